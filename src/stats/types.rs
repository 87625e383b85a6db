use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStats {
    pub total_intervals: usize,
    pub active_intervals: usize,
    pub inactive_intervals: usize,
    pub activity_percentage: f64,
    /// Wall-clock minutes the session has been running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_duration: Option<u64>,
    /// Active intervals expressed in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_work_time: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub sessions_count: usize,
    pub total_active_minutes: u64,
    /// Minute-weighted: sum of active minutes over sum of total minutes.
    pub average_activity: f64,
}

impl DailyAggregate {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            sessions_count: 0,
            total_active_minutes: 0,
            average_activity: 0.0,
        }
    }
}
