//! Session-related data models.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::mask::ActivityMask;

pub const DEFAULT_FILL_COLOR: &str = "#4CAF50";
pub const DEFAULT_INTERVAL_MINUTES: u32 = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Running,
    Paused,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Created => "created",
            SessionStatus::Running => "running",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
        }
    }

    /// Completed is terminal and nothing moves back to Created.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, next) {
            (Completed, _) => false,
            (_, Created) => false,
            (Created, Paused) => false,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Work,
    ShortBreak,
    LongBreak,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Work => "work",
            SessionKind::ShortBreak => "short_break",
            SessionKind::LongBreak => "long_break",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub path: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_fill_color")]
    pub fill_color: String,
    pub status: SessionStatus,
    #[serde(rename = "sessionType")]
    pub kind: SessionKind,
    pub target_minutes: u32,
    pub total_minutes: u64,
    pub active_minutes: u64,
    /// Length of one mask interval, fixed by the first recording run.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,
    #[serde(default)]
    pub daily_masks: BTreeMap<NaiveDate, ActivityMask>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

fn default_fill_color() -> String {
    DEFAULT_FILL_COLOR.to_string()
}

fn default_interval_minutes() -> u32 {
    DEFAULT_INTERVAL_MINUTES
}

/// Fields supplied by the caller when a session is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub path: String,
    pub title: String,
    #[serde(rename = "sessionType")]
    pub kind: SessionKind,
    pub target_minutes: u32,
    #[serde(default)]
    pub description: Option<String>,
}

impl Session {
    pub fn new(id: String, input: NewSession, now: DateTime<Utc>) -> Self {
        Self {
            id,
            path: input.path,
            title: input.title,
            description: input.description.unwrap_or_default(),
            fill_color: default_fill_color(),
            status: SessionStatus::Created,
            kind: input.kind,
            target_minutes: input.target_minutes,
            total_minutes: 0,
            active_minutes: 0,
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            daily_masks: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Calendar day the session file and index entry are keyed by.
    pub fn date(&self) -> NaiveDate {
        self.created_at.date_naive()
    }

    pub fn total_intervals(&self) -> usize {
        self.daily_masks.values().map(ActivityMask::len).sum()
    }

    pub fn active_intervals(&self) -> usize {
        self.daily_masks.values().map(ActivityMask::active_count).sum()
    }

    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }
}

/// Listing filters. Date bounds are inclusive and compare against the
/// session's index date.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFilter {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub status: Option<SessionStatus>,
    #[serde(rename = "sessionType")]
    pub kind: Option<SessionKind>,
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Session {
        Session::new(
            "abc".into(),
            NewSession {
                path: "work/deep".into(),
                title: "Write report".into(),
                kind: SessionKind::Work,
                target_minutes: 25,
                description: None,
            },
            Utc::now(),
        )
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["sessionType"], "work");
        assert_eq!(value["status"], "created");
        assert_eq!(value["targetMinutes"], 25);
        assert_eq!(value["fillColor"], DEFAULT_FILL_COLOR);
        assert_eq!(value["intervalMinutes"], DEFAULT_INTERVAL_MINUTES);
        assert!(value.get("completedAt").is_none());
    }

    #[test]
    fn files_without_interval_minutes_default_to_five() {
        let mut value = serde_json::to_value(sample()).unwrap();
        value.as_object_mut().unwrap().remove("intervalMinutes");
        let back: Session = serde_json::from_value(value).unwrap();
        assert_eq!(back.interval_minutes, 5);
    }

    #[test]
    fn daily_masks_round_trip_with_date_keys() {
        let mut session = sample();
        let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let mut mask = ActivityMask::new();
        mask.push(true);
        session.daily_masks.insert(day, mask);

        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"2024-03-09\":\"1\""));
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn completed_is_terminal() {
        assert!(SessionStatus::Created.can_transition_to(SessionStatus::Running));
        assert!(SessionStatus::Running.can_transition_to(SessionStatus::Paused));
        assert!(SessionStatus::Paused.can_transition_to(SessionStatus::Running));
        assert!(SessionStatus::Paused.can_transition_to(SessionStatus::Completed));
        assert!(!SessionStatus::Completed.can_transition_to(SessionStatus::Running));
        assert!(!SessionStatus::Running.can_transition_to(SessionStatus::Created));
    }
}
