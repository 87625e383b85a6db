use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{
    models::{ActivityMask, BitMaskRecord, Session, SessionStatus, DEFAULT_INTERVAL_MINUTES},
    stats::{self, ActivityStats},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum RecorderStatus {
    #[default]
    Idle,
    Recording,
    Paused,
}

/// Sampling cadence. `minutes` drives the minute accounting; `period` is the
/// real tick spacing and only differs from `minutes` when overridden for
/// development.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalConfig {
    pub minutes: u32,
    pub period: Duration,
}

impl IntervalConfig {
    pub const DEFAULT_MINUTES: u32 = DEFAULT_INTERVAL_MINUTES;

    pub fn from_minutes(minutes: u32) -> Self {
        let minutes = minutes.max(1);
        Self {
            minutes,
            period: Duration::from_secs(u64::from(minutes) * 60),
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self::from_minutes(Self::DEFAULT_MINUTES)
    }
}

/// Result of one recorded interval.
#[derive(Debug, Clone)]
pub struct IntervalSample {
    pub session_id: String,
    pub date: NaiveDate,
    pub interval_index: usize,
    pub is_active: bool,
    pub record: BitMaskRecord,
    pub stats: ActivityStats,
}

#[derive(Debug, Clone, Default)]
pub struct RecorderState {
    pub status: RecorderStatus,
    pub session: Option<Session>,
    pub interval: IntervalConfig,
    pub started_at: Option<DateTime<Utc>>,
    /// `total_minutes` the session already had when this run started.
    pub baseline_total_minutes: u64,
    /// Bumped whenever a tick source is armed, so a tick from an older run
    /// can tell it has been superseded.
    pub generation: u64,
}

impl RecorderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.id.as_str())
    }

    pub fn holds(&self, session_id: &str) -> bool {
        self.session_id() == Some(session_id)
    }

    pub fn begin(&mut self, mut session: Session, interval: IntervalConfig, now: DateTime<Utc>) -> u64 {
        session.status = SessionStatus::Running;
        session.interval_minutes = interval.minutes;
        *self = Self {
            status: RecorderStatus::Recording,
            baseline_total_minutes: session.total_minutes,
            session: Some(session),
            interval,
            started_at: Some(now),
            generation: self.generation.wrapping_add(1),
        };
        self.generation
    }

    /// Appends one sample to the mask of the calendar day `now` falls on and
    /// refreshes the session metrics. Does nothing unless recording.
    pub fn record_sample(&mut self, is_active: bool, now: DateTime<Utc>) -> Option<IntervalSample> {
        if self.status != RecorderStatus::Recording {
            return None;
        }
        let started_at = self.started_at.unwrap_or(now);
        let date = now.date_naive();

        let mask = {
            let session = self.session.as_mut()?;
            let mask = session.daily_masks.entry(date).or_insert_with(ActivityMask::new);
            mask.push(is_active);
            mask.clone()
        };
        self.refresh_metrics(now);

        let session = self.session.as_ref()?;
        Some(IntervalSample {
            session_id: session.id.clone(),
            date,
            interval_index: mask.len() - 1,
            is_active,
            record: BitMaskRecord::new(&session.id, date, mask, started_at, now),
            stats: stats::session_stats(session),
        })
    }

    fn refresh_metrics(&mut self, now: DateTime<Utc>) {
        let elapsed = self
            .started_at
            .map(|started| (now - started).num_minutes().max(0) as u64)
            .unwrap_or(0);
        let total = self.baseline_total_minutes.saturating_add(elapsed);

        if let Some(session) = self.session.as_mut() {
            session.active_minutes =
                stats::real_work_time(session.active_intervals(), session.interval_minutes);
            session.total_minutes = total;
        }
    }

    pub fn pause(&mut self) -> bool {
        if self.status != RecorderStatus::Recording {
            return false;
        }
        self.status = RecorderStatus::Paused;
        if let Some(session) = self.session.as_mut() {
            session.status = SessionStatus::Paused;
        }
        true
    }

    pub fn resume(&mut self) -> Option<u64> {
        if self.status != RecorderStatus::Paused {
            return None;
        }
        self.status = RecorderStatus::Recording;
        self.generation = self.generation.wrapping_add(1);
        if let Some(session) = self.session.as_mut() {
            session.status = SessionStatus::Running;
        }
        Some(self.generation)
    }

    /// The held session as it should be persisted on stop: metrics recomputed
    /// from every day mask, status Completed.
    pub fn finalize(&mut self, now: DateTime<Utc>) -> Option<Session> {
        self.session.as_ref()?;
        self.refresh_metrics(now);
        let mut session = self.session.clone()?;
        session.status = SessionStatus::Completed;
        session.completed_at = Some(now);
        Some(session)
    }

    pub fn reset(&mut self) {
        *self = Self {
            generation: self.generation.wrapping_add(1),
            ..Self::default()
        };
    }

    pub fn current_mask(&self, now: DateTime<Utc>) -> Option<&ActivityMask> {
        self.session
            .as_ref()
            .and_then(|session| session.daily_masks.get(&now.date_naive()))
    }
}
