//! Per-day activity bit masks.
//!
//! One character per recorded interval: `'1'` active, `'0'` inactive.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActivityMask(String);

impl ActivityMask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, active: bool) {
        self.0.push(if active { '1' } else { '0' });
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.0.bytes().filter(|b| *b == b'1').count()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ActivityMask {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if let Some(bad) = value.chars().find(|c| *c != '0' && *c != '1') {
            return Err(format!("invalid activity mask character {bad:?}"));
        }
        Ok(Self(value))
    }
}

impl From<ActivityMask> for String {
    fn from(mask: ActivityMask) -> Self {
        mask.0
    }
}

impl fmt::Display for ActivityMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stand-alone copy of one session's mask for one day, stored next to the
/// session file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitMaskRecord {
    pub date: NaiveDate,
    pub session_id: String,
    pub mask: ActivityMask,
    pub start_time: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Always equal to `mask.len()`.
    pub interval_count: usize,
}

impl BitMaskRecord {
    pub fn new(
        session_id: &str,
        date: NaiveDate,
        mask: ActivityMask,
        start_time: DateTime<Utc>,
        last_updated: DateTime<Utc>,
    ) -> Self {
        Self {
            date,
            session_id: session_id.to_string(),
            interval_count: mask.len(),
            mask,
            start_time,
            last_updated,
        }
    }
}
