//! Denormalized index of every persisted session plus per-day rollups.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::session::{Session, SessionKind, SessionStatus};
use crate::stats::{aggregate_day, DailyAggregate};

pub const INDEX_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub id: String,
    pub date: NaiveDate,
    pub file_path: PathBuf,
    pub status: SessionStatus,
    #[serde(rename = "sessionType")]
    pub kind: SessionKind,
    pub total_minutes: u64,
    pub active_minutes: u64,
    pub created_at: DateTime<Utc>,
}

impl IndexEntry {
    pub fn from_session(session: &Session, file_path: PathBuf) -> Self {
        Self {
            id: session.id.clone(),
            date: session.date(),
            file_path,
            status: session.status,
            kind: session.kind,
            total_minutes: session.total_minutes,
            active_minutes: session.active_minutes,
            created_at: session.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIndex {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rebuilt: Option<DateTime<Utc>>,
    pub total_sessions: u64,
    pub sessions: BTreeMap<String, IndexEntry>,
    pub daily_stats: BTreeMap<NaiveDate, DailyAggregate>,
}

impl SessionIndex {
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            version: INDEX_VERSION.to_string(),
            created_at: now,
            last_updated: now,
            last_rebuilt: None,
            total_sessions: 0,
            sessions: BTreeMap::new(),
            daily_stats: BTreeMap::new(),
        }
    }

    /// Inserts or replaces the entry and re-derives the affected day(s).
    /// Returns `true` when the id was not indexed before.
    pub fn upsert(&mut self, entry: IndexEntry) -> bool {
        let date = entry.date;
        let previous = self.sessions.insert(entry.id.clone(), entry);
        let is_new = previous.is_none();
        if is_new {
            self.total_sessions += 1;
        }
        if let Some(old) = previous.filter(|old| old.date != date) {
            self.recompute_day(old.date);
        }
        self.recompute_day(date);
        is_new
    }

    pub fn remove(&mut self, id: &str) -> Option<IndexEntry> {
        let removed = self.sessions.remove(id)?;
        self.total_sessions = self.total_sessions.saturating_sub(1);
        self.recompute_day(removed.date);
        Some(removed)
    }

    pub fn recompute_day(&mut self, date: NaiveDate) {
        let aggregate = aggregate_day(date, self.sessions.values());
        if aggregate.sessions_count == 0 {
            self.daily_stats.remove(&date);
        } else {
            self.daily_stats.insert(date, aggregate);
        }
    }

    pub fn day(&self, date: NaiveDate) -> DailyAggregate {
        self.daily_stats
            .get(&date)
            .cloned()
            .unwrap_or_else(|| DailyAggregate::empty(date))
    }
}
