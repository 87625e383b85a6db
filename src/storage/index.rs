//! Index manager: the single `index.json` summarizing every session.
//!
//! The index is derived data. Session files are authoritative, and
//! [`rebuild`] reconstructs the whole index from them.

use std::{collections::BTreeMap, fs, path::PathBuf};

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::{
    files::{parse_date_dir, read_json, read_json_opt, validate_session_id, write_json_atomic},
    Storage, StorageLayout,
};
use crate::{
    error::TrackerResult,
    models::{IndexEntry, Session, SessionIndex},
    stats::DailyAggregate,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildReport {
    pub sessions_indexed: usize,
    pub files_skipped: usize,
    pub rebuilt_at: DateTime<Utc>,
}

/// Loads the index; a missing file yields a fresh one. A file that exists but
/// cannot be parsed is an error so that callers never overwrite it blindly.
pub(crate) fn load(layout: &StorageLayout) -> anyhow::Result<SessionIndex> {
    Ok(read_json_opt(layout.index_path())?.unwrap_or_else(|| SessionIndex::fresh(Utc::now())))
}

pub(crate) fn save(layout: &StorageLayout, index: &mut SessionIndex) -> anyhow::Result<()> {
    index.last_updated = Utc::now();
    write_json_atomic(layout.index_path(), index).context("failed to save index")
}

pub(crate) fn apply_update(
    layout: &StorageLayout,
    session: &Session,
    file_path: PathBuf,
) -> TrackerResult<bool> {
    let mut index = load(layout)?;
    let is_new = index.upsert(IndexEntry::from_session(session, file_path));
    save(layout, &mut index)?;
    Ok(is_new)
}

pub(crate) fn lookup(layout: &StorageLayout, session_id: &str) -> anyhow::Result<Option<IndexEntry>> {
    Ok(load(layout)?.sessions.remove(session_id))
}

/// Every `sessions/<YYYY-MM-DD>/*.json` file, sorted for a stable walk order.
pub(crate) fn session_files(layout: &StorageLayout) -> anyhow::Result<Vec<PathBuf>> {
    let root = layout.sessions_dir();
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let entries =
        fs::read_dir(root).with_context(|| format!("failed to read {}", root.display()))?;
    for entry in entries {
        let entry = entry?;
        let is_date_dir = entry.file_type()?.is_dir()
            && entry
                .file_name()
                .to_str()
                .and_then(parse_date_dir)
                .is_some();
        if !is_date_dir {
            continue;
        }

        for file in fs::read_dir(entry.path())? {
            let path = file?.path();
            let is_session_file = path.extension().and_then(|ext| ext.to_str()) == Some("json")
                && !path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map_or(true, |name| name.starts_with('.'));
            if is_session_file {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

pub(crate) fn rebuild(layout: &StorageLayout) -> TrackerResult<RebuildReport> {
    info!("Rebuilding session index...");
    let now = Utc::now();

    let mut index = SessionIndex::fresh(now);
    if let Ok(previous) = load(layout) {
        index.created_at = previous.created_at;
    }

    let mut files_skipped = 0;
    for path in session_files(layout)? {
        match read_json::<Session>(&path) {
            Ok(session) => {
                if let Err(err) = validate_session_id(&session.id) {
                    warn!("Skipping session file {}: {err}", path.display());
                    files_skipped += 1;
                    continue;
                }
                index.upsert(IndexEntry::from_session(&session, path));
            }
            Err(err) => {
                warn!("Skipping unreadable session file {}: {err:#}", path.display());
                files_skipped += 1;
            }
        }
    }

    index.total_sessions = index.sessions.len() as u64;
    index.last_rebuilt = Some(now);
    save(layout, &mut index)?;

    info!(
        "Rebuilt index with {} sessions ({} files skipped)",
        index.total_sessions, files_skipped
    );

    Ok(RebuildReport {
        sessions_indexed: index.sessions.len(),
        files_skipped,
        rebuilt_at: now,
    })
}

impl Storage {
    pub async fn load_index(&self) -> TrackerResult<SessionIndex> {
        self.execute(|layout| Ok(load(layout)?)).await
    }

    /// Re-derives the index entry and day aggregate for an already written
    /// session file.
    pub async fn update_index(&self, session: &Session) -> TrackerResult<bool> {
        let record = session.clone();
        self.execute(move |layout| {
            let path = layout.session_path(&record.id, record.date());
            apply_update(layout, &record, path)
        })
        .await
    }

    pub async fn rebuild_index(&self) -> TrackerResult<RebuildReport> {
        self.execute(rebuild).await
    }

    /// Rebuilds when the index is missing or unreadable. Returns the rebuild
    /// report if one ran.
    pub async fn ensure_index(&self) -> TrackerResult<Option<RebuildReport>> {
        self.execute(|layout| {
            if layout.index_path().exists() {
                match read_json::<SessionIndex>(layout.index_path()) {
                    Ok(_) => return Ok(None),
                    Err(err) => warn!("Session index is corrupt, rebuilding: {err:#}"),
                }
            }
            rebuild(layout).map(Some)
        })
        .await
    }

    pub async fn day_stats(&self, date: NaiveDate) -> TrackerResult<DailyAggregate> {
        self.execute(move |layout| Ok(load(layout)?.day(date))).await
    }

    /// One aggregate per date in `start..=end`, zeros where nothing was tracked.
    pub async fn daily_stats_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> TrackerResult<BTreeMap<NaiveDate, DailyAggregate>> {
        self.execute(move |layout| {
            let index = load(layout)?;
            Ok(start
                .iter_days()
                .take_while(|date| *date <= end)
                .map(|date| (date, index.day(date)))
                .collect())
        })
        .await
    }
}
