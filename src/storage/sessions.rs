use std::path::PathBuf;

use chrono::Utc;
use log::{debug, info, warn};

use super::{
    files::{read_json, remove_if_exists, validate_session_id, write_json_atomic},
    index, masks, Storage, StorageLayout,
};
use crate::{
    error::{TrackerError, TrackerResult},
    models::{IndexEntry, Session, SessionFilter},
};

fn validate_session(session: &Session) -> TrackerResult<()> {
    validate_session_id(&session.id)?;
    if session.title.trim().is_empty() {
        return Err(TrackerError::validation("session title must not be empty"));
    }
    if session.target_minutes == 0 {
        return Err(TrackerError::validation("target minutes must be greater than zero"));
    }
    Ok(())
}

/// Writes the session file first and only then touches the index, so a crash
/// in between leaves a stale index that `rebuild` can repair.
pub(crate) fn write_session(layout: &StorageLayout, session: &mut Session) -> TrackerResult<Session> {
    session.updated_at = Utc::now();
    let path = layout.session_path(&session.id, session.date());
    write_json_atomic(&path, session)?;
    index::apply_update(layout, session, path)?;
    debug!("Saved session {}", session.id);
    Ok(session.clone())
}

/// Finds the file for `session_id`, via the index first and a directory scan
/// when the index has no (or a dangling) entry.
fn locate(layout: &StorageLayout, session_id: &str) -> anyhow::Result<Option<PathBuf>> {
    match index::lookup(layout, session_id) {
        Ok(Some(entry)) if entry.file_path.exists() => return Ok(Some(entry.file_path)),
        Ok(Some(entry)) => warn!(
            "Index points session {session_id} at missing file {}",
            entry.file_path.display()
        ),
        Ok(None) => {}
        Err(err) => warn!("Could not consult index for {session_id}: {err:#}"),
    }

    let file_name = format!("{session_id}.json");
    Ok(index::session_files(layout)?
        .into_iter()
        .find(|path| path.file_name().and_then(|name| name.to_str()) == Some(file_name.as_str())))
}

pub(crate) fn read_session(layout: &StorageLayout, session_id: &str) -> TrackerResult<Session> {
    validate_session_id(session_id)?;
    let path = locate(layout, session_id)?
        .ok_or_else(|| TrackerError::not_found(format!("session {session_id}")))?;
    Ok(read_json(&path)?)
}

fn matches_filter(entry: &IndexEntry, filter: &SessionFilter) -> bool {
    filter.date_from.map_or(true, |from| entry.date >= from)
        && filter.date_to.map_or(true, |to| entry.date <= to)
        && filter.status.map_or(true, |status| entry.status == status)
        && filter.kind.map_or(true, |kind| entry.kind == kind)
}

impl Storage {
    /// Persists a brand-new session. Fails if the id is already taken.
    pub async fn create_session(&self, session: Session) -> TrackerResult<Session> {
        validate_session(&session)?;
        let mut record = session;
        self.execute(move |layout| {
            let taken = index::lookup(layout, &record.id)?.is_some()
                || layout.session_path(&record.id, record.date()).exists();
            if taken {
                return Err(TrackerError::validation(format!(
                    "session {} already exists",
                    record.id
                )));
            }
            let saved = write_session(layout, &mut record)?;
            info!("Created {} session {}", saved.kind.as_str(), saved.id);
            Ok(saved)
        })
        .await
    }

    /// Upserts the session and refreshes its index entry. The returned copy
    /// carries the new `updated_at`.
    pub async fn save_session(&self, session: &Session) -> TrackerResult<Session> {
        validate_session(session)?;
        let mut record = session.clone();
        self.execute(move |layout| write_session(layout, &mut record))
            .await
    }

    /// Load, mutate and save as one storage task. Status changes must follow
    /// the session lifecycle.
    pub async fn update_session<F>(&self, session_id: &str, mutate: F) -> TrackerResult<Session>
    where
        F: FnOnce(&mut Session) -> TrackerResult<()> + Send + 'static,
    {
        validate_session_id(session_id)?;
        let session_id = session_id.to_string();
        self.execute(move |layout| {
            let mut session = read_session(layout, &session_id)?;
            let before = session.status;
            mutate(&mut session)?;
            if session.status != before && !before.can_transition_to(session.status) {
                return Err(TrackerError::validation(format!(
                    "session {session_id} cannot move from {} to {}",
                    before.as_str(),
                    session.status.as_str()
                )));
            }
            validate_session(&session)?;
            write_session(layout, &mut session)
        })
        .await
    }

    pub async fn load_session(&self, session_id: &str) -> TrackerResult<Session> {
        validate_session_id(session_id)?;
        let session_id = session_id.to_string();
        self.execute(move |layout| read_session(layout, &session_id))
            .await
    }

    /// Removes the session file, every mask record of the session and its
    /// index entry. The index is read before anything is removed, so an
    /// unreadable index fails the delete with every file still in place.
    pub async fn delete_session(&self, session_id: &str) -> TrackerResult<()> {
        validate_session_id(session_id)?;
        let session_id = session_id.to_string();
        self.execute(move |layout| {
            let mut index = index::load(layout)?;
            let path = locate(layout, &session_id)?
                .ok_or_else(|| TrackerError::not_found(format!("session {session_id}")))?;

            remove_if_exists(&path)?;
            let removed_masks = masks::remove_all(layout, &session_id)?;
            if index.remove(&session_id).is_some() {
                index::save(layout, &mut index)?;
            }

            info!("Deleted session {session_id} ({removed_masks} mask records)");
            Ok(())
        })
        .await
    }

    /// Filters against the index, newest first, then hydrates each hit from
    /// its file. Entries whose file cannot be read are skipped.
    pub async fn list_sessions(&self, filter: SessionFilter) -> TrackerResult<Vec<Session>> {
        if let (Some(from), Some(to)) = (filter.date_from, filter.date_to) {
            if from > to {
                return Err(TrackerError::validation(format!(
                    "dateFrom {from} is after dateTo {to}"
                )));
            }
        }

        self.execute(move |layout| {
            let index = index::load(layout)?;
            let mut entries: Vec<&IndexEntry> = index
                .sessions
                .values()
                .filter(|entry| matches_filter(entry, &filter))
                .collect();
            entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
            if let Some(limit) = filter.limit {
                entries.truncate(limit);
            }

            let mut sessions = Vec::with_capacity(entries.len());
            for entry in entries {
                match read_json::<Session>(&entry.file_path) {
                    Ok(session) => sessions.push(session),
                    Err(err) => warn!("Skipping indexed session {}: {err:#}", entry.id),
                }
            }

            debug!("Listed {} sessions", sessions.len());
            Ok(sessions)
        })
        .await
    }
}
