use std::{
    fs::{self, File},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{TrackerError, TrackerResult};

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

/// Like [`read_json`], but a missing file is `Ok(None)`.
pub fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents)
            .map(Some)
            .with_context(|| format!("failed to parse {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

/// Writes the whole value to a sibling temp file, syncs it, then renames it
/// over `path`. Readers see either the old or the new file, never a torn one.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("{} has no parent directory", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create directory {}", parent.display()))?;

    let serialized = serde_json::to_string_pretty(value)?;
    let tmp_path = temp_path(path)?;

    let mut tmp_file = File::create(&tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;
    tmp_file
        .write_all(serialized.as_bytes())
        .and_then(|_| tmp_file.sync_all())
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    drop(tmp_file);

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err).with_context(|| format!("failed to replace {}", path.display()));
    }
    Ok(())
}

fn temp_path(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("invalid file name {}", path.display()))?;
    Ok(path.with_file_name(format!(".{file_name}.tmp")))
}

/// Returns whether a file was actually removed.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
    }
}

/// Directory names under the sessions root are `YYYY-MM-DD`.
pub fn parse_date_dir(name: &str) -> Option<NaiveDate> {
    if name.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(name, "%Y-%m-%d").ok()
}

/// Session ids become file names, so only a conservative charset is allowed.
pub fn validate_session_id(id: &str) -> TrackerResult<()> {
    if id.is_empty() {
        return Err(TrackerError::validation("session id must not be empty"));
    }
    if id.len() > 128 {
        return Err(TrackerError::validation("session id is too long"));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(TrackerError::validation(format!(
            "session id {id:?} contains unsupported characters"
        )));
    }
    Ok(())
}
