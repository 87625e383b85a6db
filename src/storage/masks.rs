use std::fs;

use anyhow::Context;
use chrono::NaiveDate;
use log::debug;

use super::{
    files::{parse_date_dir, read_json_opt, remove_if_exists, validate_session_id, write_json_atomic},
    Storage, StorageLayout,
};
use crate::{
    error::{TrackerError, TrackerResult},
    models::BitMaskRecord,
};

/// Dates with a mask record for `session_id`, taken from `<id>_<date>.json`
/// file names. The date suffix must parse, so `abc` never matches
/// `abc_def_<date>.json`.
fn mask_dates(layout: &StorageLayout, session_id: &str) -> anyhow::Result<Vec<NaiveDate>> {
    let dir = layout.masks_dir();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let prefix = format!("{session_id}_");
    let mut dates = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let date = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(".json"))
            .and_then(parse_date_dir);
        if let Some(date) = date {
            dates.push(date);
        }
    }
    dates.sort();
    Ok(dates)
}

pub(crate) fn remove_all(layout: &StorageLayout, session_id: &str) -> anyhow::Result<usize> {
    let mut removed = 0;
    for date in mask_dates(layout, session_id)? {
        if remove_if_exists(&layout.mask_path(session_id, date))? {
            removed += 1;
        }
    }
    Ok(removed)
}

impl Storage {
    pub async fn save_mask_record(&self, record: &BitMaskRecord) -> TrackerResult<()> {
        validate_session_id(&record.session_id)?;
        if record.interval_count != record.mask.len() {
            return Err(TrackerError::validation(format!(
                "interval count {} does not match mask length {}",
                record.interval_count,
                record.mask.len()
            )));
        }

        let record = record.clone();
        self.execute(move |layout| {
            let path = layout.mask_path(&record.session_id, record.date);
            write_json_atomic(&path, &record)?;
            debug!(
                "Saved bit mask for {} on {} ({} intervals)",
                record.session_id, record.date, record.interval_count
            );
            Ok(())
        })
        .await
    }

    pub async fn load_mask_record(
        &self,
        session_id: &str,
        date: NaiveDate,
    ) -> TrackerResult<Option<BitMaskRecord>> {
        validate_session_id(session_id)?;
        let session_id = session_id.to_string();
        self.execute(move |layout| Ok(read_json_opt(&layout.mask_path(&session_id, date))?))
            .await
    }

    pub async fn list_mask_records(&self, session_id: &str) -> TrackerResult<Vec<BitMaskRecord>> {
        validate_session_id(session_id)?;
        let session_id = session_id.to_string();
        self.execute(move |layout| {
            let mut records = Vec::new();
            for date in mask_dates(layout, &session_id)? {
                if let Some(record) = read_json_opt(&layout.mask_path(&session_id, date))? {
                    records.push(record);
                }
            }
            Ok(records)
        })
        .await
    }
}
