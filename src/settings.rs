use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{PoisonError, RwLock},
};

use crate::{
    error::{TrackerError, TrackerResult},
    storage::files::write_json_atomic,
};

pub const MIN_INTERVAL_MINUTES: u32 = 1;
pub const MAX_INTERVAL_MINUTES: u32 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerSettings {
    pub tracking_enabled: bool,
    pub activity_threshold_seconds: u32,
    pub interval_duration_minutes: u32,
    pub show_activity_indicator: bool,
    pub auto_create_sessions: bool,
    pub save_detailed_logs: bool,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            tracking_enabled: true,
            activity_threshold_seconds: 180,
            interval_duration_minutes: 5,
            show_activity_indicator: true,
            auto_create_sessions: true,
            save_detailed_logs: false,
        }
    }
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub tracking_enabled: Option<bool>,
    pub activity_threshold_seconds: Option<u32>,
    pub interval_duration_minutes: Option<u32>,
    pub show_activity_indicator: Option<bool>,
    pub auto_create_sessions: Option<bool>,
    pub save_detailed_logs: Option<bool>,
}

impl TrackerSettings {
    pub fn apply(&mut self, patch: SettingsPatch) {
        if let Some(value) = patch.tracking_enabled {
            self.tracking_enabled = value;
        }
        if let Some(value) = patch.activity_threshold_seconds {
            self.activity_threshold_seconds = value;
        }
        if let Some(value) = patch.interval_duration_minutes {
            self.interval_duration_minutes = value;
        }
        if let Some(value) = patch.show_activity_indicator {
            self.show_activity_indicator = value;
        }
        if let Some(value) = patch.auto_create_sessions {
            self.auto_create_sessions = value;
        }
        if let Some(value) = patch.save_detailed_logs {
            self.save_detailed_logs = value;
        }
    }

    pub fn validate(&self) -> TrackerResult<()> {
        if !(MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES).contains(&self.interval_duration_minutes) {
            return Err(TrackerError::validation(format!(
                "intervalDurationMinutes must be between {MIN_INTERVAL_MINUTES} and {MAX_INTERVAL_MINUTES}"
            )));
        }
        if self.activity_threshold_seconds == 0 {
            return Err(TrackerError::validation(
                "activityThresholdSeconds must be greater than zero",
            ));
        }
        Ok(())
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<TrackerSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str::<TrackerSettings>(&contents) {
                Ok(settings) if settings.validate().is_ok() => settings,
                Ok(_) | Err(_) => {
                    warn!("Ignoring invalid settings in {}, using defaults", path.display());
                    TrackerSettings::default()
                }
            }
        } else {
            TrackerSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn current(&self) -> TrackerSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Applies `patch`, validates the result and persists it. Nothing changes
    /// if validation or the write fails.
    pub fn update(&self, patch: SettingsPatch) -> TrackerResult<TrackerSettings> {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();
        next.apply(patch);
        next.validate()?;
        self.persist(&next)?;
        *guard = next.clone();
        Ok(next)
    }

    fn persist(&self, data: &TrackerSettings) -> Result<()> {
        write_json_atomic(&self.path, data)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
