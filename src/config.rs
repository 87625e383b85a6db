use std::{env, path::PathBuf, time::Duration};

use anyhow::{Context, Result};

use crate::storage::StorageLayout;

const DATA_DIR_ENV: &str = "POMATRACK_DATA_DIR";
const DEBUG_ENV: &str = "POMATRACK_DEBUG";
const TICK_SECS_ENV: &str = "POMATRACK_TICK_SECS";

const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub debug: bool,
    /// Replaces the real tick spacing; interval minutes still drive the
    /// minute accounting.
    pub tick_override: Option<Duration>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let data_dir = match env::var_os(DATA_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .context("Could not determine the user data directory")?
                .join("pomatrack"),
        };

        let debug = env::var(DEBUG_ENV)
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let tick_override = match env::var(TICK_SECS_ENV) {
            Ok(raw) => {
                let secs: u64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{TICK_SECS_ENV} must be a whole number of seconds"))?;
                Some(Duration::from_secs(secs.max(1)))
            }
            Err(_) => None,
        };

        Ok(Self {
            data_dir,
            debug,
            tick_override,
        })
    }

    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            debug: false,
            tick_override: None,
        }
    }

    pub fn storage_layout(&self) -> StorageLayout {
        StorageLayout::new(self.data_dir.clone())
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE)
    }
}
