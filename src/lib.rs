pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod recorder;
pub mod session_commands;
pub mod settings;
pub mod stats;
pub mod storage;

#[cfg(test)]
mod tests;

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use log::{info, warn};
use serde::Deserialize;

use config::AppConfig;
use error::{CommandResponse, TrackerResult};
use events::{EventSink, EventStream};
use models::{Session, SessionFilter, SessionStatus};
use recorder::{ActivityProbe, ActivityRecorder, IntervalConfig, SyntheticProbe};
use settings::{SettingsPatch, SettingsStore, TrackerSettings};
use storage::Storage;

pub struct AppState {
    pub storage: Storage,
    pub recorder: ActivityRecorder,
    pub settings: SettingsStore,
    pub(crate) events: EventSink,
    config: AppConfig,
}

impl AppState {
    /// Opens storage under the configured data directory, repairs the index
    /// if needed and parks sessions a previous run left running.
    pub async fn init(config: AppConfig, probe: Arc<dyn ActivityProbe>) -> anyhow::Result<(Self, EventStream)> {
        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("Failed to create data directory {}", config.data_dir.display())
        })?;

        let storage = Storage::open(config.storage_layout())?;
        if let Some(report) = storage.ensure_index().await? {
            info!(
                "Rebuilt session index: {} sessions, {} files skipped",
                report.sessions_indexed, report.files_skipped
            );
        }
        recover_interrupted_sessions(&storage).await?;

        let settings = SettingsStore::new(config.settings_path())?;
        let (events, stream) = EventSink::channel();
        let recorder = ActivityRecorder::new(storage.clone(), probe, events.clone());

        Ok((
            Self {
                storage,
                recorder,
                settings,
                events,
                config,
            },
            stream,
        ))
    }

    pub fn interval_config(&self) -> IntervalConfig {
        self.with_tick_override(IntervalConfig::from_minutes(
            self.settings.current().interval_duration_minutes,
        ))
    }

    /// A session that already holds samples keeps the interval it was
    /// sampled at; only a fresh session picks up the current setting.
    pub fn interval_config_for(&self, session: &Session) -> IntervalConfig {
        if session.total_intervals() == 0 {
            return self.interval_config();
        }
        self.with_tick_override(IntervalConfig::from_minutes(session.interval_minutes))
    }

    fn with_tick_override(&self, interval: IntervalConfig) -> IntervalConfig {
        match self.config.tick_override {
            Some(period) => interval.with_period(period),
            None => interval,
        }
    }

    pub async fn shutdown(&self) {
        self.recorder.shutdown().await;
        info!("Recorder shut down");
    }
}

/// Nothing can be recording at startup, so any session still persisted as
/// running is marked paused.
async fn recover_interrupted_sessions(storage: &Storage) -> TrackerResult<()> {
    let running = storage
        .list_sessions(SessionFilter {
            status: Some(SessionStatus::Running),
            ..SessionFilter::default()
        })
        .await?;

    for session in running {
        warn!("Recovered interrupted session {}; marking as paused", session.id);
        storage
            .update_session(&session.id, |session| {
                session.status = SessionStatus::Paused;
                Ok(())
            })
            .await?;
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSettingsRequest {
    #[serde(default)]
    pub settings: SettingsPatch,
}

pub fn get_settings(state: &AppState) -> CommandResponse<TrackerSettings> {
    CommandResponse::ok(state.settings.current())
}

pub fn update_settings(state: &AppState, request: UpdateSettingsRequest) -> CommandResponse<TrackerSettings> {
    let result = state.settings.update(request.settings);
    match &result {
        Ok(settings) => info!(
            "Settings updated (tracking {}, {} min intervals)",
            if settings.tracking_enabled { "on" } else { "off" },
            settings.interval_duration_minutes
        ),
        Err(err) => warn!("Rejected settings update: {err}"),
    }
    result.into()
}

fn log_events(mut events: EventStream) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => info!("{} {json}", event.name()),
                Err(err) => warn!("Could not serialize {}: {err}", event.name()),
            }
        }
    })
}

pub fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    env_logger::Builder::from_default_env()
        .filter_level(if config.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    log::info!("pomatrack starting up, data in {}", config.data_dir.display());

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(async move {
        let (state, events) = AppState::init(config, Arc::new(SyntheticProbe::default())).await?;
        let listener = log_events(events);

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        info!("Shutdown requested");

        state.shutdown().await;
        drop(state);
        if tokio::time::timeout(Duration::from_secs(1), listener).await.is_err() {
            warn!("Event listener did not drain before exit");
        }
        Ok::<(), anyhow::Error>(())
    })
}
