use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use chrono::{NaiveDate, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{TrackerError, TrackerResult},
    events::{EventSink, IntervalRecordedEvent, TrackerEvent, TrackingChange},
    models::Session,
    stats::{self, ActivityStats},
    storage::Storage,
};

use super::{
    probe::{sample_probe, ActivityProbe},
    IntervalConfig, IntervalSample, RecorderState, RecorderStatus,
};

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RecorderSnapshot {
    pub status: RecorderStatus,
    pub session_id: Option<String>,
    pub date: NaiveDate,
    pub current_mask: String,
    pub stats: Option<ActivityStats>,
}

struct Ticker {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

/// Samples activity for at most one session at a time.
///
/// `control` serializes start/pause/resume/stop; `state` is shared with the
/// tick task and is held across a whole sample-persist-emit step, so a pause
/// or stop never overlaps an in-flight interval write.
#[derive(Clone)]
pub struct ActivityRecorder {
    state: Arc<Mutex<RecorderState>>,
    control: Arc<Mutex<()>>,
    storage: Storage,
    probe: Arc<dyn ActivityProbe>,
    events: EventSink,
    ticker: Arc<Mutex<Option<Ticker>>>,
}

impl ActivityRecorder {
    pub fn new(storage: Storage, probe: Arc<dyn ActivityProbe>, events: EventSink) -> Self {
        Self {
            state: Arc::new(Mutex::new(RecorderState::new())),
            control: Arc::new(Mutex::new(())),
            storage,
            probe,
            events,
            ticker: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn status(&self) -> RecorderStatus {
        self.state.lock().await.status
    }

    pub async fn active_session_id(&self) -> Option<String> {
        self.state.lock().await.session_id().map(str::to_string)
    }

    /// In-memory copy of the held session, if it is `session_id`.
    pub async fn held_session(&self, session_id: &str) -> Option<Session> {
        let state = self.state.lock().await;
        state
            .session
            .as_ref()
            .filter(|session| session.id == session_id)
            .cloned()
    }

    pub async fn snapshot(&self) -> RecorderSnapshot {
        let state = self.state.lock().await;
        let now = Utc::now();
        RecorderSnapshot {
            status: state.status,
            session_id: state.session_id().map(str::to_string),
            date: now.date_naive(),
            current_mask: state
                .current_mask(now)
                .map(|mask| mask.to_string())
                .unwrap_or_default(),
            stats: state
                .session
                .as_ref()
                .map(stats::session_stats),
        }
    }

    /// Starts (or resumes) recording `session_id`. A different session that
    /// is currently held is stopped first. The session is read under the
    /// control lock, so a concurrent delete either wins or is refused.
    pub async fn start(&self, session_id: &str, interval: IntervalConfig) -> TrackerResult<()> {
        let _control = self.control.lock().await;

        let session = match self.held_session(session_id).await {
            Some(session) => session,
            None => self.storage.load_session(session_id).await?,
        };
        if session.is_completed() {
            return Err(TrackerError::validation(format!(
                "session {} is already completed",
                session.id
            )));
        }

        let held = {
            let state = self.state.lock().await;
            state.session_id().map(|id| (id.to_string(), state.status))
        };
        if let Some((held_id, status)) = held {
            if held_id == session.id {
                return match status {
                    RecorderStatus::Paused => self.resume_inner().await,
                    _ => {
                        debug!("Session {held_id} is already being recorded");
                        Ok(())
                    }
                };
            }
            info!("Stopping session {held_id} before recording {}", session.id);
            self.stop_inner().await?;
        }

        let session_id = session.id.clone();
        let (generation, saved) = {
            let mut state = self.state.lock().await;
            let generation = state.begin(session, interval, Utc::now());
            let running = state
                .session
                .clone()
                .ok_or_else(|| anyhow!("recorder lost its session"))?;
            match self.storage.save_session(&running).await {
                Ok(saved) => {
                    if let Some(held) = state.session.as_mut() {
                        held.updated_at = saved.updated_at;
                    }
                    (generation, saved)
                }
                Err(err) => {
                    state.reset();
                    return Err(err);
                }
            }
        };

        self.spawn_ticker(generation, interval.period).await;
        self.events
            .emit(TrackerEvent::tracking(TrackingChange::Started, &session_id));
        self.events.emit(TrackerEvent::session_updated(&saved));
        info!(
            "Recording session {session_id} every {} min",
            interval.minutes
        );
        Ok(())
    }

    pub async fn pause(&self) -> TrackerResult<()> {
        let _control = self.control.lock().await;
        self.pause_inner().await
    }

    pub async fn resume(&self) -> TrackerResult<()> {
        let _control = self.control.lock().await;
        self.resume_inner().await
    }

    /// Finalizes the held session. Returns `None` when idle.
    pub async fn stop(&self) -> TrackerResult<Option<Session>> {
        let _control = self.control.lock().await;
        self.stop_inner().await
    }

    /// Pauses only if `session_id` is the held session. Returns whether it was.
    pub async fn pause_if_holding(&self, session_id: &str) -> TrackerResult<bool> {
        let _control = self.control.lock().await;
        if !self.state.lock().await.holds(session_id) {
            return Ok(false);
        }
        self.pause_inner().await?;
        Ok(true)
    }

    /// Stops only if `session_id` is the held session.
    pub async fn stop_if_holding(&self, session_id: &str) -> TrackerResult<Option<Session>> {
        let _control = self.control.lock().await;
        if !self.state.lock().await.holds(session_id) {
            return Ok(None);
        }
        self.stop_inner().await
    }

    /// Deletes a stored session unless it is the one being recorded.
    pub async fn delete_unless_holding(&self, session_id: &str) -> TrackerResult<()> {
        let _control = self.control.lock().await;
        if self.state.lock().await.holds(session_id) {
            return Err(TrackerError::validation(format!(
                "session {session_id} is being tracked; stop it before deleting"
            )));
        }
        self.storage.delete_session(session_id).await
    }

    /// Takes one sample right away, outside the tick schedule.
    pub async fn record_interval(&self) -> TrackerResult<Option<IntervalSample>> {
        let mut state = self.state.lock().await;
        self.record_locked(&mut state).await
    }

    /// Pauses whatever is being recorded and disarms the tick source.
    pub async fn shutdown(&self) {
        let _control = self.control.lock().await;
        if let Err(err) = self.pause_inner().await {
            error!("Failed to pause recording during shutdown: {err}");
        }
        self.cancel_ticker().await;
    }

    async fn pause_inner(&self) -> TrackerResult<()> {
        let saved = {
            let mut state = self.state.lock().await;
            if state.status != RecorderStatus::Recording {
                debug!("Pause requested while not recording");
                return Ok(());
            }
            if let Err(err) = self.record_locked(&mut state).await {
                warn!("Final interval before pause was not persisted: {err}");
            }
            state.pause();
            let paused = state
                .session
                .clone()
                .ok_or_else(|| anyhow!("recorder lost its session"))?;
            let saved = self.storage.save_session(&paused).await?;
            if let Some(held) = state.session.as_mut() {
                held.updated_at = saved.updated_at;
            }
            saved
        };

        self.cancel_ticker().await;
        self.events
            .emit(TrackerEvent::tracking(TrackingChange::Paused, &saved.id));
        self.events.emit(TrackerEvent::session_updated(&saved));
        info!("Paused recording of session {}", saved.id);
        Ok(())
    }

    async fn resume_inner(&self) -> TrackerResult<()> {
        let (generation, period, saved) = {
            let mut state = self.state.lock().await;
            let Some(generation) = state.resume() else {
                debug!("Resume requested while not paused");
                return Ok(());
            };
            let running = state
                .session
                .clone()
                .ok_or_else(|| anyhow!("recorder lost its session"))?;
            match self.storage.save_session(&running).await {
                Ok(saved) => {
                    if let Some(held) = state.session.as_mut() {
                        held.updated_at = saved.updated_at;
                    }
                    (generation, state.interval.period, saved)
                }
                Err(err) => {
                    state.pause();
                    return Err(err);
                }
            }
        };

        self.spawn_ticker(generation, period).await;
        self.events
            .emit(TrackerEvent::tracking(TrackingChange::Resumed, &saved.id));
        self.events.emit(TrackerEvent::session_updated(&saved));
        info!("Resumed recording of session {}", saved.id);
        Ok(())
    }

    async fn stop_inner(&self) -> TrackerResult<Option<Session>> {
        let completed = {
            let mut state = self.state.lock().await;
            match state.status {
                RecorderStatus::Idle => {
                    debug!("Stop requested while idle");
                    return Ok(None);
                }
                RecorderStatus::Recording => {
                    if let Err(err) = self.record_locked(&mut state).await {
                        warn!("Final interval before stop was not persisted: {err}");
                    }
                }
                RecorderStatus::Paused => {}
            }

            let finalized = state
                .finalize(Utc::now())
                .ok_or_else(|| anyhow!("recorder lost its session"))?;
            let saved = self.storage.save_session(&finalized).await?;
            state.reset();
            saved
        };

        self.cancel_ticker().await;
        self.events
            .emit(TrackerEvent::tracking(TrackingChange::Stopped, &completed.id));
        self.events.emit(TrackerEvent::session_completed(&completed));
        info!(
            "Session {} completed: {} min total, {} min active",
            completed.id, completed.total_minutes, completed.active_minutes
        );
        Ok(Some(completed))
    }

    /// Sample, persist and notify for one interval. Persistence failures are
    /// returned after the event has gone out; the sample stays in memory.
    async fn record_locked(&self, state: &mut RecorderState) -> TrackerResult<Option<IntervalSample>> {
        if state.status != RecorderStatus::Recording {
            return Ok(None);
        }

        let is_active = sample_probe(self.probe.clone()).await;
        let Some(sample) = state.record_sample(is_active, Utc::now()) else {
            return Ok(None);
        };

        let persisted = self.persist_sample(state, &sample).await;

        self.events
            .emit(TrackerEvent::IntervalRecorded(IntervalRecordedEvent {
                session_id: sample.session_id.clone(),
                date: sample.date,
                interval_index: sample.interval_index,
                is_active: sample.is_active,
                stats: sample.stats.clone(),
            }));
        debug!(
            "Interval {} for {} on {}: {}",
            sample.interval_index,
            sample.session_id,
            sample.date,
            if sample.is_active { "active" } else { "inactive" }
        );

        persisted.map(|_| Some(sample))
    }

    async fn persist_sample(&self, state: &mut RecorderState, sample: &IntervalSample) -> TrackerResult<()> {
        let session = state
            .session
            .clone()
            .ok_or_else(|| anyhow!("recorder lost its session"))?;
        let saved = self.storage.save_session(&session).await?;
        if let Some(held) = state.session.as_mut() {
            held.updated_at = saved.updated_at;
        }
        self.storage.save_mask_record(&sample.record).await
    }

    async fn spawn_ticker(&self, generation: u64, period: Duration) {
        self.cancel_ticker().await;

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(self.clone().run_ticker(generation, period, cancel_token.clone()));
        *self.ticker.lock().await = Some(Ticker {
            handle,
            cancel_token,
        });
    }

    /// Cancels the tick task and waits for it to finish. Callers must not
    /// hold `state`, the task may be waiting on it.
    async fn cancel_ticker(&self) {
        let ticker = self.ticker.lock().await.take();
        if let Some(Ticker {
            handle,
            cancel_token,
        }) = ticker
        {
            cancel_token.cancel();
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    error!("Interval ticker ended abnormally: {err}");
                }
            }
        }
    }

    async fn run_ticker(self, generation: u64, period: Duration, cancel_token: CancellationToken) {
        let mut interval = time::interval_at(time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!("Interval ticker cancelled");
                    break;
                }
                _ = interval.tick() => {
                    let mut state = self.state.lock().await;
                    if state.status != RecorderStatus::Recording || state.generation != generation {
                        break;
                    }
                    if let Err(err) = self.record_locked(&mut state).await {
                        error!("Failed to persist interval: {err}");
                    }
                }
            }
        }
    }
}
