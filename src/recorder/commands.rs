use chrono::Utc;
use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::{
    error::{CommandResponse, TrackerError, TrackerResult},
    events::{TrackerEvent, TrackingChange},
    models::{Session, SessionStatus},
    stats,
    AppState,
};

use super::RecorderSnapshot;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrackingAck {
    pub session_id: String,
}

fn respond(session_id: String, action: &str, result: TrackerResult<()>) -> CommandResponse<TrackingAck> {
    if let Err(err) = &result {
        error!("Failed to {action} tracking for {session_id}: {err}");
    }
    result.map(|_| TrackingAck { session_id }).into()
}

pub async fn start_tracking(state: &AppState, request: TrackingRequest) -> CommandResponse<TrackingAck> {
    let result = begin(state, &request.session_id).await;
    respond(request.session_id, "start", result)
}

pub async fn pause_tracking(state: &AppState, request: TrackingRequest) -> CommandResponse<TrackingAck> {
    let result = pause(state, &request.session_id).await;
    respond(request.session_id, "pause", result)
}

pub async fn stop_tracking(state: &AppState, request: TrackingRequest) -> CommandResponse<TrackingAck> {
    let result = stop(state, &request.session_id).await;
    respond(request.session_id, "stop", result)
}

pub async fn get_tracking_state(state: &AppState) -> CommandResponse<RecorderSnapshot> {
    CommandResponse::ok(state.recorder.snapshot().await)
}

async fn begin(state: &AppState, session_id: &str) -> TrackerResult<()> {
    if !state.settings.current().tracking_enabled {
        return Err(TrackerError::validation("activity tracking is disabled"));
    }
    let session = state.storage.load_session(session_id).await?;
    let interval = state.interval_config_for(&session);
    state.recorder.start(session_id, interval).await
}

/// The held session pauses through the recorder; any other session that is
/// persisted as running (left over from a previous run) is marked paused.
async fn pause(state: &AppState, session_id: &str) -> TrackerResult<()> {
    if state.recorder.pause_if_holding(session_id).await? {
        return Ok(());
    }

    let session = state.storage.load_session(session_id).await?;
    if session.status != SessionStatus::Running {
        return Ok(());
    }
    let saved = state
        .storage
        .update_session(session_id, |session| {
            session.status = SessionStatus::Paused;
            Ok(())
        })
        .await?;
    state
        .events
        .emit(TrackerEvent::tracking(TrackingChange::Paused, session_id));
    state.events.emit(TrackerEvent::session_updated(&saved));
    info!("Paused idle session {session_id}");
    Ok(())
}

async fn stop(state: &AppState, session_id: &str) -> TrackerResult<()> {
    if state.recorder.stop_if_holding(session_id).await?.is_some() {
        return Ok(());
    }

    let session = state.storage.load_session(session_id).await?;
    if session.is_completed() {
        return Ok(());
    }

    let saved = state
        .storage
        .update_session(session_id, |session| {
            complete_offline(session);
            Ok(())
        })
        .await?;
    state
        .events
        .emit(TrackerEvent::tracking(TrackingChange::Stopped, session_id));
    state.events.emit(TrackerEvent::session_completed(&saved));
    info!("Completed session {session_id} without an active recording");
    Ok(())
}

fn complete_offline(session: &mut Session) {
    session.active_minutes =
        stats::real_work_time(session.active_intervals(), session.interval_minutes);
    session.status = SessionStatus::Completed;
    session.completed_at = Some(Utc::now());
}
