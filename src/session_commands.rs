use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{CommandResponse, TrackerError, TrackerResult},
    events::TrackerEvent,
    models::{NewSession, Session, SessionFilter},
    stats::{self, ActivityStats, DailyAggregate},
    storage::RebuildReport,
    AppState,
};

pub const MAX_TARGET_MINUTES: u32 = 24 * 60;
pub const MAX_STATS_RANGE_DAYS: i64 = 366;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetSessionRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSessionsRequest {
    #[serde(default)]
    pub filter: SessionFilter,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetStatsRequest {
    pub session_id: Option<String>,
    pub date_range: Option<DateRange>,
}

/// `{"stats": ...}` for a single session, `{"dailyStats": ...}` for a range
/// (today when no range is given).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StatsReport {
    Stats(ActivityStats),
    DailyStats(BTreeMap<NaiveDate, DailyAggregate>),
}

fn log_failure<T>(action: &str, result: TrackerResult<T>) -> CommandResponse<T> {
    if let Err(err) = &result {
        error!("Failed to {action}: {err}");
    }
    result.into()
}

fn validate_new_session(request: &NewSession) -> TrackerResult<()> {
    if request.path.trim().is_empty() {
        return Err(TrackerError::validation("path must not be empty"));
    }
    if request.title.trim().is_empty() {
        return Err(TrackerError::validation("title must not be empty"));
    }
    if !(1..=MAX_TARGET_MINUTES).contains(&request.target_minutes) {
        return Err(TrackerError::validation(format!(
            "targetMinutes must be between 1 and {MAX_TARGET_MINUTES}"
        )));
    }
    Ok(())
}

pub async fn create_session(state: &AppState, request: NewSession) -> CommandResponse<Session> {
    log_failure("create session", create(state, request).await)
}

async fn create(state: &AppState, request: NewSession) -> TrackerResult<Session> {
    validate_new_session(&request)?;
    let session = Session::new(Uuid::new_v4().to_string(), request, Utc::now());
    let created = state.storage.create_session(session).await?;
    state.events.emit(TrackerEvent::session_created(&created));
    Ok(created)
}

/// The held session is served from memory so it reflects the latest tick.
pub async fn get_session(state: &AppState, request: GetSessionRequest) -> CommandResponse<Session> {
    let result = match state.recorder.held_session(&request.session_id).await {
        Some(session) => Ok(session),
        None => state.storage.load_session(&request.session_id).await,
    };
    log_failure("load session", result)
}

pub async fn list_sessions(state: &AppState, request: ListSessionsRequest) -> CommandResponse<Vec<Session>> {
    log_failure("list sessions", state.storage.list_sessions(request.filter).await)
}

pub async fn get_stats(state: &AppState, request: GetStatsRequest) -> CommandResponse<StatsReport> {
    log_failure("compute stats", stats_report(state, request).await)
}

async fn stats_report(state: &AppState, request: GetStatsRequest) -> TrackerResult<StatsReport> {
    match (request.session_id, request.date_range) {
        (Some(session_id), _) => {
            let session = match state.recorder.held_session(&session_id).await {
                Some(session) => session,
                None => state.storage.load_session(&session_id).await?,
            };
            Ok(StatsReport::Stats(stats::session_stats(&session)))
        }
        (None, Some(DateRange { start, end })) => {
            if end < start {
                return Err(TrackerError::validation(format!(
                    "date range end {end} is before start {start}"
                )));
            }
            if (end - start).num_days() > MAX_STATS_RANGE_DAYS {
                return Err(TrackerError::validation(format!(
                    "date range may span at most {MAX_STATS_RANGE_DAYS} days"
                )));
            }
            Ok(StatsReport::DailyStats(
                state.storage.daily_stats_range(start, end).await?,
            ))
        }
        (None, None) => {
            let today = Utc::now().date_naive();
            Ok(StatsReport::DailyStats(
                state.storage.daily_stats_range(today, today).await?,
            ))
        }
    }
}

pub async fn delete_session(state: &AppState, request: GetSessionRequest) -> CommandResponse<bool> {
    log_failure("delete session", delete(state, &request.session_id).await)
}

/// A session that is currently held by the recorder has to be stopped first.
async fn delete(state: &AppState, session_id: &str) -> TrackerResult<bool> {
    state.recorder.delete_unless_holding(session_id).await?;
    Ok(true)
}

pub async fn rebuild_index(state: &AppState) -> CommandResponse<RebuildReport> {
    let result = state.storage.rebuild_index().await;
    if let Ok(report) = &result {
        info!(
            "Index rebuilt: {} sessions, {} files skipped",
            report.sessions_indexed, report.files_skipped
        );
    }
    log_failure("rebuild index", result)
}
