//! End-to-end tests through the command surface.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use crate::{
    config::AppConfig,
    events::EventStream,
    get_settings,
    models::{NewSession, Session, SessionFilter, SessionKind, SessionStatus},
    recorder::{
        commands::{get_tracking_state, pause_tracking, start_tracking, stop_tracking, TrackingRequest},
        RecorderStatus, SyntheticProbe,
    },
    session_commands::{
        create_session, delete_session, get_session, get_stats, list_sessions, rebuild_index,
        DateRange, GetSessionRequest, GetStatsRequest, ListSessionsRequest, StatsReport,
    },
    settings::SettingsPatch,
    storage::{Storage, StorageLayout},
    update_settings, AppState, UpdateSettingsRequest,
};

async fn app(dir: &TempDir) -> (AppState, EventStream) {
    AppState::init(
        AppConfig::with_data_dir(dir.path()),
        Arc::new(SyntheticProbe::new(1.0)),
    )
    .await
    .unwrap()
}

fn new_session(title: &str, target_minutes: u32) -> NewSession {
    NewSession {
        path: "writing".into(),
        title: title.into(),
        kind: SessionKind::Work,
        target_minutes,
        description: Some("chapter draft".into()),
    }
}

fn tracking(session_id: &str) -> TrackingRequest {
    TrackingRequest {
        session_id: session_id.to_string(),
    }
}

async fn created(state: &AppState, title: &str) -> Session {
    let response = create_session(state, new_session(title, 25)).await;
    assert!(response.success, "{:?}", response.error);
    response.data.unwrap()
}

#[tokio::test]
async fn create_session_assigns_id_and_emits_event() {
    let dir = tempfile::tempdir().unwrap();
    let (state, mut events) = app(&dir).await;

    let session = created(&state, "Outline").await;
    assert!(!session.id.is_empty());
    assert_eq!(session.status, SessionStatus::Created);
    assert_eq!(session.description, "chapter draft");

    let event = events.try_recv().unwrap();
    assert_eq!(event.name(), "session-created");

    let fetched = get_session(
        &state,
        GetSessionRequest {
            session_id: session.id.clone(),
        },
    )
    .await;
    assert_eq!(fetched.data.unwrap().title, "Outline");
}

#[tokio::test]
async fn create_session_validation_failures_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _events) = app(&dir).await;

    let response = create_session(&state, new_session("  ", 25)).await;
    assert!(!response.success);
    assert!(response.error.unwrap().contains("title"));

    let response = create_session(&state, new_session("Too long", 5000)).await;
    assert!(!response.success);
    assert!(response.data.is_none());
}

#[tokio::test]
async fn tracking_round_trip_through_commands() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _events) = app(&dir).await;
    let session = created(&state, "Focus").await;

    assert!(start_tracking(&state, tracking(&session.id)).await.success);
    let snapshot = get_tracking_state(&state).await.data.unwrap();
    assert_eq!(snapshot.status, RecorderStatus::Recording);
    assert_eq!(snapshot.session_id.as_deref(), Some(session.id.as_str()));

    assert!(pause_tracking(&state, tracking(&session.id)).await.success);
    assert_eq!(state.recorder.status().await, RecorderStatus::Paused);

    assert!(stop_tracking(&state, tracking(&session.id)).await.success);
    assert_eq!(state.recorder.status().await, RecorderStatus::Idle);

    let stored = state.storage.load_session(&session.id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
    // The pause flushed one sample with an always-active probe.
    assert_eq!(stored.active_intervals(), 1);

    let restart = start_tracking(&state, tracking(&session.id)).await;
    assert!(!restart.success);
}

#[tokio::test]
async fn tracking_unknown_session_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _events) = app(&dir).await;

    let response = start_tracking(&state, tracking("missing")).await;
    assert!(!response.success);
    assert!(response.error.unwrap().contains("not found"));
}

#[tokio::test]
async fn disabled_tracking_rejects_start() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _events) = app(&dir).await;
    let session = created(&state, "Blocked").await;

    let response = update_settings(
        &state,
        UpdateSettingsRequest {
            settings: SettingsPatch {
                tracking_enabled: Some(false),
                ..SettingsPatch::default()
            },
        },
    );
    assert!(response.success);
    assert!(!get_settings(&state).data.unwrap().tracking_enabled);

    let response = start_tracking(&state, tracking(&session.id)).await;
    assert!(!response.success);
    assert_eq!(state.recorder.status().await, RecorderStatus::Idle);
}

#[tokio::test]
async fn interval_setting_drives_recorder_cadence() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _events) = app(&dir).await;
    assert_eq!(state.interval_config().minutes, 5);

    update_settings(
        &state,
        UpdateSettingsRequest {
            settings: SettingsPatch {
                interval_duration_minutes: Some(15),
                ..SettingsPatch::default()
            },
        },
    );
    assert_eq!(state.interval_config().minutes, 15);

    let rejected = update_settings(
        &state,
        UpdateSettingsRequest {
            settings: SettingsPatch {
                interval_duration_minutes: Some(90),
                ..SettingsPatch::default()
            },
        },
    );
    assert!(!rejected.success);
    assert_eq!(state.interval_config().minutes, 15);
}

#[tokio::test]
async fn deleting_the_tracked_session_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _events) = app(&dir).await;
    let session = created(&state, "Busy").await;
    let request = || GetSessionRequest {
        session_id: session.id.clone(),
    };

    start_tracking(&state, tracking(&session.id)).await;
    assert!(!delete_session(&state, request()).await.success);

    stop_tracking(&state, tracking(&session.id)).await;
    assert!(delete_session(&state, request()).await.success);
    assert!(!get_session(&state, request()).await.success);
}

#[tokio::test]
async fn stats_for_session_and_range() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _events) = app(&dir).await;
    let session = created(&state, "Measured").await;

    start_tracking(&state, tracking(&session.id)).await;
    state.recorder.record_interval().await.unwrap();
    state.recorder.record_interval().await.unwrap();

    let report = get_stats(
        &state,
        GetStatsRequest {
            session_id: Some(session.id.clone()),
            date_range: None,
        },
    )
    .await
    .data
    .unwrap();
    match report {
        StatsReport::Stats(stats) => {
            assert_eq!(stats.total_intervals, 2);
            assert_eq!(stats.activity_percentage, 100.0);
            assert_eq!(stats.real_work_time, Some(10));
        }
        other => panic!("expected session stats, got {other:?}"),
    }

    stop_tracking(&state, tracking(&session.id)).await;

    let today = Utc::now().date_naive();
    let report = get_stats(
        &state,
        GetStatsRequest {
            session_id: None,
            date_range: Some(DateRange {
                start: today - Duration::days(2),
                end: today,
            }),
        },
    )
    .await
    .data
    .unwrap();
    match report {
        StatsReport::DailyStats(days) => {
            assert_eq!(days.len(), 3);
            assert_eq!(days[&today].sessions_count, 1);
            assert_eq!(days[&(today - Duration::days(1))].sessions_count, 0);
        }
        other => panic!("expected daily stats, got {other:?}"),
    }
}

#[tokio::test]
async fn stats_range_is_validated_and_defaults_to_today() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _events) = app(&dir).await;
    let today = Utc::now().date_naive();

    let inverted = get_stats(
        &state,
        GetStatsRequest {
            session_id: None,
            date_range: Some(DateRange {
                start: today,
                end: today - Duration::days(1),
            }),
        },
    )
    .await;
    assert!(!inverted.success);

    let too_wide = get_stats(
        &state,
        GetStatsRequest {
            session_id: None,
            date_range: Some(DateRange {
                start: today - Duration::days(400),
                end: today,
            }),
        },
    )
    .await;
    assert!(!too_wide.success);

    let today_only = get_stats(&state, GetStatsRequest::default()).await.data.unwrap();
    match today_only {
        StatsReport::DailyStats(days) => assert_eq!(days.keys().copied().collect::<Vec<_>>(), [today]),
        other => panic!("expected daily stats, got {other:?}"),
    }
}

#[tokio::test]
async fn pausing_an_untracked_running_session_marks_it_paused() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _events) = app(&dir).await;
    let session = created(&state, "Orphan").await;
    state
        .storage
        .update_session(&session.id, |session| {
            session.status = SessionStatus::Running;
            Ok(())
        })
        .await
        .unwrap();

    assert!(pause_tracking(&state, tracking(&session.id)).await.success);
    let stored = state.storage.load_session(&session.id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Paused);

    assert!(stop_tracking(&state, tracking(&session.id)).await.success);
    let stored = state.storage.load_session(&session.id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
}

#[tokio::test]
async fn startup_parks_sessions_left_running() {
    let dir = tempfile::tempdir().unwrap();
    {
        let storage = Storage::open(StorageLayout::new(dir.path())).unwrap();
        let mut session = Session::new("left-running".into(), new_session("Crashed", 25), Utc::now());
        session.status = SessionStatus::Running;
        storage.create_session(session).await.unwrap();
        // Simulate a lost index as well.
        std::fs::remove_file(storage.layout().index_path()).unwrap();
    }

    let (state, _events) = app(&dir).await;
    let stored = state.storage.load_session("left-running").await.unwrap();
    assert_eq!(stored.status, SessionStatus::Paused);
    assert_eq!(state.recorder.status().await, RecorderStatus::Idle);
}

#[tokio::test]
async fn list_and_rebuild_commands() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _events) = app(&dir).await;
    for title in ["One", "Two", "Three"] {
        created(&state, title).await;
    }

    let listed = list_sessions(
        &state,
        ListSessionsRequest {
            filter: SessionFilter {
                limit: Some(2),
                ..SessionFilter::default()
            },
        },
    )
    .await
    .data
    .unwrap();
    assert_eq!(listed.len(), 2);

    let report = rebuild_index(&state).await.data.unwrap();
    assert_eq!(report.sessions_indexed, 3);
    assert_eq!(report.files_skipped, 0);
}

#[tokio::test]
async fn changing_the_interval_setting_keeps_recorded_minutes() {
    let dir = tempfile::tempdir().unwrap();
    let session_id = {
        let (state, _events) = app(&dir).await;
        let session = created(&state, "Paced").await;
        start_tracking(&state, tracking(&session.id)).await;
        state.recorder.record_interval().await.unwrap();
        state.recorder.record_interval().await.unwrap();
        // Three intervals at 5 minutes once the pause flush lands.
        pause_tracking(&state, tracking(&session.id)).await;

        let response = update_settings(
            &state,
            UpdateSettingsRequest {
                settings: SettingsPatch {
                    interval_duration_minutes: Some(30),
                    ..SettingsPatch::default()
                },
            },
        );
        assert!(response.success);

        let stored = state.storage.load_session(&session.id).await.unwrap();
        assert_eq!(stored.active_minutes, 15);
        assert_eq!(state.interval_config_for(&stored).minutes, 5);
        assert_eq!(state.interval_config_for(&session).minutes, 30);

        let report = get_stats(
            &state,
            GetStatsRequest {
                session_id: Some(session.id.clone()),
                date_range: None,
            },
        )
        .await
        .data
        .unwrap();
        match report {
            StatsReport::Stats(stats) => assert_eq!(stats.real_work_time, Some(15)),
            other => panic!("expected session stats, got {other:?}"),
        }

        state.shutdown().await;
        session.id
    };

    // A fresh process no longer holds the session, so stop completes it from disk.
    let (state, _events) = app(&dir).await;
    assert_eq!(state.interval_config().minutes, 30);
    assert!(stop_tracking(&state, tracking(&session_id)).await.success);

    let stored = state.storage.load_session(&session_id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
    assert_eq!(stored.active_minutes, 15);
    assert_eq!(stored.interval_minutes, 5);
}

#[tokio::test]
async fn delete_and_start_of_the_same_session_never_resurrect_it() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _events) = app(&dir).await;
    let session = created(&state, "Contested").await;
    let request = GetSessionRequest {
        session_id: session.id.clone(),
    };

    let (deleted, started) = tokio::join!(
        delete_session(&state, request.clone()),
        start_tracking(&state, tracking(&session.id)),
    );

    let on_disk = state.storage.load_session(&session.id).await;
    if deleted.success {
        assert!(on_disk.unwrap_err().is_not_found());
        assert_eq!(state.recorder.status().await, RecorderStatus::Idle);
    } else {
        assert!(started.success);
        assert!(on_disk.is_ok());
    }
}
