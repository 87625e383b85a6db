//! Outbound notifications for the UI layer.
//!
//! Events go through an unbounded channel so a slow consumer never makes the
//! recorder drop or reorder a tick's notification.

use chrono::NaiveDate;
use log::debug;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::{models::Session, stats::ActivityStats};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    pub session: Session,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEvent {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalRecordedEvent {
    pub session_id: String,
    pub date: NaiveDate,
    pub interval_index: usize,
    pub is_active: bool,
    pub stats: ActivityStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum TrackerEvent {
    SessionCreated(SessionEvent),
    SessionUpdated(SessionEvent),
    SessionCompleted(SessionEvent),
    TrackingStarted(TrackingEvent),
    TrackingPaused(TrackingEvent),
    TrackingResumed(TrackingEvent),
    TrackingStopped(TrackingEvent),
    IntervalRecorded(IntervalRecordedEvent),
}

impl TrackerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TrackerEvent::SessionCreated(_) => "session-created",
            TrackerEvent::SessionUpdated(_) => "session-updated",
            TrackerEvent::SessionCompleted(_) => "session-completed",
            TrackerEvent::TrackingStarted(_) => "tracking-started",
            TrackerEvent::TrackingPaused(_) => "tracking-paused",
            TrackerEvent::TrackingResumed(_) => "tracking-resumed",
            TrackerEvent::TrackingStopped(_) => "tracking-stopped",
            TrackerEvent::IntervalRecorded(_) => "interval-recorded",
        }
    }

    pub fn session_created(session: &Session) -> Self {
        TrackerEvent::SessionCreated(SessionEvent {
            session: session.clone(),
        })
    }

    pub fn session_updated(session: &Session) -> Self {
        TrackerEvent::SessionUpdated(SessionEvent {
            session: session.clone(),
        })
    }

    pub fn session_completed(session: &Session) -> Self {
        TrackerEvent::SessionCompleted(SessionEvent {
            session: session.clone(),
        })
    }

    pub fn tracking(kind: TrackingChange, session_id: &str) -> Self {
        let payload = TrackingEvent {
            session_id: session_id.to_string(),
        };
        match kind {
            TrackingChange::Started => TrackerEvent::TrackingStarted(payload),
            TrackingChange::Paused => TrackerEvent::TrackingPaused(payload),
            TrackingChange::Resumed => TrackerEvent::TrackingResumed(payload),
            TrackingChange::Stopped => TrackerEvent::TrackingStopped(payload),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingChange {
    Started,
    Paused,
    Resumed,
    Stopped,
}

pub type EventStream = mpsc::UnboundedReceiver<TrackerEvent>;

#[derive(Clone)]
pub struct EventSink {
    sender: mpsc::UnboundedSender<TrackerEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, EventStream) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: TrackerEvent) {
        let name = event.name();
        if self.sender.send(event).is_err() {
            debug!("No listener for {name}; event dropped");
        }
    }
}
