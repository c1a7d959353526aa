//! Best-effort notification sink for critical sweep failures.
//!
//! Strictly fire-and-forget: the engine never waits on delivery
//! guarantees, and sink failures are swallowed. Success paths stay
//! quiet; only per-item failures and partial cutovers notify.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use tracing::warn;

/// What went wrong.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotifyKind {
    /// A session's cutover failed outright.
    CutoverFailed,
    /// A cutover applied some transitions but not all of them.
    CutoverPartial,
    /// A reconciliation step failed for one session.
    ReconcileFailed,
}

/// A single failure notification.
#[derive(Debug, Clone, Serialize)]
pub struct NotifyEvent {
    pub kind: NotifyKind,
    pub session_id: Option<String>,
    pub task_id: Option<String>,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl NotifyEvent {
    /// Build an event stamped with the current time.
    #[must_use]
    pub fn now(kind: NotifyKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            session_id: None,
            task_id: None,
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }

    /// Attach the session this event concerns.
    #[must_use]
    pub fn for_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Attach the task this event concerns.
    #[must_use]
    pub fn for_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}

/// Delivery seam for failure notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one event. Implementations must not propagate delivery
    /// failures; the caller has already moved on.
    async fn notify(&self, event: &NotifyEvent);
}

/// Default sink: structured log lines via tracing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, event: &NotifyEvent) {
        warn!(
            kind = ?event.kind,
            session_id = event.session_id.as_deref().unwrap_or("-"),
            task_id = event.task_id.as_deref().unwrap_or("-"),
            "{}",
            event.message
        );
    }
}

/// Recording sink for tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<NotifyEvent>>,
}

impl RecordingSink {
    /// Create an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<NotifyEvent> {
        self.events.lock().expect("sink mutex poisoned").clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, event: &NotifyEvent) {
        self.events
            .lock()
            .expect("sink mutex poisoned")
            .push(event.clone());
    }
}
