//! Reconciliation sweeps: repair drift left by partial cutovers, process
//! crashes, or external interference.
//!
//! Three independent, composable jobs share one close primitive:
//!
//! - stale-task closer: open sessions on already-completed tasks
//! - hard-ceiling closer: open sessions older than a fixed ceiling
//! - single-record fixer: operator-triggered close of one session
//!
//! All are idempotent and stateless; running any of them concurrently
//! with the overrun detector is safe because only one write wins the
//! open-session predicate and the other becomes a no-op.

use super::{SweepDetail, SweepReport};
use crate::config::StintConfig;
use crate::error::StintError;
use crate::model::{TaskStatus, WorkSession};
use crate::notify::{NotificationSink, NotifyEvent, NotifyKind};
use crate::store::{CloseSession, WorkStore};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Repair jobs over the session store.
pub struct Reconciler {
    store: Arc<dyn WorkStore>,
    sink: Arc<dyn NotificationSink>,
    ceiling_hours: f64,
}

impl Reconciler {
    /// Build a reconciler from configuration.
    #[must_use]
    pub fn new(
        store: Arc<dyn WorkStore>,
        sink: Arc<dyn NotificationSink>,
        config: &StintConfig,
    ) -> Self {
        Self {
            store,
            sink,
            ceiling_hours: config.ceiling_hours,
        }
    }

    /// Close open sessions whose task is already completed.
    ///
    /// Corrects the window where a cutover closed the task but not the
    /// session, or where a task was completed through another path while
    /// a session stayed open. The task record is never touched.
    ///
    /// # Errors
    ///
    /// Returns an error only when the primary query fails.
    pub async fn close_stale_sessions(&self) -> crate::Result<SweepReport> {
        let now = Utc::now();
        let sessions = self.store.find_open_sessions(None).await?;
        let mut report = SweepReport::new("stale_task");

        for session in sessions {
            report.checked += 1;
            let result = self.close_if_task_completed(&session, now).await;
            self.record_repair(&mut report, &session, result).await;
        }

        debug!(
            checked = report.checked,
            closed = report.applied,
            "stale-task reconciliation pass"
        );
        Ok(report)
    }

    /// Force-close open sessions older than the configured ceiling,
    /// independent of any task budget.
    ///
    /// Safety net for sessions the detector can never evaluate (missing
    /// definition, crashed detector).
    ///
    /// # Errors
    ///
    /// Returns an error only when the primary query fails.
    pub async fn close_over_ceiling(&self) -> crate::Result<SweepReport> {
        let now = Utc::now();
        let ceiling_minutes = (self.ceiling_hours * 60.0).round() as i64;
        let cutoff = now - Duration::minutes(ceiling_minutes);
        let sessions = self.store.find_open_sessions(Some(cutoff)).await?;
        let mut report = SweepReport::new("hard_ceiling");

        for session in sessions {
            report.checked += 1;
            let elapsed = session.elapsed_hours(now);
            let close = CloseSession {
                ended_at: now,
                hours: elapsed,
                description: format!(
                    "force-closed: open for {elapsed:.2}h, over the {:.2}h ceiling",
                    self.ceiling_hours
                ),
            };
            let result = self.apply_close(&session, close).await;
            self.record_repair(&mut report, &session, result).await;
        }

        info!(
            checked = report.checked,
            closed = report.applied,
            ceiling_hours = self.ceiling_hours,
            "hard-ceiling reconciliation pass"
        );
        Ok(report)
    }

    /// Close one named session for manual incident response.
    ///
    /// # Errors
    ///
    /// Returns [`SessionNotFound`](StintError::SessionNotFound) if the id
    /// does not exist, or a store error if the lookup fails.
    pub async fn close_one(&self, session_id: &str) -> crate::Result<SweepReport> {
        let now = Utc::now();
        let mut report = SweepReport::new("single_session");

        let session = self
            .store
            .find_session(session_id)
            .await?
            .ok_or_else(|| StintError::SessionNotFound {
                session_id: session_id.to_string(),
            })?;
        report.checked = 1;

        if !session.is_open() {
            report.record(SweepDetail::Skipped {
                session_id: session.id.clone(),
                reason: "already closed".into(),
            });
            return Ok(report);
        }

        let elapsed = session.elapsed_hours(now);
        let close = CloseSession {
            ended_at: now,
            hours: elapsed,
            description: "closed by operator".into(),
        };
        let result = self.apply_close(&session, close).await;
        self.record_repair(&mut report, &session, result).await;
        Ok(report)
    }

    /// Close the session if its task progress says completed.
    async fn close_if_task_completed(
        &self,
        session: &WorkSession,
        now: DateTime<Utc>,
    ) -> crate::Result<Option<SweepDetail>> {
        let progress = self
            .store
            .find_task_progress(&session.project_id, &session.task_id)
            .await?;
        match progress {
            Some(progress) if progress.status == TaskStatus::Completed => {
                let elapsed = session.elapsed_hours(now);
                let close = CloseSession {
                    ended_at: now,
                    hours: elapsed,
                    description: "task already completed; closing stale session".into(),
                };
                self.apply_close(session, close).await
            }
            _ => Ok(None),
        }
    }

    /// Shared close primitive: one guarded session update, no task writes.
    async fn apply_close(
        &self,
        session: &WorkSession,
        close: CloseSession,
    ) -> crate::Result<Option<SweepDetail>> {
        let reason = close.description.clone();
        let closed = self
            .store
            .close_session(&session.id, close)
            .await
            .map_err(|err| StintError::reconcile(&session.id, err.to_string()))?;

        Ok(Some(if closed {
            SweepDetail::Closed {
                session_id: session.id.clone(),
                task_id: session.task_id.clone(),
                reason,
            }
        } else {
            SweepDetail::Skipped {
                session_id: session.id.clone(),
                reason: "already closed by a concurrent run".into(),
            }
        }))
    }

    /// Fold one repair result into the report, notifying on failure.
    async fn record_repair(
        &self,
        report: &mut SweepReport,
        session: &WorkSession,
        result: crate::Result<Option<SweepDetail>>,
    ) {
        match result {
            Ok(Some(detail)) => report.record(detail),
            Ok(None) => {}
            Err(err) => {
                warn!(
                    session_id = %session.id,
                    error = %err,
                    "reconciliation failed, continuing sweep"
                );
                self.sink
                    .notify(
                        &NotifyEvent::now(NotifyKind::ReconcileFailed, err.to_string())
                            .for_session(&session.id)
                            .for_task(&session.task_id),
                    )
                    .await;
                report.record(SweepDetail::Failed {
                    session_id: session.id.clone(),
                    error: err.to_string(),
                });
            }
        }
    }
}
