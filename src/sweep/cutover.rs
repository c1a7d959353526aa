//! Cutover execution: close the session, complete the task, cascade the
//! project.
//!
//! The three updates run as one atomic store unit via
//! [`WorkStore::apply_cutover`]; the guarded predicates inside it remain
//! the backstop for drift produced by historical partial cutovers or
//! external writers, which the reconciliation sweeps repair.

use crate::model::WorkSession;
use crate::notify::{NotificationSink, NotifyEvent, NotifyKind};
use crate::store::{CutoverPlan, WorkStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// What a cutover attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutoverOutcome {
    /// Session closed and task completed in this call.
    Applied { project_completed: bool },
    /// Some transitions had already been taken elsewhere; the flags say
    /// which ones this call won.
    Partial {
        session_closed: bool,
        task_completed: bool,
    },
}

/// Executes cutovers against the store.
pub struct CutoverExecutor {
    store: Arc<dyn WorkStore>,
    sink: Arc<dyn NotificationSink>,
}

impl CutoverExecutor {
    /// Create an executor over the given store and failure sink.
    #[must_use]
    pub fn new(store: Arc<dyn WorkStore>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { store, sink }
    }

    /// Cut over one session that exceeded its budget.
    ///
    /// `total_worked` is the task's accumulated hours plus this session's
    /// elapsed time; `limit` is the budget it exceeded.
    ///
    /// # Errors
    ///
    /// Returns a store error if the atomic apply fails; the caller treats
    /// it as an item-level failure and continues the batch.
    pub async fn cutover(
        &self,
        session: &WorkSession,
        total_worked: f64,
        elapsed_hours: f64,
        limit: f64,
        now: DateTime<Utc>,
    ) -> crate::Result<CutoverOutcome> {
        let plan = CutoverPlan {
            session_id: session.id.clone(),
            project_id: session.project_id.clone(),
            task_id: session.task_id.clone(),
            ended_at: now,
            session_hours: elapsed_hours,
            total_worked,
            description: format!(
                "auto-cutoff: exceeded budget {limit:.2}h, worked {total_worked:.2}h"
            ),
        };

        let applied = self.store.apply_cutover(&plan).await?;

        if applied.is_complete() {
            info!(
                session_id = %session.id,
                task_id = %session.task_id,
                total_worked,
                limit,
                project_completed = applied.project_completed,
                "budget exceeded, session cut over"
            );
            return Ok(CutoverOutcome::Applied {
                project_completed: applied.project_completed,
            });
        }

        debug!(
            session_id = %session.id,
            session_closed = applied.session_closed,
            task_completed = applied.task_completed,
            "cutover partially applied"
        );
        if applied.session_closed != applied.task_completed {
            self.sink
                .notify(
                    &NotifyEvent::now(
                        NotifyKind::CutoverPartial,
                        format!(
                            "cutover applied partially (session_closed={}, task_completed={})",
                            applied.session_closed, applied.task_completed
                        ),
                    )
                    .for_session(&session.id)
                    .for_task(&session.task_id),
                )
                .await;
        }
        Ok(CutoverOutcome::Partial {
            session_closed: applied.session_closed,
            task_completed: applied.task_completed,
        })
    }
}
