//! Sweep jobs over the session and task stores.
//!
//! Each sweep is a stateless, short-lived unit of work: it queries the
//! stores, derives state, applies guarded corrective writes, and returns
//! a [`SweepReport`]. Sweeps may overlap; safety comes from the store's
//! idempotent update predicates, not from locking. A failing item never
//! aborts the batch — only a failed primary query does.
//!
//! # Modules
//!
//! - [`overrun`] - finds sessions over budget and triggers cutover
//! - [`cutover`] - close-session + complete-task + cascade-project
//! - [`reconcile`] - repair jobs for drift left by partial cutovers

pub mod cutover;
pub mod overrun;
pub mod reconcile;

pub use cutover::{CutoverExecutor, CutoverOutcome};
pub use overrun::OverrunDetector;
pub use reconcile::Reconciler;

use serde::Serialize;

/// Aggregate result of one sweep invocation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SweepReport {
    /// Which sweep produced this report.
    pub sweep: &'static str,
    /// Sessions examined by the primary query.
    pub checked: usize,
    /// Sessions actually transitioned (enforced or repaired). Always
    /// `<= checked`; the gap is skips and per-item failures.
    pub applied: usize,
    /// Per-session outcomes.
    pub details: Vec<SweepDetail>,
}

impl SweepReport {
    /// Empty report for the named sweep.
    #[must_use]
    pub fn new(sweep: &'static str) -> Self {
        Self {
            sweep,
            checked: 0,
            applied: 0,
            details: Vec::new(),
        }
    }

    /// Record one outcome, bumping `applied` when it transitioned a row.
    pub fn record(&mut self, detail: SweepDetail) {
        if detail.counts_as_applied() {
            self.applied += 1;
        }
        self.details.push(detail);
    }
}

/// Outcome for a single session examined by a sweep.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SweepDetail {
    /// Budget overrun enforced: session closed, task completed.
    Enforced {
        session_id: String,
        task_id: String,
        project_id: String,
        total_worked: f64,
        limit: f64,
        project_completed: bool,
    },
    /// Cutover applied only some transitions; the rest had already been
    /// taken by a concurrent run or will be repaired by reconciliation.
    Partial {
        session_id: String,
        session_closed: bool,
        task_completed: bool,
    },
    /// A reconciliation sweep closed the session.
    Closed {
        session_id: String,
        task_id: String,
        reason: String,
    },
    /// Session examined but intentionally left alone.
    Skipped { session_id: String, reason: String },
    /// Item-level failure; the batch continued.
    Failed { session_id: String, error: String },
}

impl SweepDetail {
    fn counts_as_applied(&self) -> bool {
        match self {
            Self::Enforced { .. } | Self::Closed { .. } => true,
            Self::Partial {
                session_closed,
                task_completed,
                ..
            } => *session_closed || *task_completed,
            Self::Skipped { .. } | Self::Failed { .. } => false,
        }
    }
}
