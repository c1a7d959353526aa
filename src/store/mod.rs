//! Persistence seam for sessions, tasks, and projects.
//!
//! The engine owns no durable connection beyond one sweep invocation; it
//! talks to the stores through [`WorkStore`] only. Every mutating
//! operation is guarded by a predicate (`ended_at IS NULL` for sessions,
//! `status != completed` for tasks and projects), so a record already
//! transitioned by a concurrent run is naturally excluded from a second
//! transition: updates are idempotent at the row level.
//!
//! [`WorkStore::apply_cutover`] additionally executes the full cutover
//! (close session + complete task + cascade project) as one atomic unit,
//! leaving the guarded single updates as the reconciliation backstop.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::model::{Project, TaskDefinition, TaskProgress, WorkSession};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Field set applied when a session closes.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseSession {
    pub ended_at: DateTime<Utc>,
    pub hours: f64,
    pub description: String,
}

/// Field set applied when a task completes.
#[derive(Debug, Clone, PartialEq)]
pub struct CompleteTask {
    pub actual_hours: f64,
    pub ended_at: DateTime<Utc>,
}

/// The full cutover for one session, applied atomically by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct CutoverPlan {
    pub session_id: String,
    pub project_id: String,
    pub task_id: String,
    pub ended_at: DateTime<Utc>,
    /// Hours worked in this session alone; written to the session record.
    pub session_hours: f64,
    /// Accumulated hours across all sessions; written to the task record.
    pub total_worked: f64,
    pub description: String,
}

/// Which transitions a cutover actually applied.
///
/// A `false` flag means the guarding predicate no longer matched — a
/// concurrent run or an external writer got there first, and this
/// transition was a no-op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CutoverApplied {
    pub session_closed: bool,
    pub task_completed: bool,
    pub project_completed: bool,
}

/// Read/write access to the session, task, and project stores.
#[async_trait]
pub trait WorkStore: Send + Sync {
    /// Open sessions, optionally restricted to those started before
    /// `older_than`.
    async fn find_open_sessions(&self, older_than: Option<DateTime<Utc>>)
        -> Result<Vec<WorkSession>>;

    /// Look up one session by id, open or closed.
    async fn find_session(&self, session_id: &str) -> Result<Option<WorkSession>>;

    /// Record a new open session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionAlreadyOpen`](crate::StintError::SessionAlreadyOpen)
    /// if the task already has an open session; elapsed-time accounting
    /// assumes at most one.
    async fn open_session(&self, session: WorkSession) -> Result<()>;

    /// Close an open session. Returns `false` if the session was already
    /// closed (or absent), in which case nothing was written.
    async fn close_session(&self, session_id: &str, close: CloseSession) -> Result<bool>;

    /// Progress record for a task within a project.
    async fn find_task_progress(
        &self,
        project_id: &str,
        task_id: &str,
    ) -> Result<Option<TaskProgress>>;

    /// Task template carrying the budget basis.
    async fn find_task_definition(&self, task_id: &str) -> Result<Option<TaskDefinition>>;

    /// Mark a task completed with its final hours. Guarded by
    /// `status NOT IN (completed, cancelled)`; returns whether a row
    /// transitioned.
    async fn complete_task(
        &self,
        project_id: &str,
        task_id: &str,
        done: CompleteTask,
    ) -> Result<bool>;

    /// All progress records for a project.
    async fn find_project_tasks(&self, project_id: &str) -> Result<Vec<TaskProgress>>;

    /// One project by id.
    async fn find_project(&self, project_id: &str) -> Result<Option<Project>>;

    /// Mark a project completed. Guarded by `status != completed`.
    async fn complete_project(&self, project_id: &str, ended_at: DateTime<Utc>) -> Result<bool>;

    /// Apply a full cutover as one atomic unit: close the session,
    /// complete the task, and complete the project if no non-cancelled
    /// task remains incomplete. Each step keeps its guarding predicate,
    /// so the unit is also safe to re-run.
    async fn apply_cutover(&self, plan: &CutoverPlan) -> Result<CutoverApplied>;
}

impl CutoverApplied {
    /// True when both the session and the task transitioned in this call.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.session_closed && self.task_completed
    }

    /// True when nothing matched — a concurrent run already won.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        !self.session_closed && !self.task_completed && !self.project_completed
    }
}
