//! Read-only inspection of open sessions against their budgets.
//!
//! Computes the same derived numbers the overrun detector would, without
//! mutating anything. Used to validate sweep correctness before and
//! after a run; results are time-sensitive and must not be cached.

use crate::budget::BudgetPolicy;
use crate::model::TaskStatus;
use crate::store::WorkStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Snapshot of one open session and its budget position.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OpenSessionSnapshot {
    pub session_id: String,
    pub user_id: String,
    pub task_id: String,
    pub project_id: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_hours: f64,
    /// Accumulated hours from the task record; `None` when the progress
    /// record is missing.
    pub actual_hours: Option<f64>,
    pub total_worked: Option<f64>,
    /// Budget limit; `None` when the task definition is missing.
    pub limit: Option<f64>,
    /// Whether the overrun detector would cut this session over.
    pub exceeds_limit: bool,
    pub task_status: Option<TaskStatus>,
    pub missing_progress: bool,
    pub missing_definition: bool,
}

/// Read-only diagnostics over the stores.
pub struct Diagnostics {
    store: Arc<dyn WorkStore>,
    policy: BudgetPolicy,
}

impl Diagnostics {
    /// Create a diagnostics view with the given budget policy.
    #[must_use]
    pub fn new(store: Arc<dyn WorkStore>, policy: BudgetPolicy) -> Self {
        Self { store, policy }
    }

    /// Snapshot every open session, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if any store read fails; no partial snapshot is
    /// produced.
    pub async fn open_sessions(&self) -> crate::Result<Vec<OpenSessionSnapshot>> {
        let now = Utc::now();
        let sessions = self.store.find_open_sessions(None).await?;
        let mut snapshots = Vec::with_capacity(sessions.len());

        for session in sessions {
            let progress = self
                .store
                .find_task_progress(&session.project_id, &session.task_id)
                .await?;
            let definition = self.store.find_task_definition(&session.task_id).await?;

            let elapsed = session.elapsed_hours(now);
            let actual_hours = progress.as_ref().map(|p| p.actual_hours);
            let total_worked = actual_hours.map(|actual| actual + elapsed);
            let limit = definition
                .as_ref()
                .map(|d| self.policy.limit_for(d.estimated_hours));
            let enforceable = progress
                .as_ref()
                .is_some_and(|p| !p.status.is_done());
            let exceeds_limit = enforceable
                && matches!((total_worked, limit), (Some(worked), Some(limit)) if worked >= limit);

            snapshots.push(OpenSessionSnapshot {
                session_id: session.id.clone(),
                user_id: session.user_id.clone(),
                task_id: session.task_id.clone(),
                project_id: session.project_id.clone(),
                started_at: session.started_at,
                elapsed_hours: elapsed,
                actual_hours,
                total_worked,
                limit,
                exceeds_limit,
                task_status: progress.as_ref().map(|p| p.status),
                missing_progress: progress.is_none(),
                missing_definition: definition.is_none(),
            });
        }

        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Project, TaskDefinition, TaskProgress, WorkSession};
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn snapshot_store() -> Arc<MemoryStore> {
        let mut over = WorkSession::start("u-1", "t-over", "p-1");
        over.started_at = Utc::now() - Duration::minutes(90);
        let mut under = WorkSession::start("u-1", "t-under", "p-1");
        under.started_at = Utc::now() - Duration::minutes(30);
        let mut orphan = WorkSession::start("u-1", "t-orphan", "p-1");
        orphan.started_at = Utc::now() - Duration::minutes(10);

        Arc::new(
            MemoryStore::new()
                .with_project(Project::active("p-1"))
                .with_definition(TaskDefinition {
                    task_id: "t-over".into(),
                    title: "Over".into(),
                    estimated_hours: Some(1.0),
                })
                .with_definition(TaskDefinition {
                    task_id: "t-under".into(),
                    title: "Under".into(),
                    estimated_hours: Some(1.0),
                })
                .with_progress(TaskProgress {
                    status: TaskStatus::InProgress,
                    ..TaskProgress::pending("p-1", "t-over")
                })
                .with_progress(TaskProgress {
                    status: TaskStatus::InProgress,
                    ..TaskProgress::pending("p-1", "t-under")
                })
                .with_session(over)
                .with_session(under)
                .with_session(orphan),
        )
    }

    #[tokio::test]
    async fn test_snapshots_compute_budget_position() {
        let diagnostics = Diagnostics::new(snapshot_store(), BudgetPolicy::default());
        let snapshots = diagnostics.open_sessions().await.unwrap();
        assert_eq!(snapshots.len(), 3);

        let over = snapshots
            .iter()
            .find(|s| s.task_id == "t-over")
            .unwrap();
        assert!(over.exceeds_limit);
        assert_eq!(over.limit, Some(1.2));
        assert!(over.total_worked.unwrap() > 1.2);

        let under = snapshots
            .iter()
            .find(|s| s.task_id == "t-under")
            .unwrap();
        assert!(!under.exceeds_limit);
    }

    #[tokio::test]
    async fn test_missing_records_are_flagged_not_fatal() {
        let diagnostics = Diagnostics::new(snapshot_store(), BudgetPolicy::default());
        let snapshots = diagnostics.open_sessions().await.unwrap();

        let orphan = snapshots
            .iter()
            .find(|s| s.task_id == "t-orphan")
            .unwrap();
        assert!(orphan.missing_progress);
        assert!(orphan.missing_definition);
        assert!(orphan.limit.is_none());
        assert!(!orphan.exceeds_limit);
    }

    #[tokio::test]
    async fn test_diagnostics_mutate_nothing() {
        let store = snapshot_store();
        let diagnostics = Diagnostics::new(store.clone(), BudgetPolicy::default());
        diagnostics.open_sessions().await.unwrap();

        // Everything still open, even the over-budget session
        assert_eq!(store.find_open_sessions(None).await.unwrap().len(), 3);
    }
}
