//! Overrun detection: find open sessions over budget and cut them over.

use super::{SweepDetail, SweepReport};
use crate::budget::BudgetPolicy;
use crate::config::StintConfig;
use crate::error::StintError;
use crate::model::WorkSession;
use crate::notify::{NotificationSink, NotifyEvent, NotifyKind};
use crate::store::WorkStore;
use crate::sweep::cutover::{CutoverExecutor, CutoverOutcome};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// Periodic sweep that enforces the time budget on open sessions.
///
/// Stateless: every run re-derives everything from the stores. Very
/// recent sessions (inside the grace window) are never evaluated, which
/// bounds work and avoids false positives on clock skew.
pub struct OverrunDetector {
    store: Arc<dyn WorkStore>,
    sink: Arc<dyn NotificationSink>,
    policy: BudgetPolicy,
    grace_minutes: i64,
}

impl OverrunDetector {
    /// Build a detector from configuration.
    #[must_use]
    pub fn new(
        store: Arc<dyn WorkStore>,
        sink: Arc<dyn NotificationSink>,
        config: &StintConfig,
    ) -> Self {
        Self {
            store,
            sink,
            policy: config.budget,
            grace_minutes: config.grace_minutes,
        }
    }

    /// Run one detection pass.
    ///
    /// Per-item failures are logged, notified best-effort, and recorded
    /// in the report; they never abort the batch.
    ///
    /// # Errors
    ///
    /// Returns an error only when the primary open-session query fails —
    /// in that case no partial processing has occurred.
    pub async fn detect_and_enforce(&self) -> crate::Result<SweepReport> {
        let now = Utc::now();
        let cutoff = now - Duration::minutes(self.grace_minutes);
        let sessions = self.store.find_open_sessions(Some(cutoff)).await?;

        debug!(
            candidates = sessions.len(),
            grace_minutes = self.grace_minutes,
            "overrun detection pass"
        );

        let mut report = SweepReport::new("overrun");
        let executor = CutoverExecutor::new(self.store.clone(), self.sink.clone());

        for session in sessions {
            report.checked += 1;
            match self.evaluate(&executor, &session, now).await {
                Ok(Some(detail)) => report.record(detail),
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        session_id = %session.id,
                        error = %err,
                        "cutover failed, continuing sweep"
                    );
                    self.sink
                        .notify(
                            &NotifyEvent::now(NotifyKind::CutoverFailed, err.to_string())
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

        Ok(report)
    }

    /// Evaluate one candidate. `Ok(None)` means the session is within
    /// budget and stays open.
    async fn evaluate(
        &self,
        executor: &CutoverExecutor,
        session: &WorkSession,
        now: DateTime<Utc>,
    ) -> crate::Result<Option<SweepDetail>> {
        let progress = match self
            .store
            .find_task_progress(&session.project_id, &session.task_id)
            .await?
        {
            Some(progress) => progress,
            None => {
                warn!(
                    session_id = %session.id,
                    task_id = %session.task_id,
                    "open session has no task progress record"
                );
                return Ok(Some(SweepDetail::Skipped {
                    session_id: session.id.clone(),
                    reason: "no task progress record".into(),
                }));
            }
        };

        // Completed and cancelled tasks belong to reconciliation, not
        // enforcement.
        if progress.status.is_done() {
            return Ok(Some(SweepDetail::Skipped {
                session_id: session.id.clone(),
                reason: format!("task is {}", progress.status),
            }));
        }

        let definition = match self.store.find_task_definition(&session.task_id).await? {
            Some(definition) => definition,
            None => {
                warn!(
                    session_id = %session.id,
                    task_id = %session.task_id,
                    "open session has no task definition"
                );
                return Ok(Some(SweepDetail::Skipped {
                    session_id: session.id.clone(),
                    reason: "no task definition".into(),
                }));
            }
        };

        let elapsed = session.elapsed_hours(now);
        let total_worked = progress.actual_hours + elapsed;
        let limit = self.policy.limit_for(definition.estimated_hours);

        // Boundary is inclusive: working exactly the budget triggers cutover
        if total_worked < limit {
            return Ok(None);
        }

        let outcome = executor
            .cutover(session, total_worked, elapsed, limit, now)
            .await
            .map_err(|err| StintError::cutover(&session.id, err.to_string()))?;

        Ok(Some(match outcome {
            CutoverOutcome::Applied { project_completed } => SweepDetail::Enforced {
                session_id: session.id.clone(),
                task_id: session.task_id.clone(),
                project_id: session.project_id.clone(),
                total_worked,
                limit,
                project_completed,
            },
            CutoverOutcome::Partial {
                session_closed,
                task_completed,
            } => SweepDetail::Partial {
                session_id: session.id.clone(),
                session_closed,
                task_completed,
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Project, ProjectStatus, TaskDefinition, TaskProgress, TaskStatus};
    use crate::notify::RecordingSink;
    use crate::store::MemoryStore;

    fn config() -> StintConfig {
        StintConfig::default()
    }

    fn session_started_minutes_ago(task_id: &str, minutes: i64) -> WorkSession {
        let mut session = WorkSession::start("u-1", task_id, "p-1");
        session.started_at = Utc::now() - Duration::minutes(minutes);
        session
    }

    fn definition(task_id: &str, estimated_hours: Option<f64>) -> TaskDefinition {
        TaskDefinition {
            task_id: task_id.into(),
            title: format!("Task {task_id}"),
            estimated_hours,
        }
    }

    fn in_progress(task_id: &str, actual_hours: f64) -> TaskProgress {
        TaskProgress {
            status: TaskStatus::InProgress,
            actual_hours,
            ..TaskProgress::pending("p-1", task_id)
        }
    }

    fn detector(store: Arc<MemoryStore>) -> (OverrunDetector, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        (
            OverrunDetector::new(store, sink.clone(), &config()),
            sink,
        )
    }

    #[tokio::test]
    async fn test_session_over_budget_is_enforced() {
        // estimate 1h -> limit 1.2h; 78 minutes worked = 1.3h
        let session = session_started_minutes_ago("t-1", 78);
        let store = Arc::new(
            MemoryStore::new()
                .with_project(Project::active("p-1"))
                .with_definition(definition("t-1", Some(1.0)))
                .with_progress(in_progress("t-1", 0.0))
                .with_session(session.clone()),
        );
        let (detector, _) = detector(store.clone());

        let report = detector.detect_and_enforce().await.unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.applied, 1);
        assert!(matches!(
            &report.details[0],
            SweepDetail::Enforced { limit, .. } if (limit - 1.2).abs() < 1e-9
        ));

        let progress = store.find_task_progress("p-1", "t-1").await.unwrap().unwrap();
        assert_eq!(progress.status, TaskStatus::Completed);
        assert!((progress.actual_hours - 1.3).abs() < 0.01);
        assert_eq!(progress.progress_pct, 100);
    }

    #[tokio::test]
    async fn test_session_under_budget_stays_open() {
        // 60 minutes worked = 1.0h < 1.2h limit
        let session = session_started_minutes_ago("t-1", 61);
        let store = Arc::new(
            MemoryStore::new()
                .with_project(Project::active("p-1"))
                .with_definition(definition("t-1", Some(1.0)))
                .with_progress(in_progress("t-1", 0.0))
                .with_session(session.clone()),
        );
        let (detector, _) = detector(store.clone());

        let report = detector.detect_and_enforce().await.unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.applied, 0);
        assert!(report.details.is_empty());

        let stored = store.find_session(&session.id).await.unwrap().unwrap();
        assert!(stored.is_open());
    }

    #[tokio::test]
    async fn test_grace_window_excludes_recent_sessions() {
        // Over budget on paper (no estimate, default 2h budget exceeded by
        // prior hours) but only 30 minutes old: never evaluated
        let session = session_started_minutes_ago("t-1", 30);
        let store = Arc::new(
            MemoryStore::new()
                .with_project(Project::active("p-1"))
                .with_definition(definition("t-1", None))
                .with_progress(in_progress("t-1", 5.0))
                .with_session(session),
        );
        let (detector, _) = detector(store);

        let report = detector.detect_and_enforce().await.unwrap();
        assert_eq!(report.checked, 0);
    }

    #[tokio::test]
    async fn test_default_budget_applies_without_estimate() {
        // 2.5h elapsed vs default 2.0h budget
        let session = session_started_minutes_ago("t-1", 150);
        let store = Arc::new(
            MemoryStore::new()
                .with_project(Project::active("p-1"))
                .with_definition(definition("t-1", None))
                .with_progress(in_progress("t-1", 0.0))
                .with_session(session),
        );
        let (detector, _) = detector(store);

        let report = detector.detect_and_enforce().await.unwrap();
        assert_eq!(report.applied, 1);
        assert!(matches!(
            &report.details[0],
            SweepDetail::Enforced { limit, .. } if (limit - 2.0).abs() < 1e-9
        ));
    }

    #[tokio::test]
    async fn test_completed_task_is_skipped_not_enforced() {
        let session = session_started_minutes_ago("t-1", 300);
        let store = Arc::new(
            MemoryStore::new()
                .with_project(Project::active("p-1"))
                .with_definition(definition("t-1", Some(1.0)))
                .with_progress(TaskProgress {
                    status: TaskStatus::Completed,
                    actual_hours: 1.0,
                    progress_pct: 100,
                    ..TaskProgress::pending("p-1", "t-1")
                })
                .with_session(session.clone()),
        );
        let (detector, _) = detector(store.clone());

        let report = detector.detect_and_enforce().await.unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.applied, 0);
        assert!(matches!(&report.details[0], SweepDetail::Skipped { .. }));

        // No double-completion side effects: hours untouched, session open
        let progress = store.find_task_progress("p-1", "t-1").await.unwrap().unwrap();
        assert!((progress.actual_hours - 1.0).abs() < 1e-9);
        let stored = store.find_session(&session.id).await.unwrap().unwrap();
        assert!(stored.is_open());
    }

    #[tokio::test]
    async fn test_missing_records_are_skipped_and_logged() {
        let no_progress = session_started_minutes_ago("t-none", 120);
        let no_definition = session_started_minutes_ago("t-undef", 120);
        let store = Arc::new(
            MemoryStore::new()
                .with_project(Project::active("p-1"))
                .with_progress(in_progress("t-undef", 0.0))
                .with_session(no_progress)
                .with_session(no_definition),
        );
        let (detector, _) = detector(store);

        let report = detector.detect_and_enforce().await.unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(report.applied, 0);
        assert_eq!(
            report
                .details
                .iter()
                .filter(|d| matches!(d, SweepDetail::Skipped { .. }))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_second_run_enforces_nothing() {
        let session = session_started_minutes_ago("t-1", 90);
        let store = Arc::new(
            MemoryStore::new()
                .with_project(Project::active("p-1"))
                .with_definition(definition("t-1", Some(1.0)))
                .with_progress(in_progress("t-1", 0.0))
                .with_session(session),
        );
        let (detector, _) = detector(store);

        let first = detector.detect_and_enforce().await.unwrap();
        assert_eq!(first.applied, 1);

        let second = detector.detect_and_enforce().await.unwrap();
        assert_eq!(second.checked, 0);
        assert_eq!(second.applied, 0);
    }

    #[tokio::test]
    async fn test_cascade_completes_project_in_same_run() {
        let session = session_started_minutes_ago("t-3", 90);
        let completed = |task_id: &str| TaskProgress {
            status: TaskStatus::Completed,
            actual_hours: 1.0,
            progress_pct: 100,
            ..TaskProgress::pending("p-1", task_id)
        };
        let store = Arc::new(
            MemoryStore::new()
                .with_project(Project::active("p-1"))
                .with_definition(definition("t-3", Some(1.0)))
                .with_progress(completed("t-1"))
                .with_progress(completed("t-2"))
                .with_progress(in_progress("t-3", 0.0))
                .with_session(session),
        );
        let (detector, _) = detector(store.clone());

        let report = detector.detect_and_enforce().await.unwrap();
        assert!(matches!(
            &report.details[0],
            SweepDetail::Enforced {
                project_completed: true,
                ..
            }
        ));
        let project = store.find_project("p-1").await.unwrap().unwrap();
        assert_eq!(project.status, ProjectStatus::Completed);
    }
}
