//! In-memory store for tests and the demo path.
//!
//! Keeps all records behind one mutex, which makes `apply_cutover`
//! trivially atomic. Seeding uses builder-style `with_*` methods so test
//! setups read as data.

use super::{CloseSession, CompleteTask, CutoverApplied, CutoverPlan, WorkStore};
use crate::error::{Result, StintError};
use crate::model::{Project, ProjectStatus, TaskDefinition, TaskProgress, TaskStatus, WorkSession};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<String, WorkSession>,
    progress: HashMap<String, TaskProgress>,
    definitions: HashMap<String, TaskDefinition>,
    projects: HashMap<String, Project>,
}

/// Mutex-backed [`WorkStore`] implementation.
///
/// # Example
///
/// ```rust,ignore
/// let store = MemoryStore::new()
///     .with_project(Project::active("p-1"))
///     .with_definition(TaskDefinition { task_id: "t-1".into(), title: "Design".into(), estimated_hours: Some(1.0) })
///     .with_progress(TaskProgress::pending("p-1", "t-1"));
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a session as-is, bypassing the open-session uniqueness check.
    ///
    /// Tests use this to reproduce drift (e.g. a stray open session on a
    /// completed task) that `open_session` would refuse to create.
    #[must_use]
    pub fn with_session(self, session: WorkSession) -> Self {
        self.lock_seed(|inner| {
            inner.sessions.insert(session.id.clone(), session);
        });
        self
    }

    /// Seed a task progress record.
    #[must_use]
    pub fn with_progress(self, progress: TaskProgress) -> Self {
        self.lock_seed(|inner| {
            inner.progress.insert(progress.id.clone(), progress);
        });
        self
    }

    /// Seed a task definition.
    #[must_use]
    pub fn with_definition(self, definition: TaskDefinition) -> Self {
        self.lock_seed(|inner| {
            inner
                .definitions
                .insert(definition.task_id.clone(), definition);
        });
        self
    }

    /// Seed a project.
    #[must_use]
    pub fn with_project(self, project: Project) -> Self {
        self.lock_seed(|inner| {
            inner.projects.insert(project.id.clone(), project);
        });
        self
    }

    fn lock_seed(&self, seed: impl FnOnce(&mut Inner)) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        seed(&mut inner);
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StintError::store("memory", "store mutex poisoned"))
    }
}

/// Applies the close field set if the session is still open.
fn close_in_place(session: &mut WorkSession, close: &CloseSession) -> bool {
    if session.ended_at.is_some() {
        return false;
    }
    session.ended_at = Some(close.ended_at);
    session.hours = Some(close.hours);
    session.description = close.description.clone();
    true
}

/// Applies the completion field set if the task can still transition.
fn complete_in_place(progress: &mut TaskProgress, done: &CompleteTask) -> bool {
    if progress.status.is_done() {
        return false;
    }
    progress.status = TaskStatus::Completed;
    progress.actual_hours = done.actual_hours;
    progress.progress_pct = 100;
    progress.ended_at = Some(done.ended_at);
    true
}

fn cascade_project(inner: &mut Inner, project_id: &str, ended_at: DateTime<Utc>) -> bool {
    let all_done = inner
        .progress
        .values()
        .filter(|p| p.project_id == project_id && p.status != TaskStatus::Cancelled)
        .all(|p| p.status == TaskStatus::Completed);
    if !all_done {
        return false;
    }
    match inner.projects.get_mut(project_id) {
        Some(project) if project.status != ProjectStatus::Completed => {
            project.status = ProjectStatus::Completed;
            project.ended_at = Some(ended_at);
            true
        }
        _ => false,
    }
}

#[async_trait]
impl WorkStore for MemoryStore {
    async fn find_open_sessions(
        &self,
        older_than: Option<DateTime<Utc>>,
    ) -> Result<Vec<WorkSession>> {
        let inner = self.lock()?;
        let mut sessions: Vec<WorkSession> = inner
            .sessions
            .values()
            .filter(|s| s.is_open())
            .filter(|s| older_than.is_none_or(|cutoff| s.started_at < cutoff))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(sessions)
    }

    async fn find_session(&self, session_id: &str) -> Result<Option<WorkSession>> {
        Ok(self.lock()?.sessions.get(session_id).cloned())
    }

    async fn open_session(&self, session: WorkSession) -> Result<()> {
        let mut inner = self.lock()?;
        let already_open = inner
            .sessions
            .values()
            .any(|s| s.task_id == session.task_id && s.is_open());
        if already_open {
            return Err(StintError::SessionAlreadyOpen {
                task_id: session.task_id,
            });
        }
        inner.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn close_session(&self, session_id: &str, close: CloseSession) -> Result<bool> {
        let mut inner = self.lock()?;
        Ok(inner
            .sessions
            .get_mut(session_id)
            .is_some_and(|session| close_in_place(session, &close)))
    }

    async fn find_task_progress(
        &self,
        project_id: &str,
        task_id: &str,
    ) -> Result<Option<TaskProgress>> {
        let inner = self.lock()?;
        Ok(inner
            .progress
            .values()
            .find(|p| p.project_id == project_id && p.task_id == task_id)
            .cloned())
    }

    async fn find_task_definition(&self, task_id: &str) -> Result<Option<TaskDefinition>> {
        Ok(self.lock()?.definitions.get(task_id).cloned())
    }

    async fn complete_task(
        &self,
        project_id: &str,
        task_id: &str,
        done: CompleteTask,
    ) -> Result<bool> {
        let mut inner = self.lock()?;
        Ok(inner
            .progress
            .values_mut()
            .find(|p| p.project_id == project_id && p.task_id == task_id)
            .is_some_and(|progress| complete_in_place(progress, &done)))
    }

    async fn find_project_tasks(&self, project_id: &str) -> Result<Vec<TaskProgress>> {
        let inner = self.lock()?;
        let mut tasks: Vec<TaskProgress> = inner
            .progress
            .values()
            .filter(|p| p.project_id == project_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        Ok(tasks)
    }

    async fn find_project(&self, project_id: &str) -> Result<Option<Project>> {
        Ok(self.lock()?.projects.get(project_id).cloned())
    }

    async fn complete_project(&self, project_id: &str, ended_at: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.lock()?;
        Ok(match inner.projects.get_mut(project_id) {
            Some(project) if project.status != ProjectStatus::Completed => {
                project.status = ProjectStatus::Completed;
                project.ended_at = Some(ended_at);
                true
            }
            _ => false,
        })
    }

    async fn apply_cutover(&self, plan: &CutoverPlan) -> Result<CutoverApplied> {
        let mut inner = self.lock()?;

        let session_closed = inner.sessions.get_mut(&plan.session_id).is_some_and(|s| {
            close_in_place(
                s,
                &CloseSession {
                    ended_at: plan.ended_at,
                    hours: plan.session_hours,
                    description: plan.description.clone(),
                },
            )
        });

        let task_completed = inner
            .progress
            .values_mut()
            .find(|p| p.project_id == plan.project_id && p.task_id == plan.task_id)
            .is_some_and(|progress| {
                complete_in_place(
                    progress,
                    &CompleteTask {
                        actual_hours: plan.total_worked,
                        ended_at: plan.ended_at,
                    },
                )
            });

        let project_completed = cascade_project(&mut inner, &plan.project_id, plan.ended_at);

        Ok(CutoverApplied {
            session_closed,
            task_completed,
            project_completed,
        })
    }
}
