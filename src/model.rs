//! Domain records for sessions, tasks, and projects.
//!
//! The engine never caches these between sweep runs; every invocation
//! re-reads them from the store. A [`WorkSession`] makes exactly one
//! transition in its lifetime, open -> closed, and closed sessions are
//! immutable from this crate's point of view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a task instantiated within a project.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    /// True for states that exclude the task from overrun enforcement.
    ///
    /// Cancelled is terminal and never re-enters enforcement; completed
    /// tasks are left to the reconciliation sweeps, which close any stray
    /// open sessions without touching the task again.
    #[must_use]
    pub fn is_done(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Stable text form used by the relational store.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "assigned" => Ok(Self::Assigned),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a project.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Planning,
    Active,
    Paused,
    Completed,
}

impl ProjectStatus {
    /// Stable text form used by the relational store.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }
}

impl std::str::FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "planning" => Ok(Self::Planning),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown project status: {other}")),
        }
    }
}

/// A timed interval during which a user is recorded as actively working
/// a task.
///
/// `ended_at == None` means the session is open. `hours` is set exactly
/// once, when the session closes, by either the user action, the cutover
/// executor, or a reconciliation sweep. Sessions are never deleted here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkSession {
    pub id: String,
    pub user_id: String,
    pub task_id: String,
    pub project_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub hours: Option<f64>,
    pub description: String,
}

impl WorkSession {
    /// Open a new session starting now.
    #[must_use]
    pub fn start(
        user_id: impl Into<String>,
        task_id: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            task_id: task_id.into(),
            project_id: project_id.into(),
            started_at: Utc::now(),
            ended_at: None,
            hours: None,
            description: String::new(),
        }
    }

    /// Whether the session is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Hours elapsed from `started_at` to `now`, clamped at zero so a
    /// skewed clock never yields negative work.
    #[must_use]
    pub fn elapsed_hours(&self, now: DateTime<Utc>) -> f64 {
        let millis = (now - self.started_at).num_milliseconds();
        (millis as f64 / 3_600_000.0).max(0.0)
    }
}

/// Per-project state of a task.
///
/// `actual_hours` is monotonically non-decreasing while the status is not
/// completed; a completed task always carries `progress_pct == 100`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskProgress {
    pub id: String,
    pub project_id: String,
    pub task_id: String,
    pub status: TaskStatus,
    pub actual_hours: f64,
    pub progress_pct: u8,
    pub assigned_to: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl TaskProgress {
    /// A fresh pending record for a task attached to a project.
    #[must_use]
    pub fn pending(project_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            task_id: task_id.into(),
            status: TaskStatus::Pending,
            actual_hours: 0.0,
            progress_pct: 0,
            assigned_to: None,
            started_at: None,
            ended_at: None,
        }
    }
}

/// Immutable task template carrying the budget basis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDefinition {
    pub task_id: String,
    pub title: String,
    /// Estimated hours; `None` or zero falls back to the default budget.
    pub estimated_hours: Option<f64>,
}

/// A project; auto-completed only as a cascading side effect when all of
/// its non-cancelled tasks reach completed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: String,
    pub status: ProjectStatus,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Project {
    /// An active project with the given id.
    #[must_use]
    pub fn active(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ProjectStatus::Active,
            ended_at: None,
        }
    }
}
