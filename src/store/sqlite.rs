//! SQLite-backed reference implementation of [`WorkStore`].
//!
//! Every mutating statement carries its guarding predicate in the WHERE
//! clause, and [`WorkStore::apply_cutover`] runs inside one transaction,
//! so the cutover is atomic and re-running any sweep is safe. A partial
//! unique index holds the at-most-one-open-session-per-task invariant
//! even for writers that bypass [`WorkStore::open_session`].

use super::{CloseSession, CompleteTask, CutoverApplied, CutoverPlan, WorkStore};
use crate::error::{Result, StintError};
use crate::model::{
    Project, ProjectStatus, TaskDefinition, TaskProgress, TaskStatus, WorkSession,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS work_sessions (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL,
    task_id     TEXT NOT NULL,
    project_id  TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    ended_at    TEXT,
    hours       REAL,
    description TEXT NOT NULL DEFAULT ''
);

CREATE UNIQUE INDEX IF NOT EXISTS open_session_per_task
    ON work_sessions (task_id) WHERE ended_at IS NULL;

CREATE TABLE IF NOT EXISTS task_progress (
    id           TEXT PRIMARY KEY,
    project_id   TEXT NOT NULL,
    task_id      TEXT NOT NULL,
    status       TEXT NOT NULL DEFAULT 'pending',
    actual_hours REAL NOT NULL DEFAULT 0,
    progress_pct INTEGER NOT NULL DEFAULT 0,
    assigned_to  TEXT,
    started_at   TEXT,
    ended_at     TEXT,
    UNIQUE (project_id, task_id)
);

CREATE TABLE IF NOT EXISTS task_definitions (
    task_id         TEXT PRIMARY KEY,
    title           TEXT NOT NULL,
    estimated_hours REAL
);

CREATE TABLE IF NOT EXISTS projects (
    id       TEXT PRIMARY KEY,
    status   TEXT NOT NULL DEFAULT 'planning',
    ended_at TEXT
);
";

/// [`WorkStore`] over a SQLite database file.
///
/// Sweeps are short-lived and sequential per invocation, so a single
/// mutex-guarded connection is sufficient; overlapping sweep processes
/// coordinate through SQLite itself.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (and initialize) a database at the given path.
    ///
    /// # Errors
    ///
    /// Returns a store error if the file cannot be opened or the schema
    /// cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(store_err("open"))?;
        conn.execute_batch(SCHEMA).map_err(store_err("schema"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database, mainly for tests.
    ///
    /// # Errors
    ///
    /// Returns a store error if the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err("open"))?;
        conn.execute_batch(SCHEMA).map_err(store_err("schema"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert or replace a task progress record. Used by seeding and by
    /// the CRUD layers that own record creation.
    pub fn upsert_progress(&self, progress: &TaskProgress) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO task_progress
             (id, project_id, task_id, status, actual_hours, progress_pct, assigned_to, started_at, ended_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                progress.id,
                progress.project_id,
                progress.task_id,
                progress.status.as_str(),
                progress.actual_hours,
                progress.progress_pct,
                progress.assigned_to,
                progress.started_at,
                progress.ended_at,
            ],
        )
        .map_err(store_err("upsert_progress"))?;
        Ok(())
    }

    /// Insert or replace a task definition.
    pub fn upsert_definition(&self, definition: &TaskDefinition) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO task_definitions (task_id, title, estimated_hours)
             VALUES (?1, ?2, ?3)",
            params![
                definition.task_id,
                definition.title,
                definition.estimated_hours
            ],
        )
        .map_err(store_err("upsert_definition"))?;
        Ok(())
    }

    /// Insert or replace a project.
    pub fn upsert_project(&self, project: &Project) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO projects (id, status, ended_at) VALUES (?1, ?2, ?3)",
            params![project.id, project.status.as_str(), project.ended_at],
        )
        .map_err(store_err("upsert_project"))?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StintError::store("sqlite", "connection mutex poisoned"))
    }
}

fn store_err(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> StintError {
    move |e| StintError::store(operation, e.to_string())
}

fn parse_task_status(raw: &str) -> rusqlite::Result<TaskStatus> {
    raw.parse().map_err(|message: String| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            message.into(),
        )
    })
}

fn parse_project_status(raw: &str) -> rusqlite::Result<ProjectStatus> {
    raw.parse().map_err(|message: String| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            message.into(),
        )
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<WorkSession> {
    Ok(WorkSession {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        task_id: row.get("task_id")?,
        project_id: row.get("project_id")?,
        started_at: row.get("started_at")?,
        ended_at: row.get("ended_at")?,
        hours: row.get("hours")?,
        description: row.get("description")?,
    })
}

fn progress_from_row(row: &Row<'_>) -> rusqlite::Result<TaskProgress> {
    let status: String = row.get("status")?;
    Ok(TaskProgress {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        task_id: row.get("task_id")?,
        status: parse_task_status(&status)?,
        actual_hours: row.get("actual_hours")?,
        progress_pct: row.get("progress_pct")?,
        assigned_to: row.get("assigned_to")?,
        started_at: row.get("started_at")?,
        ended_at: row.get("ended_at")?,
    })
}

const SESSION_COLUMNS: &str =
    "id, user_id, task_id, project_id, started_at, ended_at, hours, description";

fn query_open_sessions(
    conn: &Connection,
    older_than: Option<DateTime<Utc>>,
) -> rusqlite::Result<Vec<WorkSession>> {
    match older_than {
        Some(cutoff) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM work_sessions
                 WHERE ended_at IS NULL AND started_at < ?1
                 ORDER BY started_at"
            ))?;
            let rows = stmt.query_map(params![cutoff], session_from_row)?;
            rows.collect()
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM work_sessions
                 WHERE ended_at IS NULL
                 ORDER BY started_at"
            ))?;
            let rows = stmt.query_map([], session_from_row)?;
            rows.collect()
        }
    }
}

const PROGRESS_COLUMNS: &str =
    "id, project_id, task_id, status, actual_hours, progress_pct, assigned_to, started_at, ended_at";

/// Executes the three guarded cutover updates inside an open transaction.
fn cutover_in_tx(
    tx: &rusqlite::Transaction<'_>,
    plan: &CutoverPlan,
) -> rusqlite::Result<CutoverApplied> {
    let session_closed = tx.execute(
        "UPDATE work_sessions SET ended_at = ?1, hours = ?2, description = ?3
         WHERE id = ?4 AND ended_at IS NULL",
        params![
            plan.ended_at,
            plan.session_hours,
            plan.description,
            plan.session_id
        ],
    )? > 0;

    let task_completed = tx.execute(
        "UPDATE task_progress
         SET status = 'completed', actual_hours = ?1, progress_pct = 100, ended_at = ?2
         WHERE project_id = ?3 AND task_id = ?4
           AND status NOT IN ('completed', 'cancelled')",
        params![
            plan.total_worked,
            plan.ended_at,
            plan.project_id,
            plan.task_id
        ],
    )? > 0;

    let remaining: i64 = tx.query_row(
        "SELECT COUNT(*) FROM task_progress
         WHERE project_id = ?1 AND status NOT IN ('completed', 'cancelled')",
        params![plan.project_id],
        |row| row.get(0),
    )?;

    let project_completed = remaining == 0
        && tx.execute(
            "UPDATE projects SET status = 'completed', ended_at = ?1
             WHERE id = ?2 AND status != 'completed'",
            params![plan.ended_at, plan.project_id],
        )? > 0;

    Ok(CutoverApplied {
        session_closed,
        task_completed,
        project_completed,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[async_trait]
impl WorkStore for SqliteStore {
    async fn find_open_sessions(
        &self,
        older_than: Option<DateTime<Utc>>,
    ) -> Result<Vec<WorkSession>> {
        let conn = self.lock()?;
        query_open_sessions(&conn, older_than).map_err(store_err("find_open_sessions"))
    }

    async fn find_session(&self, session_id: &str) -> Result<Option<WorkSession>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM work_sessions WHERE id = ?1"),
            params![session_id],
            session_from_row,
        )
        .optional()
        .map_err(store_err("find_session"))
    }

    async fn open_session(&self, session: WorkSession) -> Result<()> {
        let conn = self.lock()?;
        let result = conn.execute(
            "INSERT INTO work_sessions
             (id, user_id, task_id, project_id, started_at, ended_at, hours, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                session.id,
                session.user_id,
                session.task_id,
                session.project_id,
                session.started_at,
                session.ended_at,
                session.hours,
                session.description,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StintError::SessionAlreadyOpen {
                task_id: session.task_id,
            }),
            Err(err) => Err(store_err("open_session")(err)),
        }
    }

    async fn close_session(&self, session_id: &str, close: CloseSession) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE work_sessions SET ended_at = ?1, hours = ?2, description = ?3
                 WHERE id = ?4 AND ended_at IS NULL",
                params![close.ended_at, close.hours, close.description, session_id],
            )
            .map_err(store_err("close_session"))?;
        Ok(changed > 0)
    }

    async fn find_task_progress(
        &self,
        project_id: &str,
        task_id: &str,
    ) -> Result<Option<TaskProgress>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!(
                "SELECT {PROGRESS_COLUMNS} FROM task_progress
                 WHERE project_id = ?1 AND task_id = ?2"
            ),
            params![project_id, task_id],
            progress_from_row,
        )
        .optional()
        .map_err(store_err("find_task_progress"))
    }

    async fn find_task_definition(&self, task_id: &str) -> Result<Option<TaskDefinition>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT task_id, title, estimated_hours FROM task_definitions WHERE task_id = ?1",
            params![task_id],
            |row| {
                Ok(TaskDefinition {
                    task_id: row.get(0)?,
                    title: row.get(1)?,
                    estimated_hours: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(store_err("find_task_definition"))
    }

    async fn complete_task(
        &self,
        project_id: &str,
        task_id: &str,
        done: CompleteTask,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE task_progress
                 SET status = 'completed', actual_hours = ?1, progress_pct = 100, ended_at = ?2
                 WHERE project_id = ?3 AND task_id = ?4
                   AND status NOT IN ('completed', 'cancelled')",
                params![done.actual_hours, done.ended_at, project_id, task_id],
            )
            .map_err(store_err("complete_task"))?;
        Ok(changed > 0)
    }

    async fn find_project_tasks(&self, project_id: &str) -> Result<Vec<TaskProgress>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {PROGRESS_COLUMNS} FROM task_progress
                 WHERE project_id = ?1 ORDER BY task_id"
            ))
            .map_err(store_err("find_project_tasks"))?;
        let rows = stmt
            .query_map(params![project_id], progress_from_row)
            .map_err(store_err("find_project_tasks"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err("find_project_tasks"))
    }

    async fn find_project(&self, project_id: &str) -> Result<Option<Project>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, status, ended_at FROM projects WHERE id = ?1",
            params![project_id],
            |row| {
                let status: String = row.get(1)?;
                Ok(Project {
                    id: row.get(0)?,
                    status: parse_project_status(&status)?,
                    ended_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(store_err("find_project"))
    }

    async fn complete_project(&self, project_id: &str, ended_at: DateTime<Utc>) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE projects SET status = 'completed', ended_at = ?1
                 WHERE id = ?2 AND status != 'completed'",
                params![ended_at, project_id],
            )
            .map_err(store_err("complete_project"))?;
        Ok(changed > 0)
    }

    async fn apply_cutover(&self, plan: &CutoverPlan) -> Result<CutoverApplied> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(store_err("apply_cutover"))?;
        let applied = cutover_in_tx(&tx, plan).map_err(store_err("apply_cutover"))?;
        tx.commit().map_err(store_err("apply_cutover"))?;
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store_with_task(estimated_hours: Option<f64>) -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_project(&Project::active("p-1")).unwrap();
        store
            .upsert_definition(&TaskDefinition {
                task_id: "t-1".into(),
                title: "Wire the API".into(),
                estimated_hours,
            })
            .unwrap();
        store
            .upsert_progress(&TaskProgress {
                status: TaskStatus::InProgress,
                ..TaskProgress::pending("p-1", "t-1")
            })
            .unwrap();
        store
    }

    fn session_started_hours_ago(task_id: &str, hours: i64) -> WorkSession {
        let mut session = WorkSession::start("u-1", task_id, "p-1");
        session.started_at = Utc::now() - Duration::hours(hours);
        session
    }

    #[tokio::test]
    async fn test_schema_round_trip() {
        let store = store_with_task(Some(1.0));
        let session = session_started_hours_ago("t-1", 2);
        store.open_session(session.clone()).await.unwrap();

        let found = store.find_session(&session.id).await.unwrap().unwrap();
        assert_eq!(found.task_id, "t-1");
        assert!(found.is_open());

        let progress = store.find_task_progress("p-1", "t-1").await.unwrap().unwrap();
        assert_eq!(progress.status, TaskStatus::InProgress);

        let definition = store.find_task_definition("t-1").await.unwrap().unwrap();
        assert_eq!(definition.estimated_hours, Some(1.0));
    }

    #[tokio::test]
    async fn test_unique_index_rejects_second_open_session() {
        let store = store_with_task(Some(1.0));
        store
            .open_session(session_started_hours_ago("t-1", 2))
            .await
            .unwrap();

        let err = store
            .open_session(WorkSession::start("u-2", "t-1", "p-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StintError::SessionAlreadyOpen { .. }));
    }

    #[tokio::test]
    async fn test_reopening_after_close_is_allowed() {
        let store = store_with_task(Some(1.0));
        let session = session_started_hours_ago("t-1", 2);
        let id = session.id.clone();
        store.open_session(session).await.unwrap();
        store
            .close_session(
                &id,
                CloseSession {
                    ended_at: Utc::now(),
                    hours: 2.0,
                    description: "done".into(),
                },
            )
            .await
            .unwrap();

        // The partial index only covers open sessions
        store
            .open_session(WorkSession::start("u-1", "t-1", "p-1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_find_open_sessions_age_filter() {
        let store = store_with_task(Some(1.0));
        store
            .open_session(session_started_hours_ago("t-1", 3))
            .await
            .unwrap();
        store
            .upsert_progress(&TaskProgress {
                status: TaskStatus::InProgress,
                ..TaskProgress::pending("p-1", "t-2")
            })
            .unwrap();
        store
            .open_session(WorkSession::start("u-1", "t-2", "p-1"))
            .await
            .unwrap();

        let cutoff = Utc::now() - Duration::hours(1);
        let old = store.find_open_sessions(Some(cutoff)).await.unwrap();
        assert_eq!(old.len(), 1);
        assert_eq!(old[0].task_id, "t-1");

        let all = store.find_open_sessions(None).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_apply_cutover_transaction() {
        let store = store_with_task(Some(1.0));
        let session = session_started_hours_ago("t-1", 2);
        let plan = CutoverPlan {
            session_id: session.id.clone(),
            project_id: "p-1".into(),
            task_id: "t-1".into(),
            ended_at: Utc::now(),
            session_hours: 2.0,
            total_worked: 2.0,
            description: "auto-cutoff: exceeded budget 1.20h, worked 2.00h".into(),
        };
        store.open_session(session).await.unwrap();

        let applied = store.apply_cutover(&plan).await.unwrap();
        assert!(applied.session_closed);
        assert!(applied.task_completed);
        assert!(applied.project_completed);

        let progress = store.find_task_progress("p-1", "t-1").await.unwrap().unwrap();
        assert_eq!(progress.status, TaskStatus::Completed);
        assert_eq!(progress.progress_pct, 100);

        let project = store.find_project("p-1").await.unwrap().unwrap();
        assert_eq!(project.status, ProjectStatus::Completed);

        // Re-running the same plan must be a no-op
        let second = store.apply_cutover(&plan).await.unwrap();
        assert!(second.is_noop());
    }

    #[tokio::test]
    async fn test_complete_task_guard() {
        let store = store_with_task(Some(1.0));
        let done = CompleteTask {
            actual_hours: 1.3,
            ended_at: Utc::now(),
        };
        assert!(store.complete_task("p-1", "t-1", done.clone()).await.unwrap());
        assert!(!store.complete_task("p-1", "t-1", done).await.unwrap());
    }
}
