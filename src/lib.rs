//! Stint - work-session lifecycle and time-budget enforcement engine.
//!
//! Tracks open and closed work sessions against tasks, computes
//! accumulated worked time, enforces a per-task time budget, and
//! auto-completes tasks (cascading to project completion) when the
//! budget is exceeded. Reconciliation sweeps repair sessions left in
//! inconsistent states by partial cutovers or process crashes.
//!
//! # Architecture
//!
//! - [`model`] - domain records for sessions, tasks, and projects
//! - [`budget`] - pure time-budget calculation
//! - [`store`] - persistence seam with idempotent update predicates
//! - [`sweep`] - overrun detector, cutover executor, reconciliation
//! - [`diagnostics`] - read-only budget-position snapshots
//! - [`notify`] - best-effort failure notification sink
//! - [`server`] - HTTP trigger surface for external schedulers
//! - [`config`] - enforcement configuration
//! - [`error`] - custom error types and handling
//!
//! # Example
//!
//! ```rust,ignore
//! use stint::config::StintConfig;
//! use stint::notify::LogSink;
//! use stint::store::SqliteStore;
//! use stint::sweep::OverrunDetector;
//!
//! let config = StintConfig::load(Path::new("stint.toml"))?;
//! let store = Arc::new(SqliteStore::open(&config.database_path())?);
//! let detector = OverrunDetector::new(store, Arc::new(LogSink), &config);
//! let report = detector.detect_and_enforce().await?;
//! println!("{} checked, {} enforced", report.checked, report.applied);
//! ```

pub mod budget;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod model;
pub mod notify;
pub mod server;
pub mod store;
pub mod sweep;

// Re-export commonly used types
pub use error::{Result, StintError};

pub use budget::BudgetPolicy;
pub use config::StintConfig;
pub use diagnostics::{Diagnostics, OpenSessionSnapshot};
pub use model::{
    Project, ProjectStatus, TaskDefinition, TaskProgress, TaskStatus, WorkSession,
};
pub use notify::{LogSink, NotificationSink, NotifyEvent, NotifyKind, RecordingSink};
pub use server::{AppState, SweepResponse};
pub use store::{
    CloseSession, CompleteTask, CutoverApplied, CutoverPlan, MemoryStore, SqliteStore, WorkStore,
};
pub use sweep::{
    CutoverExecutor, CutoverOutcome, OverrunDetector, Reconciler, SweepDetail, SweepReport,
};
