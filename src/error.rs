//! Custom error types for Stint.
//!
//! This module provides structured error types that separate run-aborting
//! failures (a sweep's primary store query) from item-level failures
//! (a single session's cutover or repair step), which are logged and
//! skipped without failing the batch.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Stint operations
#[derive(Error, Debug)]
pub enum StintError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    // =========================================================================
    // Store Errors
    // =========================================================================
    /// Store operation failed (aborts the sweep run when raised by a
    /// primary query)
    #[error("Store error during {operation}: {message}")]
    Store { operation: String, message: String },

    /// A second open session was requested for a task that already has one
    #[error("Task {task_id} already has an open session")]
    SessionAlreadyOpen { task_id: String },

    /// Named session does not exist
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    // =========================================================================
    // Sweep Item Errors
    // =========================================================================
    /// Cutover of a single session failed; the batch continues
    #[error("Cutover failed for session {session_id}: {message}")]
    Cutover { session_id: String, message: String },

    /// Reconciliation of a single session failed; the batch continues
    #[error("Reconciliation failed for session {session_id}: {message}")]
    Reconcile { session_id: String, message: String },

    // =========================================================================
    // Trigger Errors
    // =========================================================================
    /// Trigger endpoint called without a valid shared secret
    #[error("Unauthorized: missing or invalid bearer token")]
    Unauthorized,

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StintError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create a store error
    pub fn store(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a cutover error for one session
    pub fn cutover(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Cutover {
            session_id: session_id.into(),
            message: message.into(),
        }
    }

    /// Create a reconciliation error for one session
    pub fn reconcile(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Reconcile {
            session_id: session_id.into(),
            message: message.into(),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this error is scoped to a single sweep item.
    ///
    /// Item-level errors are logged and skipped; they never propagate to
    /// fail the batch.
    pub fn is_item_level(&self) -> bool {
        matches!(
            self,
            Self::Cutover { .. } | Self::Reconcile { .. } | Self::SessionAlreadyOpen { .. }
        )
    }

    /// Check if this error aborts a whole sweep run
    pub fn is_run_level(&self) -> bool {
        matches!(self, Self::Store { .. } | Self::Io(_))
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Unauthorized => 2,
            Self::SessionNotFound { .. } => 3,
            Self::Store { .. } => 4,
            Self::Config { .. } | Self::InvalidConfig { .. } => 7,
            _ => 1,
        }
    }
}

/// Type alias for Stint results
pub type Result<T> = std::result::Result<T, StintError>;
