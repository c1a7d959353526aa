//! Configuration for the enforcement engine.
//!
//! All sweep behavior flows from [`StintConfig`]: the budget policy, the
//! grace window for the overrun detector, the hard ceiling for the
//! reconciliation closer, and the trigger surface settings. Values come
//! from a TOML file with per-field defaults; the CLI layers its own
//! overrides on top.

use crate::budget::BudgetPolicy;
use crate::error::{Result, StintError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file name looked up in the working directory.
pub const CONFIG_FILE: &str = "stint.toml";

/// Engine and trigger-surface configuration.
///
/// # Example stint.toml
///
/// ```toml
/// grace_minutes = 60
/// ceiling_hours = 10.0
/// bind = "127.0.0.1:8787"
///
/// [budget]
/// overrun_factor = 0.20
/// default_hours = 2.0
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StintConfig {
    /// Budget policy applied to every task.
    #[serde(default)]
    pub budget: BudgetPolicy,

    /// Open sessions younger than this are never evaluated by the overrun
    /// detector. Bounds work and avoids false positives on clock skew.
    #[serde(default = "default_grace_minutes")]
    pub grace_minutes: i64,

    /// Hard ceiling in hours after which the reconciliation closer
    /// force-closes a session independent of any task budget.
    #[serde(default = "default_ceiling_hours")]
    pub ceiling_hours: f64,

    /// Address the trigger surface binds to.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Shared secret for the trigger endpoints. `None` disables the check.
    #[serde(default)]
    pub shared_secret: Option<String>,

    /// Path to the SQLite database. `None` resolves to the platform data
    /// directory.
    #[serde(default)]
    pub database: Option<PathBuf>,
}

fn default_grace_minutes() -> i64 {
    60
}

fn default_ceiling_hours() -> f64 {
    10.0
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

impl Default for StintConfig {
    fn default() -> Self {
        Self {
            budget: BudgetPolicy::default(),
            grace_minutes: default_grace_minutes(),
            ceiling_hours: default_ceiling_hours(),
            bind: default_bind(),
            shared_secret: None,
            database: None,
        }
    }
}

impl StintConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| StintError::config_with_path(e.to_string(), path.to_path_buf()))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| StintError::config_with_path(e.to_string(), path.to_path_buf()))?;
        Ok(config)
    }

    /// Pick up environment overrides. `STINT_SHARED_SECRET` takes
    /// precedence over the file so secrets can stay out of it.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(secret) = std::env::var("STINT_SHARED_SECRET") {
            if !secret.is_empty() {
                self.shared_secret = Some(secret);
            }
        }
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.budget.overrun_factor < 0.0 {
            return Err(StintError::InvalidConfig {
                field: "budget.overrun_factor".into(),
                reason: "must not be negative".into(),
            });
        }
        if self.budget.default_hours <= 0.0 {
            return Err(StintError::InvalidConfig {
                field: "budget.default_hours".into(),
                reason: "must be positive".into(),
            });
        }
        if self.grace_minutes < 0 {
            return Err(StintError::InvalidConfig {
                field: "grace_minutes".into(),
                reason: "must not be negative".into(),
            });
        }
        if self.ceiling_hours <= 0.0 {
            return Err(StintError::InvalidConfig {
                field: "ceiling_hours".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    /// Resolve the database path, defaulting under the platform data dir.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        if let Some(path) = &self.database {
            return path.clone();
        }
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stint")
            .join("stint.db")
    }
}
