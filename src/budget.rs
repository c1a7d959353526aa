//! Time-budget calculation.
//!
//! Pure and deterministic: no I/O, no clock access. The policy values are
//! carried in configuration so behavior is overridable per environment
//! rather than hidden in constants.

use serde::{Deserialize, Serialize};

/// Default overrun factor applied on top of a task's estimate.
pub const DEFAULT_OVERRUN_FACTOR: f64 = 0.20;

/// Default budget in hours for tasks without a usable estimate.
pub const DEFAULT_BUDGET_HOURS: f64 = 2.0;

/// Budget policy for a task's allowed total worked time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BudgetPolicy {
    /// Fraction of the estimate granted on top of it before cutover.
    #[serde(default = "default_overrun_factor")]
    pub overrun_factor: f64,
    /// Budget in hours when a task has no positive estimate.
    #[serde(default = "default_budget_hours")]
    pub default_hours: f64,
}

fn default_overrun_factor() -> f64 {
    DEFAULT_OVERRUN_FACTOR
}

fn default_budget_hours() -> f64 {
    DEFAULT_BUDGET_HOURS
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            overrun_factor: default_overrun_factor(),
            default_hours: default_budget_hours(),
        }
    }
}

impl BudgetPolicy {
    /// Maximum allowed total worked hours for a task.
    ///
    /// A positive estimate is stretched by the overrun factor; a missing,
    /// zero, or negative estimate falls back to `default_hours`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stint::budget::BudgetPolicy;
    ///
    /// let policy = BudgetPolicy::default();
    /// assert!((policy.limit_for(Some(1.0)) - 1.2).abs() < 1e-9);
    /// assert_eq!(policy.limit_for(None), 2.0);
    /// ```
    #[must_use]
    pub fn limit_for(&self, estimated_hours: Option<f64>) -> f64 {
        match estimated_hours {
            Some(estimate) if estimate > 0.0 => estimate * (1.0 + self.overrun_factor),
            _ => self.default_hours,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_scales_estimate() {
        let policy = BudgetPolicy::default();
        assert!((policy.limit_for(Some(1.0)) - 1.2).abs() < 1e-9);
        assert!((policy.limit_for(Some(10.0)) - 12.0).abs() < 1e-9);
        assert!((policy.limit_for(Some(0.5)) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_missing_estimate_uses_default() {
        let policy = BudgetPolicy::default();
        assert_eq!(policy.limit_for(None), 2.0);
    }

    #[test]
    fn test_zero_estimate_uses_default() {
        let policy = BudgetPolicy::default();
        assert_eq!(policy.limit_for(Some(0.0)), 2.0);
        assert_eq!(policy.limit_for(Some(-3.0)), 2.0);
    }

    #[test]
    fn test_custom_factor() {
        let policy = BudgetPolicy {
            overrun_factor: 0.5,
            default_hours: 4.0,
        };
        assert!((policy.limit_for(Some(2.0)) - 3.0).abs() < 1e-9);
        assert_eq!(policy.limit_for(Some(0.0)), 4.0);
    }

    #[test]
    fn test_policy_deserializes_with_defaults() {
        let policy: BudgetPolicy = toml::from_str("").unwrap();
        assert_eq!(policy, BudgetPolicy::default());

        let policy: BudgetPolicy = toml::from_str("overrun_factor = 0.1").unwrap();
        assert!((policy.overrun_factor - 0.1).abs() < 1e-9);
        assert_eq!(policy.default_hours, 2.0);
    }
}
