//! Runtime configuration.
//!
//! Lifecycle time budgets and the load-error retry window, with defaults that
//! suit interactive hosts and overrides from `SWITCHYARD_*` environment
//! variables.
//!
//! # Example
//!
//! ```no_run
//! use switchyard_runtime::config::SwitchyardConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SwitchyardConfig::from_env()?;
//! println!("mount budget: {:?}", config.timeouts.mount.budget());
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use switchyard_core::Phase;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable held an unparsable value
    #[error("Invalid value for {var}: {value}")]
    InvalidValue {
        /// Variable name
        var: String,
        /// Raw value
        value: String,
    },

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Time budget for one lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Budget in milliseconds
    pub millis: u64,
    /// Fail the phase when the budget is exceeded; otherwise keep waiting
    pub die_on_timeout: bool,
    /// Log a warning every this many milliseconds while the phase is pending
    pub warning_millis: u64,
}

impl TimeoutConfig {
    /// A budget of `millis` that logs but never fails.
    #[must_use]
    pub const fn new(millis: u64) -> Self {
        Self {
            millis,
            die_on_timeout: false,
            warning_millis: 1000,
        }
    }

    /// Set whether exceeding the budget fails the phase.
    #[must_use]
    pub const fn with_die_on_timeout(mut self, die: bool) -> Self {
        self.die_on_timeout = die;
        self
    }

    /// Set the warning interval.
    #[must_use]
    pub const fn with_warning_millis(mut self, millis: u64) -> Self {
        self.warning_millis = millis;
        self
    }

    /// Budget as a `Duration`.
    #[must_use]
    pub const fn budget(&self) -> Duration {
        Duration::from_millis(self.millis)
    }

    /// Warning interval as a `Duration`.
    #[must_use]
    pub const fn warning(&self) -> Duration {
        Duration::from_millis(self.warning_millis)
    }

    /// Validate the budget.
    ///
    /// # Errors
    ///
    /// Returns error if the budget is zero or the warning interval exceeds it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.millis == 0 {
            return Err(ConfigError::ValidationError("timeout millis must be > 0".to_string()));
        }
        if self.warning_millis == 0 || self.warning_millis > self.millis {
            return Err(ConfigError::ValidationError(format!(
                "warning_millis must be between 1 and {}",
                self.millis
            )));
        }
        Ok(())
    }
}

/// Time budgets per phase. Loading has no budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleTimeouts {
    /// Bootstrap budget
    pub bootstrap: TimeoutConfig,
    /// Mount budget
    pub mount: TimeoutConfig,
    /// Unmount budget
    pub unmount: TimeoutConfig,
    /// Unload budget
    pub unload: TimeoutConfig,
}

impl LifecycleTimeouts {
    /// The budget that applies to `phase`, if any.
    #[must_use]
    pub const fn for_phase(&self, phase: Phase) -> Option<TimeoutConfig> {
        match phase {
            Phase::Load => None,
            Phase::Bootstrap => Some(self.bootstrap),
            Phase::Mount => Some(self.mount),
            Phase::Unmount => Some(self.unmount),
            Phase::Unload => Some(self.unload),
        }
    }

    /// Validate every budget.
    ///
    /// # Errors
    ///
    /// Returns the first invalid budget's error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bootstrap.validate()?;
        self.mount.validate()?;
        self.unmount.validate()?;
        self.unload.validate()?;
        Ok(())
    }
}

impl Default for LifecycleTimeouts {
    fn default() -> Self {
        Self {
            bootstrap: TimeoutConfig::new(4000),
            mount: TimeoutConfig::new(3000),
            unmount: TimeoutConfig::new(3000),
            unload: TimeoutConfig::new(3000),
        }
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchyardConfig {
    /// Per-phase time budgets
    pub timeouts: LifecycleTimeouts,
    /// Minimum delay before an app in `LOAD_ERROR` is loaded again
    pub load_error_retry_ms: u64,
}

impl SwitchyardConfig {
    /// Load configuration from `SWITCHYARD_*` environment variables.
    ///
    /// Recognized variables:
    ///
    /// - `SWITCHYARD_BOOTSTRAP_TIMEOUT_MS`, `SWITCHYARD_MOUNT_TIMEOUT_MS`,
    ///   `SWITCHYARD_UNMOUNT_TIMEOUT_MS`, `SWITCHYARD_UNLOAD_TIMEOUT_MS`
    /// - `SWITCHYARD_TIMEOUT_WARNING_MS` (all phases)
    /// - `SWITCHYARD_DIE_ON_TIMEOUT` (all phases, `true`/`false`)
    /// - `SWITCHYARD_LOAD_ERROR_RETRY_MS`
    ///
    /// # Errors
    ///
    /// Returns error if a variable is unparsable or the result is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns error if a variable is unparsable or the result is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let phases = [
            ("SWITCHYARD_BOOTSTRAP_TIMEOUT_MS", &mut config.timeouts.bootstrap),
            ("SWITCHYARD_MOUNT_TIMEOUT_MS", &mut config.timeouts.mount),
            ("SWITCHYARD_UNMOUNT_TIMEOUT_MS", &mut config.timeouts.unmount),
            ("SWITCHYARD_UNLOAD_TIMEOUT_MS", &mut config.timeouts.unload),
        ];
        let warning = parse_var::<u64, _>(&lookup, "SWITCHYARD_TIMEOUT_WARNING_MS")?;
        let die = parse_var::<bool, _>(&lookup, "SWITCHYARD_DIE_ON_TIMEOUT")?;

        for (var, timeout) in phases {
            if let Some(millis) = parse_var::<u64, _>(&lookup, var)? {
                timeout.millis = millis;
            }
            if let Some(warning) = warning {
                timeout.warning_millis = warning;
            }
            if let Some(die) = die {
                timeout.die_on_timeout = die;
            }
        }

        if let Some(retry) = parse_var::<u64, _>(&lookup, "SWITCHYARD_LOAD_ERROR_RETRY_MS")? {
            config.load_error_retry_ms = retry;
        }

        config.validate()?;
        Ok(config)
    }

    /// Replace the per-phase budgets.
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: LifecycleTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the load-error retry delay.
    #[must_use]
    pub const fn with_load_error_retry(mut self, retry: Duration) -> Self {
        // Retry windows beyond u64::MAX millis are not meaningful
        #[allow(clippy::cast_possible_truncation)]
        let millis = retry.as_millis() as u64;
        self.load_error_retry_ms = millis;
        self
    }

    /// Load-error retry delay as a `Duration`.
    #[must_use]
    pub const fn load_error_retry(&self) -> Duration {
        Duration::from_millis(self.load_error_retry_ms)
    }

    /// Validate the whole configuration.
    ///
    /// # Errors
    ///
    /// Returns error if any budget is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timeouts.validate()
    }
}

impl Default for SwitchyardConfig {
    fn default() -> Self {
        Self {
            timeouts: LifecycleTimeouts::default(),
            load_error_retry_ms: 200,
        }
    }
}

fn parse_var<T, F>(lookup: &F, var: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .map(|value| {
            value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
                var: var.to_string(),
                value,
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SwitchyardConfig::default();
        assert_eq!(config.timeouts.bootstrap.millis, 4000);
        assert_eq!(config.timeouts.mount.millis, 3000);
        assert!(!config.timeouts.unmount.die_on_timeout);
        assert_eq!(config.load_error_retry(), Duration::from_millis(200));
        assert!(config.validate().is_ok());
        assert_eq!(config.timeouts.for_phase(Phase::Load), None);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = SwitchyardConfig::from_lookup(lookup(&[
            ("SWITCHYARD_MOUNT_TIMEOUT_MS", "500"),
            ("SWITCHYARD_TIMEOUT_WARNING_MS", "100"),
            ("SWITCHYARD_DIE_ON_TIMEOUT", "true"),
            ("SWITCHYARD_LOAD_ERROR_RETRY_MS", "50"),
        ]))
        .unwrap();

        assert_eq!(config.timeouts.mount.millis, 500);
        assert_eq!(config.timeouts.bootstrap.millis, 4000);
        assert!(config.timeouts.unload.die_on_timeout);
        assert_eq!(config.timeouts.unload.warning_millis, 100);
        assert_eq!(config.load_error_retry_ms, 50);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = SwitchyardConfig::from_lookup(lookup(&[("SWITCHYARD_DIE_ON_TIMEOUT", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref var, .. } if var == "SWITCHYARD_DIE_ON_TIMEOUT"));
    }

    #[test]
    fn test_warning_longer_than_budget_is_invalid() {
        let err = SwitchyardConfig::from_lookup(lookup(&[
            ("SWITCHYARD_UNMOUNT_TIMEOUT_MS", "200"),
            ("SWITCHYARD_TIMEOUT_WARNING_MS", "1000"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_zero_budget_is_invalid() {
        assert!(TimeoutConfig::new(0).validate().is_err());
        assert!(TimeoutConfig::new(10).with_warning_millis(5).validate().is_ok());
    }
}
