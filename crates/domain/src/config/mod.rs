mod observability;
mod session_tracking;
mod storage;

pub use observability::*;
pub use session_tracking::*;
pub use storage::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub session_tracking: SessionTrackingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let tracking = &self.session_tracking;

        if tracking.inactivity_timeout_ms == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "session_tracking.inactivity_timeout_ms".into(),
                message: "must be greater than 0 (every activity would rotate the session)".into(),
            });
        }

        if tracking.absolute_lifetime_ms == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "session_tracking.absolute_lifetime_ms".into(),
                message: "must be greater than 0".into(),
            });
        }

        // A lifetime shorter than the idle window makes the idle rule dead.
        if tracking.absolute_lifetime_ms < tracking.inactivity_timeout_ms {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "session_tracking.absolute_lifetime_ms".into(),
                message: "shorter than inactivity_timeout_ms; sessions will always expire by age".into(),
            });
        }

        if let Some(seed) = &tracking.session {
            if seed.usable_id().is_none() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: "session_tracking.session.id".into(),
                    message: "seed session has no id and will be ignored".into(),
                });
            }
        }

        if tracking.persistent && self.storage.state_path.as_os_str().is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "storage.state_path".into(),
                message: "state_path must not be empty when session_tracking.persistent is set".into(),
            });
        }

        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "observability.sample_rate".into(),
                message: "must be between 0.0 and 1.0".into(),
            });
        }

        errors
    }
}
