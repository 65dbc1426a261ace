//! Core error types for breakwarden-core.
//!
//! Planning errors (`InvalidDuration`, `InvalidPlan`) are returned to whoever
//! asked for a session and are never auto-corrected. Runtime errors
//! (`ActionNotPermitted`, `StaleEvent`) leave the state machine untouched and
//! are reported to the notifier as diagnostics.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::policy::{Action, Mode, Phase};

/// Core error type for breakwarden-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A countdown or task duration that is zero or negative
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// A scheduling request that cannot produce a break plan
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// A user action outside the allowed set for the current mode and phase
    #[error("Action '{action}' is not permitted in {mode} mode during {phase}{}", reason_suffix(.reason))]
    ActionNotPermitted {
        action: Action,
        mode: Mode,
        phase: Phase,
        reason: Option<String>,
    },

    /// An event tagged with an outdated timer generation or phase epoch
    #[error("Stale {source_name} event: expected {expected}, got {received}")]
    StaleEvent {
        source_name: &'static str,
        expected: u64,
        received: u64,
    },

    /// The session runtime has already shut down
    #[error("Session {0} is no longer running")]
    SessionClosed(uuid::Uuid),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_ref()
        .map(|r| format!(" ({r})"))
        .unwrap_or_default()
}

impl CoreError {
    pub(crate) fn not_permitted(action: Action, mode: Mode, phase: Phase) -> Self {
        CoreError::ActionNotPermitted {
            action,
            mode,
            phase,
            reason: None,
        }
    }

    pub(crate) fn not_permitted_because(
        action: Action,
        mode: Mode,
        phase: Phase,
        reason: impl Into<String>,
    ) -> Self {
        CoreError::ActionNotPermitted {
            action,
            mode,
            phase,
            reason: Some(reason.into()),
        }
    }

    pub(crate) fn non_positive(what: &str, duration: Duration) -> Self {
        CoreError::InvalidDuration(format!("{what} must be positive, got {duration:?}"))
    }

    /// Whether this error is a runtime rejection that leaves state unchanged.
    pub fn is_runtime_rejection(&self) -> bool {
        matches!(
            self,
            CoreError::ActionNotPermitted { .. } | CoreError::StaleEvent { .. }
        )
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Key does not exist in the configuration tree
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// No home/config directory could be resolved
    #[error("Configuration directory unavailable: {0}")]
    NoDataDir(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(err: toml::ser::Error) -> Self {
        ConfigError::ParseFailed(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_permitted_message_names_mode_and_phase() {
        let err = CoreError::not_permitted(Action::Snooze, Mode::Strict, Phase::BreakActive);
        assert_eq!(
            err.to_string(),
            "Action 'snooze' is not permitted in strict mode during break_active"
        );
        assert!(err.is_runtime_rejection());
    }

    #[test]
    fn not_permitted_message_includes_reason() {
        let err = CoreError::not_permitted_because(
            Action::Snooze,
            Mode::Flexible,
            Phase::BreakActive,
            "no snooze passes left",
        );
        assert!(err.to_string().ends_with("(no snooze passes left)"));
    }

    #[test]
    fn planning_errors_are_not_runtime_rejections() {
        assert!(!CoreError::InvalidPlan("x".into()).is_runtime_rejection());
        assert!(!CoreError::non_positive("timer", Duration::ZERO).is_runtime_rejection());
    }
}
