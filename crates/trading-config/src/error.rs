//! Configuration errors.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to load or apply configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid parameters for user {user_id}: {source}")]
    Validation {
        user_id: String,
        #[source]
        source: ValidationError,
    },

    #[error("Duplicate user id: {0}")]
    DuplicateUser(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed condition file {path}: {source}")]
    Conditions {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Structural parameter problems that cannot be corrected to a default.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid ticker {0:?}: expected KRW-XXX or XXX")]
    InvalidTicker(String),

    #[error("{name} must be greater than zero")]
    ZeroPeriod { name: &'static str },

    #[error("{fast_name} ({fast}) must be smaller than {slow_name} ({slow})")]
    PeriodOrder {
        fast_name: &'static str,
        fast: usize,
        slow_name: &'static str,
        slow: usize,
    },

    #[error("User id must not be empty")]
    EmptyUserId,
}
