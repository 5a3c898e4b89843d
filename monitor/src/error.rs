//! Error types for configuration and shared selection state.

use std::path::PathBuf;

/// Errors raised while building a [`crate::config::MonitorConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("sampling interval must be a positive divisor of 60 minutes, got {0}")]
    InvalidInterval(u16),
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid date {0:?}, expected yyyy-MM-dd")]
    InvalidDate(String),
}

/// Rejected writes to the selection store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("minute {0} is outside the day")]
    OutOfRange(u16),
    #[error("minute {minute} is not a multiple of the {interval} minute interval")]
    Misaligned { minute: u16, interval: u16 },
}
