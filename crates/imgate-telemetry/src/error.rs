//! Telemetry error types.

use thiserror::Error;

/// Errors from setting up logging.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The global subscriber was already set (init called more than once).
    #[error("global tracing subscriber already set")]
    AlreadyInitialized,

    /// The log directive string could not be parsed.
    #[error("invalid log filter directive: {0}")]
    InvalidFilter(String),

    /// The log file target could not be opened.
    #[error("could not open log file at {path}: {source}")]
    LogFile {
        /// The path that failed to open.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Result alias for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
