//! Session table error types.

use thiserror::Error;

/// Errors from session registration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// `current_sessions >= max_total_sessions`; rejected before admission.
    #[error("session capacity exhausted")]
    CapacityExhausted,
}

/// Result alias for session table operations.
pub type SessionResult<T> = Result<T, SessionError>;
