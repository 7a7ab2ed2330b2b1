//! Dispatcher error types.

use thiserror::Error;

/// Errors from strategy execution.
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// No strategy is registered for the parsed message type.
    #[error("no strategy registered for msg_type {0}")]
    UnroutableType(u32),

    /// A strategy rejected the request as malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Result alias for dispatcher operations.
pub type DispatcherResult<T> = Result<T, DispatcherError>;
