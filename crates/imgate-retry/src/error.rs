//! Retry engine errors.

use thiserror::Error;

/// Configuration errors surfaced at retry engine construction.
#[derive(Debug, Error)]
pub enum RetryError {
    /// `retry_delays.len() != max_retries`.
    #[error("retry_delays has {got} entries, expected max_retries = {want}")]
    DelayCountMismatch {
        /// Configured `max_retries`.
        want: u32,
        /// `retry_delays.len()`.
        got: usize,
    },
}

/// Convenience alias for this crate's fallible returns.
pub type RetryResult<T> = Result<T, RetryError>;
