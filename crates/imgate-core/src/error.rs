//! Crate-wide error type for the core data model and identifier generators.

use thiserror::Error;

/// Errors produced while building or parsing core domain types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A `C2CSendReq` or similar payload failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The id generator's sequence space was exhausted and the spin-wait
    /// bound was exceeded (clock moved backwards by more than the bound).
    #[error("clock regression exceeded spin-wait bound: {0}ms")]
    ClockRegression(u64),

    /// A message envelope could not be decoded.
    #[error("malformed envelope: {0}")]
    Malformed(String),
}

/// Result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
