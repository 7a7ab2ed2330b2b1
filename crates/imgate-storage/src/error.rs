//! Storage error types.

use thiserror::Error;

/// Errors from the shared KV store, presence directory, retry store, or
/// durable bus.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend connection failed or a round-trip errored.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A value stored under a key could not be deserialized into the
    /// expected shape.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The durable bus producer failed to publish.
    #[error("bus publish error: {0}")]
    Bus(String),
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
