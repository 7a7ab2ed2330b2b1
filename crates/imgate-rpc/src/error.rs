//! Peer RPC error types.

use thiserror::Error;

/// Errors from a peer-node RPC call.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The channel to the peer could not be established.
    #[error("failed to dial {endpoint}: {source}")]
    Dial {
        /// The `host:port` endpoint that failed to dial.
        endpoint: String,
        /// The underlying transport error.
        #[source]
        source: tonic::transport::Error,
    },

    /// The call completed but the peer returned a gRPC status error.
    #[error("rpc call failed: {0}")]
    Status(#[from] tonic::Status),

    /// The peer responded with a non-success application code.
    #[error("peer returned code {code}: {message}")]
    PeerError {
        /// Application-level response code (200/404/500).
        code: i32,
        /// Peer-provided message.
        message: String,
    },
}

/// Result alias for peer RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;
