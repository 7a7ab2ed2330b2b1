//! Gateway daemon errors.

use thiserror::Error;

/// Errors surfaced from gateway startup and the daemon's top-level
/// operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration failed to load or validate.
    #[error("configuration error: {0}")]
    Config(#[from] imgate_config::ConfigError),

    /// The retry engine's configuration was inconsistent.
    #[error("retry engine error: {0}")]
    Retry(#[from] imgate_retry::RetryError),

    /// The id generator rejected its configured datacenter/machine ids.
    #[error("id generator error: {0}")]
    Ids(#[from] imgate_core::error::CoreError),

    /// Telemetry setup failed.
    #[error("telemetry error: {0}")]
    Telemetry(#[from] imgate_telemetry::TelemetryError),

    /// The accept listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The socket address that failed to bind.
        addr: std::net::SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The accept loop exited with an I/O error after a successful bind.
    #[error("accept loop on {addr} failed: {source}")]
    Serve {
        /// The socket address the accept loop was serving.
        addr: std::net::SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias for gateway startup.
pub type GatewayResult<T> = Result<T, GatewayError>;
