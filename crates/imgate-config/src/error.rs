//! Configuration error types.

use thiserror::Error;

/// Errors from loading, parsing, or validating the gateway configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("could not read config file {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The YAML document failed to parse.
    #[error("invalid config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A cross-field invariant was violated.
    #[error("config validation failed: {0}")]
    Invalid(String),

    /// The filesystem watcher could not be started.
    #[error("could not start config watcher: {0}")]
    Watch(String),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
