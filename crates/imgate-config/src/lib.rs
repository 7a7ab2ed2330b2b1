//! Configuration types, YAML loading and hot-reload for the IM gateway.
//!
//! Mirrors every key in the gateway's external configuration table as a
//! typed `serde` struct tree with per-field defaults, the way
//! `astrid_gateway::config` does for its own settings. [`ConfigWatcher`]
//! adds filesystem hot-reload: it watches the config file's parent
//! directory and republishes a freshly validated [`ImGateConfig`] over a
//! `tokio::sync::watch` channel on every change, discarding updates that
//! fail [`validate`].

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod loader;
mod types;
mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigWatcher;
pub use types::{
    AuthConfig, FlowControlConfig, ImGateConfig, NettyConfig, RetryConfig, SecurityConfig,
    ServerConfig, SessionLimits, StorageBackend, StorageConfig,
};
pub use validate::validate;
