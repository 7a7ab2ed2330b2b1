//! im-gateway Telemetry — logging and tracing for the IM gateway.
//!
//! This crate provides:
//! - Configurable logging setup with multiple formats
//! - Per-session tracing context for correlation across subsystems
//! - Integration with the `tracing` ecosystem
//!
//! # Example
//!
//! ```rust,no_run
//! use imgate_telemetry::{LogConfig, LogFormat, setup_logging, SessionContext};
//!
//! # fn main() -> Result<(), imgate_telemetry::TelemetryError> {
//! let config = LogConfig::new("info").with_format(LogFormat::Json);
//! setup_logging(&config)?;
//!
//! let mut ctx = SessionContext::new("sess-1");
//! ctx.bind_user("user-42");
//! let _guard = ctx.enter();
//! tracing::info!("session authenticated");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod context;
mod error;
mod logging;

pub use context::{RequestGuard, SessionContext, new_session_id};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
