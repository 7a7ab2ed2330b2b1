//! Convenience re-exports.

pub use crate::context::{RequestGuard, SessionContext, new_session_id};
pub use crate::error::{TelemetryError, TelemetryResult};
pub use crate::logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
