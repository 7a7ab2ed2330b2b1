//! Session table and liveness controller for the IM gateway.
//!
//! [`table::SessionTable`] is the authoritative in-process map of logged-in
//! users to their live connections; [`liveness::LivenessController`] drives
//! the per-node heartbeat-detection tick over it. Both are transport-agnostic:
//! callers plug in a [`transport::SessionTransport`] implementation for
//! whatever duplex server library terminates client connections.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod liveness;
pub mod session;
pub mod table;
pub mod transport;

pub use error::{SessionError, SessionResult};
pub use liveness::{LivenessConfig, LivenessController};
pub use session::Session;
pub use table::{CounterSnapshot, SessionTable};
pub use transport::SessionTransport;
