//! Gateway daemon: accept-time auth and admission control, the
//! client-facing WebSocket transport, and the wiring that assembles the
//! session table, dispatcher, delivery router, retry engine and peer RPC
//! server into one running process.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod admission;
pub mod app;
pub mod auth;
pub mod error;
pub mod transport;

pub use admission::{AdmissionControl, AdmissionRejection};
pub use app::{AppState, Gateway};
pub use auth::{AuthError, Authenticator, Claims, Credentials};
pub use error::{GatewayError, GatewayResult};
pub use transport::WsTransport;
