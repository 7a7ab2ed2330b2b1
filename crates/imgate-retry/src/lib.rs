//! Reliable-delivery retry engine: redelivers a message to a
//! claimed-online recipient until it is client-acked or retries are
//! exhausted, escalating delays between attempts.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod engine;
pub mod error;

pub use engine::{RetryConfig, RetryEngine, DEFAULT_RETRY_DELAYS_SECS};
pub use error::{RetryError, RetryResult};
