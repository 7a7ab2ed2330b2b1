//! Message parsing, type-routed strategy dispatch and the bounded worker
//! pool for the IM gateway.
//!
//! [`MessageDispatcher`] is the transport-facing entry point:
//! `accept_frame` never blocks and never performs strategy I/O itself — it
//! hands off to one of `worker_count` long-lived workers, each pulling
//! from its own bounded channel. The dispatcher never mutates the session
//! table and never touches a session other than the one a frame arrived
//! on; routed work (the three-way delivery decision, retry bookkeeping)
//! lives in the strategies it calls into.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod dispatcher;
pub mod error;
pub mod pool;
pub mod strategy;

pub use dispatcher::{DispatcherCounters, MessageDispatcher, DEFAULT_QUEUE_CAPACITY, STALE_AFTER};
pub use error::{DispatcherError, DispatcherResult};
pub use pool::{Task, TaskPool};
pub use strategy::{Strategy, StrategyRegistry};
