//! Shared KV, presence directory, retry store, admission counters and
//! durable bus adapters for the IM gateway.
//!
//! The gateway is horizontally scaled: any node may hold a user's local
//! session while any other node accepts a send for that user. Everything
//! in this crate exists to let nodes agree on presence, retry schedules
//! and connection limits through a shared backend rather than through
//! direct node-to-node state sharing. [`kv::KvStore`] is the single
//! abstraction underneath all of it; [`kv::MemoryKvStore`] backs tests and
//! single-node runs, [`redis_kv::RedisKvStore`] (feature `redis-backend`)
//! backs real deployments.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod admission;
pub mod bus;
pub mod error;
pub mod kv;
pub mod presence;
pub mod retry_store;

#[cfg(feature = "redis-backend")]
pub mod redis_kv;

pub use admission::AdmissionCounters;
pub use bus::{DurableBus, NoopBus};
pub use error::{StorageError, StorageResult};
pub use kv::{KvStore, MemoryKvStore};
pub use presence::PresenceDirectory;
pub use retry_store::RetryStore;

#[cfg(feature = "redis-backend")]
pub use redis_kv::RedisKvStore;

#[cfg(feature = "kafka-backend")]
pub use bus::KafkaBus;
