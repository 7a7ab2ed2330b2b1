//! Core data model and identifier generators for the IM gateway.
//!
//! This crate has no I/O and no async runtime dependency: it is the shared
//! vocabulary (`MsgType`, `C2CMessage`, `RetryEntry`, presence value types)
//! and the three identifier generators (`Snowflake`, `chat_id`,
//! `uuid_to_bytes`/`bytes_to_uuid`) that every other `imgate-*` crate builds
//! on.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod ids;
pub mod model;
pub mod msg;

pub use error::{CoreError, CoreResult};
pub use ids::{ParsedId, Snowflake, bytes_to_uuid, chat_id, uuid_to_bytes};
pub use model::{
    AckRecord, AckStatus, C2CMessage, ClusterEvent, ClusterEventType, Presence, PresenceStatus,
    RetryEntry,
};
pub use msg::{ImProtoRequest, ImProtoResponse, MsgType, ProtoResponseCode};
