//! Peer-node RPC client and server for the IM gateway.
//!
//! `MessageService` is the cross-node forwarding surface: when a send's
//! recipient is online on a different node, the origin node calls
//! [`client::RpcClientPool`] instead of publishing to the offline bus.
//! [`server::MessageServiceImpl`] is the corresponding inbound handler,
//! wired to local session fan-out by whatever constructs it.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Generated protobuf/tonic bindings for `MessageService`.
///
/// Populated by `build.rs` from `protos/message_service.proto` at build
/// time; nothing here is hand-written.
#[allow(missing_docs, clippy::all, unreachable_pub)]
pub mod generated {
    include!(concat!(env!("CARGO_MANIFEST_DIR"), "/src/generated/imgate.rpc.rs"));
}

pub mod client;
pub mod error;
pub mod server;

pub use client::{RpcClientPool, DEFAULT_DEADLINE};
pub use error::{RpcError, RpcResult};
pub use server::{LocalFanOut, MessageServiceImpl};
