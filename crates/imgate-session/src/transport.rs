//! The boundary to the full-duplex client transport.
//!
//! Transport framing (accepting connections, upgrading to a
//! message-oriented duplex channel, wire-level ping/pong) is explicitly
//! out of scope here; this trait is the narrow contract the session table
//! and liveness controller need from whatever server library terminates
//! the connection.

use async_trait::async_trait;

/// One live, message-oriented duplex connection.
///
/// Implementations must make `send`/`ping` safe to call concurrently with
/// `is_closed`/`close`, since the liveness controller and dispatcher both
/// hold a handle to the same session.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Send one opaque, already-encoded frame.
    ///
    /// # Errors
    ///
    /// Returns an error message on any transport-level send failure.
    async fn send(&self, frame: Vec<u8>) -> Result<(), String>;

    /// Send a protocol-level ping frame, used by the liveness controller
    /// to pre-empt a timeout.
    ///
    /// # Errors
    ///
    /// Returns an error message on any transport-level send failure.
    async fn ping(&self) -> Result<(), String>;

    /// Whether the underlying connection has already been torn down.
    fn is_closed(&self) -> bool;

    /// Tear down the underlying connection. Must be idempotent.
    async fn close(&self);
}
