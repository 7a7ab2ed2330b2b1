//! The client duplex transport: a WebSocket connection adapted to
//! [`imgate_session::SessionTransport`].
//!
//! Framing, accept, and the handshake live here; everything past the
//! session-table/dispatcher boundary is transport-agnostic.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::SinkExt;
use imgate_session::SessionTransport;
use tokio::sync::Mutex;

/// Wraps the sender half of a split [`WebSocket`] as a [`SessionTransport`].
///
/// The receive half is driven directly by the accept loop (see
/// `app.rs`), which feeds frames into the dispatcher; only the send path
/// needs to be shared with the liveness controller and the delivery
/// router, hence this wrapper covers only the sender half.
pub struct WsTransport {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    closed: AtomicBool,
}

impl WsTransport {
    /// Wrap the sender half of a WebSocket connection.
    #[must_use]
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self { sink: Mutex::new(sink), closed: AtomicBool::new(false) }
    }
}

#[async_trait]
impl SessionTransport for WsTransport {
    async fn send(&self, frame: Vec<u8>) -> Result<(), String> {
        if self.closed.load(Ordering::SeqCst) {
            return Err("transport closed".to_string());
        }
        let mut sink = self.sink.lock().await;
        sink.send(Message::Binary(frame)).await.map_err(|e| e.to_string())
    }

    async fn ping(&self) -> Result<(), String> {
        if self.closed.load(Ordering::SeqCst) {
            return Err("transport closed".to_string());
        }
        let mut sink = self.sink.lock().await;
        sink.send(Message::Ping(Vec::new())).await.map_err(|e| e.to_string())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut sink = self.sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;
    }
}
