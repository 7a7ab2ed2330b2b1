//! A single live duplex connection attached to an authenticated user.

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;

use crate::transport::SessionTransport;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// A live, authenticated duplex connection.
///
/// `send_mutex` serializes writes on the underlying transport — the
/// transport's write API is not assumed reentrant. `last_activity_time` and
/// `probe_failure_count` are atomics so the liveness controller can tick
/// against a snapshot of sessions without taking any lock shared with the
/// dispatcher's hot path.
pub struct Session {
    /// Opaque, unique-per-node session identifier.
    pub session_id: String,
    /// The authenticated user this session belongs to.
    pub user_id: String,
    /// Textual remote address, for logging/diagnostics.
    pub remote_addr: String,
    /// When this session was accepted, ms since Unix epoch.
    pub connect_time: i64,
    last_activity_time: AtomicI64,
    probe_failure_count: AtomicU32,
    transport: Arc<dyn SessionTransport>,
    send_mutex: Mutex<()>,
}

impl Session {
    /// Construct a new session wrapping `transport`, with `last_activity_time`
    /// and `connect_time` set to now.
    #[must_use]
    pub fn new(
        session_id: String,
        user_id: String,
        remote_addr: String,
        transport: Arc<dyn SessionTransport>,
    ) -> Self {
        let now = now_ms();
        Self {
            session_id,
            user_id,
            remote_addr,
            connect_time: now,
            last_activity_time: AtomicI64::new(now),
            probe_failure_count: AtomicU32::new(0),
            transport,
            send_mutex: Mutex::new(()),
        }
    }

    /// Record inbound activity: any frame, including heartbeats, resets
    /// the idle clock and clears accumulated probe failures. This is the
    /// false-timeout suppression the liveness controller depends on.
    pub fn record_activity(&self) {
        self.last_activity_time.store(now_ms(), Ordering::SeqCst);
        self.probe_failure_count.store(0, Ordering::SeqCst);
    }

    /// Milliseconds since the last recorded activity.
    #[must_use]
    pub fn idle_ms(&self) -> i64 {
        (now_ms() - self.last_activity_time.load(Ordering::SeqCst)).max(0)
    }

    /// Current consecutive probe-failure count.
    #[must_use]
    pub fn probe_failure_count(&self) -> u32 {
        self.probe_failure_count.load(Ordering::SeqCst)
    }

    /// Increment the probe-failure count, returning the new value.
    pub fn incr_probe_failure(&self) -> u32 {
        self.probe_failure_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Reset the probe-failure count to zero.
    pub fn reset_probe_failure(&self) {
        self.probe_failure_count.store(0, Ordering::SeqCst);
    }

    /// Whether the underlying transport reports closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }

    /// Send one frame, serialized against any concurrent send on this
    /// session.
    ///
    /// # Errors
    ///
    /// Propagates the transport's send error.
    pub async fn send(&self, frame: Vec<u8>) -> Result<(), String> {
        let _guard = self.send_mutex.lock().await;
        self.transport.send(frame).await
    }

    /// Send a ping frame, serialized against any concurrent send.
    ///
    /// # Errors
    ///
    /// Propagates the transport's send error.
    pub async fn ping(&self) -> Result<(), String> {
        let _guard = self.send_mutex.lock().await;
        self.transport.ping().await
    }

    /// Tear down the underlying transport. Idempotent.
    pub async fn close(&self) {
        self.transport.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct FakeTransport {
        closed: AtomicBool,
    }

    #[async_trait::async_trait]
    impl SessionTransport for FakeTransport {
        async fn send(&self, _frame: Vec<u8>) -> Result<(), String> {
            Ok(())
        }
        async fn ping(&self) -> Result<(), String> {
            Ok(())
        }
        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn session() -> Session {
        Session::new(
            "s1".to_string(),
            "u1".to_string(),
            "127.0.0.1:1".to_string(),
            Arc::new(FakeTransport { closed: AtomicBool::new(false) }),
        )
    }

    #[tokio::test]
    async fn activity_resets_probe_failures() {
        let s = session();
        s.incr_probe_failure();
        s.incr_probe_failure();
        assert_eq!(s.probe_failure_count(), 2);
        s.record_activity();
        assert_eq!(s.probe_failure_count(), 0);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let s = session();
        s.close().await;
        s.close().await;
        assert!(s.is_closed());
    }
}
