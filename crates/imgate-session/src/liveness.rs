//! Application-level heartbeat detection: active probing, graceful
//! degradation, and false-timeout suppression.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::table::SessionTable;

/// Default number of consecutive probe failures before a close.
pub const DEFAULT_MAX_FAILURES: u32 = 3;

/// Tuning knobs for the liveness controller, mirroring the gateway's
/// `netty` config section.
#[derive(Debug, Clone, Copy)]
pub struct LivenessConfig {
    /// How often the ticker fires.
    pub idle_check_interval: Duration,
    /// Idle duration past which a user is considered stale.
    pub heartbeat_timeout: Duration,
    /// Consecutive probe failures before closing a user's sessions.
    pub max_failures: u32,
}

impl LivenessConfig {
    /// Build a config, defaulting `idle_check_interval` to
    /// `heartbeat_timeout / 3` when not explicitly overridden.
    #[must_use]
    pub fn new(heartbeat_timeout: Duration, idle_check_interval: Duration, max_failures: u32) -> Self {
        Self { idle_check_interval, heartbeat_timeout, max_failures }
    }
}

/// Drives one periodic liveness tick over a [`SessionTable`].
///
/// Ticks against a snapshot of session handles taken up front each pass —
/// it never holds the table's structural lock while pinging a transport.
pub struct LivenessController {
    table: Arc<SessionTable>,
    config: LivenessConfig,
    shutdown: broadcast::Receiver<()>,
}

impl LivenessController {
    /// Build a controller over `table`, stopping when `shutdown` fires.
    #[must_use]
    pub fn new(table: Arc<SessionTable>, config: LivenessConfig, shutdown: broadcast::Receiver<()>) -> Self {
        Self { table, config, shutdown }
    }

    /// Run the tick loop until shutdown fires. Intended to be spawned as
    /// the node's single liveness timer task.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.idle_check_interval);
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.recv() => {
                    info!("liveness controller shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// Run exactly one tick over every tracked user. Exposed directly for
    /// tests.
    pub async fn tick(&self) {
        let user_ids = self.table.all_user_ids().await;
        for user_id in user_ids {
            self.tick_user(&user_id).await;
        }
    }

    async fn tick_user(&self, user_id: &str) {
        let sessions = self.table.sessions_of(user_id).await;
        if sessions.is_empty() {
            return;
        }

        let max_idle = sessions.iter().map(|s| s.idle_ms()).max().unwrap_or(0);
        let idle = Duration::from_millis(max_idle.max(0) as u64);

        if idle > self.config.heartbeat_timeout {
            self.handle_stale(user_id, &sessions).await;
        } else if idle > self.config.heartbeat_timeout / 2 {
            for session in &sessions {
                if let Err(e) = session.ping().await {
                    warn!(user_id, error = %e, "pre-emptive ping failed");
                }
            }
        } else {
            for session in &sessions {
                session.reset_probe_failure();
            }
        }
    }

    async fn handle_stale(&self, user_id: &str, sessions: &[Arc<crate::session::Session>]) {
        let failures = sessions.iter().map(|s| s.incr_probe_failure()).max().unwrap_or(0);

        if failures < self.config.max_failures {
            for session in sessions {
                if let Err(e) = session.ping().await {
                    warn!(user_id, error = %e, "liveness probe ping failed");
                }
            }
            return;
        }

        // Re-check once more: a peer that sent data between the idle
        // check above and now must not be killed.
        let still_stale = sessions
            .iter()
            .all(|s| Duration::from_millis(s.idle_ms().max(0) as u64) > self.config.heartbeat_timeout);

        if still_stale {
            info!(user_id, "closing sessions after exhausted liveness probes");
            let taken = self.table.take_all(user_id).await;
            for session in taken {
                session.close().await;
            }
        } else {
            for session in sessions {
                session.reset_probe_failure();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use crate::transport::SessionTransport;
    use std::sync::atomic::{AtomicBool, Ordering};

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

    fn fresh_session(user: &str) -> Arc<Session> {
        Arc::new(Session::new(
            "s1".to_string(),
            user.to_string(),
            "127.0.0.1:1".to_string(),
            Arc::new(FakeTransport { closed: AtomicBool::new(false) }),
        ))
    }

    #[tokio::test]
    async fn fresh_session_resets_probe_failures_on_tick() {
        let table = Arc::new(SessionTable::new(5, 100));
        let session = fresh_session("u1");
        session.incr_probe_failure();
        table.add("u1", session).await.unwrap();

        let (_tx, rx) = broadcast::channel(1);
        let controller = LivenessController::new(
            Arc::clone(&table),
            LivenessConfig::new(Duration::from_secs(60), Duration::from_secs(20), 3),
            rx,
        );
        controller.tick().await;

        let sessions = table.sessions_of("u1").await;
        assert_eq!(sessions[0].probe_failure_count(), 0);
    }

    #[tokio::test]
    async fn stale_session_below_threshold_increments_and_pings() {
        let table = Arc::new(SessionTable::new(5, 100));
        table.add("u1", fresh_session("u1")).await.unwrap();

        let (_tx, rx) = broadcast::channel(1);
        let controller = LivenessController::new(
            Arc::clone(&table),
            LivenessConfig::new(Duration::from_millis(0), Duration::from_secs(20), 3),
            rx,
        );
        controller.tick().await;

        let sessions = table.sessions_of("u1").await;
        assert_eq!(sessions[0].probe_failure_count(), 1);
        assert!(table.is_online_local("u1").await);
    }

    #[tokio::test]
    async fn exhausted_failures_close_session_when_still_stale() {
        let table = Arc::new(SessionTable::new(5, 100));
        let session = fresh_session("u1");
        session.incr_probe_failure();
        session.incr_probe_failure();
        table.add("u1", session).await.unwrap();

        let (_tx, rx) = broadcast::channel(1);
        let controller = LivenessController::new(
            Arc::clone(&table),
            LivenessConfig::new(Duration::from_millis(0), Duration::from_secs(20), 3),
            rx,
        );
        controller.tick().await;

        assert!(!table.is_online_local("u1").await);
    }
}
