//! The authoritative in-process map of logged-in users to their live
//! sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{SessionError, SessionResult};
use crate::session::Session;

/// Default per-user concurrent session cap.
pub const DEFAULT_MAX_SESSIONS_PER_USER: usize = 5;

/// Cadence of the closed-session sweep.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

struct Counters {
    current_sessions: AtomicU64,
    peak_sessions: AtomicU64,
    total_accepted: AtomicU64,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            current_sessions: AtomicU64::new(0),
            peak_sessions: AtomicU64::new(0),
            total_accepted: AtomicU64::new(0),
        }
    }
}

/// Point-in-time counter snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Sessions currently held across all users.
    pub current_sessions: u64,
    /// High-water mark of `current_sessions`.
    pub peak_sessions: u64,
    /// Total sessions ever accepted (including since-evicted/closed ones).
    pub total_accepted: u64,
}

struct Inner {
    by_user: HashMap<String, HashMap<String, Arc<Session>>>,
    by_session: HashMap<String, String>,
}

/// Two-level session map: `user_id -> {session_id -> Session}` plus a
/// reverse `session_id -> user_id` index, guarded by a single
/// reader/writer lock. Counters are atomics read without the lock.
pub struct SessionTable {
    inner: RwLock<Inner>,
    counters: Counters,
    max_sessions_per_user: usize,
    max_total_sessions: u64,
}

impl SessionTable {
    /// Build an empty table.
    #[must_use]
    pub fn new(max_sessions_per_user: usize, max_total_sessions: u64) -> Self {
        Self {
            inner: RwLock::new(Inner { by_user: HashMap::new(), by_session: HashMap::new() }),
            counters: Counters::default(),
            max_sessions_per_user,
            max_total_sessions,
        }
    }

    /// Current counter snapshot.
    #[must_use]
    pub fn counters(&self) -> CounterSnapshot {
        CounterSnapshot {
            current_sessions: self.counters.current_sessions.load(Ordering::SeqCst),
            peak_sessions: self.counters.peak_sessions.load(Ordering::SeqCst),
            total_accepted: self.counters.total_accepted.load(Ordering::SeqCst),
        }
    }

    /// Register `session` for `user_id`.
    ///
    /// Rejects with [`SessionError::CapacityExhausted`] when the table is
    /// globally full. Otherwise, if the user already holds the configured
    /// maximum on this node, evicts the session with the oldest
    /// `connect_time` (closing its transport) before inserting the new
    /// one.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::CapacityExhausted`] if
    /// `current_sessions >= max_total_sessions`.
    pub async fn add(&self, user_id: &str, session: Arc<Session>) -> SessionResult<()> {
        if self.counters.current_sessions.load(Ordering::SeqCst) >= self.max_total_sessions {
            return Err(SessionError::CapacityExhausted);
        }

        let mut evicted = None;
        {
            let mut inner = self.inner.write().await;
            let user_sessions = inner.by_user.entry(user_id.to_string()).or_default();

            if user_sessions.len() >= self.max_sessions_per_user {
                if let Some(oldest_id) = user_sessions
                    .values()
                    .min_by_key(|s| s.connect_time)
                    .map(|s| s.session_id.clone())
                {
                    if let Some(old) = user_sessions.remove(&oldest_id) {
                        inner.by_session.remove(&oldest_id);
                        evicted = Some(old);
                    }
                }
            } else {
                self.counters.current_sessions.fetch_add(1, Ordering::SeqCst);
            }

            user_sessions.insert(session.session_id.clone(), Arc::clone(&session));
            inner.by_session.insert(session.session_id.clone(), user_id.to_string());
        }

        self.counters.total_accepted.fetch_add(1, Ordering::SeqCst);
        self.bump_peak();

        if let Some(old) = evicted {
            info!(
                user_id,
                session_id = %old.session_id,
                "evicting oldest session to honor per-user session cap"
            );
            old.close().await;
        }

        Ok(())
    }

    fn bump_peak(&self) {
        let current = self.counters.current_sessions.load(Ordering::SeqCst);
        let mut peak = self.counters.peak_sessions.load(Ordering::SeqCst);
        while current > peak {
            match self.counters.peak_sessions.compare_exchange_weak(
                peak,
                current,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(observed) => peak = observed,
            }
        }
    }

    /// Remove `session_id` from the table. Idempotent: removing an
    /// already-absent session is a no-op.
    pub async fn remove(&self, user_id: &str, session_id: &str) {
        let removed = {
            let mut inner = self.inner.write().await;
            let removed = inner
                .by_user
                .get_mut(user_id)
                .and_then(|sessions| sessions.remove(session_id))
                .is_some();
            inner.by_session.remove(session_id);
            if let Some(sessions) = inner.by_user.get(user_id) {
                if sessions.is_empty() {
                    inner.by_user.remove(user_id);
                }
            }
            removed
        };
        if removed {
            self.counters.current_sessions.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Active (not transport-reported-closed) sessions for `user_id`.
    pub async fn sessions_of(&self, user_id: &str) -> Vec<Arc<Session>> {
        let inner = self.inner.read().await;
        inner
            .by_user
            .get(user_id)
            .map(|sessions| sessions.values().filter(|s| !s.is_closed()).cloned().collect())
            .unwrap_or_default()
    }

    /// All tracked user ids, for the liveness controller's snapshot tick.
    pub async fn all_user_ids(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        inner.by_user.keys().cloned().collect()
    }

    /// True iff at least one active session exists for `user_id` on this
    /// node.
    pub async fn is_online_local(&self, user_id: &str) -> bool {
        !self.sessions_of(user_id).await.is_empty()
    }

    /// Send `bytes` to every active session of `user_id`, continuing past
    /// individual failures. Returns `(sent_count, last_err)`.
    pub async fn broadcast_to_user(
        &self,
        user_id: &str,
        bytes: &[u8],
    ) -> (usize, Option<String>) {
        let sessions = self.sessions_of(user_id).await;
        let mut sent = 0;
        let mut last_err = None;
        for session in sessions {
            match session.send(bytes.to_vec()).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!(user_id, session_id = %session.session_id, error = %e, "broadcast send failed");
                    last_err = Some(e);
                }
            }
        }
        (sent, last_err)
    }

    /// Remove `user_id` entirely and return whatever sessions remained, for
    /// a caller that wants to force-close on heartbeat failure or shutdown.
    pub async fn take_all(&self, user_id: &str) -> Vec<Arc<Session>> {
        let taken = {
            let mut inner = self.inner.write().await;
            inner.by_user.remove(user_id).unwrap_or_default()
        };
        let count = taken.len();
        if count > 0 {
            self.counters.current_sessions.fetch_sub(count as u64, Ordering::SeqCst);
            let mut inner = self.inner.write().await;
            for session_id in taken.keys() {
                inner.by_session.remove(session_id);
            }
        }
        taken.into_values().collect()
    }

    /// Walk every session and remove any whose transport reports closed.
    /// Runs without holding the structural lock during transport I/O —
    /// `is_closed` is a non-blocking accessor, not an I/O call, so this is
    /// safe to do while iterating, but the actual removal still takes the
    /// write lock only briefly per stale entry.
    pub async fn sweep_closed(&self) -> usize {
        let stale: Vec<(String, String)> = {
            let inner = self.inner.read().await;
            inner
                .by_user
                .iter()
                .flat_map(|(user_id, sessions)| {
                    sessions.values().filter(|s| s.is_closed()).map(move |s| {
                        (user_id.clone(), s.session_id.clone())
                    })
                })
                .collect()
        };
        for (user_id, session_id) in &stale {
            self.remove(user_id, session_id).await;
        }
        if !stale.is_empty() {
            debug!(count = stale.len(), "swept closed sessions");
        }
        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::SessionTransport;
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

    fn new_session(id: &str, user: &str) -> Arc<Session> {
        Arc::new(Session::new(
            id.to_string(),
            user.to_string(),
            "127.0.0.1:1".to_string(),
            Arc::new(FakeTransport { closed: AtomicBool::new(false) }),
        ))
    }

    #[tokio::test]
    async fn add_and_remove_keep_counters_consistent() {
        let table = SessionTable::new(5, 100);
        table.add("u1", new_session("s1", "u1")).await.unwrap();
        table.add("u1", new_session("s2", "u1")).await.unwrap();
        assert_eq!(table.counters().current_sessions, 2);

        table.remove("u1", "s1").await;
        assert_eq!(table.counters().current_sessions, 1);
        assert!(table.is_online_local("u1").await);

        table.remove("u1", "s2").await;
        assert_eq!(table.counters().current_sessions, 0);
        assert!(!table.is_online_local("u1").await);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let table = SessionTable::new(5, 100);
        table.add("u1", new_session("s1", "u1")).await.unwrap();
        table.remove("u1", "s1").await;
        table.remove("u1", "s1").await;
        assert_eq!(table.counters().current_sessions, 0);
    }

    #[tokio::test]
    async fn exceeding_per_user_cap_evicts_oldest() {
        let table = SessionTable::new(2, 100);
        table.add("u1", new_session("s1", "u1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        table.add("u1", new_session("s2", "u1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        table.add("u1", new_session("s3", "u1")).await.unwrap();

        let sessions = table.sessions_of("u1").await;
        let ids: Vec<_> = sessions.iter().map(|s| s.session_id.clone()).collect();
        assert_eq!(ids.len(), 2);
        assert!(!ids.contains(&"s1".to_string()));
        assert_eq!(table.counters().current_sessions, 2);
    }

    #[tokio::test]
    async fn global_capacity_is_enforced_before_admission() {
        let table = SessionTable::new(5, 1);
        table.add("u1", new_session("s1", "u1")).await.unwrap();
        let err = table.add("u2", new_session("s2", "u2")).await.unwrap_err();
        assert_eq!(err, SessionError::CapacityExhausted);
    }

    #[tokio::test]
    async fn sweep_closed_removes_stale_transports() {
        let table = SessionTable::new(5, 100);
        let s1 = new_session("s1", "u1");
        table.add("u1", Arc::clone(&s1)).await.unwrap();
        s1.close().await;

        let removed = table.sweep_closed().await;
        assert_eq!(removed, 1);
        assert_eq!(table.counters().current_sessions, 0);
    }

    #[tokio::test]
    async fn broadcast_reports_sent_count() {
        let table = SessionTable::new(5, 100);
        table.add("u1", new_session("s1", "u1")).await.unwrap();
        table.add("u1", new_session("s2", "u1")).await.unwrap();

        let (sent, err) = table.broadcast_to_user("u1", b"hi").await;
        assert_eq!(sent, 2);
        assert!(err.is_none());
    }
}
