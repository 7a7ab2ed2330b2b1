//! Scans the shared delay queue and redelivers to locally-connected
//! recipients, escalating delays until the entry is acked or exhausted.
//!
//! Retry is scoped to the node a recipient is locally connected to: a
//! scan that finds the recipient offline here downgrades rather than
//! forwarding to whichever peer node might actually hold them, matching
//! this gateway's retry-is-origin-node-only scope (see `DESIGN.md`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use imgate_core::model::{ClusterEvent, ClusterEventType, RetryEntry};
use imgate_core::msg::{ImProtoResponse, MsgType};
use imgate_session::SessionTable;
use imgate_storage::bus::{self, DurableBus};
use imgate_storage::RetryStore;
use prost::Message as _;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::error::{RetryError, RetryResult};

/// Default redelivery schedule: 5s, 30s, 300s.
pub const DEFAULT_RETRY_DELAYS_SECS: [u64; 3] = [5, 30, 300];

/// Tunables for the retry engine.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of redeliveries before downgrading to offline.
    pub max_retries: u32,
    /// Escalating delay, in seconds, before each retry attempt.
    /// Must have exactly `max_retries` entries.
    pub retry_delays_secs: Vec<u64>,
    /// Maximum number of due entries claimed per scan.
    pub batch_size: usize,
    /// How often the scan loop runs.
    pub scan_interval: Duration,
}

impl RetryConfig {
    /// Validate `retry_delays_secs.len() == max_retries`.
    pub fn validate(&self) -> RetryResult<()> {
        if self.retry_delays_secs.len() as u32 != self.max_retries {
            return Err(RetryError::DelayCountMismatch {
                want: self.max_retries,
                got: self.retry_delays_secs.len(),
            });
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delays_secs: DEFAULT_RETRY_DELAYS_SECS.to_vec(),
            batch_size: 10_000,
            scan_interval: Duration::from_secs(1),
        }
    }
}

/// The retry scan loop.
pub struct RetryEngine {
    store: Arc<RetryStore>,
    sessions: Arc<SessionTable>,
    bus: Arc<dyn DurableBus>,
    config: RetryConfig,
}

impl RetryEngine {
    /// Build a retry engine. Returns an error if `config` is inconsistent.
    pub fn new(
        store: Arc<RetryStore>,
        sessions: Arc<SessionTable>,
        bus: Arc<dyn DurableBus>,
        config: RetryConfig,
    ) -> RetryResult<Self> {
        config.validate()?;
        Ok(Self { store, sessions, bus, config })
    }

    /// Run the scan loop until `shutdown` fires.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.scan_interval);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("retry engine shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// Run one scan pass: claim due entries, group by recipient, attempt
    /// one redelivery per group.
    pub async fn tick(&self) {
        let ready = match self.store.scan_ready(now_ms(), self.config.batch_size).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "retry scan failed");
                return;
            }
        };
        if ready.is_empty() {
            return;
        }

        let mut by_recipient: HashMap<String, Vec<RetryEntry>> = HashMap::new();
        for entry in ready {
            by_recipient.entry(entry.message.to_user.clone()).or_default().push(entry);
        }

        for (to_user, entries) in by_recipient {
            for entry in entries {
                self.process_one(&to_user, entry).await;
            }
        }
    }

    async fn process_one(&self, to_user: &str, entry: RetryEntry) {
        let server_msg_id = entry.message.server_msg_id;

        let Some(mut claimed) = self.claim(server_msg_id).await else {
            // Acked concurrently between the scan and the claim.
            return;
        };

        if claimed.is_exhausted() {
            self.downgrade(&claimed).await;
            return;
        }

        if !self.sessions.is_online_local(to_user).await {
            self.downgrade(&claimed).await;
            return;
        }

        let frame = ImProtoResponse::ok(
            MsgType::C2cMsgPush,
            serde_json::to_vec(&claimed.message).unwrap_or_default(),
        )
        .encode_to_vec();
        let (sent, _err) = self.sessions.broadcast_to_user(to_user, &frame).await;
        if sent == 0 {
            self.downgrade(&claimed).await;
            return;
        }

        claimed.retry_count += 1;
        if claimed.is_exhausted() {
            self.downgrade(&claimed).await;
            return;
        }

        let delay_secs = self
            .config
            .retry_delays_secs
            .get(claimed.retry_count as usize)
            .copied()
            .unwrap_or_else(|| *self.config.retry_delays_secs.last().unwrap_or(&300));
        claimed.next_fire_time_ms = now_ms() + (delay_secs as i64).saturating_mul(1000);

        if let Err(e) = self.store.enqueue(&claimed).await {
            warn!(server_msg_id, error = %e, "failed to reschedule retry entry");
        }
    }

    async fn claim(&self, server_msg_id: u64) -> Option<RetryEntry> {
        match self.store.dequeue_for_processing(server_msg_id).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(server_msg_id, error = %e, "failed to claim retry entry");
                None
            }
        }
    }

    async fn downgrade(&self, entry: &RetryEntry) {
        let server_msg_id = entry.message.server_msg_id;
        if let Err(e) = self.store.remove(server_msg_id).await {
            warn!(server_msg_id, error = %e, "failed to remove exhausted retry entry");
        }
        let event = ClusterEvent {
            cluster_event_type: ClusterEventType::C2cOffline,
            data: serde_json::json!({ "server_msg_id": server_msg_id, "msg_status": 1 }),
        };
        bus::publish_best_effort(self.bus.as_ref(), &server_msg_id.to_string(), &event).await;
        info!(server_msg_id, to_user = %entry.message.to_user, "retry exhausted, downgraded to offline");
    }
}

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}
