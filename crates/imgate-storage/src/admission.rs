//! Admission counters: per-IP/global connection limits and per-IP flow
//! control, backed by the shared KV store.

use std::sync::Arc;
use std::time::Duration;

use crate::error::StorageResult;
use crate::kv::KvStore;

const GLOBAL_COUNT_KEY: &str = "im:limit:global:count";
const RATE_WINDOW: Duration = Duration::from_secs(60);
const FLOW_WINDOW: Duration = Duration::from_secs(1);

fn conn_key(ip: &str) -> String {
    format!("im:limit:conn:{ip}")
}

fn rate_key(ip: &str) -> String {
    format!("im:limit:rate:{ip}")
}

fn blocked_key(ip: &str) -> String {
    format!("im:limit:blocked:{ip}")
}

fn flow_msg_key(ip: &str) -> String {
    format!("im:flow:msg:{ip}")
}

fn flow_byte_key(ip: &str) -> String {
    format!("im:flow:byte:{ip}")
}

fn throttled_key(ip: &str) -> String {
    format!("im:flow:throttled:{ip}")
}

/// Adapter over the connection-limit and flow-control counters used by
/// admission control.
///
/// Every counter here is advisory to the caller: a storage failure is
/// returned as `Err` and it is the caller's policy (per the "open on
/// storage failure, except the hard message-size cap" rule) whether to
/// admit or reject when counters can't be read.
pub struct AdmissionCounters {
    kv: Arc<dyn KvStore>,
}

impl AdmissionCounters {
    /// Build admission counters over the given KV backend.
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Increment and return the per-IP concurrent connection count.
    pub async fn incr_conn(&self, ip: &str) -> StorageResult<i64> {
        self.kv.incr(&conn_key(ip)).await
    }

    /// Decrement the per-IP concurrent connection count on disconnect.
    pub async fn decr_conn(&self, ip: &str) -> StorageResult<i64> {
        self.kv.decr(&conn_key(ip)).await
    }

    /// Increment and return the global concurrent connection count.
    pub async fn incr_global(&self) -> StorageResult<i64> {
        self.kv.incr(GLOBAL_COUNT_KEY).await
    }

    /// Decrement the global concurrent connection count on disconnect.
    pub async fn decr_global(&self) -> StorageResult<i64> {
        self.kv.decr(GLOBAL_COUNT_KEY).await
    }

    /// Increment and return the per-IP new-connection count in the
    /// trailing one-minute window.
    pub async fn incr_new_conn_rate(&self, ip: &str) -> StorageResult<i64> {
        self.kv.incr_with_ttl(&rate_key(ip), RATE_WINDOW).await
    }

    /// Whether the IP currently carries a block marker.
    pub async fn is_blocked(&self, ip: &str) -> StorageResult<bool> {
        self.kv.exists(&blocked_key(ip)).await
    }

    /// Set a block marker for `ttl`, or permanently if `ttl` is `None`.
    pub async fn block(&self, ip: &str, ttl: Option<Duration>) -> StorageResult<()> {
        self.kv.set(&blocked_key(ip), "1", ttl).await
    }

    /// Increment and return the per-IP message count in the current
    /// one-second flow-control window.
    pub async fn incr_flow_msg(&self, ip: &str) -> StorageResult<i64> {
        self.kv.incr_with_ttl(&flow_msg_key(ip), FLOW_WINDOW).await
    }

    /// Increment and return the per-IP byte count in the current
    /// one-second flow-control window.
    pub async fn incr_flow_bytes(&self, ip: &str, bytes: i64) -> StorageResult<i64> {
        self.kv.incrby_with_ttl(&flow_byte_key(ip), bytes, FLOW_WINDOW).await
    }

    /// Whether the IP is currently throttled.
    pub async fn is_throttled(&self, ip: &str) -> StorageResult<bool> {
        self.kv.exists(&throttled_key(ip)).await
    }

    /// Mark the IP as throttled for `throttle_duration`.
    pub async fn throttle(&self, ip: &str, throttle_duration: Duration) -> StorageResult<()> {
        self.kv
            .set(&throttled_key(ip), "1", Some(throttle_duration))
            .await
    }
}
