//! Admission control: the connection limiter and flow controller
//! consulted on transport accept and on every inbound frame.
//!
//! Both gates are open-on-storage-failure: a counter read/write that
//! fails against the shared KV never rejects a client on its own, except
//! the per-message size cap, which is enforced locally and hard. Limits
//! are read fresh from the config watch channel on every call, so a
//! hot-reloaded config takes effect on the very next connection/frame
//! without restarting the gateway.

use std::sync::Arc;
use std::time::Duration;

use imgate_config::ImGateConfig;
use imgate_storage::AdmissionCounters;
use tokio::sync::watch;
use tracing::warn;

/// Why an accept or a frame was rejected by admission control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionRejection {
    /// The IP carries an explicit or failure-triggered block entry.
    IpBlocked,
    /// Per-IP concurrent connection cap exceeded.
    ConnLimitExceeded,
    /// Per-IP new-connection rate exceeded.
    RateLimitExceeded,
    /// Global concurrent connection cap exceeded.
    GlobalCapExceeded,
    /// The IP is currently throttled after a flow-control violation.
    Throttled,
    /// The message exceeds the hard per-message size cap.
    MessageTooLarge,
}

/// Connection-limiter and flow-controller gate over [`AdmissionCounters`].
pub struct AdmissionControl {
    counters: Arc<AdmissionCounters>,
    config: watch::Receiver<Arc<ImGateConfig>>,
}

impl AdmissionControl {
    /// Build admission control over `counters`, reading limits from
    /// `config` on every call.
    #[must_use]
    pub fn new(counters: Arc<AdmissionCounters>, config: watch::Receiver<Arc<ImGateConfig>>) -> Self {
        Self { counters, config }
    }

    fn current(&self) -> Arc<ImGateConfig> {
        self.config.borrow().clone()
    }

    /// Consult the connection limiter on transport accept. On success,
    /// the per-IP and global counters have already been incremented;
    /// callers must call [`AdmissionControl::release`] on disconnect.
    pub async fn admit_connection(&self, ip: &str) -> Result<(), AdmissionRejection> {
        let config = self.current();

        if config.security.blocked_ips.iter().any(|b| b == ip) {
            return Err(AdmissionRejection::IpBlocked);
        }
        match self.counters.is_blocked(ip).await {
            Ok(true) => return Err(AdmissionRejection::IpBlocked),
            Ok(false) => {}
            Err(e) => warn!(ip, error = %e, "admission block check failed, opening"),
        }

        match self.counters.incr_new_conn_rate(ip).await {
            Ok(count) if count as u32 > config.security.max_new_conn_per_ip_per_min => {
                return Err(AdmissionRejection::RateLimitExceeded);
            }
            Ok(_) => {}
            Err(e) => warn!(ip, error = %e, "new-connection rate check failed, opening"),
        }

        match self.counters.incr_conn(ip).await {
            Ok(count) if count as u32 > config.security.max_conn_per_ip => {
                let _ = self.counters.decr_conn(ip).await;
                return Err(AdmissionRejection::ConnLimitExceeded);
            }
            Ok(_) => {}
            Err(e) => warn!(ip, error = %e, "per-ip connection count check failed, opening"),
        }

        match self.counters.incr_global().await {
            Ok(count) if count as u64 > config.server.max_connections as u64 => {
                let _ = self.counters.decr_global().await;
                let _ = self.counters.decr_conn(ip).await;
                return Err(AdmissionRejection::GlobalCapExceeded);
            }
            Ok(_) => {}
            Err(e) => warn!(ip, error = %e, "global connection count check failed, opening"),
        }

        Ok(())
    }

    /// Release the per-IP and global connection counters on disconnect.
    pub async fn release(&self, ip: &str) {
        if let Err(e) = self.counters.decr_conn(ip).await {
            warn!(ip, error = %e, "failed to release per-ip connection counter");
        }
        if let Err(e) = self.counters.decr_global().await {
            warn!(ip, error = %e, "failed to release global connection counter");
        }
    }

    /// Consult the flow controller for one inbound frame. The hard
    /// message-size cap is checked first and is never overridden by a
    /// storage failure.
    pub async fn admit_frame(&self, ip: &str, frame_len: usize) -> Result<(), AdmissionRejection> {
        let config = self.current();

        if frame_len > config.netty.max_message_size {
            return Err(AdmissionRejection::MessageTooLarge);
        }

        match self.counters.is_throttled(ip).await {
            Ok(true) => return Err(AdmissionRejection::Throttled),
            Ok(false) => {}
            Err(e) => warn!(ip, error = %e, "throttle check failed, opening"),
        }

        let mut violated = false;
        match self.counters.incr_flow_msg(ip).await {
            Ok(count) if count as u32 > config.flow_control.max_messages_per_sec => violated = true,
            Ok(_) => {}
            Err(e) => warn!(ip, error = %e, "message-rate check failed, opening"),
        }
        match self.counters.incr_flow_bytes(ip, frame_len as i64).await {
            Ok(count) if count as u64 > config.flow_control.max_bytes_per_sec => violated = true,
            Ok(_) => {}
            Err(e) => warn!(ip, error = %e, "byte-rate check failed, opening"),
        }

        if violated {
            let duration = Duration::from_secs(config.flow_control.throttle_duration_secs);
            if let Err(e) = self.counters.throttle(ip, duration).await {
                warn!(ip, error = %e, "failed to record throttle marker");
            }
            return Err(AdmissionRejection::Throttled);
        }

        Ok(())
    }
}
