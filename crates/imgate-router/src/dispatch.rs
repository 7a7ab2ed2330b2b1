//! The three-way delivery decision shared by message send and ack
//! routing: local fan-out, peer-node RPC forward, or offline bus publish.

use std::sync::Arc;

use imgate_core::model::{ClusterEvent, ClusterEventType, PresenceStatus, RetryEntry};
use imgate_core::msg::MsgType;
use imgate_rpc::RpcClientPool;
use imgate_session::SessionTable;
use imgate_storage::bus::{self, DurableBus};
use imgate_storage::PresenceDirectory;
use tracing::{info, warn};

/// How a delivery attempt was ultimately resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Delivered to at least one local session.
    LocalFanOut,
    /// Forwarded to a peer node, which accepted it.
    PeerForwarded,
    /// Published to the offline bus (absent/offline, or the peer forward
    /// failed and was downgraded).
    OfflinePublished,
}

/// Shared infrastructure the three-way dispatch needs, independent of
/// whether the caller is the send strategy or the ack strategy.
pub struct DispatchContext {
    /// Local session table, for this node's fan-out.
    pub sessions: Arc<SessionTable>,
    /// Shared presence directory.
    pub presence: Arc<PresenceDirectory>,
    /// Pooled peer-node RPC client.
    pub rpc: Arc<RpcClientPool>,
    /// Durable bus for offline persistence / fan-out.
    pub bus: Arc<dyn DurableBus>,
}

/// Resolve presence for `to_user` and deliver `frame_bytes`, deterministic
/// by the tuple `(has_local_session, status, route)` per the delivery
/// router's three-way decision. `offline_event` is published when the
/// recipient is not reachable; `cluster_event_type` tags what kind of
/// event this delivery attempt represents (send vs ack) for callers that
/// also want a bus record of the attempt itself — callers pass `None` to
/// skip that (e.g. the ack path only cares about reaching the sender, not
/// about re-persisting).
pub async fn three_way_dispatch(
    ctx: &DispatchContext,
    to_user: &str,
    frame_bytes: Vec<u8>,
    offline_event: ClusterEvent,
) -> DispatchOutcome {
    let has_local_session = ctx.sessions.is_online_local(to_user).await;
    if has_local_session {
        let (sent, _err) = ctx.sessions.broadcast_to_user(to_user, &frame_bytes).await;
        if sent > 0 {
            return DispatchOutcome::LocalFanOut;
        }
    }

    let presence = match ctx.presence.lookup(to_user).await {
        Ok(p) => p,
        Err(e) => {
            warn!(to_user, error = %e, "presence lookup failed, treating as offline");
            bus::publish_best_effort(ctx.bus.as_ref(), to_user, &offline_event).await;
            return DispatchOutcome::OfflinePublished;
        }
    };

    match (presence.status, presence.route.as_deref()) {
        (PresenceStatus::Online, Some(route)) if !has_local_session => {
            let rpc_request = imgate_rpc::generated::ImProtoRequest {
                r#type: MsgType::C2cMsgPush as u32,
                payload: frame_bytes.clone(),
            };
            match ctx.rpc.transfer_c2c_msg(route, rpc_request).await {
                Ok(resp) if resp.code == 200 => DispatchOutcome::PeerForwarded,
                Ok(resp) => {
                    info!(to_user, route, code = resp.code, "peer forward rejected, downgrading to offline");
                    bus::publish_best_effort(ctx.bus.as_ref(), to_user, &offline_event).await;
                    DispatchOutcome::OfflinePublished
                }
                Err(e) => {
                    warn!(to_user, route, error = %e, "peer forward failed, downgrading to offline");
                    bus::publish_best_effort(ctx.bus.as_ref(), to_user, &offline_event).await;
                    DispatchOutcome::OfflinePublished
                }
            }
        }
        _ => {
            bus::publish_best_effort(ctx.bus.as_ref(), to_user, &offline_event).await;
            DispatchOutcome::OfflinePublished
        }
    }
}

/// Build the `C2C_OFF_LINE_MSG`-equivalent offline event for a send.
#[must_use]
pub fn offline_send_event(server_msg_id: u64) -> ClusterEvent {
    ClusterEvent {
        cluster_event_type: ClusterEventType::C2cOffline,
        data: serde_json::json!({ "server_msg_id": server_msg_id, "msg_status": 1 }),
    }
}

/// Build the retry entry scheduled after a successful local fan-out.
#[must_use]
pub fn first_retry_entry(
    message: imgate_core::model::C2CMessage,
    max_retries: u32,
    delay_secs: u64,
) -> RetryEntry {
    let next_fire_time_ms = now_ms() + (delay_secs as i64).saturating_mul(1000);
    RetryEntry::first(message, max_retries, next_fire_time_ms)
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use imgate_session::{Session, SessionTransport};
    use imgate_storage::{MemoryKvStore, NoopBus, PresenceDirectory};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeTransport {
        closed: AtomicBool,
    }

    #[async_trait]
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

    fn test_ctx() -> DispatchContext {
        DispatchContext {
            sessions: Arc::new(SessionTable::new(5, 100)),
            presence: Arc::new(PresenceDirectory::new(Arc::new(MemoryKvStore::new()))),
            rpc: Arc::new(RpcClientPool::new()),
            bus: Arc::new(NoopBus),
        }
    }

    fn sample_event() -> ClusterEvent {
        offline_send_event(1)
    }

    #[tokio::test]
    async fn online_local_recipient_gets_local_fan_out() {
        let ctx = test_ctx();
        let transport = Arc::new(FakeTransport { closed: AtomicBool::new(false) });
        let session = Arc::new(Session::new("s1".into(), "bob".into(), "1.2.3.4".into(), transport));
        ctx.sessions.add("bob", session).await.unwrap();

        let outcome = three_way_dispatch(&ctx, "bob", b"frame".to_vec(), sample_event()).await;
        assert_eq!(outcome, DispatchOutcome::LocalFanOut);
    }

    #[tokio::test]
    async fn absent_presence_publishes_offline() {
        let ctx = test_ctx();
        let outcome = three_way_dispatch(&ctx, "nobody", b"frame".to_vec(), sample_event()).await;
        assert_eq!(outcome, DispatchOutcome::OfflinePublished);
    }
}
