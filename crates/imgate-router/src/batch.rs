//! The `GET_BATCH_MSG_IDS` strategy: a pass-through query against a
//! downstream message-id source, fronted by a short in-memory TTL cache
//! so repeated polls within the cache window skip the round trip.
//!
//! Supplemental feature carried over from the original system's
//! `batch_msg_ids` strategy, not named in the distilled spec's module
//! list. Message persistence itself is out of scope; [`NoopBatchMsgIdSource`]
//! stands in for it until a real downstream is wired in.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use imgate_core::msg::{ImProtoRequest, ImProtoResponse, MsgType, ProtoResponseCode};
use imgate_dispatcher::Strategy;
use imgate_session::Session;
use tokio::sync::Mutex;

use crate::types::{GetBatchMsgIdsReq, PushBatchMsgIdsResp};

/// How long a cached batch-id lookup is served before being refreshed.
const CACHE_TTL: Duration = Duration::from_secs(30);

/// The downstream source of server message ids for a chat. Implementations
/// back this with whatever message-persistence store the deployment uses;
/// it is out of this gateway's scope.
#[async_trait]
pub trait BatchMsgIdSource: Send + Sync {
    /// Fetch recent server message ids for `chat_id`, newest first.
    async fn fetch(&self, chat_id: &str) -> Vec<u64>;
}

/// A source with nothing behind it: always returns an empty batch.
#[derive(Default)]
pub struct NoopBatchMsgIdSource;

#[async_trait]
impl BatchMsgIdSource for NoopBatchMsgIdSource {
    async fn fetch(&self, _chat_id: &str) -> Vec<u64> {
        Vec::new()
    }
}

struct CacheEntry {
    ids: Vec<u64>,
    fetched_at: Instant,
}

/// Delivers `GET_BATCH_MSG_IDS`.
pub struct BatchStrategy {
    source: Arc<dyn BatchMsgIdSource>,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl BatchStrategy {
    /// Build a batch strategy over `source`.
    #[must_use]
    pub fn new(source: Arc<dyn BatchMsgIdSource>) -> Self {
        Self { source, cache: Mutex::new(HashMap::new()) }
    }

    async fn resolve(&self, chat_id: &str) -> Vec<u64> {
        {
            let cache = self.cache.lock().await;
            if let Some(entry) = cache.get(chat_id) {
                if entry.fetched_at.elapsed() < CACHE_TTL {
                    return entry.ids.clone();
                }
            }
        }
        let ids = self.source.fetch(chat_id).await;
        let mut cache = self.cache.lock().await;
        cache.insert(chat_id.to_string(), CacheEntry { ids: ids.clone(), fetched_at: Instant::now() });
        ids
    }
}

#[async_trait]
impl Strategy for BatchStrategy {
    async fn handle(&self, _session: &Arc<Session>, request: ImProtoRequest) -> ImProtoResponse {
        let req: GetBatchMsgIdsReq = match serde_json::from_slice(&request.payload) {
            Ok(r) => r,
            Err(e) => {
                return ImProtoResponse::error(
                    MsgType::PushBatchMsgIds,
                    ProtoResponseCode::InvalidRequest,
                    format!("malformed payload: {e}"),
                );
            }
        };

        if req.chat_id.is_empty() {
            return ImProtoResponse::error(
                MsgType::PushBatchMsgIds,
                ProtoResponseCode::InvalidRequest,
                "chat_id is required",
            );
        }

        let server_msg_ids = self.resolve(&req.chat_id).await;
        let payload = serde_json::to_vec(&PushBatchMsgIdsResp { server_msg_ids }).unwrap_or_default();
        ImProtoResponse::ok(MsgType::PushBatchMsgIds, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        ids: Vec<u64>,
    }

    #[async_trait]
    impl BatchMsgIdSource for CountingSource {
        async fn fetch(&self, _chat_id: &str) -> Vec<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.ids.clone()
        }
    }

    #[tokio::test]
    async fn repeated_lookups_within_ttl_hit_the_cache() {
        let source = Arc::new(CountingSource { calls: AtomicUsize::new(0), ids: vec![1, 2, 3] });
        let strategy = BatchStrategy::new(source.clone());

        let first = strategy.resolve("chat-1").await;
        let second = strategy.resolve("chat-1").await;

        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(second, vec![1, 2, 3]);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_chats_are_cached_independently() {
        let source = Arc::new(CountingSource { calls: AtomicUsize::new(0), ids: vec![9] });
        let strategy = BatchStrategy::new(source.clone());

        strategy.resolve("chat-1").await;
        strategy.resolve("chat-2").await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
