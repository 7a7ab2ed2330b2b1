//! Retry store: the delayed-delivery queue backing the reliable-delivery
//! retry engine (`im:c2c:retry:queue` / `im:c2c:retry:index`).

use std::sync::Arc;

use imgate_core::model::RetryEntry;
use tracing::warn;

use crate::error::StorageResult;
use crate::kv::KvStore;

const QUEUE_KEY: &str = "im:c2c:retry:queue";
const INDEX_KEY: &str = "im:c2c:retry:index";

/// Adapter over the shared KV retry queue: a sorted set of due times plus a
/// hash of serialized entries, keyed by `server_msg_id`.
pub struct RetryStore {
    kv: Arc<dyn KvStore>,
}

impl RetryStore {
    /// Build a retry store over the given KV backend.
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Enqueue (or reschedule) a retry entry.
    pub async fn enqueue(&self, entry: &RetryEntry) -> StorageResult<()> {
        let member = entry.message.server_msg_id.to_string();
        let json = serde_json::to_string(entry)?;
        self.kv.hset(INDEX_KEY, &member, &json).await?;
        self.kv
            .zadd(QUEUE_KEY, &member, entry.next_fire_time_ms as f64)
            .await?;
        Ok(())
    }

    /// Look up an entry by id without removing it.
    pub async fn get(&self, server_msg_id: u64) -> StorageResult<Option<RetryEntry>> {
        let member = server_msg_id.to_string();
        let Some(raw) = self.kv.hget(INDEX_KEY, &member).await? else {
            return Ok(None);
        };
        Ok(serde_json::from_str(&raw).ok())
    }

    /// Remove an entry, e.g. once an ack has been observed or the entry is
    /// exhausted. Removal happens before redelivery is attempted, so a
    /// crash mid-send at worst drops a retry rather than duplicating one.
    pub async fn remove(&self, server_msg_id: u64) -> StorageResult<()> {
        let member = server_msg_id.to_string();
        self.kv.zrem(QUEUE_KEY, &member).await?;
        self.kv.hdel(INDEX_KEY, &member).await?;
        Ok(())
    }

    /// Claim an entry for processing: remove it from the due-time queue
    /// immediately (so a concurrent scan on another node can't double-fire
    /// it), then re-check the index hash. Returns `None` if the hash entry
    /// is already gone — the message was acked concurrently. The hash
    /// entry itself is left in place; the caller re-enqueues (rescheduling)
    /// or calls [`RetryStore::remove`] (downgrading/exhausting) next.
    pub async fn dequeue_for_processing(&self, server_msg_id: u64) -> StorageResult<Option<RetryEntry>> {
        let member = server_msg_id.to_string();
        self.kv.zrem(QUEUE_KEY, &member).await?;
        let Some(raw) = self.kv.hget(INDEX_KEY, &member).await? else {
            return Ok(None);
        };
        Ok(serde_json::from_str(&raw).ok())
    }

    /// Scan for entries due at or before `now_ms`, up to `limit` per call.
    ///
    /// Entries whose index hash value is missing or unparsable are logged
    /// and skipped rather than failing the whole scan — a single corrupt
    /// entry must not stall the retry loop.
    pub async fn scan_ready(&self, now_ms: i64, limit: usize) -> StorageResult<Vec<RetryEntry>> {
        let members = self
            .kv
            .zrangebyscore(QUEUE_KEY, f64::MIN, now_ms as f64, limit)
            .await?;

        let mut entries = Vec::with_capacity(members.len());
        for member in members {
            let Some(raw) = self.kv.hget(INDEX_KEY, &member).await? else {
                warn!(server_msg_id = %member, "retry queue member has no index entry, dropping");
                self.kv.zrem(QUEUE_KEY, &member).await?;
                continue;
            };
            match serde_json::from_str::<RetryEntry>(&raw) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(server_msg_id = %member, error = %e, "corrupt retry entry, dropping");
                    self.kv.zrem(QUEUE_KEY, &member).await?;
                    self.kv.hdel(INDEX_KEY, &member).await?;
                }
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;
    use imgate_core::model::C2CMessage;

    fn sample_entry(server_msg_id: u64, next_fire_time_ms: i64) -> RetryEntry {
        let message = C2CMessage::new(
            "client-1".to_string(),
            server_msg_id,
            "alice".to_string(),
            "bob".to_string(),
            0,
            "hi".to_string(),
            1_700_000_000_000,
        );
        RetryEntry::first(message, 3, next_fire_time_ms)
    }

    #[tokio::test]
    async fn enqueue_then_scan_ready_respects_due_time() {
        let store = RetryStore::new(Arc::new(MemoryKvStore::new()));
        store.enqueue(&sample_entry(1, 1_000)).await.unwrap();
        store.enqueue(&sample_entry(2, 5_000)).await.unwrap();

        let ready = store.scan_ready(2_000, 10).await.unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].message.server_msg_id, 1);
    }

    #[tokio::test]
    async fn remove_drops_from_both_structures() {
        let store = RetryStore::new(Arc::new(MemoryKvStore::new()));
        store.enqueue(&sample_entry(1, 1_000)).await.unwrap();
        store.remove(1).await.unwrap();

        let ready = store.scan_ready(10_000, 10).await.unwrap();
        assert!(ready.is_empty());
    }

    #[tokio::test]
    async fn get_returns_entry_without_removing_it() {
        let store = RetryStore::new(Arc::new(MemoryKvStore::new()));
        store.enqueue(&sample_entry(1, 1_000)).await.unwrap();

        let fetched = store.get(1).await.unwrap().expect("entry present");
        assert_eq!(fetched.message.server_msg_id, 1);

        let ready = store.scan_ready(10_000, 10).await.unwrap();
        assert_eq!(ready.len(), 1);
    }

    #[tokio::test]
    async fn dequeue_for_processing_removes_from_queue_but_keeps_hash() {
        let store = RetryStore::new(Arc::new(MemoryKvStore::new()));
        store.enqueue(&sample_entry(1, 1_000)).await.unwrap();

        let claimed = store.dequeue_for_processing(1).await.unwrap().expect("entry present");
        assert_eq!(claimed.message.server_msg_id, 1);

        // Gone from the due-time queue...
        let ready = store.scan_ready(10_000, 10).await.unwrap();
        assert!(ready.is_empty());
        // ...but the index hash still has it, for the caller to reschedule or delete.
        assert!(store.get(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn dequeue_for_processing_returns_none_if_already_acked() {
        let store = RetryStore::new(Arc::new(MemoryKvStore::new()));
        store.enqueue(&sample_entry(1, 1_000)).await.unwrap();
        store.remove(1).await.unwrap();

        assert!(store.dequeue_for_processing(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scan_ready_respects_limit() {
        let store = RetryStore::new(Arc::new(MemoryKvStore::new()));
        for i in 1..=5u64 {
            store.enqueue(&sample_entry(i, 1_000)).await.unwrap();
        }
        let ready = store.scan_ready(2_000, 2).await.unwrap();
        assert_eq!(ready.len(), 2);
    }
}
