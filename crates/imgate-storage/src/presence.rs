//! Presence directory: who is online, and which gateway node holds their
//! local session.

use std::sync::Arc;

use imgate_core::model::Presence;
use tracing::warn;

use crate::error::StorageResult;
use crate::kv::KvStore;

const SERVER_KEY: &str = "userLogin:server";
const STATUS_KEY: &str = "userLogin:status";

/// Adapter over the shared KV presence hashes (`userLogin:server`,
/// `userLogin:status`).
///
/// All methods are soft-fail at the call site, not here: a KV outage is
/// surfaced as `Err` and it is up to the caller (the router, admission
/// control) to decide whether to treat that as "assume offline" or "open
/// the gate". This adapter only ever reports what storage actually said.
pub struct PresenceDirectory {
    kv: Arc<dyn KvStore>,
}

impl PresenceDirectory {
    /// Build a presence directory over the given KV backend.
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Mark a user online and record which `host:port` holds its local
    /// session.
    pub async fn register(&self, user_id: &str, route: &str) -> StorageResult<()> {
        self.kv.hset(STATUS_KEY, user_id, "5").await?;
        self.kv.hset(SERVER_KEY, user_id, route).await?;
        Ok(())
    }

    /// Mark a user offline. The route mapping is left in place: the last
    /// known route is harmless once status reads offline, and clearing it
    /// would race a concurrent reconnect on another node.
    pub async fn clear(&self, user_id: &str) -> StorageResult<()> {
        self.kv.hset(STATUS_KEY, user_id, "0").await?;
        Ok(())
    }

    /// Resolve a user's current presence.
    pub async fn lookup(&self, user_id: &str) -> StorageResult<Presence> {
        let status = self.kv.hget(STATUS_KEY, user_id).await?;
        let route = self.kv.hget(SERVER_KEY, user_id).await?;
        let status = imgate_core::model::PresenceStatus::from_wire(status.as_deref());

        if status != imgate_core::model::PresenceStatus::Online && route.is_some() {
            warn!(user_id, "presence status offline but a stale route entry exists");
        }

        Ok(Presence { status, route })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;
    use imgate_core::model::PresenceStatus;

    #[tokio::test]
    async fn register_then_lookup_reports_online_with_route() {
        let dir = PresenceDirectory::new(Arc::new(MemoryKvStore::new()));
        dir.register("u1", "10.0.0.1:9100").await.unwrap();

        let presence = dir.lookup("u1").await.unwrap();
        assert_eq!(presence.status, PresenceStatus::Online);
        assert_eq!(presence.route.as_deref(), Some("10.0.0.1:9100"));
    }

    #[tokio::test]
    async fn unknown_user_is_absent() {
        let dir = PresenceDirectory::new(Arc::new(MemoryKvStore::new()));
        let presence = dir.lookup("ghost").await.unwrap();
        assert_eq!(presence.status, PresenceStatus::Absent);
        assert_eq!(presence.route, None);
    }

    #[tokio::test]
    async fn clear_flips_status_without_dropping_route() {
        let dir = PresenceDirectory::new(Arc::new(MemoryKvStore::new()));
        dir.register("u1", "10.0.0.1:9100").await.unwrap();
        dir.clear("u1").await.unwrap();

        let presence = dir.lookup("u1").await.unwrap();
        assert_eq!(presence.status, PresenceStatus::Offline);
    }
}
