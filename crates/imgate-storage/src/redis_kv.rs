//! Redis-backed [`KvStore`], used when the gateway is deployed across more
//! than one process and presence/admission/retry state must be shared.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::{StorageError, StorageResult};
use crate::kv::KvStore;

/// A [`KvStore`] backed by a shared Redis instance.
///
/// Holds a `ConnectionManager`, which reconnects and pipelines internally;
/// callers never see a dead connection, only propagated command errors.
pub struct RedisKvStore {
    conn: ConnectionManager,
}

impl RedisKvStore {
    /// Connect to `redis_url` (e.g. `redis://127.0.0.1:6379/0`).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] if the initial connection fails.
    pub async fn connect(redis_url: &str) -> StorageResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Self { conn })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.conn()
            .get(key)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StorageResult<()> {
        let mut conn = self.conn();
        match ttl {
            Some(ttl) => conn
                .set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
                .await
                .map_err(|e| StorageError::Backend(e.to_string())),
            None => conn
                .set::<_, _, ()>(key, value)
                .await
                .map_err(|e| StorageError::Backend(e.to_string())),
        }
    }

    async fn del(&self, key: &str) -> StorageResult<()> {
        self.conn()
            .del::<_, ()>(key)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.conn()
            .exists(key)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    async fn incr(&self, key: &str) -> StorageResult<i64> {
        self.conn()
            .incr(key, 1)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    async fn decr(&self, key: &str) -> StorageResult<i64> {
        self.conn()
            .incr(key, -1)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> StorageResult<i64> {
        let mut conn = self.conn();
        let count: i64 = conn
            .incr(key, 1)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        conn.expire::<_, ()>(key, ttl.as_secs().max(1) as i64)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(count)
    }

    async fn incrby_with_ttl(&self, key: &str, amount: i64, ttl: Duration) -> StorageResult<i64> {
        let mut conn = self.conn();
        let count: i64 = conn
            .incr(key, amount)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        conn.expire::<_, ()>(key, ttl.as_secs().max(1) as i64)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(count)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StorageResult<()> {
        self.conn()
            .expire::<_, ()>(key, ttl.as_secs().max(1) as i64)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> StorageResult<()> {
        self.conn()
            .hset::<_, _, _, ()>(key, field, value)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    async fn hget(&self, key: &str, field: &str) -> StorageResult<Option<String>> {
        self.conn()
            .hget(key, field)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    async fn hdel(&self, key: &str, field: &str) -> StorageResult<()> {
        self.conn()
            .hdel::<_, _, ()>(key, field)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> StorageResult<()> {
        self.conn()
            .zadd::<_, _, _, ()>(key, member, score)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    async fn zrem(&self, key: &str, member: &str) -> StorageResult<()> {
        self.conn()
            .zrem::<_, _, ()>(key, member)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    async fn zrangebyscore(
        &self,
        key: &str,
        min: f64,
        max: f64,
        limit: usize,
    ) -> StorageResult<Vec<String>> {
        self.conn()
            .zrangebyscore_limit(key, min, max, 0, limit as isize)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }
}
