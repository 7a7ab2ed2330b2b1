//! The shared key-value abstraction every presence/admission/retry adapter
//! is built on, plus an in-process implementation used for tests and as a
//! single-node fallback.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::StorageResult;

/// Required shared-KV operations: `HSET`/`HGET`/`HDEL`; `GET`/`SET`/`DEL`/
/// `EXISTS` with TTL; `INCR`/`DECR` and TTL-preserving
/// `INCR(key) + EXPIRE(key, ttl)`; `ZADD`/`ZREM`/`ZRANGEBYSCORE`.
///
/// All operations are atomic at the single-key level; no multi-key
/// transactions are required by any caller.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch a plain string value.
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Set a plain string value, optionally with a TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StorageResult<()>;

    /// Delete a key (any type).
    async fn del(&self, key: &str) -> StorageResult<()>;

    /// Whether a key currently exists (and has not expired).
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Atomically increment a counter, creating it at 1 if absent.
    async fn incr(&self, key: &str) -> StorageResult<i64>;

    /// Atomically decrement a counter, creating it at -1 if absent.
    async fn decr(&self, key: &str) -> StorageResult<i64>;

    /// Atomically increment a counter and (re)apply a TTL in one round
    /// trip, for sliding-window rate counters.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> StorageResult<i64>;

    /// Atomically increment a counter by `amount` and (re)apply a TTL, for
    /// sliding-window byte counters.
    async fn incrby_with_ttl(&self, key: &str, amount: i64, ttl: Duration) -> StorageResult<i64>;

    /// Set or refresh a key's TTL without changing its value.
    async fn expire(&self, key: &str, ttl: Duration) -> StorageResult<()>;

    /// Set one field of a hash.
    async fn hset(&self, key: &str, field: &str, value: &str) -> StorageResult<()>;

    /// Read one field of a hash.
    async fn hget(&self, key: &str, field: &str) -> StorageResult<Option<String>>;

    /// Delete one field of a hash.
    async fn hdel(&self, key: &str, field: &str) -> StorageResult<()>;

    /// Add a member to a sorted set with the given score, or update its
    /// score if already present.
    async fn zadd(&self, key: &str, member: &str, score: f64) -> StorageResult<()>;

    /// Remove a member from a sorted set.
    async fn zrem(&self, key: &str, member: &str) -> StorageResult<()>;

    /// Return up to `limit` members scored within `[min, max]`, ascending.
    async fn zrangebyscore(
        &self,
        key: &str,
        min: f64,
        max: f64,
        limit: usize,
    ) -> StorageResult<Vec<String>>;
}

#[derive(Default)]
struct MemoryState {
    strings: HashMap<String, String>,
    hashes: HashMap<String, HashMap<String, String>>,
    zsets: HashMap<String, Vec<(String, f64)>>,
    expirations: HashMap<String, Instant>,
}

/// An in-process [`KvStore`], used for tests and as the fallback when a
/// shared backend is configured but a single-node deployment has none.
#[derive(Default)]
pub struct MemoryKvStore {
    state: Mutex<MemoryState>,
}

impl MemoryKvStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn is_expired(state: &MemoryState, key: &str) -> bool {
        state
            .expirations
            .get(key)
            .is_some_and(|deadline| Instant::now() >= *deadline)
    }

    fn purge_if_expired(state: &mut MemoryState, key: &str) {
        if Self::is_expired(state, key) {
            state.strings.remove(key);
            state.hashes.remove(key);
            state.zsets.remove(key);
            state.expirations.remove(key);
        }
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let mut state = self.lock();
        Self::purge_if_expired(&mut state, key);
        Ok(state.strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StorageResult<()> {
        let mut state = self.lock();
        state.strings.insert(key.to_string(), value.to_string());
        match ttl {
            Some(ttl) => {
                state.expirations.insert(key.to_string(), Instant::now() + ttl);
            }
            None => {
                state.expirations.remove(key);
            }
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> StorageResult<()> {
        let mut state = self.lock();
        state.strings.remove(key);
        state.hashes.remove(key);
        state.zsets.remove(key);
        state.expirations.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let mut state = self.lock();
        Self::purge_if_expired(&mut state, key);
        Ok(state.strings.contains_key(key)
            || state.hashes.contains_key(key)
            || state.zsets.contains_key(key))
    }

    async fn incr(&self, key: &str) -> StorageResult<i64> {
        let mut state = self.lock();
        Self::purge_if_expired(&mut state, key);
        let entry = state.strings.entry(key.to_string()).or_insert_with(|| "0".to_string());
        let next = entry.parse::<i64>().unwrap_or(0).saturating_add(1);
        *entry = next.to_string();
        Ok(next)
    }

    async fn decr(&self, key: &str) -> StorageResult<i64> {
        let mut state = self.lock();
        Self::purge_if_expired(&mut state, key);
        let entry = state.strings.entry(key.to_string()).or_insert_with(|| "0".to_string());
        let next = entry.parse::<i64>().unwrap_or(0).saturating_sub(1);
        *entry = next.to_string();
        Ok(next)
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> StorageResult<i64> {
        let mut state = self.lock();
        Self::purge_if_expired(&mut state, key);
        let entry = state.strings.entry(key.to_string()).or_insert_with(|| "0".to_string());
        let next = entry.parse::<i64>().unwrap_or(0).saturating_add(1);
        *entry = next.to_string();
        state.expirations.insert(key.to_string(), Instant::now() + ttl);
        Ok(next)
    }

    async fn incrby_with_ttl(&self, key: &str, amount: i64, ttl: Duration) -> StorageResult<i64> {
        let mut state = self.lock();
        Self::purge_if_expired(&mut state, key);
        let entry = state.strings.entry(key.to_string()).or_insert_with(|| "0".to_string());
        let next = entry.parse::<i64>().unwrap_or(0).saturating_add(amount);
        *entry = next.to_string();
        state.expirations.insert(key.to_string(), Instant::now() + ttl);
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StorageResult<()> {
        let mut state = self.lock();
        state.expirations.insert(key.to_string(), Instant::now() + ttl);
        Ok(())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> StorageResult<()> {
        let mut state = self.lock();
        state
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> StorageResult<Option<String>> {
        let mut state = self.lock();
        Self::purge_if_expired(&mut state, key);
        Ok(state.hashes.get(key).and_then(|h| h.get(field).cloned()))
    }

    async fn hdel(&self, key: &str, field: &str) -> StorageResult<()> {
        let mut state = self.lock();
        if let Some(h) = state.hashes.get_mut(key) {
            h.remove(field);
        }
        Ok(())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> StorageResult<()> {
        let mut state = self.lock();
        let set = state.zsets.entry(key.to_string()).or_default();
        if let Some(existing) = set.iter_mut().find(|(m, _)| m == member) {
            existing.1 = score;
        } else {
            set.push((member.to_string(), score));
        }
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> StorageResult<()> {
        let mut state = self.lock();
        if let Some(set) = state.zsets.get_mut(key) {
            set.retain(|(m, _)| m != member);
        }
        Ok(())
    }

    async fn zrangebyscore(
        &self,
        key: &str,
        min: f64,
        max: f64,
        limit: usize,
    ) -> StorageResult<Vec<String>> {
        let state = self.lock();
        let Some(set) = state.zsets.get(key) else {
            return Ok(Vec::new());
        };
        let mut matches: Vec<(String, f64)> = set
            .iter()
            .filter(|(_, score)| *score >= min && *score <= max)
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.1.total_cmp(&b.1));
        Ok(matches.into_iter().take(limit).map(|(m, _)| m).collect())
    }
}
