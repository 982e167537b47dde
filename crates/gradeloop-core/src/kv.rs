// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Key-value store seam and backends.
//!
//! All coordination state lives behind [`KeyValueStore`]. The production
//! backend is [`RedisStore`]; [`MemoryStore`] is the embedded backend used
//! for tests and single-process deployments.
//!
//! The store's atomic-script facility is surfaced as the semantic
//! [`KeyValueStore::version_cas`] method rather than a raw script runner:
//! the Redis backend implements it with a single Lua script, the memory
//! backend under its mutex. Both give the same guarantee - compare and set
//! in one atomic step, no read-then-write round trip.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::error::{CoreError, Result};

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist.
    Missing,
    /// The key exists and has no expiry set.
    NoExpiry,
    /// The key exists and expires after the given duration.
    Expires(Duration),
}

/// Store operations used by the coordination components.
///
/// Every method is a single network round trip on the Redis backend.
/// Failures are hard errors ([`CoreError::StoreUnavailable`]); callers do
/// not fall back to local state.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a key, `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a key, optionally with an expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Write a key only if it does not exist, with an expiry, atomically.
    /// Returns true iff this call created the key.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Atomically add `amount` to a float counter, creating it at 0 if
    /// absent. Returns the post-increment total.
    async fn incr_by_float(&self, key: &str, amount: f64) -> Result<f64>;

    /// Set an expiry on an existing key. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Remaining lifetime of a key.
    async fn ttl(&self, key: &str) -> Result<KeyTtl>;

    /// Delete a key. Returns true iff the key existed.
    async fn del(&self, key: &str) -> Result<bool>;

    /// Non-mutating existence probe.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Compare-and-set for monotonic version counters, in one atomic step:
    /// if `candidate` is strictly greater than the stored value (absent
    /// reads as 0), store it and refresh the expiry to `ttl`, returning
    /// true; otherwise leave the key untouched and return false.
    async fn version_cas(&self, key: &str, candidate: i64, ttl: Duration) -> Result<bool>;
}

// ============================================================================
// Redis backend
// ============================================================================

/// Lua compare-and-set for version counters. Runs atomically on the server,
/// so concurrent callers cannot interleave between the read and the write.
const VERSION_CAS_SCRIPT: &str = r"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
local candidate = tonumber(ARGV[1])
if candidate > current then
    redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[2])
    return 1
end
return 0
";

/// Redis-backed store using a multiplexed connection manager.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Create a store from an existing connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Connect to Redis at `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => {
                let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        // SET key value NX EX ttl - creation and expiry in one round trip
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn incr_by_float(&self, key: &str, amount: f64) -> Result<f64> {
        let mut conn = self.conn.clone();
        // A float delta makes redis-rs issue INCRBYFLOAT
        let total: f64 = conn.incr(key, amount).await?;
        Ok(total)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let applied: bool = conn.expire(key, ttl.as_secs().max(1) as i64).await?;
        Ok(applied)
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let mut conn = self.conn.clone();
        let ttl: i64 = conn.ttl(key).await?;
        Ok(match ttl {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::NoExpiry,
            secs => KeyTtl::Expires(Duration::from_secs(secs.max(0) as u64)),
        })
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn version_cas(&self, key: &str, candidate: i64, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let applied: i64 = redis::Script::new(VERSION_CAS_SCRIPT)
            .key(key)
            .arg(candidate)
            .arg(ttl.as_secs().max(1))
            .invoke_async(&mut conn)
            .await?;
        Ok(applied == 1)
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory store for tests and embedded single-process use.
///
/// Expiry is lazy: expired entries are dropped when next touched, which is
/// indistinguishable from eager expiry through this interface.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn live<'a>(map: &'a mut HashMap<String, Entry>, key: &str, now: Instant) -> Option<&'a Entry> {
        if map.get(key).is_some_and(|e| e.expired(now)) {
            map.remove(key);
        }
        map.get(key)
    }

    fn parse_counter(key: &str, raw: &str) -> Result<f64> {
        raw.parse::<f64>().map_err(|e| CoreError::CorruptValue {
            key: key.to_string(),
            details: e.to_string(),
        })
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut map = self.entries.lock().unwrap();
        Ok(Self::live(&mut map, key, Instant::now()).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut map = self.entries.lock().unwrap();
        map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut map = self.entries.lock().unwrap();
        let now = Instant::now();
        if Self::live(&mut map, key, now).is_some() {
            return Ok(false);
        }
        map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn incr_by_float(&self, key: &str, amount: f64) -> Result<f64> {
        let mut map = self.entries.lock().unwrap();
        let now = Instant::now();
        let (current, expires_at) = match Self::live(&mut map, key, now) {
            Some(entry) => (Self::parse_counter(key, &entry.value)?, entry.expires_at),
            None => (0.0, None),
        };
        let total = current + amount;
        map.insert(
            key.to_string(),
            Entry {
                value: total.to_string(),
                expires_at,
            },
        );
        Ok(total)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut map = self.entries.lock().unwrap();
        let now = Instant::now();
        if Self::live(&mut map, key, now).is_none() {
            return Ok(false);
        }
        if let Some(entry) = map.get_mut(key) {
            entry.expires_at = Some(now + ttl);
        }
        Ok(true)
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let mut map = self.entries.lock().unwrap();
        let now = Instant::now();
        Ok(match Self::live(&mut map, key, now) {
            None => KeyTtl::Missing,
            Some(Entry {
                expires_at: None, ..
            }) => KeyTtl::NoExpiry,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => KeyTtl::Expires(at.saturating_duration_since(now)),
        })
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let mut map = self.entries.lock().unwrap();
        let now = Instant::now();
        if Self::live(&mut map, key, now).is_none() {
            return Ok(false);
        }
        Ok(map.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut map = self.entries.lock().unwrap();
        Ok(Self::live(&mut map, key, Instant::now()).is_some())
    }

    async fn version_cas(&self, key: &str, candidate: i64, ttl: Duration) -> Result<bool> {
        let mut map = self.entries.lock().unwrap();
        let now = Instant::now();
        let current = match Self::live(&mut map, key, now) {
            Some(entry) => entry
                .value
                .parse::<i64>()
                .map_err(|e| CoreError::CorruptValue {
                    key: key.to_string(),
                    details: e.to_string(),
                })?,
            None => 0,
        };
        if candidate <= current {
            return Ok(false);
        }
        map.insert(
            key.to_string(),
            Entry {
                value: candidate.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_set_get_del() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert!(store.exists("k").await.unwrap());

        assert!(store.del("k").await.unwrap());
        assert!(!store.del("k").await.unwrap());
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_nx_only_first_wins() {
        let store = MemoryStore::new();
        assert!(store.set_nx("lock:x", "a", TTL).await.unwrap());
        assert!(!store.set_nx("lock:x", "b", TTL).await.unwrap());
        assert_eq!(store.get("lock:x").await.unwrap(), Some("a".to_string()));
    }

    #[tokio::test]
    async fn test_set_nx_succeeds_after_expiry() {
        let store = MemoryStore::new();
        assert!(
            store
                .set_nx("lock:x", "a", Duration::from_millis(20))
                .await
                .unwrap()
        );
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.set_nx("lock:x", "b", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn test_incr_by_float_accumulates() {
        let store = MemoryStore::new();
        assert_eq!(store.incr_by_float("c", 0.25).await.unwrap(), 0.25);
        assert_eq!(store.incr_by_float("c", 0.25).await.unwrap(), 0.5);
        assert_eq!(store.incr_by_float("c", 2.0).await.unwrap(), 2.5);
    }

    #[tokio::test]
    async fn test_incr_rejects_non_numeric_value() {
        let store = MemoryStore::new();
        store.set("c", "not-a-number", None).await.unwrap();
        let err = store.incr_by_float("c", 1.0).await.unwrap_err();
        assert!(matches!(err, CoreError::CorruptValue { .. }));
    }

    #[tokio::test]
    async fn test_ttl_transitions() {
        let store = MemoryStore::new();
        assert_eq!(store.ttl("k").await.unwrap(), KeyTtl::Missing);

        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.ttl("k").await.unwrap(), KeyTtl::NoExpiry);

        assert!(store.expire("k", TTL).await.unwrap());
        match store.ttl("k").await.unwrap() {
            KeyTtl::Expires(remaining) => assert!(remaining <= TTL),
            other => panic!("expected Expires, got {:?}", other),
        }

        assert!(!store.expire("missing", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_key_reads_as_missing() {
        let store = MemoryStore::new();
        store
            .set("k", "v", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.ttl("k").await.unwrap(), KeyTtl::Missing);
    }

    #[tokio::test]
    async fn test_version_cas_strictly_greater() {
        let store = MemoryStore::new();
        assert!(store.version_cas("v", 5, TTL).await.unwrap());
        assert_eq!(store.get("v").await.unwrap(), Some("5".to_string()));

        assert!(!store.version_cas("v", 5, TTL).await.unwrap());
        assert!(!store.version_cas("v", 3, TTL).await.unwrap());
        assert_eq!(store.get("v").await.unwrap(), Some("5".to_string()));

        assert!(store.version_cas("v", 6, TTL).await.unwrap());
        assert_eq!(store.get("v").await.unwrap(), Some("6".to_string()));
    }
}
