//! In-memory cache store backend.
//!
//! The minimal valid backend: a `RwLock<HashMap>` with TTL checked on read.
//! Used directly by the local memoizer variant and as the reference
//! implementation for the `CacheStore` contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prewarm_core::{CacheKey, CachedValue, EngineResult, KeyPrefix, StoreError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use crate::traits::{CacheStore, StoreStats};

/// One stored entry. Expiry is wall-clock so shared-store semantics carry
/// over unchanged if the same data were held in an external backend.
#[derive(Debug, Clone)]
struct StoredEntry {
    value: Value,
    stored_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }
}

/// Process-local cache store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    expired_reads: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read_entries(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, StoredEntry>>, StoreError> {
        self.entries.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write_entries(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, StoredEntry>>, StoreError> {
        self.entries.write().map_err(|_| StoreError::LockPoisoned)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &CacheKey) -> EngineResult<Option<CachedValue>> {
        let now = Utc::now();
        {
            let entries = self.read_entries()?;
            match entries.get(key.as_str()) {
                Some(entry) if !entry.is_expired(now) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some(CachedValue::stored_at(
                        entry.value.clone(),
                        entry.stored_at,
                    )));
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return Ok(None);
                }
            }
        }

        // Expired on read: sweep it so entry_count stays honest. Re-check
        // under the write lock, a concurrent set may have replaced it.
        self.expired_reads.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.write_entries()?;
        if entries
            .get(key.as_str())
            .is_some_and(|entry| entry.is_expired(now))
        {
            entries.remove(key.as_str());
        }
        Ok(None)
    }

    async fn set(&self, key: &CacheKey, value: Value, ttl: Option<Duration>) -> EngineResult<()> {
        let stored_at = Utc::now();
        // A ttl too large for the calendar is the same as no expiry.
        let expires_at = ttl.and_then(|ttl| {
            chrono::Duration::from_std(ttl)
                .ok()
                .and_then(|d| stored_at.checked_add_signed(d))
        });
        let mut entries = self.write_entries()?;
        entries.insert(
            key.as_str().to_owned(),
            StoredEntry {
                value,
                stored_at,
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> EngineResult<()> {
        let mut entries = self.write_entries()?;
        entries.remove(key.as_str());
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &KeyPrefix) -> EngineResult<u64> {
        // One pass under one write lock: readers see the invalidation
        // either not at all or in full.
        let mut entries = self.write_entries()?;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix.as_str()));
        Ok((before - entries.len()) as u64)
    }

    async fn stats(&self) -> EngineResult<StoreStats> {
        let entry_count = self.read_entries()?.len() as u64;
        Ok(StoreStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired_reads: self.expired_reads.load(Ordering::Relaxed),
            entry_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prewarm_core::KeyBuilder;
    use serde_json::json;

    fn key(owner: &str, op: &str, args: &[Value]) -> CacheKey {
        KeyBuilder::new().build(owner, op, args).expect("key")
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let store = MemoryStore::new();
        let k = key("sources", "getAll", &[]);

        assert!(store.get(&k).await.expect("get").is_none());
        store
            .set(&k, json!({"rows": 3}), None)
            .await
            .expect("set");

        let cached = store.get(&k).await.expect("get").expect("present");
        assert_eq!(cached.value, json!({"rows": 3}));
    }

    #[tokio::test]
    async fn test_cached_null_is_a_hit() {
        let store = MemoryStore::new();
        let k = key("sources", "find", &[json!("missing")]);
        store.set(&k, json!(null), None).await.expect("set");

        let cached = store.get(&k).await.expect("get").expect("present");
        assert!(cached.is_null());
    }

    #[tokio::test]
    async fn test_set_overwrites_unconditionally() {
        let store = MemoryStore::new();
        let k = key("o", "op", &[]);
        store.set(&k, json!(1), None).await.expect("set");
        store.set(&k, json!(2), None).await.expect("set");

        let cached = store.get(&k).await.expect("get").expect("present");
        assert_eq!(cached.value, json!(2));
    }

    #[tokio::test]
    async fn test_expired_entry_reads_as_absent() {
        let store = MemoryStore::new();
        let k = key("o", "op", &[]);
        store
            .set(&k, json!("v"), Some(Duration::from_millis(20)))
            .await
            .expect("set");

        assert!(store.get(&k).await.expect("get").is_some());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.get(&k).await.expect("get").is_none());

        let stats = store.stats().await.expect("stats");
        assert_eq!(stats.expired_reads, 1);
        assert_eq!(stats.entry_count, 0, "expired entry was swept");
    }

    #[tokio::test]
    async fn test_delete_missing_is_noop() {
        let store = MemoryStore::new();
        let k = key("o", "op", &[]);
        store.delete(&k).await.expect("delete absent is ok");
    }

    #[tokio::test]
    async fn test_delete_by_prefix_scopes_to_owner() {
        let store = MemoryStore::new();
        let builder = KeyBuilder::new();

        for op in ["a", "b", "c"] {
            let k = builder.build("sources", op, &[]).expect("key");
            store.set(&k, json!(op), None).await.expect("set");
        }
        let other = builder.build("organizations", "a", &[]).expect("key");
        store.set(&other, json!("keep"), None).await.expect("set");

        let prefix = builder.owner_prefix("sources").expect("prefix");
        let removed = store.delete_by_prefix(&prefix).await.expect("delete");
        assert_eq!(removed, 3);

        assert!(store.get(&other).await.expect("get").is_some());
        let gone = builder.build("sources", "a", &[]).expect("key");
        assert!(store.get(&gone).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_stats_track_hits_and_misses() {
        let store = MemoryStore::new();
        let k = key("o", "op", &[]);

        let _ = store.get(&k).await.expect("get");
        store.set(&k, json!(1), None).await.expect("set");
        let _ = store.get(&k).await.expect("get");

        let stats = store.stats().await.expect("stats");
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < 0.001);
    }
}
