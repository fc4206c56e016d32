//! Cache store trait and usage statistics.
//!
//! This module defines the backend abstraction the memoization engine runs
//! against. A backend may be process-local (an in-memory map) or shared and
//! external (a network cache); the engine is agnostic.

use async_trait::async_trait;
use prewarm_core::{CacheKey, CachedValue, EngineResult, KeyPrefix};
use serde_json::Value;
use std::time::Duration;

/// Key/value store with TTL, exact deletion and prefix deletion.
///
/// # Key Space
///
/// Keys are produced by `prewarm_core::KeyBuilder`; isolation between
/// owners and operations is achieved purely through key namespacing, not
/// through locking. Implementations never need to interpret key contents.
///
/// # TTL Contract
///
/// A present entry whose TTL has elapsed must be indistinguishable from an
/// absent entry to readers.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a value from the store.
    ///
    /// Returns `Ok(None)` for absent or expired entries. A cached JSON
    /// `null` is returned as `Some(CachedValue)` holding `Value::Null` and
    /// must never be collapsed into `None`. Fails with
    /// `StoreError::Unavailable` if the backend cannot be reached.
    async fn get(&self, key: &CacheKey) -> EngineResult<Option<CachedValue>>;

    /// Store a value, overwriting unconditionally.
    ///
    /// With `ttl = None` the entry does not expire on its own and relies on
    /// explicit deletion or bulk invalidation.
    async fn set(&self, key: &CacheKey, value: Value, ttl: Option<Duration>) -> EngineResult<()>;

    /// Remove one entry. A no-op, not an error, if the entry is absent.
    async fn delete(&self, key: &CacheKey) -> EngineResult<()>;

    /// Remove every entry whose key starts with `prefix`, returning the
    /// number removed.
    ///
    /// Must be atomic from the caller's point of view: a reader never
    /// observes the same logical invalidation half-applied.
    async fn delete_by_prefix(&self, prefix: &KeyPrefix) -> EngineResult<u64>;

    /// Get store usage statistics.
    async fn stats(&self) -> EngineResult<StoreStats>;
}

/// Statistics about store usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of reads that returned a live entry.
    pub hits: u64,
    /// Number of reads that found nothing.
    pub misses: u64,
    /// Number of reads that found an entry already past its TTL.
    pub expired_reads: u64,
    /// Number of entries currently held (may include expired entries not
    /// yet swept).
    pub entry_count: u64,
}

impl StoreStats {
    /// Calculate the hit rate (0.0 to 1.0). Expired reads count as misses.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.expired_reads;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
