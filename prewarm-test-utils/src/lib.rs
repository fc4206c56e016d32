//! Test doubles for exercising the engine: stores that fail or stall on
//! command, and operations that count their invocations.
//!
//! Everything here is deterministic and clock-free so tests can assert
//! exact call counts.

use async_trait::async_trait;
use prewarm_core::{
    CacheKey, CachedValue, EngineError, EngineResult, KeyPrefix, Operation, StoreError,
};
use prewarm_store::{CacheStore, StoreStats};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

// =============================================================================
// STORES
// =============================================================================

/// Wraps a store with switchable read and write failures.
pub struct FaultStore<S> {
    inner: S,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl<S> FaultStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn read_fault(&self) -> EngineResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "injected read failure".to_owned(),
            }
            .into());
        }
        Ok(())
    }

    fn write_fault(&self) -> EngineResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "injected write failure".to_owned(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl<S: CacheStore> CacheStore for FaultStore<S> {
    async fn get(&self, key: &CacheKey) -> EngineResult<Option<CachedValue>> {
        self.read_fault()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &CacheKey, value: Value, ttl: Option<Duration>) -> EngineResult<()> {
        self.write_fault()?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &CacheKey) -> EngineResult<()> {
        self.write_fault()?;
        self.inner.delete(key).await
    }

    async fn delete_by_prefix(&self, prefix: &KeyPrefix) -> EngineResult<u64> {
        self.write_fault()?;
        self.inner.delete_by_prefix(prefix).await
    }

    async fn stats(&self) -> EngineResult<StoreStats> {
        self.inner.stats().await
    }
}

/// Wraps a store with a fixed per-read latency, for widening the window
/// between miss and commit in race tests.
pub struct SlowStore<S> {
    inner: S,
    read_latency: Duration,
}

impl<S> SlowStore<S> {
    pub fn new(inner: S, read_latency: Duration) -> Self {
        Self {
            inner,
            read_latency,
        }
    }
}

#[async_trait]
impl<S: CacheStore> CacheStore for SlowStore<S> {
    async fn get(&self, key: &CacheKey) -> EngineResult<Option<CachedValue>> {
        tokio::time::sleep(self.read_latency).await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &CacheKey, value: Value, ttl: Option<Duration>) -> EngineResult<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &CacheKey) -> EngineResult<()> {
        self.inner.delete(key).await
    }

    async fn delete_by_prefix(&self, prefix: &KeyPrefix) -> EngineResult<u64> {
        self.inner.delete_by_prefix(prefix).await
    }

    async fn stats(&self) -> EngineResult<StoreStats> {
        self.inner.stats().await
    }
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Returns a fixed value and counts how many times it actually ran.
pub struct CountingOperation {
    result: Value,
    latency: Option<Duration>,
    calls: AtomicU64,
}

impl CountingOperation {
    pub fn returning(result: Value) -> Self {
        Self {
            result,
            latency: None,
            calls: AtomicU64::new(0),
        }
    }

    /// Add a fixed latency so concurrent callers overlap the computation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Operation for CountingOperation {
    async fn call(&self, _args: &[Value]) -> EngineResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(self.result.clone())
    }
}

/// Fails its first `n` invocations, then returns a fixed value.
pub struct FlakyOperation {
    failures_left: AtomicU64,
    result: Value,
    calls: AtomicU64,
}

impl FlakyOperation {
    pub fn failing_first(n: u64, result: Value) -> Self {
        Self {
            failures_left: AtomicU64::new(n),
            result,
            calls: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Operation for FlakyOperation {
    async fn call(&self, _args: &[Value]) -> EngineResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(EngineError::computation(
                "flaky",
                "injected computation failure",
            ));
        }
        Ok(self.result.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prewarm_core::KeyBuilder;
    use prewarm_store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_fault_store_toggles() {
        let store = FaultStore::new(MemoryStore::new());
        let key = KeyBuilder::new().build("owner", "op", &[]).unwrap();

        store.set(&key, json!(1), None).await.unwrap();
        store.fail_reads(true);
        assert!(store.get(&key).await.is_err());
        store.fail_reads(false);
        assert!(store.get(&key).await.unwrap().is_some());

        store.fail_writes(true);
        assert!(store.set(&key, json!(2), None).await.is_err());
    }

    #[tokio::test]
    async fn test_flaky_operation_recovers() {
        let op = FlakyOperation::failing_first(2, json!("ok"));
        assert!(op.call(&[]).await.is_err());
        assert!(op.call(&[]).await.is_err());
        assert_eq!(op.call(&[]).await.unwrap(), json!("ok"));
        assert_eq!(op.calls(), 3);
    }
}
