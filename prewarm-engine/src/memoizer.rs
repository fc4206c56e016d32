//! Get-or-compute orchestration.
//!
//! [`Memoizer`] wires the cache store, the key builder and the in-flight
//! registry into the full memoization algorithm. The local variant is
//! `Memoizer<MemoryStore>`; the shared variant is the same type over an
//! external store implementation: one parameterized design, different
//! durability of the hit path.

use prewarm_core::{CacheKey, EngineError, EngineResult, KeyBuilder, Operation};
use prewarm_store::{CacheStore, MemoryStore};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::inflight::{Flight, InFlightRegistry};

/// Configuration for a memoizer instance.
#[derive(Debug, Clone, Default)]
pub struct MemoizerConfig {
    /// Degrade to a direct computation when the store read path fails,
    /// instead of surfacing `StoreError::Unavailable`.
    ///
    /// Off by default: silently recomputing under a partial store outage
    /// would defeat the deduplication guarantees the engine exists for, so
    /// degrading is an explicit opt-in. When enabled, a failed read logs a
    /// warning and falls through to the single-flight compute path, and a
    /// failed write after a successful computation logs and still returns
    /// the computed value.
    pub degrade_on_store_error: bool,
}

impl MemoizerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable degrade-to-direct-call mode.
    pub fn with_degrade_on_store_error(mut self, enabled: bool) -> Self {
        self.degrade_on_store_error = enabled;
        self
    }
}

/// The get-or-compute orchestrator.
///
/// # Algorithm
///
/// 1. Derive the key (fails fast, nothing downstream touched).
/// 2. Check the store; any hit, including an explicitly cached `null`,
///    returns immediately without touching the in-flight registry.
/// 3. Join or start the flight for the key. Followers await the shared
///    outcome. The leader runs the wrapped operation; on success the value
///    is committed to the store *before* waiters are released, on failure
///    nothing is cached and the error fans out to every waiter.
pub struct Memoizer<S: CacheStore> {
    store: Arc<S>,
    keys: KeyBuilder,
    inflight: Arc<InFlightRegistry>,
    config: MemoizerConfig,
}

impl Memoizer<MemoryStore> {
    /// A process-local memoizer over a fresh in-memory store. Hits are
    /// invisible to other processes.
    pub fn local() -> Self {
        Self::with_defaults(Arc::new(MemoryStore::new()))
    }
}

impl<S: CacheStore> Memoizer<S> {
    /// Create a memoizer over the given store.
    ///
    /// Pass an external store implementation to get the shared variant:
    /// hits become visible to every process sharing that store.
    pub fn new(store: Arc<S>, keys: KeyBuilder, config: MemoizerConfig) -> Self {
        Self {
            store,
            keys,
            inflight: Arc::new(InFlightRegistry::new()),
            config,
        }
    }

    /// Create a memoizer with the default key namespace and configuration.
    pub fn with_defaults(store: Arc<S>) -> Self {
        Self::new(store, KeyBuilder::new(), MemoizerConfig::default())
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The key builder; bulk invalidation must share it so the prefix
    /// convention cannot diverge.
    pub fn key_builder(&self) -> &KeyBuilder {
        &self.keys
    }

    pub fn config(&self) -> &MemoizerConfig {
        &self.config
    }

    /// Run `op` memoized under `(owner, operation, args)`.
    pub async fn get_or_compute(
        &self,
        owner: &str,
        operation: &str,
        args: &[Value],
        ttl: Option<Duration>,
        op: &dyn Operation,
    ) -> EngineResult<Value> {
        let key = self.keys.build(owner, operation, args)?;

        match self.store.get(&key).await {
            Ok(Some(cached)) => return Ok(cached.into_value()),
            Ok(None) => {}
            Err(e) if self.config.degrade_on_store_error => {
                tracing::warn!(
                    key = %key,
                    error = %e,
                    "Store read failed, degrading to direct computation"
                );
            }
            Err(e) => return Err(e),
        }

        match self.inflight.begin(&key, operation) {
            Flight::Follower(mut rx) => match rx.recv().await {
                Ok(outcome) => outcome,
                Err(_) => Err(EngineError::computation(
                    operation,
                    "in-flight computation ended without an outcome",
                )),
            },
            Flight::Leader(permit) => match op.call(args).await {
                Ok(value) => {
                    if let Err(e) = self.store.set(&key, value.clone(), ttl).await {
                        if !self.config.degrade_on_store_error {
                            permit.complete(Err(e.clone()));
                            return Err(e);
                        }
                        tracing::warn!(
                            key = %key,
                            error = %e,
                            "Store write failed, returning uncached result"
                        );
                    }
                    permit.complete(Ok(value.clone()));
                    Ok(value)
                }
                Err(e) => {
                    // Failed computations are never cached; the error fans
                    // out to every waiter and the next call starts fresh.
                    permit.complete(Err(e.clone()));
                    Err(e)
                }
            },
        }
    }

    /// Drop every cached entry for `owner`, returning the number removed.
    ///
    /// Clearing is not a computation: it goes straight to the store and
    /// never touches the in-flight registry.
    pub async fn clear_owner(&self, owner: &str) -> EngineResult<u64> {
        let prefix = self.keys.owner_prefix(owner)?;
        self.store.delete_by_prefix(&prefix).await
    }

    /// Bind `(owner, operation, ttl, op)` into a callable memoized handle.
    ///
    /// This is the composition point components use at construction time
    /// instead of method interception: wrap each operation once, register
    /// the handles, call them like plain functions.
    pub fn wrap(
        &self,
        owner: &str,
        operation: &str,
        ttl: Option<Duration>,
        op: Arc<dyn Operation>,
    ) -> EngineResult<MemoizedOp<S>> {
        // Validate the names now so a bad registration fails at
        // construction, not on first call.
        self.keys.build(owner, operation, &[])?;
        Ok(MemoizedOp {
            memoizer: self.clone(),
            owner: owner.to_owned(),
            operation: operation.to_owned(),
            ttl,
            op,
        })
    }

    /// Derive the key an operation call would use. Exposed for tests and
    /// diagnostics.
    pub fn key_for(
        &self,
        owner: &str,
        operation: &str,
        args: &[Value],
    ) -> EngineResult<CacheKey> {
        Ok(self.keys.build(owner, operation, args)?)
    }
}

impl<S: CacheStore> Clone for Memoizer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            keys: self.keys.clone(),
            inflight: Arc::clone(&self.inflight),
            config: self.config.clone(),
        }
    }
}

/// A memoized operation handle: `(owner, operation, ttl)` bound to a
/// wrapped function.
///
/// Handles are what [`OwnerRegistration`](crate::registration::OwnerRegistration)
/// collects, giving bulk clear and warm-up an explicit collection to
/// iterate instead of reflected metadata.
pub struct MemoizedOp<S: CacheStore> {
    memoizer: Memoizer<S>,
    owner: String,
    operation: String,
    ttl: Option<Duration>,
    op: Arc<dyn Operation>,
}

impl<S: CacheStore> MemoizedOp<S> {
    /// Invoke the operation through the full memoization algorithm.
    pub async fn call(&self, args: &[Value]) -> EngineResult<Value> {
        self.memoizer
            .get_or_compute(&self.owner, &self.operation, args, self.ttl, self.op.as_ref())
            .await
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }
}

impl<S: CacheStore> Clone for MemoizedOp<S> {
    fn clone(&self) -> Self {
        Self {
            memoizer: self.memoizer.clone(),
            owner: self.owner.clone(),
            operation: self.operation.clone(),
            ttl: self.ttl,
            op: Arc::clone(&self.op),
        }
    }
}
