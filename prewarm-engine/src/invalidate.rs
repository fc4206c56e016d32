//! Owner-scoped bulk invalidation.

use prewarm_core::{EngineResult, KeyBuilder};
use prewarm_store::CacheStore;
use std::sync::Arc;

use crate::memoizer::Memoizer;

/// Deletes every cached entry for an owner in one prefix sweep.
///
/// Built from a [`Memoizer`] so it shares the same key builder; a separate
/// namespace here would silently invalidate nothing.
pub struct BulkInvalidator<S: CacheStore> {
    store: Arc<S>,
    keys: KeyBuilder,
}

impl<S: CacheStore> BulkInvalidator<S> {
    pub fn for_memoizer(memoizer: &Memoizer<S>) -> Self {
        Self {
            store: Arc::clone(memoizer.store()),
            keys: memoizer.key_builder().clone(),
        }
    }

    /// Remove every entry under `owner`, returning the number deleted.
    ///
    /// Entries for other owners are untouched. In-flight computations are
    /// unaffected; a computation that completes after the sweep re-caches
    /// its result.
    pub async fn invalidate_owner(&self, owner: &str) -> EngineResult<u64> {
        let prefix = self.keys.owner_prefix(owner)?;
        let removed = self.store.delete_by_prefix(&prefix).await?;
        tracing::info!(owner, removed, "Invalidated cached entries");
        Ok(removed)
    }
}

impl<S: CacheStore> Clone for BulkInvalidator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            keys: self.keys.clone(),
        }
    }
}
