//! Owner registrations.
//!
//! An owner groups the memoized operations of one component together with
//! the warm tasks that repopulate them. The scheduler iterates these
//! registrations; nothing in the engine discovers operations by
//! reflection or naming convention.

use async_trait::async_trait;
use prewarm_core::{EngineError, EngineResult};
use prewarm_store::CacheStore;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::memoizer::MemoizedOp;

/// A unit of warm-up work: one call that exercises a memoized operation
/// with representative arguments so its entry is populated.
#[async_trait]
pub trait WarmTask: Send + Sync {
    async fn warm(&self) -> EngineResult<()>;
}

/// Adapter turning an async closure into a [`WarmTask`].
pub struct FnWarmTask<F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnWarmTask<F, Fut>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = EngineResult<()>> + Send,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> WarmTask for FnWarmTask<F, Fut>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = EngineResult<()>> + Send,
{
    async fn warm(&self) -> EngineResult<()> {
        (self.f)().await
    }
}

/// One owner's memoized operations plus its warm-up tasks.
pub struct OwnerRegistration<S: CacheStore> {
    owner: String,
    ops: Vec<MemoizedOp<S>>,
    warm_tasks: Vec<Arc<dyn WarmTask>>,
}

impl<S: CacheStore> OwnerRegistration<S> {
    pub fn builder(owner: impl Into<String>) -> OwnerRegistrationBuilder<S> {
        OwnerRegistrationBuilder {
            owner: owner.into(),
            ops: Vec::new(),
            warm_tasks: Vec::new(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn ops(&self) -> &[MemoizedOp<S>] {
        &self.ops
    }

    pub fn warm_tasks(&self) -> &[Arc<dyn WarmTask>] {
        &self.warm_tasks
    }

    pub fn operation_names(&self) -> Vec<&str> {
        self.ops.iter().map(|op| op.operation()).collect()
    }
}

/// Builder enforcing registration invariants: every operation belongs to
/// the registration's owner, and operation names are unique within it.
pub struct OwnerRegistrationBuilder<S: CacheStore> {
    owner: String,
    ops: Vec<MemoizedOp<S>>,
    warm_tasks: Vec<Arc<dyn WarmTask>>,
}

impl<S: CacheStore> OwnerRegistrationBuilder<S> {
    /// Add a memoized operation. Rejects an operation wrapped under a
    /// different owner, and a second operation with the same name.
    pub fn operation(mut self, op: MemoizedOp<S>) -> EngineResult<Self> {
        if op.owner() != self.owner {
            return Err(EngineError::Registration {
                owner: self.owner.clone(),
                reason: format!(
                    "operation '{}' is wrapped under owner '{}'",
                    op.operation(),
                    op.owner()
                ),
            });
        }
        if self.ops.iter().any(|o| o.operation() == op.operation()) {
            return Err(EngineError::Registration {
                owner: self.owner.clone(),
                reason: format!("duplicate operation name '{}'", op.operation()),
            });
        }
        self.ops.push(op);
        Ok(self)
    }

    pub fn warm_task(mut self, task: Arc<dyn WarmTask>) -> Self {
        self.warm_tasks.push(task);
        self
    }

    /// Convenience for closure-based warm tasks.
    pub fn warm_with<F, Fut>(self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EngineResult<()>> + Send + 'static,
    {
        self.warm_task(Arc::new(FnWarmTask::new(f)))
    }

    pub fn build(self) -> OwnerRegistration<S> {
        OwnerRegistration {
            owner: self.owner,
            ops: self.ops,
            warm_tasks: self.warm_tasks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memoizer::Memoizer;
    use prewarm_test_utils::CountingOperation;
    use serde_json::json;

    #[tokio::test]
    async fn test_builder_collects_ops_and_tasks() {
        let memoizer = Memoizer::local();
        let op = Arc::new(CountingOperation::returning(json!(1)));

        let reg = OwnerRegistration::builder("sources")
            .operation(memoizer.wrap("sources", "getAll", None, op.clone()).unwrap())
            .unwrap()
            .operation(memoizer.wrap("sources", "getAllDict", None, op).unwrap())
            .unwrap()
            .warm_with(|| async { Ok(()) })
            .build();

        assert_eq!(reg.owner(), "sources");
        assert_eq!(reg.operation_names(), vec!["getAll", "getAllDict"]);
        assert_eq!(reg.warm_tasks().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_operation_name_rejected() {
        let memoizer = Memoizer::local();
        let op = Arc::new(CountingOperation::returning(json!(1)));

        let err = OwnerRegistration::builder("sources")
            .operation(memoizer.wrap("sources", "getAll", None, op.clone()).unwrap())
            .unwrap()
            .operation(memoizer.wrap("sources", "getAll", None, op).unwrap())
            .err()
            .expect("duplicate must be rejected");
        assert!(matches!(err, EngineError::Registration { .. }));
    }

    #[tokio::test]
    async fn test_owner_mismatch_rejected() {
        let memoizer = Memoizer::local();
        let op = Arc::new(CountingOperation::returning(json!(1)));

        let err = OwnerRegistration::builder("sources")
            .operation(memoizer.wrap("organizations", "getAll", None, op).unwrap())
            .err()
            .expect("owner mismatch must be rejected");
        match err {
            EngineError::Registration { owner, .. } => assert_eq!(owner, "sources"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fn_warm_task_runs_closure() {
        let counter = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let c = Arc::clone(&counter);
        let task = FnWarmTask::new(move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            }
        });
        task.warm().await.unwrap();
        task.warm().await.unwrap();
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
