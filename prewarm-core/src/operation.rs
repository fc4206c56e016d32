//! The wrapped-operation boundary.
//!
//! An [`Operation`] is the collaborator the engine memoizes: an idempotent,
//! side-effect-free (from the cache's point of view) async function taking a
//! fixed argument list and returning a JSON-serializable result. It is
//! supplied by upstream business logic and is opaque to the engine.

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;

use crate::error::EngineResult;

/// An idempotent async computation the engine can memoize.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Execute the computation with the given arguments.
    ///
    /// Failures are propagated to every caller sharing the in-flight entry
    /// and are never cached.
    async fn call(&self, args: &[Value]) -> EngineResult<Value>;
}

/// Adapter turning a plain async closure into an [`Operation`].
///
/// ```ignore
/// let op = FnOperation::new(|args: Vec<Value>| async move {
///     Ok(json!({ "echo": args }))
/// });
/// ```
pub struct FnOperation<F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnOperation<F, Fut>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = EngineResult<Value>> + Send,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> Operation for FnOperation<F, Fut>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = EngineResult<Value>> + Send,
{
    async fn call(&self, args: &[Value]) -> EngineResult<Value> {
        (self.f)(args.to_vec()).await
    }
}
