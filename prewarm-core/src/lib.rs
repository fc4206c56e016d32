//! PREWARM Core - Shared Types for the Memoization Engine
//!
//! Defines the pieces every other prewarm crate builds on: the error
//! taxonomy, deterministic cache-key derivation, the cached-value wrapper
//! and the wrapped-operation boundary. No I/O happens here.

mod canon;
pub mod error;
pub mod key;
pub mod operation;
pub mod value;

pub use error::{EngineError, EngineResult, KeyError, StoreError};
pub use key::{json_args, CacheKey, KeyBuilder, KeyPrefix, DEFAULT_NAMESPACE};
pub use operation::{FnOperation, Operation};
pub use value::CachedValue;
