//! Cached value wrapper.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A value read from or written to the cache, with the time it was stored.
///
/// The payload is any JSON value. An explicit JSON `null` is a legitimate
/// cached result: readers receive `Some(CachedValue)` holding `Value::Null`,
/// which is distinct from an absent entry (`None`). The engine never folds
/// one into the other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedValue {
    /// The cached JSON payload.
    pub value: Value,
    /// When the payload was written to the store.
    pub stored_at: DateTime<Utc>,
}

impl CachedValue {
    /// Wrap a payload stored now.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            stored_at: Utc::now(),
        }
    }

    /// Wrap a payload with an explicit storage timestamp.
    pub fn stored_at(value: Value, stored_at: DateTime<Utc>) -> Self {
        Self { value, stored_at }
    }

    /// Whether the cached payload is an explicit JSON `null`.
    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    /// Consume the wrapper and return the payload.
    pub fn into_value(self) -> Value {
        self.value
    }
}
