//! Error types for prewarm operations

use thiserror::Error;

/// Cache store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Cache store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache payload codec error for key {key}: {reason}")]
    Codec { key: String, reason: String },

    #[error("Cache store lock poisoned")]
    LockPoisoned,
}

/// Cache key derivation errors.
///
/// These fail fast, before the store or the in-flight registry is touched,
/// so an unbuildable key never leaves a partial entry behind.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid {kind} name {name:?}: {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("Argument at index {index} cannot be canonically serialized: {reason}")]
    Unserializable { index: usize, reason: String },
}

/// Master error type for all prewarm errors.
///
/// `Clone` is required: a single computation failure fans out to every
/// caller sharing the same in-flight entry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("Computation failed for operation {operation}: {reason}")]
    Computation { operation: String, reason: String },

    #[error("Warm-up failed for owner {owner}: {reason}")]
    Warmup { owner: String, reason: String },

    #[error("Registration error for owner {owner}: {reason}")]
    Registration { owner: String, reason: String },
}

impl EngineError {
    /// Wrap an upstream failure raised by a wrapped operation.
    pub fn computation(operation: impl Into<String>, reason: impl ToString) -> Self {
        Self::Computation {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Wrap a failed warm-up run for the given owner.
    pub fn warmup(owner: impl Into<String>, reason: impl ToString) -> Self {
        Self::Warmup {
            owner: owner.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for prewarm operations.
pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// TESTS
// =============================================================================
