//! Deterministic, collision-resistant cache key derivation.
//!
//! Keys are namespaced strings of the form
//! `<namespace>:<owner>:<operation>:<canonical-args>`. The private fields of
//! [`CacheKey`] and [`KeyPrefix`] make it impossible to construct a key that
//! did not go through the builder, so every consumer of the key space uses
//! the same prefix convention and owner-scoped bulk invalidation can never
//! miss an entry.
//!
//! # Canonical arguments
//!
//! Each argument is re-serialized from `serde_json::Value` to a canonical
//! JSON string (object keys sorted by serde_json's default map ordering) and
//! the encodings are joined with the ASCII unit separator `0x1F`. JSON string
//! encoding always escapes control characters, so the separator cannot be
//! produced by any argument value and distinct argument lists cannot collide
//! on the joined segment. Segments longer than [`MAX_ARG_SEGMENT_BYTES`] are
//! replaced by a sha256 hex digest, keeping keys bounded and stable across
//! process restarts.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::KeyError;

/// Namespace used when none is configured, distinguishing this cache domain
/// from unrelated uses of the same store.
pub const DEFAULT_NAMESPACE: &str = "prewarm";

/// Separator between the namespace, owner, operation and argument segments.
const SEPARATOR: char = ':';

/// Separator between canonicalized arguments. Not producible by JSON string
/// encoding, which escapes all control characters.
const ARG_SEPARATOR: char = '\u{1F}';

/// Canonical argument segments longer than this are replaced by a digest.
pub const MAX_ARG_SEGMENT_BYTES: usize = 128;

/// A fully derived cache key.
///
/// Can only be produced by [`KeyBuilder::build`]; the inner string is
/// private so ad-hoc keys cannot leak into the key space.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    inner: String,
}

impl CacheKey {
    /// The key as a string, suitable for any string-keyed backend.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Whether this key falls under the given owner prefix.
    pub fn starts_with(&self, prefix: &KeyPrefix) -> bool {
        self.inner.starts_with(prefix.as_str())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

/// An owner-scoped key prefix, `<namespace>:<owner>:`.
///
/// This is the exact prefix contract used by bulk invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPrefix {
    inner: String,
}

impl KeyPrefix {
    /// The prefix as a string.
    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

impl fmt::Display for KeyPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

/// Derives cache keys from an owner identity, an operation identity and an
/// ordered argument list.
///
/// Identical `(owner, operation, args)` always yields an identical key;
/// semantically different arguments yield different keys with overwhelming
/// probability.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    namespace: String,
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl KeyBuilder {
    /// Create a builder with the default namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder with a custom namespace.
    pub fn with_namespace(namespace: impl Into<String>) -> Result<Self, KeyError> {
        let namespace = namespace.into();
        validate_name("namespace", &namespace)?;
        Ok(Self { namespace })
    }

    /// The namespace this builder derives keys under.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Derive the key for `(owner, operation, args)`.
    ///
    /// Fails fast with [`KeyError`] if a name is invalid or an argument
    /// cannot be canonically serialized; nothing is touched downstream.
    pub fn build(
        &self,
        owner: &str,
        operation: &str,
        args: &[Value],
    ) -> Result<CacheKey, KeyError> {
        validate_name("owner", owner)?;
        validate_name("operation", operation)?;

        let mut segment = String::new();
        for (index, arg) in args.iter().enumerate() {
            if index > 0 {
                segment.push(ARG_SEPARATOR);
            }
            let canonical =
                serde_json::to_string(arg).map_err(|e| KeyError::Unserializable {
                    index,
                    reason: e.to_string(),
                })?;
            segment.push_str(&canonical);
        }

        if segment.len() > MAX_ARG_SEGMENT_BYTES {
            segment = digest_segment(&segment);
        }

        Ok(CacheKey {
            inner: format!(
                "{ns}{sep}{owner}{sep}{operation}{sep}{segment}",
                ns = self.namespace,
                sep = SEPARATOR,
            ),
        })
    }

    /// The prefix covering every key this builder derives for `owner`,
    /// regardless of operation or arguments.
    pub fn owner_prefix(&self, owner: &str) -> Result<KeyPrefix, KeyError> {
        validate_name("owner", owner)?;
        Ok(KeyPrefix {
            inner: format!("{}{sep}{}{sep}", self.namespace, owner, sep = SEPARATOR),
        })
    }
}

/// Convert a typed argument list into the JSON argument values the builder
/// consumes, attaching the failing index on error.
///
/// Conversion is strict: a value with no exact JSON representation (a
/// non-finite float, which `serde_json` would fold into `null`) fails here
/// rather than aliasing another argument's key.
pub fn json_args<T: Serialize>(args: &[T]) -> Result<Vec<Value>, KeyError> {
    args.iter()
        .enumerate()
        .map(|(index, arg)| {
            crate::canon::to_canonical_value(arg).map_err(|e| KeyError::Unserializable {
                index,
                reason: e.to_string(),
            })
        })
        .collect()
}

fn validate_name(kind: &'static str, name: &str) -> Result<(), KeyError> {
    if name.is_empty() {
        return Err(KeyError::InvalidName {
            kind,
            name: name.to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    if name.contains(SEPARATOR) {
        return Err(KeyError::InvalidName {
            kind,
            name: name.to_string(),
            reason: format!("must not contain {:?}", SEPARATOR),
        });
    }
    if name.chars().any(char::is_control) {
        return Err(KeyError::InvalidName {
            kind,
            name: name.to_string(),
            reason: "must not contain control characters".to_string(),
        });
    }
    Ok(())
}

fn digest_segment(segment: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(segment.as_bytes());
    format!("sha256:{}", hex::encode(hasher.finalize()))
}
