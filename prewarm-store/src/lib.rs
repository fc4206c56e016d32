//! PREWARM Store - Cache Store Abstraction
//!
//! Defines the pluggable key/value backend the memoization engine runs
//! against, plus the in-memory reference backend. A shared/external backend
//! (network cache) is any other implementation of [`CacheStore`]; the
//! engine does not care which side of a socket the entries live on.

pub mod memory;
pub mod traits;

pub use memory::MemoryStore;
pub use traits::{CacheStore, StoreStats};
