//! In-flight computation registry (single-flight).
//!
//! Maps a cache key to the pending outcome of a computation currently in
//! progress, so N concurrent callers for the same cold key share one
//! execution instead of issuing N redundant computations.
//!
//! # Correctness
//!
//! The check-and-insert in [`InFlightRegistry::begin`] is one synchronous
//! step under a mutex: no await occurs between "no entry exists" and "entry
//! created", so two callers can never both believe they are first for a
//! key. Followers subscribe under the same lock, so every waiter observes
//! exactly the outcome the leader publishes. Completion removes the entry
//! and then publishes, in that order, so a later `begin` for the same key
//! always starts a fresh computation; nothing is cached here.

use prewarm_core::{CacheKey, EngineError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

/// The shared outcome of one in-flight computation.
pub type FlightOutcome = Result<Value, EngineError>;

/// What `begin` handed this caller.
pub enum Flight {
    /// No entry existed; this caller must run the computation and complete
    /// the permit exactly once.
    Leader(FlightPermit),
    /// Another caller is already computing; await the shared outcome.
    Follower(broadcast::Receiver<FlightOutcome>),
}

impl Flight {
    /// Whether this caller is the leader.
    pub fn is_leader(&self) -> bool {
        matches!(self, Flight::Leader(_))
    }
}

/// Per-process registry of computations in progress.
///
/// Entries are strictly transient: each one lives exactly as long as the
/// single computation it represents.
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    entries: Mutex<HashMap<String, broadcast::Sender<FlightOutcome>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join or start the flight for `key`.
    ///
    /// Synchronous by design: the decision "no cached value, must compute"
    /// and the entry creation happen in one step.
    pub fn begin(self: &Arc<Self>, key: &CacheKey, operation: &str) -> Flight {
        let mut entries = self.lock_entries();
        if let Some(tx) = entries.get(key.as_str()) {
            return Flight::Follower(tx.subscribe());
        }
        let (tx, _rx) = broadcast::channel(1);
        entries.insert(key.as_str().to_owned(), tx);
        Flight::Leader(FlightPermit {
            registry: Arc::clone(self),
            key: key.as_str().to_owned(),
            operation: operation.to_owned(),
            completed: false,
        })
    }

    /// Number of computations currently in flight.
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove the entry and publish the outcome to every follower.
    fn finish(&self, key: &str, outcome: FlightOutcome) {
        let tx = self.lock_entries().remove(key);
        if let Some(tx) = tx {
            // Send errors just mean nobody joined the flight.
            let _ = tx.send(outcome);
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<FlightOutcome>>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Recovered from poisoned in-flight registry lock");
                poisoned.into_inner()
            }
        }
    }
}

/// Leadership over one in-flight computation.
///
/// Must be completed exactly once, success or failure. If the leader's
/// future is dropped before completing (runtime cancellation), the permit
/// publishes a computation failure on drop so followers never hang; there
/// is no API to abandon a flight early.
pub struct FlightPermit {
    registry: Arc<InFlightRegistry>,
    key: String,
    operation: String,
    completed: bool,
}

impl FlightPermit {
    /// Resolve the flight: remove the entry and wake every follower with
    /// this outcome.
    pub fn complete(mut self, outcome: FlightOutcome) {
        self.completed = true;
        self.registry.finish(&self.key, outcome);
    }
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        if !self.completed {
            self.registry.finish(
                &self.key,
                Err(EngineError::computation(
                    &self.operation,
                    "computation dropped before completion",
                )),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prewarm_core::KeyBuilder;
    use serde_json::json;

    fn key(op: &str) -> CacheKey {
        KeyBuilder::new().build("owner", op, &[]).expect("key")
    }

    #[tokio::test]
    async fn test_first_begin_is_leader() {
        let registry = Arc::new(InFlightRegistry::new());
        let flight = registry.begin(&key("op"), "op");
        assert!(flight.is_leader());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_followers_share_the_leaders_outcome() {
        let registry = Arc::new(InFlightRegistry::new());
        let k = key("op");

        let leader = match registry.begin(&k, "op") {
            Flight::Leader(permit) => permit,
            Flight::Follower(_) => panic!("first caller must lead"),
        };
        let mut follower_a = match registry.begin(&k, "op") {
            Flight::Follower(rx) => rx,
            Flight::Leader(_) => panic!("second caller must follow"),
        };
        let mut follower_b = match registry.begin(&k, "op") {
            Flight::Follower(rx) => rx,
            Flight::Leader(_) => panic!("third caller must follow"),
        };

        leader.complete(Ok(json!(42)));

        assert_eq!(follower_a.recv().await.expect("recv").expect("ok"), json!(42));
        assert_eq!(follower_b.recv().await.expect("recv").expect("ok"), json!(42));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_failure_fans_out_to_followers() {
        let registry = Arc::new(InFlightRegistry::new());
        let k = key("op");

        let leader = match registry.begin(&k, "op") {
            Flight::Leader(permit) => permit,
            Flight::Follower(_) => panic!("must lead"),
        };
        let mut follower = match registry.begin(&k, "op") {
            Flight::Follower(rx) => rx,
            Flight::Leader(_) => panic!("must follow"),
        };

        leader.complete(Err(EngineError::computation("op", "boom")));

        let outcome = follower.recv().await.expect("recv");
        assert!(matches!(outcome, Err(EngineError::Computation { .. })));
    }

    #[tokio::test]
    async fn test_begin_after_complete_starts_fresh() {
        let registry = Arc::new(InFlightRegistry::new());
        let k = key("op");

        match registry.begin(&k, "op") {
            Flight::Leader(permit) => permit.complete(Ok(json!(1))),
            Flight::Follower(_) => panic!("must lead"),
        }

        // No permanent caching here: the next begin leads again.
        assert!(registry.begin(&k, "op").is_leader());
    }

    #[tokio::test]
    async fn test_dropped_permit_fails_followers() {
        let registry = Arc::new(InFlightRegistry::new());
        let k = key("op");

        let leader = match registry.begin(&k, "op") {
            Flight::Leader(permit) => permit,
            Flight::Follower(_) => panic!("must lead"),
        };
        let mut follower = match registry.begin(&k, "op") {
            Flight::Follower(rx) => rx,
            Flight::Leader(_) => panic!("must follow"),
        };

        drop(leader);

        let outcome = follower.recv().await.expect("recv");
        assert!(matches!(outcome, Err(EngineError::Computation { .. })));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_keys_fly_independently() {
        let registry = Arc::new(InFlightRegistry::new());
        // Keep the permits bound; dropping a Flight ends its entry.
        let flight_a = registry.begin(&key("a"), "a");
        let flight_b = registry.begin(&key("b"), "b");
        assert!(flight_a.is_leader());
        assert!(flight_b.is_leader());
        assert_eq!(registry.len(), 2);

        drop(flight_a);
        assert_eq!(registry.len(), 1);
        drop(flight_b);
        assert!(registry.is_empty());
    }
}
