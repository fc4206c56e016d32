//! Proactive cache warm-up.
//!
//! The scheduler owns a set of [`OwnerRegistration`]s and repopulates their
//! entries on a cadence: once at startup (the bootstrap pass runs inside
//! the spawned task, so spawning never blocks the caller) and then on an
//! optional fixed interval. Each pass clears the owner's entries first and
//! then runs its warm tasks, so stale values are dropped even when a warm
//! task later fails.
//!
//! Warm-up failures are logged and counted, never fatal: a failed pass
//! leaves the affected operations on the cold-miss path until the next
//! trigger.

use prewarm_core::{EngineError, EngineResult};
use prewarm_store::CacheStore;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Warm-up cadence.
#[derive(Debug, Clone)]
pub struct WarmupConfig {
    /// Run a full warm-up pass as soon as the scheduler task starts.
    pub run_at_start: bool,
    /// Re-run the full pass on this period. `None` means bootstrap only.
    pub interval: Option<Duration>,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            run_at_start: true,
            interval: None,
        }
    }
}

impl WarmupConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn with_run_at_start(mut self, run_at_start: bool) -> Self {
        self.run_at_start = run_at_start;
        self
    }
}

// =============================================================================
// METRICS
// =============================================================================

/// Counters for warm-up activity. Cheap enough to bump from every pass.
#[derive(Debug, Default)]
pub struct WarmupMetrics {
    runs_completed: AtomicU64,
    runs_failed: AtomicU64,
    runs_coalesced: AtomicU64,
    entries_cleared: AtomicU64,
}

/// Point-in-time copy of [`WarmupMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarmupMetricsSnapshot {
    pub runs_completed: u64,
    pub runs_failed: u64,
    pub runs_coalesced: u64,
    pub entries_cleared: u64,
}

impl WarmupMetrics {
    pub fn snapshot(&self) -> WarmupMetricsSnapshot {
        WarmupMetricsSnapshot {
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            runs_coalesced: self.runs_coalesced.load(Ordering::Relaxed),
            entries_cleared: self.entries_cleared.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// SCHEDULER
// =============================================================================

use crate::memoizer::Memoizer;
use crate::registration::OwnerRegistration;

struct OwnerState<S: CacheStore> {
    registration: OwnerRegistration<S>,
    /// Claim bit for the clear-then-repopulate pass. A trigger that finds
    /// it set coalesces into the pass already running.
    warming: AtomicBool,
}

/// Drives warm-up passes over a set of owner registrations.
pub struct WarmupScheduler<S: CacheStore> {
    memoizer: Memoizer<S>,
    owners: Vec<Arc<OwnerState<S>>>,
    config: WarmupConfig,
    metrics: Arc<WarmupMetrics>,
}

impl<S: CacheStore + 'static> WarmupScheduler<S> {
    pub fn new(memoizer: Memoizer<S>, config: WarmupConfig) -> Self {
        Self {
            memoizer,
            owners: Vec::new(),
            config,
            metrics: Arc::new(WarmupMetrics::default()),
        }
    }

    /// Add an owner. Rejects a second registration for the same owner name.
    pub fn register(&mut self, registration: OwnerRegistration<S>) -> EngineResult<()> {
        if self
            .owners
            .iter()
            .any(|s| s.registration.owner() == registration.owner())
        {
            return Err(EngineError::Registration {
                owner: registration.owner().to_owned(),
                reason: "owner is already registered".to_owned(),
            });
        }
        self.owners.push(Arc::new(OwnerState {
            registration,
            warming: AtomicBool::new(false),
        }));
        Ok(())
    }

    pub fn metrics(&self) -> Arc<WarmupMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Warm one owner immediately, on the caller's task.
    ///
    /// Returns `Ok(false)` when the trigger coalesced into a pass that was
    /// already running for that owner.
    pub async fn run_owner_now(&self, owner: &str) -> EngineResult<bool> {
        let state = self
            .owners
            .iter()
            .find(|s| s.registration.owner() == owner)
            .ok_or_else(|| EngineError::Registration {
                owner: owner.to_owned(),
                reason: "owner is not registered".to_owned(),
            })?;
        Ok(self.warm_owner(state).await)
    }

    /// Run a full pass over every registered owner, on the caller's task.
    pub async fn run_all_now(&self) {
        for state in &self.owners {
            self.warm_owner(state).await;
        }
    }

    /// Clear then repopulate one owner. Returns `false` if the trigger
    /// coalesced.
    async fn warm_owner(&self, state: &OwnerState<S>) -> bool {
        let owner = state.registration.owner();

        // Single claim per owner: concurrent triggers fold into the
        // running pass instead of stacking clear/repopulate cycles.
        if state
            .warming
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.metrics.runs_coalesced.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(owner, "Warm-up already in progress, coalescing trigger");
            return false;
        }
        let _release = ClaimGuard(&state.warming);

        match self.memoizer.clear_owner(owner).await {
            Ok(cleared) => {
                self.metrics
                    .entries_cleared
                    .fetch_add(cleared, Ordering::Relaxed);
                tracing::debug!(owner, cleared, "Cleared entries before warm-up");
            }
            Err(e) => {
                self.metrics.runs_failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(owner, error = %e, "Warm-up clear failed, skipping pass");
                return true;
            }
        }

        let mut failed = 0u64;
        for task in state.registration.warm_tasks() {
            if let Err(e) = task.warm().await {
                failed += 1;
                tracing::warn!(owner, error = %e, "Warm task failed");
            }
        }

        if failed > 0 {
            self.metrics.runs_failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(owner, failed, "Warm-up pass completed with failures");
        } else {
            self.metrics.runs_completed.fetch_add(1, Ordering::Relaxed);
            tracing::info!(owner, "Warm-up pass completed");
        }
        true
    }

    /// Spawn the scheduler loop. The bootstrap pass (when configured) runs
    /// inside the spawned task.
    pub fn spawn(self) -> WarmupHandle<S> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = Arc::new(self);
        let join = tokio::spawn(warmup_task(Arc::clone(&scheduler), shutdown_rx));
        WarmupHandle {
            scheduler,
            shutdown_tx,
            join,
        }
    }
}

struct ClaimGuard<'a>(&'a AtomicBool);

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The scheduler loop: optional bootstrap pass, then interval ticks until
/// shutdown is signalled.
async fn warmup_task<S: CacheStore + 'static>(
    scheduler: Arc<WarmupScheduler<S>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tracing::info!(
        owners = scheduler.owners.len(),
        interval = ?scheduler.config.interval,
        "Warm-up scheduler started"
    );

    if scheduler.config.run_at_start {
        scheduler.run_all_now().await;
    }

    let Some(period) = scheduler.config.interval else {
        // Bootstrap-only mode: stay alive so the handle's shutdown and
        // join semantics are uniform.
        let _ = shutdown_rx.wait_for(|stop| *stop).await;
        tracing::info!("Warm-up scheduler stopped");
        return;
    };

    // First tick lands one full period from now; the bootstrap pass above
    // already covered "now".
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                scheduler.run_all_now().await;
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("Warm-up scheduler stopped");
}

/// Handle to a spawned scheduler: signal shutdown, await the task, read
/// metrics, trigger an owner out of band.
pub struct WarmupHandle<S: CacheStore> {
    scheduler: Arc<WarmupScheduler<S>>,
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl<S: CacheStore + 'static> WarmupHandle<S> {
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn join(self) -> Arc<WarmupMetrics> {
        let _ = self.join.await;
        self.scheduler.metrics()
    }

    pub fn metrics(&self) -> Arc<WarmupMetrics> {
        self.scheduler.metrics()
    }

    /// Warm one owner now, independent of the interval. Triggers that land
    /// while a pass for that owner is running coalesce into it.
    pub async fn run_owner_now(&self, owner: &str) -> EngineResult<bool> {
        self.scheduler.run_owner_now(owner).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::OwnerRegistration;
    use prewarm_core::FnOperation;
    use prewarm_test_utils::CountingOperation;
    use serde_json::{json, Value};

    fn counting_registration(
        memoizer: &Memoizer<prewarm_store::MemoryStore>,
        owner: &str,
        op: Arc<CountingOperation>,
    ) -> OwnerRegistration<prewarm_store::MemoryStore> {
        let wrapped = memoizer.wrap(owner, "getAll", None, op).unwrap();
        let warm_target = wrapped.clone();
        OwnerRegistration::builder(owner)
            .operation(wrapped)
            .unwrap()
            .warm_with(move || {
                let target = warm_target.clone();
                async move { target.call(&[]).await.map(|_| ()) }
            })
            .build()
    }

    #[tokio::test]
    async fn test_pass_clears_then_repopulates() {
        let memoizer = Memoizer::local();
        let op = Arc::new(CountingOperation::returning(json!([1, 2])));
        let mut scheduler = WarmupScheduler::new(memoizer.clone(), WarmupConfig::new());
        scheduler
            .register(counting_registration(&memoizer, "sources", op.clone()))
            .unwrap();

        // Seed a stale entry, then warm: the pass must clear it and the
        // warm task must repopulate.
        memoizer
            .get_or_compute("sources", "getAll", &[], None, op.as_ref())
            .await
            .unwrap();
        assert_eq!(op.calls(), 1);

        assert!(scheduler.run_owner_now("sources").await.unwrap());
        assert_eq!(op.calls(), 2, "warm task must recompute after the clear");

        let snap = scheduler.metrics().snapshot();
        assert_eq!(snap.runs_completed, 1);
        assert_eq!(snap.entries_cleared, 1);

        // The repopulated entry serves hits.
        memoizer
            .get_or_compute("sources", "getAll", &[], None, op.as_ref())
            .await
            .unwrap();
        assert_eq!(op.calls(), 2);
    }

    #[tokio::test]
    async fn test_warm_task_failure_is_counted_not_fatal() {
        let memoizer = Memoizer::local();
        let mut scheduler = WarmupScheduler::new(memoizer.clone(), WarmupConfig::new());
        let reg = OwnerRegistration::builder("sources")
            .warm_with(|| async { Err(EngineError::warmup("sources", "backend down")) })
            .build();
        scheduler.register(reg).unwrap();

        assert!(scheduler.run_owner_now("sources").await.unwrap());
        let snap = scheduler.metrics().snapshot();
        assert_eq!(snap.runs_failed, 1);
        assert_eq!(snap.runs_completed, 0);
    }

    #[tokio::test]
    async fn test_duplicate_owner_rejected() {
        let memoizer = Memoizer::local();
        let mut scheduler = WarmupScheduler::new(memoizer, WarmupConfig::new());
        scheduler
            .register(OwnerRegistration::builder("sources").build())
            .unwrap();
        let err = scheduler
            .register(OwnerRegistration::builder("sources").build())
            .expect_err("duplicate owner");
        assert!(matches!(err, EngineError::Registration { .. }));
    }

    #[tokio::test]
    async fn test_unknown_owner_rejected() {
        let memoizer = Memoizer::local();
        let scheduler = WarmupScheduler::new(memoizer, WarmupConfig::new());
        assert!(scheduler.run_owner_now("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_triggers_coalesce() {
        let memoizer = Memoizer::local();
        let mut scheduler = WarmupScheduler::new(memoizer.clone(), WarmupConfig::new());

        // A warm task slow enough that the second trigger lands mid-pass.
        let reg = OwnerRegistration::builder("sources")
            .warm_with(|| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            })
            .build();
        scheduler.register(reg).unwrap();

        let scheduler = Arc::new(scheduler);
        let first = {
            let s = Arc::clone(&scheduler);
            tokio::spawn(async move { s.run_owner_now("sources").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = scheduler.run_owner_now("sources").await.unwrap();

        assert!(first.await.unwrap().unwrap(), "first trigger runs the pass");
        assert!(!second, "second trigger coalesces");
        assert_eq!(scheduler.metrics().snapshot().runs_coalesced, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_loop_bootstraps_and_ticks() {
        let memoizer = Memoizer::local();
        let op = Arc::new(CountingOperation::returning(json!("warm")));
        let mut scheduler = WarmupScheduler::new(
            memoizer.clone(),
            WarmupConfig::new().with_interval(Duration::from_secs(60)),
        );
        scheduler
            .register(counting_registration(&memoizer, "sources", op.clone()))
            .unwrap();

        let handle = scheduler.spawn();

        // Bootstrap pass.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(op.calls(), 1);

        // One interval later, a second pass. Not two: the first tick is a
        // full period after start, not immediate.
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(op.calls(), 2);

        handle.shutdown();
        let metrics = handle.join().await;
        assert_eq!(metrics.snapshot().runs_completed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_only_mode_runs_once() {
        let memoizer = Memoizer::local();
        let op = Arc::new(CountingOperation::returning(json!("warm")));
        let mut scheduler = WarmupScheduler::new(memoizer.clone(), WarmupConfig::new());
        scheduler
            .register(counting_registration(&memoizer, "sources", op.clone()))
            .unwrap();

        let handle = scheduler.spawn();
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(op.calls(), 1);

        handle.shutdown();
        handle.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_at_start_disabled_waits_for_interval() {
        let memoizer = Memoizer::local();
        let op = Arc::new(CountingOperation::returning(json!("warm")));
        let mut scheduler = WarmupScheduler::new(
            memoizer.clone(),
            WarmupConfig::new()
                .with_run_at_start(false)
                .with_interval(Duration::from_secs(30)),
        );
        scheduler
            .register(counting_registration(&memoizer, "sources", op.clone()))
            .unwrap();

        let handle = scheduler.spawn();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(op.calls(), 0, "no bootstrap pass when disabled");

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(op.calls(), 1);

        handle.shutdown();
        handle.join().await;
    }

    #[tokio::test]
    async fn test_handle_triggers_owner_out_of_band() {
        let memoizer = Memoizer::local();
        let op = Arc::new(CountingOperation::returning(json!("warm")));
        let mut scheduler = WarmupScheduler::new(
            memoizer.clone(),
            WarmupConfig::new().with_run_at_start(false),
        );
        scheduler
            .register(counting_registration(&memoizer, "sources", op.clone()))
            .unwrap();

        let handle = scheduler.spawn();
        assert!(handle.run_owner_now("sources").await.unwrap());
        assert_eq!(op.calls(), 1);
        assert_eq!(handle.metrics().snapshot().runs_completed, 1);

        handle.shutdown();
        handle.join().await;
    }

    #[tokio::test]
    async fn test_failed_pass_leaves_cold_miss_path_working() {
        let memoizer = Memoizer::local();
        let mut scheduler = WarmupScheduler::new(memoizer.clone(), WarmupConfig::new());
        let reg = OwnerRegistration::builder("sources")
            .warm_with(|| async { Err(EngineError::warmup("sources", "source offline")) })
            .build();
        scheduler.register(reg).unwrap();
        scheduler.run_owner_now("sources").await.unwrap();

        // Callers still get values through the normal miss path.
        let op = FnOperation::new(|_args: Vec<Value>| async move { Ok(json!("fresh")) });
        let value = memoizer
            .get_or_compute("sources", "getAll", &[], None, &op)
            .await
            .unwrap();
        assert_eq!(value, json!("fresh"));
    }
}
