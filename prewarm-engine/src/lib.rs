//! Memoization and cache warm-up engine.
//!
//! The engine turns expensive read-mostly operations into cached lookups:
//!
//! - [`Memoizer`] runs an operation at most once per distinct argument
//!   list while an entry is live, deduplicating concurrent callers through
//!   [`InFlightRegistry`] so a cold miss under load costs one computation.
//! - [`WarmupScheduler`] repopulates registered owners at startup and on
//!   an interval, so first callers land on warm entries.
//! - [`BulkInvalidator`] drops everything an owner has cached in one
//!   prefix sweep.
//!
//! Operations are wrapped explicitly via [`Memoizer::wrap`] and grouped
//! into [`OwnerRegistration`]s; there is no interception layer.

pub mod inflight;
pub mod invalidate;
pub mod memoizer;
pub mod registration;
pub mod warmup;

pub use inflight::{Flight, FlightOutcome, FlightPermit, InFlightRegistry};
pub use invalidate::BulkInvalidator;
pub use memoizer::{MemoizedOp, Memoizer, MemoizerConfig};
pub use registration::{FnWarmTask, OwnerRegistration, OwnerRegistrationBuilder, WarmTask};
pub use warmup::{
    WarmupConfig, WarmupHandle, WarmupMetrics, WarmupMetricsSnapshot, WarmupScheduler,
};
