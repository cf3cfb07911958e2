//! Scheduler module for gameserver placement.
//!
//! The scheduler is responsible for:
//! - Finding gameservers whose deployment has no agent yet
//! - Filtering agents by liveness, free memory and free addresses per game kind
//! - Choosing one candidate through a pluggable [`SelectionPolicy`]
//! - Persisting the assignment exactly once
//!
//! A single scheduler instance is assumed; there is no cross-instance locking.

mod policy;
mod reconciler;
mod worker;

pub use policy::{Candidate, LeastLoaded, PolicyKind, RandomSelection, SelectionPolicy};
pub use reconciler::{
    SchedulerConfig, SchedulerError, SchedulerReconciler, SchedulerResult, TickStats,
};
pub use worker::SchedulerWorker;
