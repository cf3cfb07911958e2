//! Reconciliation loop primitives.
//!
//! This library provides helpers for implementing reconciliation loops
//! that converge desired state to actual state. Key concepts:
//!
//! - **Desired state**: What the host should be running (from the control plane).
//! - **Actual state**: What the host is running (from the container runtime).
//! - **Plan**: The minimal set of creates and removes that closes the gap.
//!
//! # Invariants
//!
//! - Planning is pure and deterministic given the same inputs
//! - Applying a plan and planning again yields an empty plan
//! - At most one actual item per key survives a plan

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Reconciliation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// The desired set names the same key twice.
    #[error("duplicate desired key: {0}")]
    DuplicateDesired(String),
}

/// Convergence status of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// Actual matches desired.
    Converged,

    /// Actions are pending.
    Converging,
}

impl ConvergenceStatus {
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceStatus::Converged)
    }
}

/// Actions needed to move actual state onto desired state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan<D, A> {
    /// Desired items with no actual counterpart.
    pub to_create: Vec<D>,

    /// Actual items whose key is not desired.
    pub to_remove: Vec<A>,

    /// Extra actual items for a desired key beyond the first one seen.
    pub duplicates: Vec<A>,

    /// Number of desired items already satisfied.
    pub unchanged: usize,
}

impl<D, A> ReconcilePlan<D, A> {
    pub fn status(&self) -> ConvergenceStatus {
        if self.to_create.is_empty() && self.to_remove.is_empty() && self.duplicates.is_empty() {
            ConvergenceStatus::Converged
        } else {
            ConvergenceStatus::Converging
        }
    }

    /// Everything to remove, stale items first.
    pub fn removals(&self) -> impl Iterator<Item = &A> {
        self.to_remove.iter().chain(self.duplicates.iter())
    }
}

/// Diffs a desired set against an actual set by key.
///
/// Order of `to_create` follows `desired`; order of `to_remove` and
/// `duplicates` follows `actual`.
pub fn plan<D, A, K, FD, FA>(
    desired: Vec<D>,
    actual: Vec<A>,
    desired_key: FD,
    actual_key: FA,
) -> Result<ReconcilePlan<D, A>, ReconcileError>
where
    K: Ord + Clone + Display,
    FD: Fn(&D) -> K,
    FA: Fn(&A) -> K,
{
    let mut wanted = BTreeSet::new();
    for d in &desired {
        let key = desired_key(d);
        if !wanted.insert(key.clone()) {
            return Err(ReconcileError::DuplicateDesired(key.to_string()));
        }
    }

    let mut seen = BTreeSet::new();
    let mut to_remove = Vec::new();
    let mut duplicates = Vec::new();

    for a in actual {
        let key = actual_key(&a);
        if !wanted.contains(&key) {
            to_remove.push(a);
        } else if !seen.insert(key) {
            duplicates.push(a);
        }
    }

    let unchanged = seen.len();
    let to_create = desired
        .into_iter()
        .filter(|d| !seen.contains(&desired_key(d)))
        .collect();

    Ok(ReconcilePlan {
        to_create,
        to_remove,
        duplicates,
        unchanged,
    })
}

/// Retry tracker for failed operations.
#[derive(Debug, Clone)]
pub struct RetryTracker<K = String> {
    /// Maximum retries per resource.
    max_retries: u32,

    /// Retry window duration.
    window: Duration,

    /// Tracked failures: key -> (count, first_failure_time).
    failures: BTreeMap<K, (u32, Instant)>,
}

impl<K: Ord + Clone> RetryTracker<K> {
    /// Create a new retry tracker.
    pub fn new(max_retries: u32, window: Duration) -> Self {
        Self {
            max_retries,
            window,
            failures: BTreeMap::new(),
        }
    }

    /// Record a failure for a resource.
    ///
    /// Returns true if retries are exhausted.
    pub fn record_failure(&mut self, key: &K) -> bool {
        self.record_failure_at(key, Instant::now())
    }

    pub fn record_failure_at(&mut self, key: &K, now: Instant) -> bool {
        let (count, first) = self.failures.entry(key.clone()).or_insert((0, now));

        // Reset if outside window
        if now.saturating_duration_since(*first) > self.window {
            *count = 0;
            *first = now;
        }

        *count += 1;
        *count > self.max_retries
    }

    /// Check if retries are exhausted for a resource.
    pub fn is_exhausted(&self, key: &K) -> bool {
        self.is_exhausted_at(key, Instant::now())
    }

    pub fn is_exhausted_at(&self, key: &K, now: Instant) -> bool {
        let Some((count, first)) = self.failures.get(key) else {
            return false;
        };

        if now.saturating_duration_since(*first) > self.window {
            return false;
        }

        *count > self.max_retries
    }

    /// Failures recorded for a resource inside the current window.
    pub fn failures(&self, key: &K) -> u32 {
        self.failures.get(key).map(|(count, _)| *count).unwrap_or(0)
    }

    /// Clear failure tracking for a resource (on success).
    pub fn clear(&mut self, key: &K) {
        self.failures.remove(key);
    }

    /// Prune expired entries.
    pub fn prune(&mut self) {
        let now = Instant::now();
        let window = self.window;
        self.failures
            .retain(|_, (_, first)| now.saturating_duration_since(*first) <= window);
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Default reconciliation interval.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(5);

/// Default create attempts before backing off.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default retry window.
pub const DEFAULT_RETRY_WINDOW: Duration = Duration::from_secs(10 * 60);

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &&str) -> String {
        s.to_string()
    }

    #[test]
    fn test_plan_create_and_remove() {
        let desired = vec!["a", "b"];
        let actual = vec!["b", "c"];

        let p = plan(desired, actual, key, key).unwrap();

        assert_eq!(p.to_create, vec!["a"]);
        assert_eq!(p.to_remove, vec!["c"]);
        assert!(p.duplicates.is_empty());
        assert_eq!(p.unchanged, 1);
        assert_eq!(p.status(), ConvergenceStatus::Converging);
    }

    #[test]
    fn test_plan_converged() {
        let p = plan(vec!["a"], vec!["a"], key, key).unwrap();
        assert!(p.status().is_converged());
        assert_eq!(p.unchanged, 1);
    }

    #[test]
    fn test_plan_duplicates_keep_first() {
        let desired = vec!["a"];
        let actual = vec![("a", 1), ("a", 2), ("a", 3)];

        let p = plan(desired, actual, key, |(k, _)| k.to_string()).unwrap();

        assert!(p.to_create.is_empty());
        assert!(p.to_remove.is_empty());
        assert_eq!(p.duplicates, vec![("a", 2), ("a", 3)]);
        assert_eq!(p.removals().count(), 2);
    }

    #[test]
    fn test_plan_rejects_duplicate_desired() {
        let err = plan(vec!["a", "a"], Vec::<&str>::new(), key, key).unwrap_err();
        assert_eq!(err, ReconcileError::DuplicateDesired("a".to_string()));
    }

    #[test]
    fn test_retry_tracker() {
        let mut tracker = RetryTracker::new(3, Duration::from_secs(60));
        let r1 = "resource-1".to_string();
        let r2 = "resource-2".to_string();

        assert!(!tracker.record_failure(&r1)); // 1st
        assert!(!tracker.record_failure(&r1)); // 2nd
        assert!(!tracker.record_failure(&r1)); // 3rd
        assert!(tracker.record_failure(&r1)); // 4th - exhausted

        assert!(tracker.is_exhausted(&r1));
        assert!(!tracker.is_exhausted(&r2));
        assert_eq!(tracker.failures(&r1), 4);

        tracker.clear(&r1);
        assert!(!tracker.is_exhausted(&r1));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_retry_tracker_window_lapses() {
        let mut tracker = RetryTracker::new(1, Duration::from_secs(60));
        let start = Instant::now();
        let k = 7u32;

        tracker.record_failure_at(&k, start);
        assert!(tracker.record_failure_at(&k, start + Duration::from_secs(1)));
        assert!(tracker.is_exhausted_at(&k, start + Duration::from_secs(30)));
        assert!(!tracker.is_exhausted_at(&k, start + Duration::from_secs(61)));

        // A failure after the window starts a fresh count.
        assert!(!tracker.record_failure_at(&k, start + Duration::from_secs(62)));
        assert_eq!(tracker.failures(&k), 1);
    }

    mod proptest_plan {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn applying_a_plan_converges(
                desired in proptest::collection::btree_set(0u8..32, 0..16),
                actual in proptest::collection::vec(0u8..32, 0..24),
            ) {
                let desired: Vec<u8> = desired.into_iter().collect();
                let p = plan(desired.clone(), actual.clone(), |d| *d, |a| *a).unwrap();

                let mut after: Vec<u8> = actual;
                for r in p.removals() {
                    let pos = after.iter().position(|a| a == r).unwrap();
                    after.remove(pos);
                }
                after.extend(p.to_create.iter().copied());

                let again = plan(desired.clone(), after.clone(), |d| *d, |a| *a).unwrap();
                prop_assert!(again.status().is_converged());

                after.sort_unstable();
                prop_assert_eq!(after, desired);
            }
        }
    }
}
