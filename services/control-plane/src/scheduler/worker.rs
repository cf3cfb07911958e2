//! Scheduler background worker.
//!
//! Runs the scheduler pass on a fixed interval.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, instrument};

use super::reconciler::SchedulerReconciler;

/// Scheduler worker that runs the placement loop.
pub struct SchedulerWorker {
    reconciler: SchedulerReconciler,
    interval: Duration,
}

impl SchedulerWorker {
    pub fn new(reconciler: SchedulerReconciler, interval: Duration) -> Self {
        Self {
            reconciler,
            interval,
        }
    }

    /// Run the scheduler worker until shutdown is signaled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting scheduler worker"
        );

        let mut interval = tokio::time::interval(self.interval);
        // Don't immediately tick on startup - wait for first interval
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.reconciler.tick().await {
                        error!(error = %e, "Scheduler pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Scheduler worker shutting down");
                        break;
                    }
                }
            }
        }
    }
}
