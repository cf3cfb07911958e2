//! Scheduler reconciler for gameserver placement.
//!
//! Each pass:
//! - Reads every gameserver and every agent from the store
//! - Filters agents per unscheduled gameserver (liveness, memory, addresses)
//! - Picks one survivor through the configured [`SelectionPolicy`]
//! - Persists the assignment
//!
//! A failed read aborts the pass. A failure on one gameserver never stops
//! the others.

use std::time::Duration;

use chrono::{DateTime, Utc};
use hearth_id::GameserverId;
use hearth_model::{Agent, Gameserver, ModelError};
use tracing::{debug, info, instrument, warn};

use super::policy::{Candidate, SelectionPolicy};
use crate::db::{DbError, StateStore};

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors that can occur during scheduling.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("store error: {0}")]
    Store(#[from] DbError),

    /// No live agent has room. Retried next pass.
    #[error("no agent has capacity for gameserver {gameserver}")]
    NoCapacity { gameserver: GameserverId },

    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Agents silent for longer than this are never candidates.
    pub agent_contact_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            agent_contact_delay: Duration::from_secs(30),
        }
    }
}

/// Counters for one pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    /// Unscheduled gameservers looked at.
    pub considered: usize,
    pub scheduled: usize,
    pub no_capacity: usize,
    pub failed: usize,
}

/// The scheduler reconciler.
pub struct SchedulerReconciler {
    store: StateStore,
    policy: Box<dyn SelectionPolicy>,
    contact_delay: chrono::Duration,
}

impl SchedulerReconciler {
    pub fn new(
        store: StateStore,
        policy: Box<dyn SelectionPolicy>,
        config: SchedulerConfig,
    ) -> Self {
        let contact_delay =
            chrono::Duration::from_std(config.agent_contact_delay).unwrap_or(chrono::Duration::MAX);
        Self {
            store,
            policy,
            contact_delay,
        }
    }

    /// Run a single pass against the current time.
    pub async fn tick(&self) -> SchedulerResult<TickStats> {
        self.tick_at(Utc::now()).await
    }

    /// Run a single pass, judging agent liveness against `now`.
    #[instrument(skip(self), fields(policy = self.policy.name()))]
    pub async fn tick_at(&self, now: DateTime<Utc>) -> SchedulerResult<TickStats> {
        let mut stats = TickStats::default();

        let mut gameservers = self.store.list_gameservers().await?;
        let agents = self.store.list_agents().await?;
        debug!(
            gameservers = gameservers.len(),
            agents = agents.len(),
            "Loaded scheduling snapshot"
        );

        for idx in 0..gameservers.len() {
            if gameservers[idx].deployment.is_scheduled() {
                continue;
            }
            stats.considered += 1;
            let uuid = gameservers[idx].uuid();

            match self.schedule_one(&gameservers, idx, &agents, now).await {
                Ok(hostname) => {
                    info!(gameserver = %uuid, agent = %hostname, "Gameserver scheduled");
                    // Later placements in this pass must see this one.
                    gameservers[idx].deployment.agent = hostname;
                    stats.scheduled += 1;
                }
                Err(SchedulerError::NoCapacity { .. }) => {
                    info!(gameserver = %uuid, "No capacity, will retry next pass");
                    stats.no_capacity += 1;
                }
                Err(e) => {
                    warn!(gameserver = %uuid, error = %e, "Failed to schedule gameserver");
                    stats.failed += 1;
                }
            }
        }

        if stats.considered > 0 {
            info!(
                considered = stats.considered,
                scheduled = stats.scheduled,
                no_capacity = stats.no_capacity,
                failed = stats.failed,
                "Scheduling pass complete"
            );
        }

        Ok(stats)
    }

    async fn schedule_one(
        &self,
        gameservers: &[Gameserver],
        idx: usize,
        agents: &[Agent],
        now: DateTime<Utc>,
    ) -> SchedulerResult<String> {
        let target = &gameservers[idx];
        let candidates = self.candidates(gameservers, idx, agents, now);

        let chosen = self
            .policy
            .select(&candidates)
            .ok_or(SchedulerError::NoCapacity {
                gameserver: target.uuid(),
            })?;

        let mut updated = target.clone();
        updated.deployment.assign(&chosen.hostname)?;
        self.store.update_gameserver(&updated).await?;

        Ok(chosen.hostname.clone())
    }

    /// Agents able to take `gameservers[idx]`.
    fn candidates(
        &self,
        gameservers: &[Gameserver],
        idx: usize,
        agents: &[Agent],
        now: DateTime<Utc>,
    ) -> Vec<Candidate> {
        let target = &gameservers[idx];
        let requested = target.deployment.resources.memory_reservation_kib as i64;

        agents
            .iter()
            .filter_map(|agent| {
                let hostname = agent.hostname();

                if agent.is_stale(now, self.contact_delay) {
                    debug!(
                        agent = %hostname,
                        last_contact = %agent.last_contact,
                        "Skipping stale agent"
                    );
                    return None;
                }

                let (committed, same_kind) = gameservers
                    .iter()
                    .enumerate()
                    .filter(|(i, gs)| *i != idx && gs.agent() == hostname)
                    .fold((0i64, 0i64), |(mem, kind), (_, gs)| {
                        let same = i64::from(gs.game() == target.game());
                        (
                            mem + gs.deployment.resources.memory_reservation_kib as i64,
                            kind + same,
                        )
                    });

                let resources = &agent.state.resources;
                let free_memory_kib = resources.memory_kib as i64 - committed - requested;
                if free_memory_kib <= 0 {
                    debug!(agent = %hostname, committed, requested, "Agent out of memory");
                    return None;
                }

                let free_addresses = i64::from(resources.ip_addresses) - same_kind;
                if free_addresses <= 0 {
                    debug!(agent = %hostname, same_kind, "Agent out of addresses");
                    return None;
                }

                Some(Candidate {
                    hostname: hostname.to_string(),
                    free_memory_kib,
                    free_addresses,
                })
            })
            .collect()
    }
}
