//! Agent-facing RPC surface.
//!
//! Agents call exactly two methods: `Register` to report their state and
//! `GetGameserverDeployments` to learn what they should run. The HTTP
//! transport lives in `api::v1::agents`.

use hearth_model::{keys, AgentState, GameserverDeploymentsResponse, ModelError, RegisterResponse};
use thiserror::Error;
use tracing::{debug, info};

use crate::db::{DbError, StateStore};

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Store(#[from] DbError),
}

impl From<ModelError> for RpcError {
    fn from(err: ModelError) -> Self {
        RpcError::InvalidArgument(err.to_string())
    }
}

/// Serves agent registration and deployment lookup.
#[derive(Clone)]
pub struct AgentService {
    store: StateStore,
}

impl AgentService {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// Store the agent's full snapshot, replacing the previous one.
    pub async fn register(&self, state: AgentState) -> Result<RegisterResponse, RpcError> {
        keys::validate_hostname(&state.hostname)?;

        let running = state.running_gameservers.len();
        let agent = self.store.register_agent(state).await?;
        debug!(
            agent = %agent.hostname(),
            running,
            memory_kib = agent.state.resources.memory_kib,
            "Agent registered"
        );

        Ok(RegisterResponse {})
    }

    /// Every deployment assigned to `hostname`.
    pub async fn get_gameserver_deployments(
        &self,
        hostname: &str,
    ) -> Result<GameserverDeploymentsResponse, RpcError> {
        keys::validate_hostname(hostname)?;

        let deployments: Vec<_> = self
            .store
            .gameservers_for_agent(hostname)
            .await?
            .into_iter()
            .map(|gs| gs.deployment)
            .collect();

        if deployments.is_empty() {
            debug!(agent = %hostname, "No deployments assigned");
        } else {
            info!(agent = %hostname, count = deployments.len(), "Serving deployments");
        }

        Ok(GameserverDeploymentsResponse { deployments })
    }
}
