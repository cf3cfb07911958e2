//! User-facing gameserver and agent operations.
//!
//! Creation renders the definition synchronously, so unsupported kinds and
//! bad parameters fail the request. Placement happens later in the scheduler.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hearth_id::GameserverId;
use hearth_model::{
    Agent, AgentResourceUsage, AgentResources, Gameserver, GameserverDefinition, GameserverStatus,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::db::{DbError, StateStore};
use crate::games::{GameError, GameMetadata, GameRegistry};

const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum GameserverServiceError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Game(#[from] GameError),

    #[error("gameserver not found: {0}")]
    NotFound(GameserverId),

    #[error(transparent)]
    Store(#[from] DbError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateGameserverRequest {
    pub name: String,
    pub game: String,
    pub version: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGameserverResponse {
    pub uuid: GameserverId,
    pub status: String,
}

/// One row of a user's gameserver listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameserverSummary {
    pub uuid: GameserverId,
    pub name: String,
    pub game: String,
    pub version: String,
    /// `ip:port`, empty until the agent reports the port bound.
    pub address: String,
    pub status: GameserverStatus,
}

/// One row of the agent listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOverview {
    pub hostname: String,
    pub last_contact: DateTime<Utc>,
    pub resources: AgentResources,
    pub usage: AgentResourceUsage,
    /// Sum of reservations of gameservers assigned here, in KiB.
    pub reserved_memory_kib: u64,
    pub gameservers: usize,
}

#[derive(Clone)]
pub struct GameserverService {
    store: StateStore,
    registry: Arc<GameRegistry>,
}

impl GameserverService {
    pub fn new(store: StateStore, registry: Arc<GameRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn supported_games(&self) -> Vec<GameMetadata> {
        self.registry.supported_games()
    }

    /// Render and store a new, unscheduled gameserver.
    pub async fn create(
        &self,
        owner: &str,
        request: CreateGameserverRequest,
    ) -> Result<CreateGameserverResponse, GameserverServiceError> {
        let name = request.name.trim();
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(GameserverServiceError::InvalidRequest(format!(
                "name must be 1 to {MAX_NAME_LEN} characters"
            )));
        }

        let definition = GameserverDefinition {
            uuid: GameserverId::new(),
            name: name.to_string(),
            owner: owner.to_string(),
            game: request.game,
            version: request.version,
            parameters: request.parameters,
        };
        let deployment = self.registry.create_deployment(&definition)?;
        let gameserver = Gameserver {
            definition,
            deployment,
        };

        self.store.create_gameserver(&gameserver).await?;
        info!(
            gameserver = %gameserver.uuid(),
            game = %gameserver.game(),
            owner,
            "Gameserver created"
        );

        Ok(CreateGameserverResponse {
            uuid: gameserver.uuid(),
            status: "Order accepted".to_string(),
        })
    }

    /// The owner's gameservers, with status and address from agent reports.
    pub async fn list(
        &self,
        owner: &str,
    ) -> Result<Vec<GameserverSummary>, GameserverServiceError> {
        let gameservers = self.store.list_gameservers().await?;
        let agents: HashMap<String, Agent> = self
            .store
            .list_agents()
            .await?
            .into_iter()
            .map(|a| (a.state.hostname.clone(), a))
            .collect();

        Ok(gameservers
            .iter()
            .filter(|gs| gs.definition.owner == owner)
            .map(|gs| {
                let instance = agents
                    .get(gs.agent())
                    .and_then(|a| a.state.running_instance(gs.uuid()));

                let status = instance
                    .map(|i| i.status)
                    .unwrap_or(GameserverStatus::Unknown);
                let address = match self.registry.endpoint(gs, instance) {
                    Ok(address) => address,
                    Err(e) => {
                        debug!(gameserver = %gs.uuid(), reason = %e, "No address yet");
                        String::new()
                    }
                };

                GameserverSummary {
                    uuid: gs.uuid(),
                    name: gs.definition.name.clone(),
                    game: gs.definition.game.clone(),
                    version: gs.definition.version.clone(),
                    address,
                    status,
                }
            })
            .collect())
    }

    /// Remove a gameserver. The agent tears the container down on its next tick.
    pub async fn delete(
        &self,
        owner: &str,
        uuid: GameserverId,
    ) -> Result<(), GameserverServiceError> {
        let gameserver = match self.store.get_gameserver(&uuid).await {
            Ok(gs) => gs,
            Err(e) if e.is_not_found() => return Err(GameserverServiceError::NotFound(uuid)),
            Err(e) => return Err(e.into()),
        };

        // Other owners' gameservers are invisible.
        if gameserver.definition.owner != owner {
            return Err(GameserverServiceError::NotFound(uuid));
        }

        match self.store.delete_gameserver(&uuid).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Err(GameserverServiceError::NotFound(uuid)),
            Err(e) => return Err(e.into()),
        }

        info!(gameserver = %uuid, agent = %gameserver.agent(), "Gameserver deleted");
        Ok(())
    }

    pub async fn agents(&self) -> Result<Vec<AgentOverview>, GameserverServiceError> {
        let gameservers = self.store.list_gameservers().await?;
        let agents = self.store.list_agents().await?;

        Ok(agents
            .into_iter()
            .map(|agent| {
                let assigned: Vec<_> = gameservers
                    .iter()
                    .filter(|gs| gs.agent() == agent.hostname())
                    .collect();

                AgentOverview {
                    reserved_memory_kib: assigned
                        .iter()
                        .map(|gs| gs.deployment.resources.memory_reservation_kib)
                        .sum(),
                    gameservers: assigned.len(),
                    hostname: agent.state.hostname,
                    last_contact: agent.last_contact,
                    resources: agent.state.resources,
                    usage: agent.state.usage,
                }
            })
            .collect())
    }
}
