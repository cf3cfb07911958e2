//! Game title adapters.
//!
//! Each supported game kind is one [`GameAdapter`] registered in a
//! [`GameRegistry`]. Adding a kind means registering one more adapter;
//! dispatch is by exact name match and never changes.

mod factorio;
mod minecraft;
mod teamspeak;

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};

use hearth_id::GameserverId;
use hearth_model::{Deployment, Gameserver, GameserverDefinition, NetworkPort, RunningInstance};
use serde::Serialize;
use thiserror::Error;

pub use factorio::FactorioAdapter;
pub use minecraft::MinecraftAdapter;
pub use teamspeak::TeamspeakAdapter;

/// Errors raised while rendering or addressing a gameserver.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("unsupported game kind: {0}")]
    UnsupportedGameKind(String),

    #[error("invalid parameters for {game}: {reason}")]
    InvalidParameters { game: String, reason: String },

    /// The instance has not bound its primary port yet.
    #[error("endpoint of gameserver {0} not ready")]
    EndpointNotReady(GameserverId),

    #[error("game kind already registered: {0}")]
    DuplicateGameKind(String),
}

/// One deployable version and the parameters it accepts (name -> description).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameOption {
    pub version: String,
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameMetadata {
    pub name: String,
    pub options: Vec<GameOption>,
}

impl GameMetadata {
    pub fn option(&self, version: &str) -> Option<&GameOption> {
        self.options.iter().find(|o| o.version == version)
    }
}

/// Rendering strategy for one game kind.
pub trait GameAdapter: Send + Sync {
    /// Game kind name, matched exactly against `GameserverDefinition::game`.
    fn name(&self) -> &'static str;

    fn metadata(&self) -> GameMetadata;

    /// Render a definition into an unassigned deployment. Pure.
    fn create_deployment(&self, definition: &GameserverDefinition) -> Result<Deployment, GameError>;

    /// Externally reachable `ip:port` of the primary port.
    fn endpoint(
        &self,
        gameserver: &Gameserver,
        instance: Option<&RunningInstance>,
    ) -> Result<String, GameError>;
}

/// Checks a definition against an adapter's advertised options.
///
/// The version must be advertised, every parameter must be declared for that
/// version, and values must be a single line of at most `max_value_len` bytes.
pub(crate) fn validate_definition(
    metadata: &GameMetadata,
    definition: &GameserverDefinition,
    max_value_len: usize,
) -> Result<(), GameError> {
    let invalid = |reason: String| GameError::InvalidParameters {
        game: metadata.name.clone(),
        reason,
    };

    let option = metadata
        .option(&definition.version)
        .ok_or_else(|| invalid(format!("unsupported version '{}'", definition.version)))?;

    for (key, value) in &definition.parameters {
        if !option.parameters.contains_key(key) {
            return Err(invalid(format!("unknown parameter '{key}'")));
        }
        if value.contains(['\n', '\r', '\0']) {
            return Err(invalid(format!("parameter '{key}' must be a single line")));
        }
        if value.len() > max_value_len {
            return Err(invalid(format!(
                "parameter '{key}' longer than {max_value_len} bytes"
            )));
        }
    }

    Ok(())
}

/// Formats the bound address of `port` on `instance`.
pub(crate) fn primary_endpoint(
    gameserver: &Gameserver,
    instance: Option<&RunningInstance>,
    port: NetworkPort,
) -> Result<String, GameError> {
    let not_ready = || GameError::EndpointNotReady(gameserver.uuid());

    let endpoint = instance
        .and_then(|i| i.endpoint.as_ref())
        .ok_or_else(not_ready)?;
    let mapping = endpoint
        .mapping(port.protocol, port.container_port)
        .ok_or_else(not_ready)?;

    Ok(match endpoint.ip_address.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, mapping.host_port).to_string(),
        Err(_) => format!("{}:{}", endpoint.ip_address, mapping.host_port),
    })
}

/// Ordered table of adapters keyed by game kind name.
#[derive(Default)]
pub struct GameRegistry {
    adapters: Vec<Box<dyn GameAdapter>>,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with Minecraft, Factorio and Teamspeak.
    pub fn with_defaults() -> Self {
        Self {
            adapters: vec![
                Box::new(MinecraftAdapter),
                Box::new(FactorioAdapter),
                Box::new(TeamspeakAdapter),
            ],
        }
    }

    pub fn register(&mut self, adapter: Box<dyn GameAdapter>) -> Result<(), GameError> {
        if self.adapters.iter().any(|a| a.name() == adapter.name()) {
            return Err(GameError::DuplicateGameKind(adapter.name().to_string()));
        }
        self.adapters.push(adapter);
        Ok(())
    }

    pub fn get(&self, game: &str) -> Result<&dyn GameAdapter, GameError> {
        self.adapters
            .iter()
            .find(|a| a.name() == game)
            .map(|a| &**a)
            .ok_or_else(|| GameError::UnsupportedGameKind(game.to_string()))
    }

    pub fn supported_games(&self) -> Vec<GameMetadata> {
        self.adapters.iter().map(|a| a.metadata()).collect()
    }

    pub fn create_deployment(
        &self,
        definition: &GameserverDefinition,
    ) -> Result<Deployment, GameError> {
        self.get(&definition.game)?.create_deployment(definition)
    }

    pub fn endpoint(
        &self,
        gameserver: &Gameserver,
        instance: Option<&RunningInstance>,
    ) -> Result<String, GameError> {
        self.get(gameserver.game())?.endpoint(gameserver, instance)
    }
}
