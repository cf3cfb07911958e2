//! Gameserver definitions and their rendered deployments.

use std::collections::BTreeMap;
use std::fmt;

use hearth_id::GameserverId;
use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Immutable user intent for one gameserver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameserverDefinition {
    pub uuid: GameserverId,
    pub name: String,
    /// Identity of the requesting user, as asserted by the auth layer.
    pub owner: String,
    /// Game kind, matched by exact name against the adapter registry.
    pub game: String,
    pub version: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// Transport protocol of a published port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkProtocol {
    Tcp,
    Udp,
}

impl NetworkProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkProtocol::Tcp => "tcp",
            NetworkProtocol::Udp => "udp",
        }
    }
}

impl fmt::Display for NetworkProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A port the container needs published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkPort {
    pub protocol: NetworkProtocol,
    pub container_port: u16,
}

impl NetworkPort {
    pub const fn tcp(container_port: u16) -> Self {
        Self {
            protocol: NetworkProtocol::Tcp,
            container_port,
        }
    }

    pub const fn udp(container_port: u16) -> Self {
        Self {
            protocol: NetworkProtocol::Udp,
            container_port,
        }
    }
}

impl fmt::Display for NetworkPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container_port, self.protocol)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
}

impl EnvironmentVariable {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Memory requirements in KiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceRequirements {
    /// Hard limit enforced by the runtime.
    pub memory_limit_kib: u64,
    /// Amount the scheduler commits on the assigned agent.
    pub memory_reservation_kib: u64,
}

impl ResourceRequirements {
    pub const fn from_mib(limit_mib: u64, reservation_mib: u64) -> Self {
        Self {
            memory_limit_kib: limit_mib * 1024,
            memory_reservation_kib: reservation_mib * 1024,
        }
    }
}

/// Runtime-facing rendering of a [`GameserverDefinition`].
///
/// `agent` is empty until the scheduler assigns the deployment, and stays
/// fixed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub uuid: GameserverId,
    pub image: String,
    #[serde(default)]
    pub env: Vec<EnvironmentVariable>,
    #[serde(default)]
    pub ports: Vec<NetworkPort>,
    pub resources: ResourceRequirements,
    #[serde(default)]
    pub agent: String,
}

impl Deployment {
    pub fn is_scheduled(&self) -> bool {
        !self.agent.is_empty()
    }

    /// Binds the deployment to `hostname`.
    ///
    /// Returns `Ok(true)` when the assignment was made, `Ok(false)` when the
    /// deployment was already bound to the same host.
    pub fn assign(&mut self, hostname: &str) -> Result<bool, ModelError> {
        crate::keys::validate_hostname(hostname)?;

        if self.agent.is_empty() {
            self.agent = hostname.to_string();
            return Ok(true);
        }

        if self.agent == hostname {
            return Ok(false);
        }

        Err(ModelError::AlreadyAssigned {
            current: self.agent.clone(),
            requested: hostname.to_string(),
        })
    }

    /// The port used for address-conflict checks on the agent.
    pub fn primary_port(&self) -> Option<&NetworkPort> {
        self.ports.first()
    }
}

/// A definition paired with its deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gameserver {
    pub definition: GameserverDefinition,
    pub deployment: Deployment,
}

impl Gameserver {
    pub fn uuid(&self) -> GameserverId {
        self.definition.uuid
    }

    pub fn game(&self) -> &str {
        &self.definition.game
    }

    /// Assigned agent hostname, empty when unscheduled.
    pub fn agent(&self) -> &str {
        &self.deployment.agent
    }
}
