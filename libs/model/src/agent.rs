//! Agent-reported state.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use hearth_id::GameserverId;
use serde::{Deserialize, Serialize};

use crate::NetworkProtocol;

/// Host capacity snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgentResources {
    pub cpus: u32,
    /// Total memory usable by gameservers, in KiB.
    pub memory_kib: u64,
    /// Number of distinct addresses in the agent's pool.
    pub ip_addresses: u32,
}

/// Self-reported consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgentResourceUsage {
    pub memory_kib: u64,
}

/// Runtime-observed status of a gameserver container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameserverStatus {
    Starting,
    Running,
    Stopped,
    Unknown,
}

impl GameserverStatus {
    /// Maps a container runtime state string onto a status.
    pub fn from_runtime_state(state: &str) -> Self {
        match state {
            "running" => GameserverStatus::Running,
            "created" | "restarting" => GameserverStatus::Starting,
            "exited" | "dead" | "removing" | "paused" => GameserverStatus::Stopped,
            _ => GameserverStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GameserverStatus::Starting => "STARTING",
            GameserverStatus::Running => "RUNNING",
            GameserverStatus::Stopped => "STOPPED",
            GameserverStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for GameserverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub protocol: NetworkProtocol,
    pub container_port: u16,
    pub host_port: u16,
}

/// Address a running instance is actually bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub ip_address: String,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
}

impl Endpoint {
    pub fn mapping(&self, protocol: NetworkProtocol, container_port: u16) -> Option<&PortMapping> {
        self.ports
            .iter()
            .find(|p| p.protocol == protocol && p.container_port == container_port)
    }
}

/// A gameserver container observed on an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningInstance {
    pub uuid: GameserverId,
    pub status: GameserverStatus,
    #[serde(default)]
    pub endpoint: Option<Endpoint>,
}

/// Snapshot an agent reports on each tick. Always a full replace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    pub hostname: String,
    pub resources: AgentResources,
    #[serde(default)]
    pub usage: AgentResourceUsage,
    #[serde(default)]
    pub running_gameservers: Vec<RunningInstance>,
}

impl AgentState {
    pub fn running_instance(&self, uuid: GameserverId) -> Option<&RunningInstance> {
        self.running_gameservers.iter().find(|i| i.uuid == uuid)
    }
}

/// Control-plane view of an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    #[serde(flatten)]
    pub state: AgentState,
    /// Set by the store on every registration.
    pub last_contact: DateTime<Utc>,
}

impl Agent {
    pub fn hostname(&self) -> &str {
        &self.state.hostname
    }

    /// True when the agent has not registered within `contact_delay` of `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, contact_delay: Duration) -> bool {
        now - self.last_contact > contact_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("running", GameserverStatus::Running)]
    #[case("created", GameserverStatus::Starting)]
    #[case("restarting", GameserverStatus::Starting)]
    #[case("exited", GameserverStatus::Stopped)]
    #[case("dead", GameserverStatus::Stopped)]
    #[case("something-new", GameserverStatus::Unknown)]
    fn test_status_from_runtime_state(#[case] state: &str, #[case] expected: GameserverStatus) {
        assert_eq!(GameserverStatus::from_runtime_state(state), expected);
    }

    fn agent(last_contact: DateTime<Utc>) -> Agent {
        Agent {
            state: AgentState {
                hostname: "host-a".to_string(),
                resources: AgentResources {
                    cpus: 4,
                    memory_kib: 8 * 1024 * 1024,
                    ip_addresses: 2,
                },
                usage: AgentResourceUsage::default(),
                running_gameservers: vec![],
            },
            last_contact,
        }
    }

    #[rstest]
    #[case(29, false)]
    #[case(30, false)]
    #[case(31, true)]
    fn test_staleness_boundary(#[case] age_secs: i64, #[case] stale: bool) {
        let now = Utc::now();
        let a = agent(now - Duration::seconds(age_secs));
        assert_eq!(a.is_stale(now, Duration::seconds(30)), stale);
    }

    #[test]
    fn test_agent_serializes_flat() {
        let a = agent(Utc::now());
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["hostname"], "host-a");
        assert!(json.get("last_contact").is_some());
        let back: Agent = serde_json::from_value(json).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn test_endpoint_mapping_lookup() {
        let ep = Endpoint {
            ip_address: "10.0.0.1".to_string(),
            ports: vec![
                PortMapping {
                    protocol: NetworkProtocol::Udp,
                    container_port: 9987,
                    host_port: 9987,
                },
                PortMapping {
                    protocol: NetworkProtocol::Tcp,
                    container_port: 30033,
                    host_port: 30033,
                },
            ],
        };
        assert!(ep.mapping(NetworkProtocol::Udp, 9987).is_some());
        assert!(ep.mapping(NetworkProtocol::Tcp, 9987).is_none());
    }
}
