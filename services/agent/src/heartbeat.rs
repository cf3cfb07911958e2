//! Agent state reports.
//!
//! Each tick the agent sends the control plane a full snapshot: host
//! resources, self-measured usage, and the gameservers it currently runs as
//! read back from container labels.

use hearth_id::GameserverId;
use hearth_model::{
    AgentResourceUsage, AgentResources, AgentState, Endpoint, GameserverStatus, PortMapping,
    RunningInstance,
};
use tracing::warn;

use crate::runtime::ContainerSummary;

/// Ownership label; its value is the gameserver UUID.
pub const OWNER_LABEL: &str = "hearth.gameserver";
pub const UUID_LABEL: &str = "hearth.gameserver.uuid";
/// Address the container's ports were bound on at create time.
pub const IP_LABEL: &str = "hearth.gameserver.ip";

/// The gameserver a managed container belongs to, as a raw label value.
pub fn container_key(container: &ContainerSummary) -> String {
    container
        .labels
        .get(UUID_LABEL)
        .or_else(|| container.labels.get(OWNER_LABEL))
        .cloned()
        .unwrap_or_default()
}

/// True once the container has exited and will not run again on its own.
pub fn is_stopped(container: &ContainerSummary) -> bool {
    matches!(container.state.as_str(), "exited" | "dead")
}

/// Rebuild a running instance from a container's labels and ports.
pub fn running_instance(container: &ContainerSummary) -> Option<RunningInstance> {
    let key = container_key(container);
    let uuid: GameserverId = match key.parse() {
        Ok(uuid) => uuid,
        Err(e) => {
            warn!(
                container = %container.id,
                label = %key,
                error = %e,
                "Container has no valid gameserver label"
            );
            return None;
        }
    };

    let ip_address = container
        .labels
        .get(IP_LABEL)
        .cloned()
        .or_else(|| container.ports.iter().find_map(|p| p.ip.clone()));

    let endpoint = ip_address.map(|ip_address| Endpoint {
        ip_address,
        ports: container
            .ports
            .iter()
            .filter_map(|p| {
                p.public_port.map(|host_port| PortMapping {
                    protocol: p.protocol,
                    container_port: p.private_port,
                    host_port,
                })
            })
            .collect(),
    });

    Some(RunningInstance {
        uuid,
        status: GameserverStatus::from_runtime_state(&container.state),
        endpoint,
    })
}

/// The snapshot sent with `Register`.
pub fn agent_state(
    hostname: &str,
    resources: AgentResources,
    usage: AgentResourceUsage,
    containers: &[ContainerSummary],
) -> AgentState {
    let mut running_gameservers: Vec<RunningInstance> = Vec::new();
    for instance in containers.iter().filter_map(running_instance) {
        // Duplicates are removed later in the tick; report each UUID once.
        if !running_gameservers.iter().any(|r| r.uuid == instance.uuid) {
            running_gameservers.push(instance);
        }
    }

    AgentState {
        hostname: hostname.to_string(),
        resources,
        usage,
        running_gameservers,
    }
}
