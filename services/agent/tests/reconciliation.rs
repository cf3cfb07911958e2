//! Agent reconciliation tests.
//!
//! Drive the reconciler against the mock runtime and an in-memory control
//! plane, checking convergence, idempotency, address allocation, and the
//! start-failure cleanup and backoff policy.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hearth_agent::{
    heartbeat::{IP_LABEL, OWNER_LABEL, UUID_LABEL},
    runtime::{ContainerSummary, PublishedPort},
    AgentError, ClientError, ControlPlane, MockRuntime, ReconcileReport, Reconciler,
    ReconcilerConfig, SystemResources,
};
use hearth_id::GameserverId;
use hearth_model::{
    AgentState, Deployment, EnvironmentVariable, GameserverStatus, NetworkPort, NetworkProtocol,
    ResourceRequirements,
};
use hearth_networking::AddressPool;

/// Control plane double: serves a fixed deployment list and records registers.
#[derive(Default)]
struct FakeControlPlane {
    deployments: Mutex<Vec<Deployment>>,
    registered: Mutex<Vec<AgentState>>,
    unreachable: Mutex<bool>,
    reject_register: Mutex<bool>,
}

impl FakeControlPlane {
    fn set_deployments(&self, deployments: Vec<Deployment>) {
        *self.deployments.lock().unwrap() = deployments;
    }

    fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock().unwrap() = unreachable;
    }

    fn set_reject_register(&self, reject: bool) {
        *self.reject_register.lock().unwrap() = reject;
    }

    fn last_state(&self) -> AgentState {
        self.registered.lock().unwrap().last().cloned().unwrap()
    }

    fn unavailable() -> ClientError {
        ClientError::Status {
            status: 503,
            body: "unavailable".to_string(),
        }
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn register(&self, state: &AgentState) -> Result<(), ClientError> {
        if *self.unreachable.lock().unwrap() || *self.reject_register.lock().unwrap() {
            return Err(Self::unavailable());
        }
        self.registered.lock().unwrap().push(state.clone());
        Ok(())
    }

    async fn get_gameserver_deployments(
        &self,
        _hostname: &str,
    ) -> Result<Vec<Deployment>, ClientError> {
        if *self.unreachable.lock().unwrap() {
            return Err(Self::unavailable());
        }
        Ok(self.deployments.lock().unwrap().clone())
    }
}

struct Harness {
    runtime: Arc<MockRuntime>,
    control_plane: Arc<FakeControlPlane>,
    reconciler: Reconciler,
}

fn harness(addresses: &str) -> Harness {
    let runtime = Arc::new(MockRuntime::new());
    let control_plane = Arc::new(FakeControlPlane::default());
    let probe = SystemResources {
        cpus: 4,
        total_memory_kib: 8 * 1024 * 1024,
        available_memory_kib: 6 * 1024 * 1024,
    };

    let mut config = ReconcilerConfig::new("host-a");
    config.call_timeout = Duration::from_secs(5);

    let reconciler = Reconciler::new(
        runtime.clone(),
        control_plane.clone(),
        Arc::new(probe),
        AddressPool::from_list(addresses).unwrap(),
        config,
    );

    Harness {
        runtime,
        control_plane,
        reconciler,
    }
}

fn minecraft() -> Deployment {
    Deployment {
        uuid: GameserverId::new(),
        image: "itzg/minecraft-server".to_string(),
        env: vec![
            EnvironmentVariable::new("EULA", "TRUE"),
            EnvironmentVariable::new("VERSION", "1.14.1"),
        ],
        ports: vec![NetworkPort::tcp(25565)],
        resources: ResourceRequirements::from_mib(2048, 1536),
        agent: "host-a".to_string(),
    }
}

fn factorio() -> Deployment {
    Deployment {
        uuid: GameserverId::new(),
        image: "factoriotools/factorio:0.17.63".to_string(),
        env: vec![],
        ports: vec![NetworkPort::udp(34197)],
        resources: ResourceRequirements::from_mib(1024, 512),
        agent: "host-a".to_string(),
    }
}

fn uuids_running(runtime: &MockRuntime) -> Vec<String> {
    let mut uuids: Vec<String> = runtime
        .containers()
        .into_iter()
        .map(|c| c.labels[UUID_LABEL].clone())
        .collect();
    uuids.sort();
    uuids
}

fn ip_of(runtime: &MockRuntime, uuid: GameserverId) -> String {
    runtime
        .containers()
        .into_iter()
        .find(|c| c.labels[UUID_LABEL] == uuid.to_string())
        .map(|c| c.labels[IP_LABEL].clone())
        .unwrap()
}

#[tokio::test]
async fn test_converges_to_desired_set() {
    let h = harness("10.0.0.1");
    let a = minecraft();
    let b = factorio();
    h.control_plane.set_deployments(vec![a.clone(), b.clone()]);

    let report = h.reconciler.tick().await.unwrap();
    assert_eq!(report.created, 2);
    assert_eq!(report.failed, 0);

    let mut expected = vec![a.uuid.to_string(), b.uuid.to_string()];
    expected.sort();
    assert_eq!(uuids_running(&h.runtime), expected);

    for container in h.runtime.containers() {
        assert_eq!(container.state, "running");
        assert_eq!(container.labels[OWNER_LABEL], container.labels[UUID_LABEL]);
        assert_eq!(container.name, container.labels[UUID_LABEL]);
    }
}

#[tokio::test]
async fn test_second_tick_is_a_no_op() {
    let h = harness("10.0.0.1,10.0.0.2");
    h.control_plane.set_deployments(vec![minecraft(), minecraft(), factorio()]);

    h.reconciler.tick().await.unwrap();
    let creates = h.runtime.create_count();

    let report = h.reconciler.tick().await.unwrap();
    assert_eq!(report, ReconcileReport::default());
    assert_eq!(h.runtime.create_count(), creates);
    assert_eq!(h.runtime.remove_count(), 0);
}

#[tokio::test]
async fn test_same_port_gets_next_address_then_exhausts() {
    let h = harness("10.0.0.1,10.0.0.2");
    let first = minecraft();
    let second = minecraft();
    let third = minecraft();

    h.control_plane.set_deployments(vec![first.clone()]);
    h.reconciler.tick().await.unwrap();
    assert_eq!(ip_of(&h.runtime, first.uuid), "10.0.0.1");

    h.control_plane
        .set_deployments(vec![first.clone(), second.clone()]);
    h.reconciler.tick().await.unwrap();
    assert_eq!(ip_of(&h.runtime, second.uuid), "10.0.0.2");

    h.control_plane
        .set_deployments(vec![first.clone(), second.clone(), third.clone()]);
    let report = h.reconciler.tick().await.unwrap();
    assert_eq!(report.created, 0);
    assert_eq!(report.failed, 1);
    assert_eq!(h.runtime.containers().len(), 2);
}

#[tokio::test]
async fn test_different_ports_share_an_address() {
    let h = harness("10.0.0.1");
    let mc = minecraft();
    let fa = factorio();
    h.control_plane.set_deployments(vec![mc.clone(), fa.clone()]);

    h.reconciler.tick().await.unwrap();

    assert_eq!(ip_of(&h.runtime, mc.uuid), "10.0.0.1");
    assert_eq!(ip_of(&h.runtime, fa.uuid), "10.0.0.1");
}

#[tokio::test]
async fn test_undesired_running_container_is_force_removed() {
    let h = harness("10.0.0.1");
    let keep = minecraft();
    let drop = factorio();
    h.control_plane.set_deployments(vec![keep.clone(), drop.clone()]);
    h.reconciler.tick().await.unwrap();
    assert_eq!(h.runtime.containers().len(), 2);

    h.control_plane.set_deployments(vec![keep.clone()]);
    let report = h.reconciler.tick().await.unwrap();

    assert_eq!(report.removed, 1);
    assert_eq!(uuids_running(&h.runtime), vec![keep.uuid.to_string()]);
}

#[tokio::test]
async fn test_removal_frees_address_in_same_tick() {
    let h = harness("10.0.0.1");
    let old = minecraft();
    let new = minecraft();
    h.control_plane.set_deployments(vec![old.clone()]);
    h.reconciler.tick().await.unwrap();

    h.control_plane.set_deployments(vec![new.clone()]);
    let report = h.reconciler.tick().await.unwrap();

    assert_eq!(report.removed, 1);
    assert_eq!(report.created, 1);
    assert_eq!(ip_of(&h.runtime, new.uuid), "10.0.0.1");
}

#[tokio::test]
async fn test_duplicate_containers_are_trimmed() {
    let h = harness("10.0.0.1,10.0.0.2");
    let d = minecraft();
    h.control_plane.set_deployments(vec![d.clone()]);
    h.reconciler.tick().await.unwrap();

    // A leftover second container for the same gameserver.
    let uuid = d.uuid.to_string();
    h.runtime.insert(ContainerSummary {
        id: "leftover".to_string(),
        name: format!("{uuid}-old"),
        image: d.image.clone(),
        state: "exited".to_string(),
        labels: BTreeMap::from([
            (OWNER_LABEL.to_string(), uuid.clone()),
            (UUID_LABEL.to_string(), uuid.clone()),
            (IP_LABEL.to_string(), "10.0.0.2".to_string()),
        ]),
        ports: vec![],
    });

    let report = h.reconciler.tick().await.unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(report.created, 0);
    assert_eq!(h.runtime.containers().len(), 1);
}

#[tokio::test]
async fn test_exited_container_is_replaced() {
    let h = harness("10.0.0.1");
    let d = minecraft();
    h.control_plane.set_deployments(vec![d.clone()]);
    h.reconciler.tick().await.unwrap();

    for _ in 0..3 {
        let id = h.runtime.containers()[0].id.clone();
        h.runtime.set_state(&id, "exited");

        let report = h.reconciler.tick().await.unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(report.created, 1);

        let containers = h.runtime.containers();
        assert_eq!(containers.len(), 1);
        assert_ne!(containers[0].id, id);
        assert_eq!(containers[0].state, "running");
        assert_eq!(containers[0].name, d.uuid.to_string());
        assert_eq!(containers[0].labels[IP_LABEL], "10.0.0.1");
    }

    // The exit was reported before the replacement.
    let states = h.control_plane.registered.lock().unwrap().clone();
    let reported = states[states.len() - 1].running_instance(d.uuid).unwrap();
    assert_eq!(reported.status, GameserverStatus::Stopped);

    let report = h.reconciler.tick().await.unwrap();
    assert_eq!(report, ReconcileReport::default());
}

#[tokio::test]
async fn test_dead_undesired_container_is_removed_once() {
    let h = harness("10.0.0.1");
    let gone = factorio();
    h.control_plane.set_deployments(vec![gone.clone()]);
    h.reconciler.tick().await.unwrap();
    let id = h.runtime.containers()[0].id.clone();
    h.runtime.set_state(&id, "dead");

    h.control_plane.set_deployments(vec![]);
    let report = h.reconciler.tick().await.unwrap();

    assert_eq!(report.removed, 1);
    assert_eq!(report.created, 0);
    assert!(h.runtime.containers().is_empty());
}

#[tokio::test]
async fn test_unreachable_control_plane_changes_nothing() {
    let h = harness("10.0.0.1");
    h.control_plane.set_deployments(vec![minecraft()]);
    h.reconciler.tick().await.unwrap();

    h.control_plane.set_unreachable(true);
    let err = h.reconciler.tick().await.unwrap_err();

    assert!(matches!(err, AgentError::Client(_)));
    assert_eq!(h.runtime.containers().len(), 1);
    assert_eq!(h.runtime.remove_count(), 0);
}

#[tokio::test]
async fn test_list_failure_aborts_tick() {
    let h = harness("10.0.0.1");
    h.control_plane.set_deployments(vec![minecraft()]);
    h.runtime.set_fail_lists(true);

    let err = h.reconciler.tick().await.unwrap_err();
    assert!(matches!(err, AgentError::Runtime(_)));
    assert_eq!(h.runtime.create_count(), 0);
}

#[tokio::test]
async fn test_pull_failure_is_isolated() {
    let h = harness("10.0.0.1");
    h.control_plane.set_deployments(vec![minecraft(), factorio()]);
    h.runtime.set_fail_pulls(true);

    let report = h.reconciler.tick().await.unwrap();
    assert_eq!(report.failed, 2);
    assert!(h.runtime.containers().is_empty());

    h.runtime.set_fail_pulls(false);
    let report = h.reconciler.tick().await.unwrap();
    assert_eq!(report.created, 2);
}

#[tokio::test]
async fn test_start_failure_cleans_up_and_backs_off() {
    let h = harness("10.0.0.1");
    h.control_plane.set_deployments(vec![minecraft()]);
    h.runtime.set_fail_starts(true);

    // Three retries are tolerated; the fourth failure exhausts them.
    for _ in 0..4 {
        let report = h.reconciler.tick().await.unwrap();
        assert_eq!(report.failed, 1);
        assert!(h.runtime.containers().is_empty(), "unstarted container left behind");
    }
    assert_eq!(h.runtime.create_count(), 4);

    h.runtime.set_fail_starts(false);
    let report = h.reconciler.tick().await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.created, 0);
    assert_eq!(h.runtime.create_count(), 4);
}

#[tokio::test]
async fn test_register_reports_running_instances() {
    let h = harness("10.0.0.1,10.0.0.2");
    let d = minecraft();
    h.control_plane.set_deployments(vec![d.clone()]);

    h.reconciler.tick().await.unwrap();
    let first = h.control_plane.last_state();
    assert_eq!(first.hostname, "host-a");
    assert!(first.running_gameservers.is_empty());
    assert_eq!(first.resources.ip_addresses, 2);
    assert_eq!(first.resources.memory_kib, 8 * 1024 * 1024 - 512 * 1024);

    h.reconciler.tick().await.unwrap();
    let second = h.control_plane.last_state();
    assert_eq!(second.running_gameservers.len(), 1);

    let instance = &second.running_gameservers[0];
    assert_eq!(instance.uuid, d.uuid);
    assert_eq!(instance.status, GameserverStatus::Running);
    let endpoint = instance.endpoint.as_ref().unwrap();
    assert_eq!(endpoint.ip_address, "10.0.0.1");
    assert_eq!(
        endpoint.mapping(NetworkProtocol::Tcp, 25565).map(|m| m.host_port),
        Some(25565)
    );
}

#[tokio::test]
async fn test_register_failure_does_not_block_reconcile() {
    let h = harness("10.0.0.1");
    h.control_plane.set_reject_register(true);
    h.runtime.insert(ContainerSummary {
        id: "stray".to_string(),
        name: "stray".to_string(),
        image: "x".to_string(),
        state: "running".to_string(),
        labels: BTreeMap::from([(OWNER_LABEL.to_string(), GameserverId::new().to_string())]),
        ports: vec![PublishedPort {
            ip: Some("10.0.0.1".to_string()),
            private_port: 25565,
            public_port: Some(25565),
            protocol: NetworkProtocol::Tcp,
        }],
    });

    let wanted = factorio();
    h.control_plane.set_deployments(vec![wanted.clone()]);

    let report = h.reconciler.tick().await.unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(report.created, 1);
    assert_eq!(uuids_running(&h.runtime), vec![wanted.uuid.to_string()]);
    assert!(h.control_plane.registered.lock().unwrap().is_empty());
}
