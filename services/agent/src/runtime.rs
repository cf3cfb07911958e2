//! Container runtime interface and mock implementation.
//!
//! The runtime interface abstracts the container operations the reconciler
//! needs:
//! - Listing containers by label and published port
//! - Pulling images
//! - Creating, starting and force-removing containers
//!
//! A mock implementation is provided for testing and development.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use hearth_model::NetworkProtocol;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("request error: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("runtime API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("container not found: {0}")]
    NotFound(String),

    #[error("image pull failed for {image}: {message}")]
    Pull { image: String, message: String },
}

/// Label and published-port filter, mirroring the runtime's list filters.
///
/// A label entry is either `key` (present) or `key=value` (equal).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerFilter {
    pub labels: Vec<String>,
    /// `<port>/<protocol>`, e.g. `25565/tcp`.
    pub publish: Option<String>,
}

impl ContainerFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(mut self, key: &str) -> Self {
        self.labels.push(key.to_string());
        self
    }

    pub fn label_value(mut self, key: &str, value: impl std::fmt::Display) -> Self {
        self.labels.push(format!("{key}={value}"));
        self
    }

    pub fn publish(mut self, port: impl Into<String>) -> Self {
        self.publish = Some(port.into());
        self
    }

    /// Whether a container with these labels and ports passes the filter.
    pub fn matches(&self, labels: &BTreeMap<String, String>, ports: &[PublishedPort]) -> bool {
        let labels_ok = self.labels.iter().all(|entry| match entry.split_once('=') {
            Some((key, value)) => labels.get(key).is_some_and(|v| v == value),
            None => labels.contains_key(entry),
        });

        let publish_ok = match &self.publish {
            Some(publish) => ports
                .iter()
                .any(|p| {
                    p.public_port
                        .is_some_and(|public| publish_key(public, p.protocol) == *publish)
                }),
            None => true,
        };

        labels_ok && publish_ok
    }
}

/// `<port>/<protocol>` as used by port filters and bindings.
pub fn publish_key(port: u16, protocol: NetworkProtocol) -> String {
    format!("{port}/{protocol}")
}

/// One port binding requested at create time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    pub protocol: NetworkProtocol,
    pub container_port: u16,
    pub host_ip: String,
    pub host_port: u16,
}

/// Everything needed to create a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// `NAME=value` pairs.
    pub env: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub port_bindings: Vec<PortBinding>,
    pub memory_limit_bytes: u64,
    pub memory_reservation_bytes: u64,
}

/// A port as reported by the runtime's container listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPort {
    pub ip: Option<String>,
    pub private_port: u16,
    pub public_port: Option<u16>,
    pub protocol: NetworkProtocol,
}

/// A container as reported by the runtime's container listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub image: String,
    /// Runtime state, e.g. `created`, `running`, `exited`.
    pub state: String,
    pub labels: BTreeMap<String, String>,
    pub ports: Vec<PublishedPort>,
}

/// Container runtime interface.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    fn name(&self) -> &'static str;

    /// All containers, in any state, that pass `filter`.
    async fn list_containers(
        &self,
        filter: &ContainerFilter,
    ) -> Result<Vec<ContainerSummary>, RuntimeError>;

    /// Pull an image, returning once the pull completes.
    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError>;

    /// Create a container and return its ID.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), RuntimeError>;
}

/// Mock runtime for testing and development.
#[derive(Default)]
pub struct MockRuntime {
    containers: Mutex<BTreeMap<String, ContainerSummary>>,

    /// Counter for generating container IDs.
    id_counter: AtomicU64,

    pulls: AtomicU64,
    creates: AtomicU64,
    removes: AtomicU64,

    fail_pulls: AtomicBool,
    fail_creates: AtomicBool,
    fail_starts: AtomicBool,
    fail_lists: AtomicBool,
}

impl MockRuntime {
    /// Create a new mock runtime.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock runtime that fails all starts.
    pub fn failing() -> Self {
        let runtime = Self::new();
        runtime.set_fail_starts(true);
        runtime
    }

    pub fn set_fail_pulls(&self, fail: bool) {
        self.fail_pulls.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_starts(&self, fail: bool) {
        self.fail_starts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    pub fn pull_count(&self) -> u64 {
        self.pulls.load(Ordering::SeqCst)
    }

    pub fn create_count(&self) -> u64 {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn remove_count(&self) -> u64 {
        self.removes.load(Ordering::SeqCst)
    }

    /// Snapshot of every container the mock holds.
    pub fn containers(&self) -> Vec<ContainerSummary> {
        self.lock().values().cloned().collect()
    }

    /// Place a container directly, bypassing create (e.g. to simulate leftovers).
    pub fn insert(&self, container: ContainerSummary) {
        self.lock().insert(container.id.clone(), container);
    }

    /// Change a container's state, e.g. to simulate a crash.
    pub fn set_state(&self, id: &str, state: &str) {
        if let Some(container) = self.lock().get_mut(id) {
            container.state = state.to_string();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, ContainerSummary>> {
        self.containers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn next_id(&self) -> String {
        let counter = self.id_counter.fetch_add(1, Ordering::SeqCst);
        format!("mock_{:016x}", counter)
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn list_containers(
        &self,
        filter: &ContainerFilter,
    ) -> Result<Vec<ContainerSummary>, RuntimeError> {
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(RuntimeError::Api {
                status: 500,
                message: "mock runtime configured to fail lists".to_string(),
            });
        }

        Ok(self
            .lock()
            .values()
            .filter(|c| filter.matches(&c.labels, &c.ports))
            .cloned()
            .collect())
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        if self.fail_pulls.load(Ordering::SeqCst) {
            return Err(RuntimeError::Pull {
                image: image.to_string(),
                message: "mock runtime configured to fail pulls".to_string(),
            });
        }

        self.pulls.fetch_add(1, Ordering::SeqCst);
        debug!(image, "[MOCK] Pulled image");
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(RuntimeError::Api {
                status: 500,
                message: "mock runtime configured to fail creates".to_string(),
            });
        }

        let mut containers = self.lock();
        if containers.values().any(|c| c.name == spec.name) {
            return Err(RuntimeError::Api {
                status: 409,
                message: format!("container name {} is already in use", spec.name),
            });
        }

        let id = self.next_id();
        let ports = spec
            .port_bindings
            .iter()
            .map(|b| PublishedPort {
                ip: Some(b.host_ip.clone()),
                private_port: b.container_port,
                public_port: Some(b.host_port),
                protocol: b.protocol,
            })
            .collect();

        containers.insert(
            id.clone(),
            ContainerSummary {
                id: id.clone(),
                name: spec.name.clone(),
                image: spec.image.clone(),
                state: "created".to_string(),
                labels: spec.labels.clone(),
                ports,
            },
        );
        self.creates.fetch_add(1, Ordering::SeqCst);

        info!(
            id = %id,
            name = %spec.name,
            image = %spec.image,
            memory_limit_mib = spec.memory_limit_bytes / (1024 * 1024),
            "[MOCK] Created container"
        );
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        if self.fail_starts.load(Ordering::SeqCst) {
            return Err(RuntimeError::Api {
                status: 500,
                message: "mock runtime configured to fail starts".to_string(),
            });
        }

        let mut containers = self.lock();
        let container = containers
            .get_mut(id)
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;
        container.state = "running".to_string();

        debug!(id, "[MOCK] Started container");
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), RuntimeError> {
        let mut containers = self.lock();
        let running = match containers.get(id) {
            Some(c) => c.state == "running",
            None => return Err(RuntimeError::NotFound(id.to_string())),
        };
        if running && !force {
            return Err(RuntimeError::Api {
                status: 409,
                message: format!("container {id} is running"),
            });
        }

        containers.remove(id);
        self.removes.fetch_add(1, Ordering::SeqCst);

        info!(id, force, "[MOCK] Removed container");
        Ok(())
    }
}
