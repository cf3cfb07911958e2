//! Reconciliation loop for converging this host's containers.
//!
//! Each tick:
//! - Lists the containers this agent manages
//! - Reports the host snapshot to the control plane (`Register`)
//! - Fetches the deployments assigned here
//! - Force-removes containers nobody wants, duplicates, and exited ones
//! - Creates and starts containers for new or exited deployments
//!
//! A failure on one container never stops work on the others.

use std::collections::BTreeMap;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use hearth_id::GameserverId;
use hearth_model::Deployment;
use hearth_networking::{AddressPool, NetworkError};
use hearth_reconcile::{
    plan, ReconcileError, RetryTracker, DEFAULT_MAX_RETRIES, DEFAULT_RECONCILE_INTERVAL,
    DEFAULT_RETRY_WINDOW,
};
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, instrument, warn};

use crate::client::{ClientError, ControlPlane};
use crate::heartbeat::{self, container_key, IP_LABEL, OWNER_LABEL, UUID_LABEL};
use crate::resources::ResourceProbe;
use crate::runtime::{
    publish_key, ContainerFilter, ContainerRuntime, ContainerSpec, ContainerSummary, PortBinding,
    RuntimeError,
};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

/// Reconciliation loop configuration.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Name this host registers under.
    pub hostname: String,

    /// Interval between ticks.
    pub reconcile_interval: Duration,

    /// Deadline for each runtime and control plane call.
    pub call_timeout: Duration,

    /// Deadline for an image pull.
    pub pull_timeout: Duration,

    /// Memory not offered to gameservers, in KiB.
    pub os_memory_reservation_kib: u64,

    /// Failed starts tolerated per gameserver inside `retry_window`.
    pub max_create_retries: u32,
    pub retry_window: Duration,
}

impl ReconcilerConfig {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            call_timeout: Duration::from_secs(30),
            pull_timeout: Duration::from_secs(600),
            os_memory_reservation_kib: crate::config::DEFAULT_OS_MEMORY_RESERVATION_KIB,
            max_create_retries: DEFAULT_MAX_RETRIES,
            retry_window: DEFAULT_RETRY_WINDOW,
        }
    }
}

impl From<&crate::config::Config> for ReconcilerConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            hostname: config.hostname.clone(),
            reconcile_interval: config.reconcile_interval,
            call_timeout: config.call_timeout,
            pull_timeout: config.pull_timeout,
            os_memory_reservation_kib: config.os_memory_reservation_kib,
            max_create_retries: config.max_create_retries,
            retry_window: config.retry_window,
        }
    }
}

/// What one tick did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub removed: usize,
    /// Creates or removes that failed this tick.
    pub failed: usize,
    /// Deployments held back because their retries are exhausted.
    pub skipped: usize,
}

/// Reconciler for converging this host's containers.
pub struct Reconciler {
    runtime: Arc<dyn ContainerRuntime>,
    control_plane: Arc<dyn ControlPlane>,
    probe: Arc<dyn ResourceProbe>,
    pool: AddressPool,
    config: ReconcilerConfig,
    retries: Mutex<RetryTracker<GameserverId>>,
}

impl Reconciler {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        control_plane: Arc<dyn ControlPlane>,
        probe: Arc<dyn ResourceProbe>,
        pool: AddressPool,
        config: ReconcilerConfig,
    ) -> Self {
        let retries = Mutex::new(RetryTracker::new(
            config.max_create_retries,
            config.retry_window,
        ));
        Self {
            runtime,
            control_plane,
            probe,
            pool,
            config,
            retries,
        }
    }

    /// Run the reconciliation loop until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            hostname = %self.config.hostname,
            runtime = self.runtime.name(),
            interval_secs = self.config.reconcile_interval.as_secs(),
            addresses = ?self.pool.iter().collect::<Vec<_>>(),
            "Starting reconciliation loop"
        );

        let mut interval = tokio::time::interval(self.config.reconcile_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "Reconciliation failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Reconciler shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Perform a single reconciliation pass.
    ///
    /// Errors are returned only when the tick could not get a consistent
    /// view (listing, fetching desired state); nothing is changed then.
    #[instrument(skip(self), fields(hostname = %self.config.hostname))]
    pub async fn tick(&self) -> Result<ReconcileReport, AgentError> {
        let mut report = ReconcileReport::default();

        let owned = ContainerFilter::new().label(OWNER_LABEL);
        let containers = self
            .bounded("list containers", self.runtime.list_containers(&owned))
            .await?;

        self.register(&containers).await;

        let desired = self
            .bounded(
                "fetch deployments",
                self.control_plane
                    .get_gameserver_deployments(&self.config.hostname),
            )
            .await
            .inspect_err(|e| warn!(error = %e, "Failed to fetch deployments, will retry"))?;

        // Exited containers are replaced, not counted as satisfying a deployment.
        let (stopped, live): (Vec<_>, Vec<_>) =
            containers.into_iter().partition(heartbeat::is_stopped);

        let actions = plan(
            desired,
            live,
            |d: &Deployment| d.uuid.to_string(),
            container_key,
        )?;
        debug!(
            create = actions.to_create.len(),
            remove = actions.to_remove.len(),
            duplicates = actions.duplicates.len(),
            stopped = stopped.len(),
            unchanged = actions.unchanged,
            "Computed reconcile plan"
        );

        for container in &stopped {
            let key = container_key(container);
            if actions.to_create.iter().any(|d| d.uuid.to_string() == key) {
                info!(
                    gameserver = %key,
                    container = %container.id,
                    "Gameserver stopped, replacing"
                );
            }
        }

        // Removals first so their names, addresses and ports are free for creates.
        for container in stopped.iter().chain(actions.removals()) {
            match self.remove(container).await {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    warn!(container = %container.id, error = %e, "Failed to remove container");
                    report.failed += 1;
                }
            }
        }

        self.retries.lock().await.prune();

        for deployment in &actions.to_create {
            if self.retries.lock().await.is_exhausted(&deployment.uuid) {
                debug!(gameserver = %deployment.uuid, "Retries exhausted, skipping create");
                report.skipped += 1;
                continue;
            }

            match self.create(deployment).await {
                Ok(id) => {
                    info!(gameserver = %deployment.uuid, container = %id, "Gameserver started");
                    self.retries.lock().await.clear(&deployment.uuid);
                    report.created += 1;
                }
                Err(e) => {
                    warn!(gameserver = %deployment.uuid, error = %e, "Failed to create gameserver");
                    report.failed += 1;
                }
            }
        }

        if report != ReconcileReport::default() {
            info!(
                created = report.created,
                removed = report.removed,
                failed = report.failed,
                skipped = report.skipped,
                "Reconciliation pass complete"
            );
        }

        Ok(report)
    }

    /// Send the host snapshot. Failures are logged; the tick goes on.
    async fn register(&self, containers: &[ContainerSummary]) {
        let measured = self.probe.measure();
        let (resources, usage) =
            measured.report(self.config.os_memory_reservation_kib, self.pool.len() as u32);
        let state = heartbeat::agent_state(&self.config.hostname, resources, usage, containers);

        match self
            .bounded("register", self.control_plane.register(&state))
            .await
        {
            Ok(()) => debug!(
                running = state.running_gameservers.len(),
                memory_kib = state.resources.memory_kib,
                "Registered with control plane"
            ),
            Err(e) => warn!(error = %e, "Register failed"),
        }
    }

    async fn remove(&self, container: &ContainerSummary) -> Result<(), AgentError> {
        info!(
            container = %container.id,
            gameserver = %container_key(container),
            state = %container.state,
            "Removing container"
        );
        match self
            .bounded(
                "remove container",
                self.runtime.remove_container(&container.id, true),
            )
            .await
        {
            Err(AgentError::Runtime(RuntimeError::NotFound(_))) => Ok(()),
            other => other,
        }
    }

    /// Pull, allocate, create and start. Returns the container ID.
    async fn create(&self, deployment: &Deployment) -> Result<String, AgentError> {
        info!(gameserver = %deployment.uuid, image = %deployment.image, "Creating gameserver");

        self.bounded_for(
            "pull image",
            self.config.pull_timeout,
            self.runtime.pull_image(&deployment.image),
        )
        .await?;

        let ip = self.allocate(deployment).await?;
        let spec = container_spec(deployment, ip);

        let id = self
            .bounded("create container", self.runtime.create_container(&spec))
            .await?;

        if let Err(e) = self
            .bounded("start container", self.runtime.start_container(&id))
            .await
        {
            // Leave nothing half-created behind; the next tick starts over.
            if let Err(cleanup) = self
                .bounded("remove container", self.runtime.remove_container(&id, true))
                .await
            {
                warn!(container = %id, error = %cleanup, "Failed to clean up unstarted container");
            }

            self.record_failure(deployment).await;
            return Err(e);
        }

        Ok(id)
    }

    async fn record_failure(&self, deployment: &Deployment) {
        let exhausted = self.retries.lock().await.record_failure(&deployment.uuid);
        if exhausted {
            error!(
                gameserver = %deployment.uuid,
                max_retries = self.config.max_create_retries,
                "Gameserver keeps failing to start, backing off"
            );
        }
    }

    /// First address in the pool with no managed container publishing the
    /// deployment's primary port on it.
    async fn allocate(&self, deployment: &Deployment) -> Result<IpAddr, AgentError> {
        let Some(port) = deployment.primary_port() else {
            return Ok(self.pool.primary());
        };
        let port = publish_key(port.container_port, port.protocol);

        let ip = self
            .pool
            .allocate(&port, |ip| {
                let filter = ContainerFilter::new()
                    .label_value(IP_LABEL, ip)
                    .publish(port.clone());
                async move {
                    let taken = self
                        .bounded("list containers", self.runtime.list_containers(&filter))
                        .await?;
                    Ok::<_, AgentError>(!taken.is_empty())
                }
            })
            .await?;

        debug!(gameserver = %deployment.uuid, ip = %ip, port = %port, "Allocated address");
        Ok(ip)
    }

    async fn bounded<T, E, F>(&self, operation: &'static str, fut: F) -> Result<T, AgentError>
    where
        F: Future<Output = Result<T, E>>,
        AgentError: From<E>,
    {
        self.bounded_for(operation, self.config.call_timeout, fut).await
    }

    async fn bounded_for<T, E, F>(
        &self,
        operation: &'static str,
        after: Duration,
        fut: F,
    ) -> Result<T, AgentError>
    where
        F: Future<Output = Result<T, E>>,
        AgentError: From<E>,
    {
        match tokio::time::timeout(after, fut).await {
            Ok(result) => result.map_err(AgentError::from),
            Err(_) => Err(AgentError::Timeout { operation, after }),
        }
    }
}

/// The container for `deployment`, bound on `ip`.
pub fn container_spec(deployment: &Deployment, ip: IpAddr) -> ContainerSpec {
    let uuid = deployment.uuid.to_string();
    let ip = ip.to_string();

    ContainerSpec {
        name: uuid.clone(),
        image: deployment.image.clone(),
        env: deployment
            .env
            .iter()
            .map(|v| format!("{}={}", v.name, v.value))
            .collect(),
        labels: BTreeMap::from([
            (OWNER_LABEL.to_string(), uuid.clone()),
            (UUID_LABEL.to_string(), uuid),
            (IP_LABEL.to_string(), ip.clone()),
        ]),
        port_bindings: deployment
            .ports
            .iter()
            .map(|p| PortBinding {
                protocol: p.protocol,
                container_port: p.container_port,
                host_ip: ip.clone(),
                host_port: p.container_port,
            })
            .collect(),
        memory_limit_bytes: deployment.resources.memory_limit_kib * 1024,
        memory_reservation_bytes: deployment.resources.memory_reservation_kib * 1024,
    }
}
