//! hearth agent
//!
//! Runs on each game host and converges its gameserver containers to the
//! deployments the control plane assigns it.
//!
//! ## Architecture
//!
//! - **Reconciler**: lists containers, registers, fetches deployments, then
//!   removes and creates containers
//! - **Runtime**: abstracts container operations (Docker in prod, mock in dev)

use std::sync::Arc;

use anyhow::Result;
use hearth_agent::{
    config::Config, docker::DockerRuntime, ContainerRuntime, HostProbe, HttpControlPlane,
    MockRuntime, Reconciler, ReconcilerConfig,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to HEARTH_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting hearth agent");
    info!(
        hostname = %config.hostname,
        control_plane_url = %config.control_plane_url,
        addresses = config.ip_addresses.len(),
        "Configuration loaded"
    );

    let runtime: Arc<dyn ContainerRuntime> = if config.mock_runtime {
        warn!("Using mock container runtime");
        Arc::new(MockRuntime::new())
    } else {
        let docker = DockerRuntime::new(&config.docker_socket);
        if !docker.socket_exists() {
            warn!(socket = %config.docker_socket.display(), "Docker socket not found");
        }
        Arc::new(docker)
    };

    let control_plane = Arc::new(HttpControlPlane::new(
        config.control_plane_url.clone(),
        config.call_timeout,
    )?);

    let reconciler = Reconciler::new(
        runtime,
        control_plane,
        Arc::new(HostProbe),
        config.ip_addresses.clone(),
        ReconcilerConfig::from(&config),
    );

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reconciler_handle = tokio::spawn(async move {
        reconciler.run(shutdown_rx).await;
    });

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);

    // A tick in flight may be waiting on a pull.
    let shutdown_timeout = std::time::Duration::from_secs(10);
    match tokio::time::timeout(shutdown_timeout, reconciler_handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Reconciler task panicked"),
        Err(_) => warn!("Reconciler did not shut down in time"),
    }

    info!("Agent shutdown complete");
    Ok(())
}
