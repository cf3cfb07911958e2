//! hearth control plane
//!
//! Holds the gameserver and agent state, assigns unscheduled gameservers to
//! agents, and serves the agent RPC and the user-facing HTTP API.

use std::sync::Arc;

use anyhow::Result;
use hearth_control_plane::{
    api, config,
    db::open_store,
    games::GameRegistry,
    scheduler::{SchedulerReconciler, SchedulerWorker},
    state::AppState,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to HEARTH_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting hearth control plane");
    info!(
        listen_addr = %config.listen_addr,
        policy = %config.scheduler_policy,
        "Configuration loaded"
    );

    let store = match open_store(&config.database).await {
        Ok(store) => {
            info!(backend = store.backend(), "State store ready");
            store
        }
        Err(e) => {
            error!(error = %e, "Failed to open state store");
            return Err(e.into());
        }
    };

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start scheduler worker in background
    let reconciler = SchedulerReconciler::new(
        store.clone(),
        config.scheduler_policy.build(),
        config.scheduler(),
    );
    let scheduler_worker = SchedulerWorker::new(reconciler, config.scheduler_interval);
    let scheduler_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            scheduler_worker.run(shutdown_rx).await;
        }
    });

    let state = AppState::new(store, Arc::new(GameRegistry::with_defaults()));
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    let _ = shutdown_tx.send(true);

    info!("Waiting for workers to shut down...");
    let shutdown_timeout = std::time::Duration::from_secs(10);
    if let Err(e) = tokio::time::timeout(shutdown_timeout, scheduler_handle).await {
        warn!(error = %e, "Scheduler worker did not shut down in time");
    }

    info!("Control plane shutdown complete");
    Ok(())
}
