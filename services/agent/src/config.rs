//! Configuration for the agent.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use hearth_networking::AddressPool;
use hearth_reconcile::{DEFAULT_MAX_RETRIES, DEFAULT_RECONCILE_INTERVAL, DEFAULT_RETRY_WINDOW};

/// Memory held back for the host OS, in KiB (512 MiB).
pub const DEFAULT_OS_MEMORY_RESERVATION_KIB: u64 = 512 * 1024;

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Name this host registers under.
    pub hostname: String,

    /// Control plane API URL.
    pub control_plane_url: String,

    /// Addresses gameserver ports may be bound on.
    pub ip_addresses: AddressPool,

    /// Docker Engine socket.
    pub docker_socket: PathBuf,

    /// Use the in-memory runtime instead of Docker.
    pub mock_runtime: bool,

    pub reconcile_interval: Duration,

    /// Memory not offered to gameservers, in KiB.
    pub os_memory_reservation_kib: u64,

    /// Deadline for each runtime and control plane call.
    pub call_timeout: Duration,

    /// Deadline for an image pull.
    pub pull_timeout: Duration,

    pub max_create_retries: u32,
    pub retry_window: Duration,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let hostname = std::env::var("HEARTH_HOSTNAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .map(|h| h.trim().to_string())
            .ok()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| anyhow!("HEARTH_HOSTNAME or HOSTNAME must be set"))?;

        let control_plane_url = std::env::var("HEARTH_CONTROL_PLANE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());

        let ip_addresses = std::env::var("HEARTH_IP_ADDRESSES")
            .context("HEARTH_IP_ADDRESSES must list the addresses this host may bind")?;
        let ip_addresses =
            AddressPool::from_list(&ip_addresses).context("HEARTH_IP_ADDRESSES")?;

        let docker_socket = std::env::var("HEARTH_DOCKER_SOCKET")
            .unwrap_or_else(|_| "/var/run/docker.sock".to_string())
            .into();

        let mock_runtime = std::env::var("HEARTH_MOCK_RUNTIME")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        let reconcile_interval = std::env::var("HEARTH_RECONCILE_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RECONCILE_INTERVAL);

        let os_memory_reservation_kib = std::env::var("HEARTH_OS_MEMORY_RESERVATION_KIB")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_OS_MEMORY_RESERVATION_KIB);

        let call_timeout = std::env::var("HEARTH_CALL_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        let pull_timeout = std::env::var("HEARTH_PULL_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(600));

        let log_level = std::env::var("HEARTH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            hostname,
            control_plane_url,
            ip_addresses,
            docker_socket,
            mock_runtime,
            reconcile_interval,
            os_memory_reservation_kib,
            call_timeout,
            pull_timeout,
            max_create_retries: DEFAULT_MAX_RETRIES,
            retry_window: DEFAULT_RETRY_WINDOW,
            log_level,
        })
    }
}
