//! State store for the control plane.
//!
//! This module provides:
//! - The [`KvStore`] contract (get/list/create/update/set/delete)
//! - An in-memory backend for dev mode and tests
//! - A Postgres backend over a single `kv_entries` table
//! - The typed [`StateStore`] facade used by the scheduler and RPC surface
//!
//! Keys follow the layout in [`hearth_model::keys`].

mod error;
mod kv;
mod memory;
mod postgres;
mod store;

pub use error::DbError;
pub use kv::KvStore;
pub use memory::MemoryKvStore;
pub use postgres::PostgresKvStore;
pub use store::{StateStore, DEFAULT_CALL_TIMEOUT};

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL. `None` selects the in-memory store.
    pub database_url: Option<String>,

    /// Maximum number of connections in the pool.
    pub max_connections: u32,

    /// Minimum number of idle connections.
    pub min_connections: u32,

    /// Connection acquire timeout.
    pub acquire_timeout: Duration,

    /// Idle connection timeout.
    pub idle_timeout: Duration,

    /// Maximum lifetime of a connection.
    pub max_lifetime: Duration,

    /// Deadline for each store call.
    pub call_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl DbConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let min_connections = std::env::var("DB_MIN_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);

        let call_timeout = std::env::var("HEARTH_CALL_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CALL_TIMEOUT);

        Self {
            database_url,
            max_connections,
            min_connections,
            call_timeout,
            ..Default::default()
        }
    }
}

/// Open the store selected by `config`.
pub async fn open_store(config: &DbConfig) -> Result<StateStore, DbError> {
    let kv: Arc<dyn KvStore> = match &config.database_url {
        Some(url) => Arc::new(PostgresKvStore::connect(url, config).await?),
        None => {
            info!("DATABASE_URL not set, using in-memory store");
            Arc::new(MemoryKvStore::new())
        }
    };

    Ok(StateStore::new(kv, config.call_timeout))
}
