use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::db::DbConfig;
use crate::scheduler::{PolicyKind, SchedulerConfig};

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub database: DbConfig,
    pub scheduler_interval: Duration,
    pub agent_contact_delay: Duration,
    pub scheduler_policy: PolicyKind,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("HEARTH_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .context("HEARTH_LISTEN_ADDR")?;

        let log_level = std::env::var("HEARTH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let scheduler_interval = Duration::from_secs(secs_from_env(
            "HEARTH_SCHEDULER_INTERVAL_SECS",
            5,
        )?);
        let agent_contact_delay = Duration::from_secs(secs_from_env(
            "HEARTH_AGENT_CONTACT_DELAY_SECS",
            30,
        )?);
        if scheduler_interval.is_zero() {
            return Err(anyhow!("HEARTH_SCHEDULER_INTERVAL_SECS must be positive"));
        }

        let scheduler_policy = match std::env::var("HEARTH_SCHEDULER_POLICY") {
            Ok(v) => v.parse().map_err(|e: String| anyhow!(e))?,
            Err(_) => PolicyKind::default(),
        };

        Ok(Self {
            listen_addr,
            log_level,
            database: DbConfig::from_env(),
            scheduler_interval,
            agent_contact_delay,
            scheduler_policy,
        })
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            agent_contact_delay: self.agent_contact_delay,
        }
    }
}

fn secs_from_env(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .with_context(|| format!("{name} must be a number of seconds")),
        Err(_) => Ok(default),
    }
}
