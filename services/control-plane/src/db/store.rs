//! Typed access to agents and gameservers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hearth_id::GameserverId;
use hearth_model::{keys, Agent, AgentState, Gameserver};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::{DbError, KvStore, MemoryKvStore};

/// Default deadline for a single store call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Typed facade over a [`KvStore`].
///
/// Cheap to clone. Every call is bounded by `call_timeout`.
#[derive(Clone)]
pub struct StateStore {
    kv: Arc<dyn KvStore>,
    call_timeout: Duration,
}

impl StateStore {
    pub fn new(kv: Arc<dyn KvStore>, call_timeout: Duration) -> Self {
        Self { kv, call_timeout }
    }

    /// A fresh in-process store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKvStore::new()), DEFAULT_CALL_TIMEOUT)
    }

    pub fn backend(&self) -> &'static str {
        self.kv.backend()
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, DbError>
    where
        F: Future<Output = Result<T, DbError>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(DbError::Timeout {
                operation,
                after: self.call_timeout,
            }),
        }
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<T, DbError> {
        let raw = self
            .bounded("get", self.kv.get(key))
            .await?
            .ok_or_else(|| DbError::NotFound(key.to_string()))?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn read_all<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>, DbError> {
        let entries = self.bounded("list", self.kv.list(prefix)).await?;
        entries
            .iter()
            .map(|(_, raw)| serde_json::from_str(raw).map_err(DbError::from))
            .collect()
    }

    fn encode<T: Serialize>(value: &T) -> Result<String, DbError> {
        Ok(serde_json::to_string(value)?)
    }

    pub async fn health_check(&self) -> Result<(), DbError> {
        self.bounded("health_check", self.kv.health_check()).await
    }

    // ── Gameservers ────────────────────────────────────────────────

    /// Store a new gameserver. Fails if the UUID is taken.
    pub async fn create_gameserver(&self, gameserver: &Gameserver) -> Result<(), DbError> {
        let key = keys::gameserver(&gameserver.uuid());
        let value = Self::encode(gameserver)?;
        self.bounded("create", self.kv.create(&key, value)).await?;
        debug!(%key, "gameserver stored");
        Ok(())
    }

    pub async fn get_gameserver(&self, uuid: &GameserverId) -> Result<Gameserver, DbError> {
        self.read(&keys::gameserver(uuid)).await
    }

    pub async fn list_gameservers(&self) -> Result<Vec<Gameserver>, DbError> {
        self.read_all(keys::GAMESERVERS_PREFIX).await
    }

    /// Replace an existing gameserver.
    pub async fn update_gameserver(&self, gameserver: &Gameserver) -> Result<(), DbError> {
        let key = keys::gameserver(&gameserver.uuid());
        let value = Self::encode(gameserver)?;
        self.bounded("update", self.kv.update(&key, value)).await
    }

    pub async fn delete_gameserver(&self, uuid: &GameserverId) -> Result<(), DbError> {
        let key = keys::gameserver(uuid);
        self.bounded("delete", self.kv.delete(&key)).await?;
        debug!(%key, "gameserver deleted");
        Ok(())
    }

    /// Every gameserver assigned to `hostname`.
    pub async fn gameservers_for_agent(&self, hostname: &str) -> Result<Vec<Gameserver>, DbError> {
        let mut all = self.list_gameservers().await?;
        all.retain(|gs| gs.agent() == hostname);
        Ok(all)
    }

    // ── Agents ─────────────────────────────────────────────────────

    /// Replace the agent's snapshot and stamp `last_contact` with now.
    pub async fn register_agent(&self, state: AgentState) -> Result<Agent, DbError> {
        self.register_agent_at(state, Utc::now()).await
    }

    pub async fn register_agent_at(
        &self,
        state: AgentState,
        last_contact: DateTime<Utc>,
    ) -> Result<Agent, DbError> {
        let key = keys::agent_state(&state.hostname);
        let agent = Agent {
            state,
            last_contact,
        };
        let value = Self::encode(&agent)?;
        self.bounded("set", self.kv.set(&key, value)).await?;
        Ok(agent)
    }

    pub async fn get_agent(&self, hostname: &str) -> Result<Agent, DbError> {
        self.read(&keys::agent_state(hostname)).await
    }

    pub async fn list_agents(&self) -> Result<Vec<Agent>, DbError> {
        self.read_all(keys::AGENTS_PREFIX).await
    }
}
