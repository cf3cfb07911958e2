//! Key-value contract the rest of the control plane is written against.

use async_trait::async_trait;

use super::DbError;

/// A consistent key-value store over a hierarchical keyspace.
///
/// Values are JSON documents carried as strings. A single key write is
/// atomic; there are no multi-key transactions.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, DbError>;

    /// All entries whose key starts with `prefix`, ordered by key.
    async fn list(&self, prefix: &str) -> Result<Vec<(String, String)>, DbError>;

    /// Insert a new key. Fails with [`DbError::AlreadyExists`].
    async fn create(&self, key: &str, value: String) -> Result<(), DbError>;

    /// Replace an existing key. Fails with [`DbError::NotFound`].
    async fn update(&self, key: &str, value: String) -> Result<(), DbError>;

    /// Insert or replace.
    async fn set(&self, key: &str, value: String) -> Result<(), DbError>;

    /// Remove a key. Fails with [`DbError::NotFound`].
    async fn delete(&self, key: &str) -> Result<(), DbError>;

    /// Check the backend is reachable.
    async fn health_check(&self) -> Result<(), DbError> {
        Ok(())
    }
}
