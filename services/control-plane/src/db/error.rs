//! Store error types.

use std::time::Duration;

use thiserror::Error;

/// Store operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to connect to the database.
    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    /// Failed to execute a query.
    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// No value stored under the key.
    #[error("key not found: {0}")]
    NotFound(String),

    /// A create hit an existing key.
    #[error("key already exists: {0}")]
    AlreadyExists(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The call did not complete within the configured deadline.
    #[error("store call '{operation}' timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

impl DbError {
    /// True for failures that a later attempt may not hit.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DbError::Connect(_) | DbError::Query(_) | DbError::Timeout { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound(_))
    }
}
