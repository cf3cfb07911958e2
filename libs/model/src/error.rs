//! Error types for model validation.

use thiserror::Error;

/// Errors raised by model invariants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The deployment is already bound to a different agent.
    #[error("deployment already assigned to agent '{current}', refusing '{requested}'")]
    AlreadyAssigned { current: String, requested: String },

    /// The hostname cannot be used as an agent identity.
    #[error("invalid hostname: {0:?}")]
    InvalidHostname(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}
