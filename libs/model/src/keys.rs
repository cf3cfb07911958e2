//! Store keyspace.

use hearth_id::GameserverId;

use crate::ModelError;

pub const AGENTS_PREFIX: &str = "/agents/";
pub const GAMESERVERS_PREFIX: &str = "/gameservers/";

/// `/agents/<hostname>/state`
pub fn agent_state(hostname: &str) -> String {
    format!("{AGENTS_PREFIX}{hostname}/state")
}

/// `/gameservers/<uuid>`
pub fn gameserver(uuid: &GameserverId) -> String {
    format!("{GAMESERVERS_PREFIX}{uuid}")
}

/// Rejects hostnames that would escape their key segment.
pub fn validate_hostname(hostname: &str) -> Result<(), ModelError> {
    let valid = !hostname.is_empty()
        && hostname.len() <= 253
        && !hostname.contains('/')
        && !hostname.chars().any(char::is_whitespace);

    if valid {
        Ok(())
    } else {
        Err(ModelError::InvalidHostname(hostname.to_string()))
    }
}
