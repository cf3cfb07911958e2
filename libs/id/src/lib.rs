//! # hearth-id
//!
//! Typed identifiers shared by the control plane and the agents.
//!
//! Two shapes exist:
//!
//! - Gameserver identity is a bare UUID (`787a1b9d-6371-44d4-bd0b-d3c94077ad6b`).
//!   It doubles as the container name and the value of the agent's UUID label,
//!   so it must stay a plain hyphenated UUID with no prefix.
//! - Internal correlation ids use a prefixed ULID (`req_01HV4Z2WQXKJNM8GPQY6VBKC3D`),
//!   which sorts by creation time.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;

/// Re-export uuid for consumers that need raw UUID operations
pub use uuid::Uuid;
