//! # hearth-model
//!
//! Data model shared by the control plane and the agents.
//!
//! ## Records
//!
//! - [`GameserverDefinition`]: immutable user intent (kind, version, parameters)
//! - [`Deployment`]: the runtime-facing rendering of a definition, plus the
//!   hostname of the agent it was assigned to
//! - [`Gameserver`]: one definition paired with its deployment, the unit of storage
//! - [`AgentState`]: the snapshot an agent reports on every reconciliation tick
//! - [`Agent`]: the stored agent state plus its `last_contact` timestamp
//!
//! ## Units
//!
//! All memory figures are kibibytes (KiB). Agents convert to bytes only when
//! talking to the container runtime.
//!
//! ## Keyspace
//!
//! - `/agents/<hostname>/state` holds an [`Agent`]
//! - `/gameservers/<uuid>` holds a [`Gameserver`]

mod agent;
mod error;
mod gameserver;
pub mod keys;
mod rpc;

pub use agent::*;
pub use error::ModelError;
pub use gameserver::*;
pub use rpc::*;

pub use hearth_id::GameserverId;
