//! hearth agent library
//!
//! The agent runs on each game host. Every tick it reports the host's
//! resources and running gameservers to the control plane, fetches the
//! deployments assigned to it, and converges the local containers to match.
//!
//! ## Modules
//!
//! - `client`: control plane RPC client
//! - `runtime`: container runtime interface and in-memory mock
//! - `docker`: Docker Engine implementation of the runtime
//! - `reconciler`: the per-tick convergence loop

pub mod client;
pub mod config;
pub mod docker;
pub mod heartbeat;
pub mod reconciler;
pub mod resources;
pub mod runtime;

// Re-export commonly used types
pub use client::{ClientError, ControlPlane, HttpControlPlane};
pub use reconciler::{AgentError, ReconcileReport, Reconciler, ReconcilerConfig};
pub use resources::{HostProbe, ResourceProbe, SystemResources};
pub use runtime::{ContainerRuntime, MockRuntime};
