//! Messages exchanged between agents and the control plane.
//!
//! `Register` takes an [`AgentState`](crate::AgentState) as its request body.

use serde::{Deserialize, Serialize};

use crate::Deployment;

/// Acknowledgement of a registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {}

/// Every deployment currently assigned to the requesting agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameserverDeploymentsResponse {
    pub deployments: Vec<Deployment>,
}
