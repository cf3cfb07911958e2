//! Control plane client for the agent.
//!
//! Provides the two RPC methods the agent needs:
//! - `Register`: report this host's full state
//! - `GetGameserverDeployments`: fetch the deployments assigned here

use std::time::Duration;

use async_trait::async_trait;
use hearth_model::{AgentState, Deployment, GameserverDeploymentsResponse};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("control plane returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl ClientError {
    /// Whether the call timed out on the client side.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Http(e) if e.is_timeout())
    }
}

/// The control plane as seen by the agent.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn register(&self, state: &AgentState) -> Result<(), ClientError>;

    async fn get_gameserver_deployments(
        &self,
        hostname: &str,
    ) -> Result<Vec<Deployment>, ClientError>;
}

/// JSON over HTTP client for the control plane.
pub struct HttpControlPlane {
    client: reqwest::Client,
    base_url: String,
}

impl HttpControlPlane {
    /// Create a client. Every request is bounded by `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self { client, base_url })
    }

    async fn check(
        response: reqwest::Response,
        what: &str,
    ) -> Result<reqwest::Response, ClientError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %body, "Failed to {what}");
        Err(ClientError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn register(&self, state: &AgentState) -> Result<(), ClientError> {
        let url = format!("{}/v1/agents/register", self.base_url);
        debug!(
            agent = %state.hostname,
            running = state.running_gameservers.len(),
            "Registering with control plane"
        );

        let response = self.client.post(&url).json(state).send().await?;
        Self::check(response, "register").await?;
        Ok(())
    }

    async fn get_gameserver_deployments(
        &self,
        hostname: &str,
    ) -> Result<Vec<Deployment>, ClientError> {
        let url = format!("{}/v1/agents/{}/deployments", self.base_url, hostname);
        debug!(url = %url, "Fetching deployments");

        let response = self.client.get(&url).send().await?;
        let response = Self::check(response, "fetch deployments").await?;

        let body: GameserverDeploymentsResponse = response.json().await?;
        debug!(count = body.deployments.len(), "Fetched deployments");
        Ok(body.deployments)
    }
}
