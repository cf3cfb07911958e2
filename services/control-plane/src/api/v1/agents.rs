//! Agent endpoints.
//!
//! `register` and `deployments` are the agent RPC transport. The listing
//! at `/` is the operator view of the fleet.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use hearth_model::AgentState;
use tracing::warn;

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::state::AppState;

/// Agents are top-level infrastructure resources: /v1/agents
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_agents))
        .route("/register", post(register))
        .route("/{hostname}/deployments", get(get_deployments))
}

/// Register: store the agent's reported state and refresh its contact time.
async fn register(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<AgentState>,
) -> Result<impl IntoResponse, ApiError> {
    let hostname = req.hostname.clone();
    let resp = state.agents().register(req).await.map_err(|e| {
        warn!(agent = %hostname, error = %e, "Register failed");
        ApiError::from(e).with_request_id(ctx.request_id.clone())
    })?;
    Ok(Json(resp))
}

/// GetGameserverDeployments: every deployment assigned to the agent.
async fn get_deployments(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(hostname): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = state
        .agents()
        .get_gameserver_deployments(&hostname)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id.clone()))?;
    Ok(Json(resp))
}

async fn list_agents(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ApiError> {
    let agents = state
        .gameservers()
        .agents()
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id.clone()))?;
    Ok(Json(agents))
}
