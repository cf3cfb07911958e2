//! Gameserver endpoints.
//!
//! The caller is identified by the owner header. Creation only records the
//! order; placement and startup happen asynchronously.

use axum::{
    extract::{Path, State},
    http::{header::ALLOW, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use hearth_id::GameserverId;

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::gameservers::CreateGameserverRequest;
use crate::state::AppState;

/// User-facing: /v1/gameservers
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_gameservers).post(create_gameserver))
        .route("/options", get(list_options).options(options_preflight))
        .route("/{uuid}", delete(delete_gameserver))
}

/// Supported game kinds, their versions, and accepted parameters.
async fn list_options(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.gameservers().supported_games())
}

async fn options_preflight() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [(ALLOW, HeaderValue::from_static("GET, OPTIONS"))],
    )
}

async fn list_gameservers(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ApiError> {
    let owner = ctx.require_owner()?;
    let items = state
        .gameservers()
        .list(owner)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id.clone()))?;
    Ok(Json(items))
}

async fn create_gameserver(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<CreateGameserverRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = ctx.require_owner()?;
    let created = state
        .gameservers()
        .create(owner, req)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id.clone()))?;
    Ok((StatusCode::ACCEPTED, Json(created)))
}

async fn delete_gameserver(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(uuid): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = ctx.require_owner()?;
    let uuid: GameserverId = uuid.parse().map_err(|_| {
        ApiError::bad_request("invalid_gameserver_id", "Invalid gameserver ID format")
            .with_request_id(ctx.request_id.clone())
    })?;

    state
        .gameservers()
        .delete(owner, uuid)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id.clone()))?;
    Ok(StatusCode::NO_CONTENT)
}
