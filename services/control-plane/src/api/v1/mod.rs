//! API v1 routes.

mod agents;
mod gameservers;

use axum::Router;

use crate::state::AppState;

/// Create API v1 routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        // Agent RPC and fleet overview: /v1/agents
        .nest("/agents", agents::routes())
        // User-facing: /v1/gameservers
        .nest("/gameservers", gameservers::routes())
}
