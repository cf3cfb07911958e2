//! HTTP surface tests.
//!
//! Drives the router in-process with `oneshot` against the in-memory store.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use hearth_control_plane::{
    api, db::StateStore, gameservers::GameserverSummary, games::GameRegistry, state::AppState,
};
use hearth_model::GameserverDeploymentsResponse;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> (Router, StateStore) {
    let store = StateStore::in_memory();
    let state = AppState::new(store.clone(), Arc::new(GameRegistry::with_defaults()));
    (api::create_router(state), store)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, owner: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(owner) = owner {
        builder = builder.header("x-owner-id", owner);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, owner: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(owner) = owner {
        builder = builder.header("x-owner-id", owner);
    }
    builder.body(Body::empty()).unwrap()
}

fn agent_state(hostname: &str) -> Value {
    json!({
        "hostname": hostname,
        "resources": { "cpus": 4, "memory_kib": 8388608, "ip_addresses": 2 },
        "usage": { "memory_kib": 1024 },
        "running_gameservers": []
    })
}

#[tokio::test]
async fn test_register_then_fetch_empty_deployments() {
    let (app, store) = app();

    let register = post_json("/v1/agents/register", None, agent_state("host-a"));
    let (status, body) = send(&app, register).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));
    assert_eq!(store.get_agent("host-a").await.unwrap().state.resources.cpus, 4);

    let (status, body) = send(&app, get("/v1/agents/host-a/deployments", None)).await;
    assert_eq!(status, StatusCode::OK);
    let resp: GameserverDeploymentsResponse = serde_json::from_value(body).unwrap();
    assert!(resp.deployments.is_empty());
}

#[tokio::test]
async fn test_register_rejects_empty_hostname() {
    let (app, _) = app();
    let (status, body) = send(&app, post_json("/v1/agents/register", None, agent_state(""))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_argument");
}

#[tokio::test]
async fn test_deployments_follow_assignment() {
    let (app, store) = app();

    let (status, body) = send(
        &app,
        post_json(
            "/v1/gameservers",
            Some("alice"),
            json!({ "name": "voice", "game": "Teamspeak", "version": "3.9" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "Order accepted");

    let uuid = body["uuid"].as_str().unwrap().parse().unwrap();
    let mut gs = store.get_gameserver(&uuid).await.unwrap();
    gs.deployment.assign("host-a").unwrap();
    store.update_gameserver(&gs).await.unwrap();

    let (_, body) = send(&app, get("/v1/agents/host-a/deployments", None)).await;
    let resp: GameserverDeploymentsResponse = serde_json::from_value(body).unwrap();
    assert_eq!(resp.deployments, vec![gs.deployment]);
}

#[tokio::test]
async fn test_gameserver_routes_require_owner() {
    let (app, _) = app();
    let (status, body) = send(&app, get("/v1/gameservers", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "missing_owner");
}

#[tokio::test]
async fn test_create_rejects_unknown_game() {
    let (app, _) = app();
    let (status, body) = send(
        &app,
        post_json(
            "/v1/gameservers",
            Some("alice"),
            json!({ "name": "doom", "game": "Doom", "version": "1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "unsupported_game_kind");
}

#[tokio::test]
async fn test_list_and_delete_gameserver() {
    let (app, _) = app();
    let (_, created) = send(
        &app,
        post_json(
            "/v1/gameservers",
            Some("alice"),
            json!({
                "name": "survival",
                "game": "Minecraft",
                "version": "1.14.1",
                "parameters": { "motd": "hello" }
            }),
        ),
    )
    .await;
    let uuid = created["uuid"].as_str().unwrap().to_string();

    let (status, body) = send(&app, get("/v1/gameservers", Some("alice"))).await;
    assert_eq!(status, StatusCode::OK);
    let listed: Vec<GameserverSummary> = serde_json::from_value(body).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].uuid.to_string(), uuid);
    assert_eq!(listed[0].address, "");

    let (_, body) = send(&app, get("/v1/gameservers", Some("bob"))).await;
    assert_eq!(body, json!([]));

    let delete = |owner: &str| {
        Request::builder()
            .method("DELETE")
            .uri(format!("/v1/gameservers/{uuid}"))
            .header("x-owner-id", owner)
            .body(Body::empty())
            .unwrap()
    };

    let (status, _) = send(&app, delete("bob")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, delete("alice")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, delete("alice")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_rejects_malformed_uuid() {
    let (app, _) = app();
    let req = Request::builder()
        .method("DELETE")
        .uri("/v1/gameservers/not-a-uuid")
        .header("x-owner-id", "alice")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_gameserver_id");
}

#[tokio::test]
async fn test_options_lists_supported_games() {
    let (app, _) = app();
    let (status, body) = send(&app, get("/v1/gameservers/options", None)).await;
    assert_eq!(status, StatusCode::OK);

    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Minecraft", "Factorio", "Teamspeak"]);
}

#[tokio::test]
async fn test_agents_overview() {
    let (app, _) = app();
    send(&app, post_json("/v1/agents/register", None, agent_state("host-a"))).await;

    let (status, body) = send(&app, get("/v1/agents", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["hostname"], "host-a");
    assert_eq!(body[0]["gameservers"], 0);
    assert_eq!(body[0]["usage"]["memory_kib"], 1024);
}

#[tokio::test]
async fn test_readyz_reports_store_backend() {
    let (app, _) = app();
    let (status, body) = send(&app, get("/readyz", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["components"]["store"]["backend"], "memory");
}
