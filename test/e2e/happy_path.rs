//! End-to-end happy path test.
//!
//! Runs the control plane HTTP server and an agent in one process, with the
//! mock container runtime standing in for Docker, and walks one gameserver
//! through its whole life:
//!
//! 1. Agent registers with an empty host
//! 2. User orders a Minecraft server
//! 3. Scheduler assigns it to the agent
//! 4. Agent creates and starts the container
//! 5. Listing shows the bound address and running status
//! 6. User deletes it; agent removes the container
//!
//! ## Running
//!
//! ```bash
//! cargo test -p hearth-e2e --test happy_path
//! ```

use std::sync::Arc;
use std::time::Duration;

use hearth_agent::{
    HttpControlPlane, MockRuntime, Reconciler, ReconcilerConfig, SystemResources,
};
use hearth_control_plane::{
    api,
    db::StateStore,
    gameservers::GameserverSummary,
    games::GameRegistry,
    scheduler::{RandomSelection, SchedulerConfig, SchedulerReconciler},
    state::AppState,
};
use hearth_model::GameserverStatus;
use hearth_networking::AddressPool;
use tokio::net::TcpListener;
use tokio::sync::watch;

const OWNER_HEADER: &str = "x-owner-id";

async fn list(client: &reqwest::Client, base_url: &str) -> Vec<GameserverSummary> {
    let resp = client
        .get(format!("{base_url}/v1/gameservers"))
        .header(OWNER_HEADER, "alice")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    resp.json().await.unwrap()
}

#[tokio::test]
async fn test_gameserver_lifecycle() {
    // Control plane
    let store = StateStore::in_memory();
    let state = AppState::new(store.clone(), Arc::new(GameRegistry::with_defaults()));
    let app = api::create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            })
            .await
            .unwrap();
    });

    let scheduler = SchedulerReconciler::new(
        store.clone(),
        Box::new(RandomSelection),
        SchedulerConfig::default(),
    );

    // Agent
    let runtime = Arc::new(MockRuntime::new());
    let control_plane =
        Arc::new(HttpControlPlane::new(&base_url, Duration::from_secs(5)).unwrap());
    let probe = SystemResources {
        cpus: 4,
        total_memory_kib: 8 * 1024 * 1024,
        available_memory_kib: 7 * 1024 * 1024,
    };
    let agent = Reconciler::new(
        runtime.clone(),
        control_plane,
        Arc::new(probe),
        AddressPool::from_list("10.0.0.1").unwrap(),
        ReconcilerConfig::new("host-a"),
    );

    // 1. Register
    let report = agent.tick().await.unwrap();
    assert_eq!(report.created, 0);

    let client = reqwest::Client::new();
    let agents: serde_json::Value = client
        .get(format!("{base_url}/v1/agents"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(agents[0]["hostname"], "host-a");

    // 2. Order
    let resp = client
        .post(format!("{base_url}/v1/gameservers"))
        .header(OWNER_HEADER, "alice")
        .json(&serde_json::json!({
            "name": "survival",
            "game": "Minecraft",
            "version": "1.14.1",
            "parameters": { "motd": "hello" }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);
    let body: serde_json::Value = resp.json().await.unwrap();
    let uuid = body["uuid"].as_str().unwrap().to_string();

    let listed = list(&client, &base_url).await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].address, "");

    // 3. Schedule
    let stats = scheduler.tick().await.unwrap();
    assert_eq!(stats.scheduled, 1);

    // 4. Create
    let report = agent.tick().await.unwrap();
    assert_eq!(report.created, 1);
    let containers = runtime.containers();
    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0].name, uuid);
    assert_eq!(containers[0].state, "running");

    // 5. Report and list
    agent.tick().await.unwrap();
    let listed = list(&client, &base_url).await;
    assert_eq!(listed[0].uuid.to_string(), uuid);
    assert_eq!(listed[0].address, "10.0.0.1:25565");
    assert_eq!(listed[0].status, GameserverStatus::Running);

    // 6. Delete
    let resp = client
        .delete(format!("{base_url}/v1/gameservers/{uuid}"))
        .header(OWNER_HEADER, "alice")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);

    let report = agent.tick().await.unwrap();
    assert_eq!(report.removed, 1);
    assert!(runtime.containers().is_empty());
    assert!(list(&client, &base_url).await.is_empty());

    let _ = shutdown_tx.send(true);
    server.await.unwrap();
}
