//! HTTP surface driven through the router without binding a socket.

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use rgs_core::{
    api::{create_app, AppState},
    config::RgsConfig,
    rng::{EntropySource, RngEngine, RngError, SeededEntropy},
    services::ServiceContainer,
    storage::{KvStore, MemoryStorage},
};
use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tower::ServiceExt;

/// Seeded entropy whose next read blocks once the flag is raised.
struct StallingEntropy {
    inner: SeededEntropy,
    stall: Arc<AtomicBool>,
}

impl EntropySource for StallingEntropy {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), RngError> {
        if self.stall.swap(false, Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(300));
        }
        self.inner.fill(buf)
    }

    fn name(&self) -> &'static str {
        "stalling"
    }
}

fn app() -> (Router, ServiceContainer) {
    let config = RgsConfig::development();
    let store: Arc<dyn KvStore> = Arc::new(MemoryStorage::new());
    let services =
        ServiceContainer::new(config.clone(), store, Arc::new(RngEngine::seeded(42))).unwrap();
    let state = Arc::new(AppState::from_services(&services));
    (create_app(state, &config.server), services)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn open_session(app: &Router, player: &str, deposit: i64) -> String {
    let (status, _) = send(
        app,
        "POST",
        &format!("/players/{}/deposit", player),
        Some(json!({ "amount": deposit })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, session) = send(
        app,
        "POST",
        "/sessions",
        Some(json!({ "player_id": player, "game_id": "fortune-slots" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    session["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_and_catalog() {
    let (app, _) = app();

    let (status, health) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "Running");
    assert_eq!(health["gaming_enabled"], true);

    let (status, games) = send(&app, "GET", "/games", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(games["games"].as_array().unwrap().len(), 2);
    assert_eq!(games["games"][0]["id"], "fortune-slots");
}

#[tokio::test]
async fn test_play_round_trip() {
    let (app, _) = app();
    let session_id = open_session(&app, "alice", 5_000).await;

    let (status, result) = send(
        &app,
        "POST",
        &format!("/sessions/{}/play", session_id),
        Some(json!({ "wager_amount": 100, "cycle_id": "api-cycle-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["cycle_id"], "api-cycle-1");
    assert_eq!(result["wager_amount"]["amount"], 100);
    assert_eq!(result["outcome"]["reels"].as_array().unwrap().len(), 3);
    let win = result["win_amount"]["amount"].as_i64().unwrap();
    assert_eq!(result["balance"]["amount"].as_i64().unwrap(), 5_000 - 100 + win);

    let (status, balance) = send(&app, "GET", "/players/alice/balance", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance["available"]["amount"], result["balance"]["amount"]);

    let (status, history) = send(&app, "GET", "/players/alice/history?limit=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["history"][0]["cycle_id"], "api-cycle-1");
    assert_eq!(history["history"][0]["outcome"], result["outcome"]);

    let (status, cycle) = send(&app, "GET", "/cycles/api-cycle-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cycle["status"], "completed");

    let (status, err) = send(
        &app,
        "POST",
        "/cycles/api-cycle-1/void",
        Some(json!({ "reason": "too late" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["error"]["code"], "INVALID_STATE");

    let (status, txs) = send(&app, "GET", "/players/alice/transactions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(txs["transactions"].as_array().unwrap().len() >= 2);
}

#[tokio::test]
async fn test_error_mapping() {
    let (app, _) = app();
    let session_id = open_session(&app, "bob", 50).await;
    let play_uri = format!("/sessions/{}/play", session_id);

    let (status, err) = send(&app, "POST", &play_uri, Some(json!({ "wager_amount": 1 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"]["code"], "BAD_REQUEST");
    assert!(err["request_id"].as_str().is_some());

    let (status, err) = send(&app, "POST", &play_uri, Some(json!({ "wager_amount": 100 }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["error"]["code"], "INSUFFICIENT_BALANCE");

    let (status, _) = send(&app, "GET", "/players/nobody/balance", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "POST",
        "/sessions/missing/play",
        Some(json!({ "wager_amount": 100 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "POST",
        "/players/bob/withdraw",
        Some(json!({ "amount": 500 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(&app, "POST", "/cycles/nope/void", Some(json!({ "reason": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_disabled_gaming_is_forbidden() {
    let (app, services) = app();
    let session_id = open_session(&app, "carol", 1_000).await;
    services
        .control()
        .disable_all_gaming("maintenance", "ops")
        .await;

    let (status, err) = send(
        &app,
        "POST",
        &format!("/sessions/{}/play", session_id),
        Some(json!({ "wager_amount": 100 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(err["error"]["code"], "FORBIDDEN");

    let (_, health) = send(&app, "GET", "/health", None).await;
    assert_eq!(health["gaming_enabled"], false);
}

#[tokio::test]
async fn test_request_id_echoed_and_metrics_exposed() {
    let (app, _) = app();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .header("x-request-id", "trace-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "trace-123");
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&body).contains("rgs_"));

    let (status, report) = send(&app, "GET", "/rng/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["healthy"], true);
}

#[tokio::test]
async fn test_play_timeout_interrupts_cycle_and_holds_wager() {
    let mut config = RgsConfig::development();
    config.server.play_timeout_ms = 50;
    let stall = Arc::new(AtomicBool::new(false));
    let rng = RngEngine::new(Box::new(StallingEntropy {
        inner: SeededEntropy::new(5),
        stall: stall.clone(),
    }));
    let store: Arc<dyn KvStore> = Arc::new(MemoryStorage::new());
    let services = ServiceContainer::new(config.clone(), store, Arc::new(rng)).unwrap();
    let app = create_app(Arc::new(AppState::from_services(&services)), &config.server);

    let session_id = open_session(&app, "slowpoke", 1_000).await;
    stall.store(true, Ordering::SeqCst);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/sessions/{}/play", session_id),
        Some(json!({ "wager_amount": 100, "cycle_id": "c-slow" })),
    )
    .await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["error"]["code"], "TIMEOUT");
    assert_eq!(body["error"]["details"]["cycle_id"], "c-slow");

    // the wager stays held on an interrupted cycle
    let (_, cycle) = send(&app, "GET", "/cycles/c-slow", None).await;
    assert_eq!(cycle["status"], "interrupted");
    let (_, interrupted) = send(&app, "GET", "/players/slowpoke/interrupted", None).await;
    let games = interrupted["games"].as_array().unwrap();
    assert_eq!(games.len(), 1);
    assert_eq!(games[0]["cycle_id"], "c-slow");
    assert_eq!(games[0]["outcome_stored"], false);
    let (_, balance) = send(&app, "GET", "/players/slowpoke/balance", None).await;
    assert_eq!(balance["available"]["amount"], 900);

    let (status, voided) = send(
        &app,
        "POST",
        "/cycles/c-slow/void",
        Some(json!({ "reason": "play timed out" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(voided["status"], "voided");
    let (_, balance) = send(&app, "GET", "/players/slowpoke/balance", None).await;
    assert_eq!(balance["available"]["amount"], 1_000);
    let (_, interrupted) = send(&app, "GET", "/players/slowpoke/interrupted", None).await;
    assert!(interrupted["games"].as_array().unwrap().is_empty());
}
