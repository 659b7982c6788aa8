//! Integration tests for the gateway endpoints.
//!
//! Most tests drive the Axum `Router` directly via `tower::ServiceExt`
//! without a TCP listener. The supervisor is never started, so the only
//! state changes are the ones the requests make.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use thunderbird_core::config::{ProducerConfig, ScenarioConfig};
use thunderbird_core::hub::BroadcastHub;
use thunderbird_core::signal::StopSignal;
use thunderbird_core::store::StateStore;
use thunderbird_core::supervisor::Supervisor;
use thunderbird_gateway::router::build_router;
use thunderbird_gateway::server::{self, ServerConfig, ServerError};
use thunderbird_gateway::state::AppState;
use thunderbird_gateway::startup::spawn_gateway;
use thunderbird_types::{SystemMode, SystemState};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn make_test_state() -> Arc<AppState> {
    let (store, rx) = StateStore::new(SystemState::seeded(SystemMode::Realtime, Utc::now()));
    let store = Arc::new(store);
    let hub = Arc::new(BroadcastHub::new(store.read().await));
    tokio::spawn(Arc::clone(&hub).run(rx));

    let supervisor = Arc::new(Supervisor::new(
        store,
        ProducerConfig::default(),
        ScenarioConfig::default(),
        5,
    ));
    Arc::new(AppState::new(supervisor, hub, 16))
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_mode(body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/mode")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn loopback() -> ServerConfig {
    ServerConfig {
        host: String::from("127.0.0.1"),
        port: 0,
    }
}

/// Next state frame, skipping control frames.
async fn next_state_frame(client: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

// =========================================================================
// GET /api/status
// =========================================================================

#[tokio::test]
async fn status_returns_seeded_state_document() {
    let state = make_test_state().await;
    let response = build_router(state).oneshot(get("/api/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["systemMode"], "realtime");
    assert_eq!(json["satellites"], Value::Array(Vec::new()));
    assert_eq!(json["quantumKeyPool"], 0);
    assert_eq!(json["activeChannels"], 0);
    assert_eq!(json["blockchainData"]["blockHeight"], 1);
    assert_eq!(json["blockchainData"]["activeValidators"], 5);
    assert_eq!(json["blockchainData"]["networkStatus"], "active");
    assert_eq!(json["aiMetrics"]["threatDetectionAccuracy"], 98.5);
    assert_eq!(json["aiMetrics"]["activeThreats"], 0);
    assert!(json["lastUpdateTime"].is_string());
}

#[tokio::test]
async fn status_rejects_other_methods() {
    let state = make_test_state().await;
    let request = Request::builder()
        .method("DELETE")
        .uri("/api/status")
        .body(Body::empty())
        .unwrap();
    let response = build_router(state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

// =========================================================================
// POST /api/mode
// =========================================================================

#[tokio::test]
async fn mode_change_succeeds_and_is_visible() {
    let state = make_test_state().await;

    let response = build_router(Arc::clone(&state))
        .oneshot(post_mode(r#"{"mode":"scenario"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json, serde_json::json!({"status": "success", "mode": "scenario"}));

    let response = build_router(state).oneshot(get("/api/status")).await.unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["systemMode"], "scenario");
}

#[tokio::test]
async fn same_mode_request_succeeds_without_a_commit() {
    let state = make_test_state().await;

    let response = build_router(Arc::clone(&state))
        .oneshot(post_mode(r#"{"mode":"realtime"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(state.supervisor.snapshot().await.version(), 0);
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let state = make_test_state().await;

    for body in ["not json", r#"{"state":"scenario"}"#, r#"{"mode":7}"#] {
        let response = build_router(Arc::clone(&state))
            .oneshot(post_mode(body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body}");
        let json = body_to_json(response.into_body()).await;
        assert_eq!(json["error"], "Invalid request body");
        assert_eq!(json["status"], 400);
    }
    assert_eq!(state.supervisor.snapshot().await.version(), 0);
}

#[tokio::test]
async fn missing_content_type_is_rejected() {
    let state = make_test_state().await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/mode")
        .body(Body::from(r#"{"mode":"scenario"}"#))
        .unwrap();

    let response = build_router(state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "Invalid request body");
}

#[tokio::test]
async fn unknown_mode_is_rejected() {
    let state = make_test_state().await;

    let response = build_router(Arc::clone(&state))
        .oneshot(post_mode(r#"{"mode":"turbo"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "Invalid mode. Must be 'realtime' or 'scenario'");
    assert_eq!(state.supervisor.snapshot().await.state().mode, SystemMode::Realtime);
}

#[tokio::test]
async fn mode_rejects_get() {
    let state = make_test_state().await;
    let response = build_router(state).oneshot(get("/api/mode")).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn mode_change_after_shutdown_is_unavailable() {
    let state = make_test_state().await;
    state.supervisor.shutdown().await;

    let response = build_router(state)
        .oneshot(post_mode(r#"{"mode":"scenario"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], 503);
}

#[tokio::test]
async fn mode_change_reaches_subscribers() {
    let state = make_test_state().await;
    let mut sub = state.hub.subscribe(8).await.unwrap();

    let response = build_router(Arc::clone(&state))
        .oneshot(post_mode(r#"{"mode":"scenario"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let initial = sub.receiver.recv().await.unwrap();
    assert_eq!(initial.version(), 0);
    let changed = tokio::time::timeout(Duration::from_secs(1), sub.receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(changed.version(), 1);
    assert_eq!(changed.state().mode, SystemMode::Scenario);
}

// =========================================================================
// CORS
// =========================================================================

#[tokio::test]
async fn preflight_allows_any_origin() {
    let state = make_test_state().await;
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/api/mode")
        .header(header::ORIGIN, "http://dashboard.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap();

    let response = build_router(state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
}

// =========================================================================
// Listener lifecycle
// =========================================================================

#[tokio::test]
async fn spawned_gateway_serves_until_shutdown() {
    let state = make_test_state().await;
    let stop = StopSignal::new();
    let mut listener = stop.listener();

    let gateway = spawn_gateway(&loopback(), state, async move { listener.stopped().await })
        .await
        .unwrap();

    let url = format!("http://{}/api/status", gateway.addr);
    let response = reqwest::get(&url).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["systemMode"], "realtime");

    stop.trigger();
    tokio::time::timeout(Duration::from_secs(5), gateway.handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn bind_conflict_is_reported() {
    let first = server::bind(&ServerConfig {
        host: String::from("127.0.0.1"),
        port: 0,
    })
    .await
    .unwrap();
    let taken = first.local_addr().unwrap().port();

    let second = server::bind(&ServerConfig {
        host: String::from("127.0.0.1"),
        port: taken,
    })
    .await;
    assert!(matches!(second, Err(ServerError::Bind(_))));

    let malformed = server::bind(&ServerConfig {
        host: String::from("not a host"),
        port: 80,
    })
    .await;
    assert!(matches!(malformed, Err(ServerError::Bind(_))));
}

// =========================================================================
// GET /ws
// =========================================================================

#[tokio::test]
async fn ws_streams_state_then_each_change_and_unregisters_on_close() {
    let state = make_test_state().await;
    let stop = StopSignal::new();
    let mut listener = stop.listener();
    let gateway = spawn_gateway(&loopback(), Arc::clone(&state), async move {
        listener.stopped().await;
    })
    .await
    .unwrap();

    let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", gateway.addr))
        .await
        .unwrap();

    let first = next_state_frame(&mut client).await;
    assert_eq!(first["systemMode"], "realtime");
    assert_eq!(first["blockchainData"]["blockHeight"], 1);
    assert_eq!(state.hub.subscriber_count().await, 1);

    client.send(Message::Ping(b"beat".to_vec())).await.unwrap();
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Pong(data) = frame {
            assert_eq!(data.to_vec(), b"beat".to_vec());
            break;
        }
    }

    let response = reqwest::Client::new()
        .post(format!("http://{}/api/mode", gateway.addr))
        .header("content-type", "application/json")
        .body(r#"{"mode":"scenario"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let changed = next_state_frame(&mut client).await;
    assert_eq!(changed["systemMode"], "scenario");

    client.close(None).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while state.hub.subscriber_count().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    stop.trigger();
    tokio::time::timeout(Duration::from_secs(5), gateway.handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn ws_clients_each_get_their_own_stream() {
    let state = make_test_state().await;
    let stop = StopSignal::new();
    let mut listener = stop.listener();
    let gateway = spawn_gateway(&loopback(), Arc::clone(&state), async move {
        listener.stopped().await;
    })
    .await
    .unwrap();
    let url = format!("ws://{}/ws", gateway.addr);

    let (mut early, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    assert_eq!(next_state_frame(&mut early).await["systemMode"], "realtime");

    state.supervisor.switch_mode(SystemMode::Scenario).await.unwrap();
    assert_eq!(next_state_frame(&mut early).await["systemMode"], "scenario");

    // A late joiner starts from the current state, not the history.
    let (mut late, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    assert_eq!(next_state_frame(&mut late).await["systemMode"], "scenario");
    assert_eq!(state.hub.subscriber_count().await, 2);

    drop(early);
    drop(late);
    stop.trigger();
    tokio::time::timeout(Duration::from_secs(5), gateway.handle)
        .await
        .unwrap()
        .unwrap();
}
