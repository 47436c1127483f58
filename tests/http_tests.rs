// Integration tests for the HTTP control API
//
// These tests exercise the router in-process with `tower::ServiceExt`.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use voice_session::config::{AudioDeviceConfig, HostedConfig, RuntimeConfig};
use voice_session::{
    create_router, AppState, ConversationConfig, ConversationSession, Engine, SessionDevices,
    WavFileOutput, WebSocketConnector,
};

fn app(dir: &TempDir, config: ConversationConfig) -> axum::Router {
    let output = WavFileOutput::create(dir.path().join("agent.wav"), 16000, false).unwrap();
    let devices = SessionDevices {
        input: None,
        output: Arc::new(output),
        connector: Arc::new(WebSocketConnector::new()),
        probe: Arc::new(Engine::Chromium),
    };
    let session = ConversationSession::new(
        config,
        AudioDeviceConfig::default(),
        RuntimeConfig::default(),
        devices,
    );
    create_router(AppState::new(Arc::new(session)))
}

fn hosted_without_key() -> ConversationConfig {
    ConversationConfig::Hosted(HostedConfig::default())
}

async fn call(app: axum::Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health_check() {
    let dir = TempDir::new().unwrap();
    let (status, _) = call(app(&dir, hosted_without_key()), "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_status_of_idle_session() {
    let dir = TempDir::new().unwrap();
    let (status, body) = call(app(&dir, hosted_without_key()), "GET", "/conversation/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["status"], "idle");
    assert_eq!(body["stats"]["active"], true);
    assert_eq!(body["speaker"], "none");
    assert_eq!(body["error"], Value::Null);
}

#[tokio::test]
async fn test_start_with_invalid_config_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let (status, body) = call(app(&dir, hosted_without_key()), "POST", "/conversation/start").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("api key"));
}

#[tokio::test]
async fn test_stop_and_toggle_while_idle() {
    let dir = TempDir::new().unwrap();
    let router = app(&dir, hosted_without_key());

    let (status, body) = call(router.clone(), "POST", "/conversation/stop").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["status"], "idle");

    let (status, body) = call(router.clone(), "POST", "/conversation/toggle").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], false);

    let (_, body) = call(router, "GET", "/conversation/transcript").await;
    assert_eq!(body, Value::Array(Vec::new()));
}
