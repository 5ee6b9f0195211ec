//! Integration tests for the HTTP server, request validation, health endpoint,
//! and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use hdh_relay::config::model::Config;
use hdh_relay::config::ConfigVersion;
use hdh_relay::health::HealthResponse;
use hdh_relay::server::{self, AppState, LoadedConfig};
use serde_json::{json, Value};

async fn start_test_server(
    config: Config,
    serve_gateway: bool,
) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
    let state = Arc::new(AppState::new(LoadedConfig::new(
        config,
        ConfigVersion::Hash("test-hash".into()),
        "test",
    )));

    let router = server::build_router(state, 1_048_576, serve_gateway);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .await
        .unwrap();
    });

    (addr, shutdown_tx)
}

async fn post(addr: SocketAddr, path: &str, body: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}{path}"))
        .header("content-type", "application/json")
        .body(body.to_string())
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn health_endpoint_returns_healthy() {
    let (addr, shutdown) = start_test_server(Config::default(), false).await;

    let url = format!("http://{addr}/health");
    let resp = reqwest::get(&url).await.unwrap();
    assert_eq!(resp.status(), 200);

    let health: HealthResponse = resp.json().await.unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.config.source, "test");
    assert_eq!(health.config.version, "test-has");
    assert!(!health.config.gateway_configured);
    assert_eq!(health.stats.requests_forwarded, 0);
    assert_eq!(health.stats.requests_failed, 0);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn health_version_matches_crate() {
    let (addr, shutdown) = start_test_server(Config::default(), false).await;

    let url = format!("http://{addr}/health");
    let health: HealthResponse = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn unknown_path_returns_404() {
    let (addr, shutdown) = start_test_server(Config::default(), false).await;

    let resp = reqwest::get(format!("http://{addr}/nonexistent")).await.unwrap();
    assert_eq!(resp.status(), 404);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn gateway_endpoint_requires_flag() {
    let (addr, shutdown) = start_test_server(Config::default(), false).await;
    let resp = post(addr, "/gateway", r#"{"mode":"proxy"}"#).await;
    assert_eq!(resp.status(), 404);
    let _ = shutdown.send(());

    let (addr, shutdown) = start_test_server(Config::default(), true).await;
    let resp = post(addr, "/gateway", r#"{"mode":"bogus"}"#).await;
    assert_eq!(resp.status(), 400);
    let _ = shutdown.send(());
}

#[tokio::test]
async fn get_on_relay_endpoint_is_405() {
    let (addr, shutdown) = start_test_server(Config::default(), false).await;

    let resp = reqwest::get(format!("http://{addr}/api/proxy")).await.unwrap();
    assert_eq!(resp.status(), 405);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn missing_fields_are_listed() {
    let (addr, shutdown) = start_test_server(Config::default(), false).await;

    let resp = post(addr, "/api/process-message", r#"{"type":"hl7"}"#).await;
    assert_eq!(resp.status(), 400);
    assert!(resp.headers().contains_key("x-correlation-id"));

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["status"], 400);
    assert_eq!(
        body["error"],
        "Missing required fields: content, domain, username, password"
    );
    assert!(body["timestamp"].is_string());

    let health: HealthResponse = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health.stats.requests_failed, 1);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn malformed_bodies_are_400() {
    let (addr, shutdown) = start_test_server(Config::default(), false).await;

    let resp = post(addr, "/api/process-message", "{not json").await;
    assert_eq!(resp.status(), 400);

    let resp = post(
        addr,
        "/api/process-message",
        r#"{"type":"xml","content":"<a/>","domain":"https://hub.example.com","username":"u","password":"p"}"#,
    )
    .await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("xml"));

    let resp = post(
        addr,
        "/api/process-message",
        r#"{"type":"json","content":"{broken","domain":"https://hub.example.com","username":"u","password":"p"}"#,
    )
    .await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid JSON content"));

    let resp = post(
        addr,
        "/api/proxy",
        r#"{"domain":"https://hub.example.com","username":"u","password":"p","payloads":{"id":1}}"#,
    )
    .await;
    assert_eq!(resp.status(), 400);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn correlation_id_is_echoed() {
    let (addr, shutdown) = start_test_server(Config::default(), false).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/proxy"))
        .header("x-correlation-id", "trace-me-42")
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(resp.headers()["x-correlation-id"], "trace-me-42");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn private_domain_without_gateway_is_500() {
    let (addr, shutdown) = start_test_server(Config::default(), false).await;

    let resp = post(
        addr,
        "/api/proxy",
        r#"{"domain":"https://qa1.rnd.hdh.nextgenaws.net","username":"u","password":"p","payloads":[{}]}"#,
    )
    .await;
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("Gateway URL is not configured"));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let state = Arc::new(AppState::new(LoadedConfig::new(
        Config::default(),
        ConfigVersion::Builtin,
        "builtin",
    )));
    let router = server::build_router(state, 64, false);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    let payloads: Vec<Value> = (0..20).map(|i| json!({"id": i})).collect();
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/proxy"))
        .json(&json!({"domain": "https://hub.example.com", "username": "u", "password": "p", "payloads": payloads}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 413);

    server.abort();
}

#[tokio::test]
async fn graceful_shutdown_works() {
    let (addr, shutdown) = start_test_server(Config::default(), false).await;

    // Verify server is running
    let url = format!("http://{addr}/health");
    assert!(reqwest::get(&url).await.is_ok());

    // Send shutdown
    let _ = shutdown.send(());

    // Give it a moment to shut down
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    // Server should no longer accept connections
    let result = reqwest::get(&url).await;
    assert!(result.is_err());
}
