//! End-to-end tests: a running gateway in front of a local backend,
//! exercised over real sockets with `reqwest` and a stream session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{
        Query, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderMap, Uri},
    response::Response,
    routing::{any, get},
};
use base64::Engine;
use edge_protocol::EdgeConfig;
use edge_server::{EdgeEvaluator, NoSessionProvider};
use edge_transport::{GatewayConfig, GatewayServer, StaticTokenSource, StreamConfig, StreamEvent, StreamSession};
use serde_json::{Value, json};
use tokio::time::timeout;
use url::Url;

/// Backend that echoes what it received.
async fn start_backend() -> u16 {
    async fn echo(uri: Uri, headers: HeaderMap) -> Json<Value> {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
        Json(json!({
            "path": uri.path(),
            "query": uri.query(),
            "authorization": header("authorization"),
            "tenant": header("x-organization-subdomain"),
        }))
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, Router::new().fallback(any(echo))).await.ok();
    });
    port
}

/// Application pages: echoes the path it was reached at, plus a token-checked socket.
fn pages() -> Router {
    async fn page(uri: Uri, headers: HeaderMap) -> Json<Value> {
        Json(json!({
            "path": uri.path(),
            "tenant": headers.get("x-organization-subdomain").and_then(|v| v.to_str().ok()),
        }))
    }

    async fn socket(ws: WebSocketUpgrade, Query(params): Query<HashMap<String, String>>) -> Response {
        let token = params.get("token").cloned().unwrap_or_default();
        ws.on_upgrade(move |mut socket: WebSocket| async move {
            let _ = socket.send(Message::Text(format!("token:{token}").into())).await;
            while let Some(Ok(Message::Text(text))) = socket.recv().await {
                if socket.send(Message::Text(text)).await.is_err() {
                    return;
                }
            }
        })
    }

    Router::new().route("/ws", get(socket)).fallback(page)
}

async fn start_gateway(primary_domain: Option<&str>) -> (GatewayServer, u16) {
    let backend = start_backend().await;
    let mut edge = EdgeConfig::default();
    if let Some(domain) = primary_domain {
        edge = edge.with_primary_domain(domain);
    }
    let config = GatewayConfig {
        port: 0,
        backend_url: Some(Url::parse(&format!("http://127.0.0.1:{backend}")).unwrap()),
        cors_origins: vec!["https://app.example.com".into()],
        ..GatewayConfig::default()
    };
    let evaluator = Arc::new(EdgeEvaluator::new(edge, NoSessionProvider));
    let server = GatewayServer::start(config, evaluator, pages()).await.unwrap();
    let port = server.port();
    (server, port)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

fn token(payload: &str) -> String {
    let body = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(payload);
    format!("eyJhbGciOiJIUzI1NiJ9.{body}.test-signature")
}

async fn get_as(port: u16, host: &str, path: &str) -> reqwest::Response {
    client()
        .get(format!("http://127.0.0.1:{port}{path}"))
        .header("host", host)
        .send()
        .await
        .unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tenant routing
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_tenant_page_is_rewritten() {
    let (mut server, port) = start_gateway(Some("example.com")).await;

    let response = get_as(port, "acme.example.com", "/projects").await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-organization-subdomain"], "acme");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["path"], "/acme/projects");
    assert_eq!(body["tenant"], "acme");

    server.stop().await;
}

#[tokio::test]
async fn test_primary_domain_passes_through() {
    let (mut server, port) = start_gateway(Some("example.com")).await;

    let response = get_as(port, "example.com", "/projects").await;
    assert_eq!(response.status(), 200);
    assert!(response.headers().get("x-organization-subdomain").is_none());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["path"], "/projects");
    assert_eq!(body["tenant"], Value::Null);

    server.stop().await;
}

#[tokio::test]
async fn test_redirects() {
    let (mut server, port) = start_gateway(Some("example.com")).await;

    let response = get_as(port, "www.example.com", "/about?ref=x").await;
    assert_eq!(response.status(), 301);
    assert_eq!(response.headers()["location"], "https://example.com/about?ref=x");

    let response = get_as(port, "acme.example.com", "/pricing").await;
    assert_eq!(response.status(), 307);
    assert_eq!(response.headers()["location"], "https://example.com/pricing");

    let response = get_as(port, "example.com", "/settings/billing").await;
    assert_eq!(response.status(), 307);
    assert_eq!(
        response.headers()["location"],
        "/auth/login?redirectTo=%2Fsettings%2Fbilling"
    );

    server.stop().await;
}

#[tokio::test]
async fn test_api_subdomain_is_not_found() {
    let (mut server, port) = start_gateway(Some("example.com")).await;

    let response = get_as(port, "api.example.com", "/anything").await;
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "error": "not found" }));

    server.stop().await;
}

#[tokio::test]
async fn test_loopback_tenants_without_primary_domain() {
    let (mut server, port) = start_gateway(None).await;

    let response = get_as(port, &format!("ktg.localhost:{port}"), "/").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["path"], "/ktg");

    server.stop().await;
}

// ─────────────────────────────────────────────────────────────────────────────
// API forwarding
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_api_call_forwarded_with_tenant_context() {
    let (mut server, port) = start_gateway(Some("example.com")).await;
    let bearer = token(r#"{"sub":"u1","email":"a@acme.example"}"#);

    let response = client()
        .get(format!("http://127.0.0.1:{port}/api/projects?limit=5"))
        .header("host", "acme.example.com")
        .bearer_auth(&bearer)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["path"], "/api/projects");
    assert_eq!(body["query"], "limit=5&subdomain=acme");
    assert_eq!(body["authorization"], format!("Bearer {bearer}"));
    assert_eq!(body["tenant"], "acme");

    server.stop().await;
}

#[tokio::test]
async fn test_client_subdomain_parameter_never_reaches_backend() {
    let (mut server, port) = start_gateway(Some("example.com")).await;
    let bearer = token(r#"{"sub":"u1"}"#);

    for (host, expected) in [
        ("acme.example.com", "limit=5&subdomain=acme"),
        ("example.com", "limit=5"),
    ] {
        let response = client()
            .get(format!("http://127.0.0.1:{port}/api/projects?subdomain=victim&limit=5"))
            .header("host", host)
            .bearer_auth(&bearer)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["query"], expected, "host {host}");
    }

    server.stop().await;
}

#[tokio::test]
async fn test_api_call_without_credential_is_rejected() {
    let (mut server, port) = start_gateway(Some("example.com")).await;

    let response = get_as(port, "example.com", "/api/projects").await;
    assert_eq!(response.status(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Authentication required" }));

    server.stop().await;
}

#[tokio::test]
async fn test_health() {
    let (mut server, port) = start_gateway(Some("example.com")).await;

    let response = get_as(port, "example.com", "/health").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");

    server.stop().await;
}

#[tokio::test]
async fn test_cors_preflight_for_allowed_origin() {
    let (mut server, port) = start_gateway(Some("example.com")).await;

    let response = client()
        .request(reqwest::Method::OPTIONS, format!("http://127.0.0.1:{port}/api/projects"))
        .header("host", "acme.example.com")
        .header("origin", "https://app.example.com")
        .header("access-control-request-method", "POST")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "https://app.example.com"
    );

    server.stop().await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream session through the gateway
// ─────────────────────────────────────────────────────────────────────────────

async fn next_event(events: &mut tokio::sync::mpsc::UnboundedReceiver<StreamEvent>) -> StreamEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("Timeout waiting for stream event")
        .expect("Event channel closed")
}

#[tokio::test]
async fn test_stream_session_through_gateway() {
    let (mut server, port) = start_gateway(None).await;

    let config = StreamConfig {
        heartbeat_interval: Duration::ZERO,
        ..StreamConfig::new(format!("ws://127.0.0.1:{port}/ws"))
    };
    let (session, mut events) = StreamSession::start(config, StaticTokenSource::new("a.b.c")).await;

    assert_eq!(next_event(&mut events).await, StreamEvent::Opened);
    assert_eq!(next_event(&mut events).await, StreamEvent::Message("token:a.b.c".into()));

    session.send("hello").unwrap();
    assert_eq!(next_event(&mut events).await, StreamEvent::Message("hello".into()));

    session.disconnect().await;
    assert_eq!(next_event(&mut events).await, StreamEvent::Closed { clean: true });

    server.stop().await;
}
