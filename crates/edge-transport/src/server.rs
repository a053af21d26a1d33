//! Gateway HTTP server using Axum.
//!
//! Serves the application router behind the edge middleware, exposes a
//! health check, and forwards `/api/*` calls to the backend after the
//! bearer admission check.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Method, Uri, header},
    response::{IntoResponse, Json, Response},
    routing::{any, get},
};
use edge_protocol::{EdgeError, Headers};
use edge_server::{AdmissionRejection, Admitted, EdgeEvaluator, SessionProvider, require_admin, require_bearer, with_edge};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use url::Url;

use crate::proxy::{BackendProxy, ForwardRequest, ProxyConfig};

/// Response headers that describe the upstream connection, not the payload.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

/// Gateway server configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Backend API origin. `/api/*` forwarding is disabled when unset.
    pub backend_url: Option<Url>,
    /// Paths under this prefix need admin claims before forwarding
    pub admin_api_prefix: String,
    /// Allowed CORS origins. CORS is disabled when empty.
    pub cors_origins: Vec<String>,
    /// Forwarding timeouts
    pub proxy: ProxyConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            hostname: "127.0.0.1".into(),
            backend_url: None,
            admin_api_prefix: "/api/admin".into(),
            cors_origins: Vec::new(),
            proxy: ProxyConfig::default(),
        }
    }
}

/// Forwarding state for `/api/*`.
struct ApiForwarder {
    proxy: BackendProxy,
    backend: Url,
    admin_prefix: String,
}

/// The gateway server.
pub struct GatewayServer {
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Actual bound port
    port: u16,
}

impl GatewayServer {
    /// Bind and serve `app` behind the edge.
    pub async fn start<P: SessionProvider>(
        config: GatewayConfig,
        evaluator: Arc<EdgeEvaluator<P>>,
        app: Router,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let router = Self::router(&config, evaluator, app)?;

        let addr: SocketAddr = format!("{}:{}", config.hostname, config.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        info!("Tenant edge listening on http://{}:{}", config.hostname, actual_port);

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            port: actual_port,
        })
    }

    /// Assemble the full router without binding.
    pub fn router<P: SessionProvider>(
        config: &GatewayConfig,
        evaluator: Arc<EdgeEvaluator<P>>,
        app: Router,
    ) -> Result<Router, EdgeError> {
        let mut inner = app.route("/health", get(health_handler));

        if let Some(backend) = &config.backend_url {
            let forwarder = Arc::new(ApiForwarder {
                proxy: BackendProxy::new(config.proxy.clone())?,
                backend: backend.clone(),
                admin_prefix: config.admin_api_prefix.clone(),
            });
            let api = Router::new()
                .route("/api/{*rest}", any(forward_handler))
                .with_state(forwarder);
            inner = inner.merge(api);
        }

        let mut router = with_edge(inner, evaluator).layer(TraceLayer::new_for_http());

        if !config.cors_origins.is_empty() {
            router = router.layer(cors_layer(&config.cors_origins));
        }

        Ok(router)
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Gracefully stop the server.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("Tenant edge stopped");
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {o}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(Headers::ORGANIZATION_SUBDOMAIN),
        ])
        .allow_credentials(true)
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "tenant-edge",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn forward_handler(
    State(forwarder): State<Arc<ApiForwarder>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match forwarder.forward(method, &uri, &headers, &body).await {
        Ok(response) => response,
        Err(e) => AdmissionRejection(e).into_response(),
    }
}

impl ApiForwarder {
    async fn forward(&self, method: Method, uri: &Uri, headers: &HeaderMap, body: &Bytes) -> Result<Response, EdgeError> {
        let admitted: Admitted = if uri.path().starts_with(&self.admin_prefix) {
            require_admin(headers)?
        } else {
            require_bearer(headers)?
        };

        let tenant = headers
            .get(Headers::ORGANIZATION_SUBDOMAIN)
            .and_then(|v| v.to_str().ok());

        let payload: Option<Value> = if body.is_empty() {
            None
        } else {
            Some(serde_json::from_slice(body).map_err(|_| EdgeError::BadRequest("Invalid JSON body".into()))?)
        };

        let target = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        let url = self
            .backend
            .join(target)
            .map_err(|e| EdgeError::BadRequest(format!("Invalid backend path: {e}")))?;

        let upstream = self
            .proxy
            .forward(ForwardRequest {
                url: url.as_str(),
                method,
                credential: &admitted.credential,
                body: payload.as_ref(),
                tenant,
            })
            .await?;

        into_response(upstream).await
    }
}

/// Relay the backend response: status, payload headers, and body.
async fn into_response(upstream: reqwest::Response) -> Result<Response, EdgeError> {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
    let bytes = upstream
        .bytes()
        .await
        .map_err(|e| EdgeError::Upstream(e.to_string()))?;

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
