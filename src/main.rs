//! Tenant Edge: multi-tenant request gateway
//!
//! Resolves the tenant from the request host, rewrites paths into the
//! tenant's namespace, redirects unauthenticated visitors to login, and
//! forwards `/api/*` calls to the backend with the caller's credential.
//!
//! Usage:
//!   tenant-edge                                          # Port 3000, loopback tenants only
//!   tenant-edge --primary-domain example.com             # Tenants at <name>.example.com
//!   tenant-edge --backend-url http://localhost:8000      # Forward /api/* to a backend
//!   tenant-edge --identity-url http://localhost:54321    # Verify session cookies

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json, Router,
    http::{HeaderMap, Uri},
    response::IntoResponse,
};
use clap::Parser;
use edge_protocol::{EdgeConfig, Headers};
use edge_server::{CookieSessionProvider, EdgeEvaluator, NoSessionProvider, SessionProvider};
use edge_transport::{GatewayConfig, GatewayServer, HttpIdentityProvider, IdentityConfig};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "tenant-edge", about = "Tenant Edge: multi-tenant request gateway")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, env = "EDGE_PORT", default_value = "3000")]
    port: u16,

    /// Hostname to bind to
    #[arg(long, env = "EDGE_HOSTNAME", default_value = "127.0.0.1")]
    hostname: String,

    /// Root domain; hosts of the form <tenant>.<domain> resolve to a tenant
    #[arg(long, env = "EDGE_PRIMARY_DOMAIN")]
    primary_domain: Option<String>,

    /// Subdomain reserved for direct API traffic (answered with 404)
    #[arg(long, env = "EDGE_API_SUBDOMAIN", default_value = "api")]
    api_subdomain: String,

    /// Backend API origin for /api/* forwarding
    #[arg(long, env = "EDGE_BACKEND_URL")]
    backend_url: Option<Url>,

    /// Identity provider base URL; sessions are never found when unset
    #[arg(long, env = "EDGE_IDENTITY_URL")]
    identity_url: Option<Url>,

    /// Identity provider API key
    #[arg(long, env = "EDGE_IDENTITY_KEY", default_value = "", hide_env_values = true)]
    identity_key: String,

    /// Session cookie holding the access token
    #[arg(long, env = "EDGE_SESSION_COOKIE", default_value = edge_server::session::DEFAULT_SESSION_COOKIE)]
    session_cookie: String,

    /// Allowed CORS origin (repeatable)
    #[arg(long = "cors-origin", env = "EDGE_CORS_ORIGINS", value_delimiter = ',')]
    cors_origins: Vec<String>,

    /// Scheme for absolute redirects (http for local development)
    #[arg(long, env = "EDGE_REDIRECT_SCHEME", default_value = "https")]
    redirect_scheme: String,

    /// Deny admin routes to sessions without an admin role
    #[arg(long, env = "EDGE_ENFORCE_ADMIN")]
    enforce_admin: bool,

    /// Match route prefixes on whole path segments only
    #[arg(long, env = "EDGE_SEGMENT_MATCHING")]
    segment_matching: bool,

    /// Log every admission decision
    #[arg(long, env = "EDGE_DEBUG")]
    debug: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Write logs to a file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn edge_config(&self) -> EdgeConfig {
        let mut config = EdgeConfig {
            api_subdomain: self.api_subdomain.to_ascii_lowercase(),
            redirect_scheme: self.redirect_scheme.clone(),
            ..EdgeConfig::default()
        }
        .with_debug(self.debug)
        .with_admin_enforcement(self.enforce_admin)
        .with_segment_matching(self.segment_matching);

        if let Some(domain) = &self.primary_domain {
            config = config.with_primary_domain(domain.as_str());
        }
        config
    }

    fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            port: self.port,
            hostname: self.hostname.clone(),
            backend_url: self.backend_url.clone(),
            cors_origins: self.cors_origins.clone(),
            ..GatewayConfig::default()
        }
    }
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match (&cli.log_file, cli.json_logs) {
        (Some(path), json) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let builder = builder.with_writer(std::sync::Mutex::new(file)).with_ansi(false);
            if json {
                builder.json().init();
            } else {
                builder.init();
            }
            eprintln!("Logging to {}", path.display());
        }
        (None, true) => builder.json().init(),
        (None, false) => builder.init(),
    }
    Ok(())
}

/// Placeholder application: reports the path it was reached at and the tenant.
async fn page_handler(uri: Uri, headers: HeaderMap) -> impl IntoResponse {
    let tenant = headers
        .get(Headers::ORGANIZATION_SUBDOMAIN)
        .and_then(|v| v.to_str().ok());
    Json(json!({
        "path": uri.path(),
        "query": uri.query(),
        "tenant": tenant,
    }))
}

async fn run<P: SessionProvider>(cli: &Cli, sessions: P) -> anyhow::Result<()> {
    let evaluator = Arc::new(EdgeEvaluator::new(cli.edge_config(), sessions));
    let app = Router::new().fallback(page_handler);

    let mut server = GatewayServer::start(cli.gateway_config(), evaluator, app)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start gateway: {e}"))?;

    println!();
    println!("  Tenant Edge");
    println!();
    println!("  Listening:  http://{}:{}", cli.hostname, server.port());
    match &cli.primary_domain {
        Some(domain) => println!("  Domain:     {domain} (tenants at <name>.{domain})"),
        None => println!("  Domain:     (none, tenants only at <name>.localhost)"),
    }
    match &cli.backend_url {
        Some(url) => println!("  Backend:    {url}"),
        None => println!("  Backend:    (none, /api/* not forwarded)"),
    }
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;

    println!();
    println!("  Shutting down...");
    server.stop().await;
    println!("  Server stopped.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    match &cli.identity_url {
        Some(url) => {
            let identity = HttpIdentityProvider::new(IdentityConfig::new(url.clone(), cli.identity_key.clone()))?;
            info!("Verifying sessions against {url}");
            let sessions = CookieSessionProvider::new(identity).with_cookie_name(cli.session_cookie.clone());
            run(&cli, sessions).await
        }
        None => {
            warn!("No identity provider configured; protected routes always redirect to login");
            run(&cli, NoSessionProvider).await
        }
    }
}
