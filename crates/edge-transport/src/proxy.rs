//! Backend proxy forwarder.
//!
//! Forwards a call to the backend API with the caller's credential and
//! tenant context attached. Performs no interpretation of the response.

use std::time::Duration;

use edge_protocol::{EdgeError, Headers};
use reqwest::Method;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;

/// Forwarder configuration. Passed in explicitly; there is no shared default client.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Per-request timeout (default: 30s)
    pub timeout: Duration,
    /// Connect timeout (default: 5s)
    pub connect_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// One call to forward.
#[derive(Debug)]
pub struct ForwardRequest<'a> {
    pub url: &'a str,
    pub method: Method,
    pub credential: &'a SecretString,
    /// Sent only for POST, PUT, and PATCH.
    pub body: Option<&'a Value>,
    /// Tenant id for `x-organization-subdomain`.
    pub tenant: Option<&'a str>,
}

/// HTTP forwarder to the backend API.
#[derive(Debug, Clone)]
pub struct BackendProxy {
    client: reqwest::Client,
}

impl BackendProxy {
    pub fn new(config: ProxyConfig) -> Result<Self, EdgeError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| EdgeError::Upstream(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Forward the call and return the backend's response untouched.
    pub async fn forward(&self, req: ForwardRequest<'_>) -> Result<reqwest::Response, EdgeError> {
        let mut builder = self
            .client
            .request(req.method.clone(), req.url)
            .bearer_auth(req.credential.expose_secret())
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");

        if let Some(tenant) = req.tenant {
            builder = builder.header(Headers::ORGANIZATION_SUBDOMAIN, tenant);
        }

        if carries_body(&req.method) {
            if let Some(body) = req.body {
                builder = builder.json(body);
            }
        }

        debug!(method = %req.method, url = req.url, tenant = ?req.tenant, "forwarding to backend");

        builder
            .send()
            .await
            .map_err(|e| EdgeError::Upstream(e.to_string()))
    }
}

fn carries_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}
