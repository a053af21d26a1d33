//! Per-request context and the admission decision it produces.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::claims::ClaimSet;
use crate::error::ErrorBody;

/// Route category chosen by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteCategory {
    Public,
    Protected,
    Admin,
    Marketing,
    InternalApi,
    Unclassified,
}

impl RouteCategory {
    /// Categories that go through the authentication sub-check.
    pub fn requires_session(&self) -> bool {
        matches!(self, Self::Protected | Self::Admin)
    }
}

/// Output of the subdomain resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantResolution {
    /// `None` means the primary domain.
    pub tenant_id: Option<String>,
    pub is_primary_domain: bool,
}

impl TenantResolution {
    pub fn primary() -> Self {
        Self {
            tenant_id: None,
            is_primary_domain: true,
        }
    }

    pub fn tenant(id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(id.into()),
            is_primary_domain: false,
        }
    }
}

/// Context for a single request, built by the evaluator and dropped with the response.
#[derive(Debug)]
pub struct RequestContext {
    /// Raw host header.
    pub host: String,
    /// Normalized path (always starts with `/`).
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    pub tenant_id: Option<String>,
    pub is_primary_domain: bool,
    pub route_category: RouteCategory,
    /// Bearer credential from the `Authorization` header, if present.
    pub credential: Option<SecretString>,
    /// Unverified claims of `credential`. `None` when absent or malformed.
    pub claims: Option<ClaimSet>,
}

impl RequestContext {
    pub fn new(host: impl Into<String>, path: &str, query: Option<&str>) -> Self {
        Self {
            host: host.into(),
            path: normalize_path(path),
            query: query.filter(|q| !q.is_empty()).map(str::to_string),
            tenant_id: None,
            is_primary_domain: true,
            route_category: RouteCategory::Unclassified,
            credential: None,
            claims: None,
        }
    }

    pub fn apply_tenant(&mut self, resolution: TenantResolution) {
        self.tenant_id = resolution.tenant_id;
        self.is_primary_domain = resolution.is_primary_domain;
    }

    /// Path plus `?query` when a query is present.
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{q}", self.path),
            None => self.path.clone(),
        }
    }
}

/// Make sure a path is non-empty and rooted.
pub fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        "/".into()
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// The single outcome of evaluating one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// Pass the request through unmodified.
    Allow,
    /// Send the client elsewhere.
    RedirectTo { location: String, status: u16 },
    /// Serve a different internal path, with extra request headers.
    RewriteTo {
        path: String,
        query: Option<String>,
        headers: Vec<(String, String)>,
    },
    /// Terminal error response.
    Deny { status: u16, body: ErrorBody },
}

impl AdmissionDecision {
    /// 301, used for host canonicalization.
    pub fn redirect_permanent(location: impl Into<String>) -> Self {
        Self::RedirectTo {
            location: location.into(),
            status: 301,
        }
    }

    /// 307, used for auth and marketing redirects (method preserved).
    pub fn redirect_temporary(location: impl Into<String>) -> Self {
        Self::RedirectTo {
            location: location.into(),
            status: 307,
        }
    }

    pub fn deny(status: u16, error: impl Into<String>) -> Self {
        Self::Deny {
            status,
            body: ErrorBody::new(error),
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self, Self::RedirectTo { .. })
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            Self::RedirectTo { location, .. } => Some(location),
            _ => None,
        }
    }
}
