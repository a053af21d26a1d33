//! Edge middleware configuration.
//!
//! Passed explicitly into every evaluator. There is no process-wide default
//! instance.

use std::time::Duration;

/// Path-prefix sets, one per route category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSets {
    pub public: Vec<String>,
    pub protected: Vec<String>,
    pub admin: Vec<String>,
    pub marketing: Vec<String>,
}

impl Default for RouteSets {
    fn default() -> Self {
        Self {
            public: to_owned(&["/auth", "/health", "/api/health", "/api/public"]),
            protected: to_owned(&["/dashboard", "/settings", "/profile"]),
            admin: to_owned(&["/admin"]),
            marketing: to_owned(&["/pricing", "/about", "/features", "/contact"]),
        }
    }
}

fn to_owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Configuration for tenant resolution, classification, and admission.
#[derive(Debug, Clone)]
pub struct EdgeConfig {
    /// Root domain with no tenant label (e.g. `example.com`). `None` disables
    /// tenant routing for non-loopback hosts.
    pub primary_domain: Option<String>,
    /// Subdomain reserved for direct API traffic (default: `api`)
    pub api_subdomain: String,
    /// Label that maps back to the primary domain (default: `www`)
    pub marketing_alias: String,
    pub routes: RouteSets,
    /// Login page for unauthenticated redirects (default: `/auth/login`)
    pub login_path: String,
    /// Scheme used when building absolute redirect URLs (default: `https`)
    pub redirect_scheme: String,
    /// Log every admission decision.
    pub debug: bool,
    /// Deny admin routes to sessions without an admin role. Off by default:
    /// a session alone admits admin routes and role checks happen downstream.
    pub enforce_admin_claims: bool,
    /// Match route prefixes on whole path segments only, so `/admin` no
    /// longer matches `/administrator`. Off by default.
    pub segment_matching: bool,
    /// Upper bound on a session lookup before failing open.
    pub session_timeout: Duration,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            primary_domain: None,
            api_subdomain: "api".into(),
            marketing_alias: "www".into(),
            routes: RouteSets::default(),
            login_path: "/auth/login".into(),
            redirect_scheme: "https".into(),
            debug: false,
            enforce_admin_claims: false,
            segment_matching: false,
            session_timeout: Duration::from_secs(5),
        }
    }
}

impl EdgeConfig {
    pub fn with_primary_domain(mut self, domain: impl Into<String>) -> Self {
        let domain = domain.into().trim().to_ascii_lowercase();
        self.primary_domain = if domain.is_empty() { None } else { Some(domain) };
        self
    }

    pub fn with_routes(mut self, routes: RouteSets) -> Self {
        self.routes = routes;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_admin_enforcement(mut self, enforce: bool) -> Self {
        self.enforce_admin_claims = enforce;
        self
    }

    pub fn with_segment_matching(mut self, enabled: bool) -> Self {
        self.segment_matching = enabled;
        self
    }
}
