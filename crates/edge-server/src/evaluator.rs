//! Admission evaluator: the per-request state machine.
//!
//! ```text
//! Start → Resolve(tenant) → Classify(route)
//!       → PublicAllow | AdminCheck | ProtectedCheck | MarketingCheck | ApiPassthrough
//!       → Decision
//! ```
//!
//! The session lookup is the only await point. Everything else is a pure
//! function of the request and the configuration.

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use edge_protocol::{
    AdmissionDecision, EdgeConfig, EdgeError, QueryParams, RequestContext, RouteCategory,
    bearer_token, decode_unverified,
};
use secrecy::SecretString;
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::rewrite::{has_query_param, rewrite_for_tenant, strip_query_param};
use crate::routes::{RouteClassifier, is_api_path};
use crate::session::{SessionLookup, SessionProvider};
use crate::tenant::{port_suffix, resolve_subdomain, strip_port};

/// Whether a nominally protected route needs a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Required,
    Exempt,
}

/// Per-request hook that can exempt protected routes from authentication.
pub type AuthModeHook = Arc<dyn Fn(&RequestContext) -> AuthMode + Send + Sync>;

/// Result of evaluating one request.
#[derive(Debug)]
pub struct Evaluation {
    pub context: RequestContext,
    pub decision: AdmissionDecision,
}

/// Evaluates requests against an [`EdgeConfig`] using a [`SessionProvider`].
pub struct EdgeEvaluator<P> {
    config: EdgeConfig,
    classifier: RouteClassifier,
    sessions: P,
    auth_mode: Option<AuthModeHook>,
}

impl<P: SessionProvider> EdgeEvaluator<P> {
    pub fn new(config: EdgeConfig, sessions: P) -> Self {
        let classifier = RouteClassifier::new(config.routes.clone())
            .with_segment_matching(config.segment_matching);
        Self {
            config,
            classifier,
            sessions,
            auth_mode: None,
        }
    }

    /// Install a `check_auth_mode` hook. Without one, protected routes always
    /// require a session.
    pub fn with_auth_mode(
        mut self,
        hook: impl Fn(&RequestContext) -> AuthMode + Send + Sync + 'static,
    ) -> Self {
        self.auth_mode = Some(Arc::new(hook));
        self
    }

    pub fn config(&self) -> &EdgeConfig {
        &self.config
    }

    pub fn classifier(&self) -> &RouteClassifier {
        &self.classifier
    }

    /// Evaluate a request. Always yields exactly one decision.
    pub async fn evaluate(
        &self,
        host: &str,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
    ) -> Evaluation {
        let mut context = RequestContext::new(host, path, query);
        attach_credential(&mut context, headers);

        let decision = self.decide(&mut context, headers).await;

        if self.config.debug {
            debug!(
                host = %context.host,
                path = %context.path,
                tenant = ?context.tenant_id,
                category = ?context.route_category,
                subject = ?context.claims.as_ref().and_then(|c| c.subject()),
                decision = ?decision,
                "edge decision"
            );
        }

        Evaluation { context, decision }
    }

    async fn decide(&self, ctx: &mut RequestContext, headers: &HeaderMap) -> AdmissionDecision {
        if let Some(location) = self.canonical_location(ctx) {
            return AdmissionDecision::redirect_permanent(location);
        }

        let resolution = resolve_subdomain(
            &ctx.host,
            self.config.primary_domain.as_deref(),
            &self.config.marketing_alias,
        );
        ctx.apply_tenant(resolution);

        if ctx.tenant_id.as_deref() == Some(self.config.api_subdomain.as_str()) {
            return EdgeError::NotFound.to_decision();
        }

        ctx.route_category = self.classifier.classify(&ctx.path);
        let category = ctx.route_category;

        match ctx.tenant_id.clone() {
            Some(_) if category == RouteCategory::Marketing => {
                AdmissionDecision::redirect_temporary(self.primary_location(ctx))
            }
            Some(tenant) => {
                let rewrite = rewrite_for_tenant(
                    &tenant,
                    &ctx.path,
                    ctx.query.as_deref(),
                    category == RouteCategory::Public,
                );
                if category.requires_session() {
                    self.authenticate(ctx, headers, rewrite).await
                } else {
                    rewrite
                }
            }
            None if category.requires_session() => {
                let admitted = primary_passthrough(ctx);
                self.authenticate(ctx, headers, admitted).await
            }
            // Public, marketing, API, and unclassified primary-domain routes are open.
            None => primary_passthrough(ctx),
        }
    }

    /// Authentication sub-check. `admitted` is returned when the request may proceed.
    async fn authenticate(
        &self,
        ctx: &RequestContext,
        headers: &HeaderMap,
        admitted: AdmissionDecision,
    ) -> AdmissionDecision {
        if let Some(hook) = &self.auth_mode {
            if hook(ctx) == AuthMode::Exempt {
                return admitted;
            }
        }

        let lookup = tokio::time::timeout(
            self.config.session_timeout,
            self.sessions.session(headers),
        )
        .await;

        match lookup {
            Ok(Ok(SessionLookup::Active(session))) => {
                if self.config.enforce_admin_claims
                    && ctx.route_category == RouteCategory::Admin
                    && !session.user.is_admin()
                {
                    debug!(user = %session.user.id, path = %ctx.path, "admin route denied");
                    return EdgeError::admin_required().to_decision();
                }
                admitted
            }
            Ok(Ok(SessionLookup::Missing)) => self.login_redirect(ctx),
            Ok(Ok(SessionLookup::Rejected(reason))) => {
                debug!(path = %ctx.path, "session rejected: {reason}");
                self.login_redirect(ctx)
            }
            Ok(Err(e)) => {
                warn!(path = %ctx.path, "session lookup failed, allowing request: {e}");
                admitted
            }
            Err(_) => {
                warn!(
                    path = %ctx.path,
                    "session lookup timed out after {:?}, allowing request",
                    self.config.session_timeout
                );
                admitted
            }
        }
    }

    /// `/auth/login?redirectTo=<original path>`
    fn login_redirect(&self, ctx: &RequestContext) -> AdmissionDecision {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair(QueryParams::REDIRECT_TO, &ctx.path)
            .finish();
        AdmissionDecision::redirect_temporary(format!("{}?{query}", self.config.login_path))
    }

    /// Canonical URL when the host is the marketing alias of the primary domain.
    fn canonical_location(&self, ctx: &RequestContext) -> Option<String> {
        let primary = self.config.primary_domain.as_deref()?;
        let host = ctx.host.trim().to_ascii_lowercase();
        let hostname = strip_port(&host);
        if hostname != format!("{}.{primary}", self.config.marketing_alias) {
            return None;
        }
        Some(format!(
            "{}://{primary}{}{}",
            self.config.redirect_scheme,
            port_suffix(&host),
            ctx.path_and_query()
        ))
    }

    /// Same path on the primary domain. Loopback tenant hosts have no
    /// configured domain and drop their tenant label instead.
    fn primary_location(&self, ctx: &RequestContext) -> String {
        let host = ctx.host.trim().to_ascii_lowercase();
        let hostname = strip_port(&host);
        let parent = hostname
            .split_once('.')
            .map(|(_, rest)| rest)
            .unwrap_or(hostname);

        let (scheme, target) = if is_loopback(parent) {
            ("http", parent)
        } else {
            let primary = self.config.primary_domain.as_deref().unwrap_or(parent);
            (self.config.redirect_scheme.as_str(), primary)
        };
        format!("{scheme}://{target}{}{}", port_suffix(&host), ctx.path_and_query())
    }
}

fn is_loopback(hostname: &str) -> bool {
    hostname == "localhost" || hostname.starts_with("127.")
}

/// Primary-domain admission. API calls carry tenant context only when the
/// edge resolved one, so a client `subdomain` parameter is removed.
fn primary_passthrough(ctx: &RequestContext) -> AdmissionDecision {
    let query = ctx
        .query
        .as_deref()
        .filter(|q| is_api_path(&ctx.path) && has_query_param(q, QueryParams::SUBDOMAIN));
    match query {
        Some(query) => AdmissionDecision::RewriteTo {
            path: ctx.path.clone(),
            query: strip_query_param(Some(query), QueryParams::SUBDOMAIN),
            headers: Vec::new(),
        },
        None => AdmissionDecision::Allow,
    }
}

/// Record the bearer credential and its unverified claims. Malformed tokens
/// leave `claims` empty.
fn attach_credential(ctx: &mut RequestContext, headers: &HeaderMap) {
    let Some(token) = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
    else {
        return;
    };
    ctx.claims = decode_unverified(token).ok();
    ctx.credential = Some(SecretString::from(token.to_string()));
}
