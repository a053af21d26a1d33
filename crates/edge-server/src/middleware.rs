//! Axum middleware that applies admission decisions before routing.
//!
//! The evaluator must see the request before the router picks a handler,
//! otherwise path rewrites would never reach the rewritten route. [`with_edge`]
//! nests the application router behind an outer router whose only job is to
//! run [`edge_middleware`].

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Request, State},
    http::{
        HeaderName, HeaderValue, StatusCode, Uri,
        header::{HOST, LOCATION},
        uri::PathAndQuery,
    },
    middleware::{Next, from_fn_with_state},
    response::{IntoResponse, Response},
};
use edge_protocol::{AdmissionDecision, ErrorBody, Headers};
use tracing::error;

use crate::evaluator::{EdgeEvaluator, Evaluation};
use crate::session::SessionProvider;

/// Put `app` behind the edge middleware.
pub fn with_edge<P: SessionProvider>(app: Router, evaluator: Arc<EdgeEvaluator<P>>) -> Router {
    Router::new()
        .fallback_service(app)
        .layer(from_fn_with_state(evaluator, edge_middleware::<P>))
}

/// Evaluate the request and emit the resulting response.
pub async fn edge_middleware<P: SessionProvider>(
    State(edge): State<Arc<EdgeEvaluator<P>>>,
    mut req: Request,
    next: Next,
) -> Response {
    // Tenant context comes from the host, never from the client.
    let org_header = HeaderName::from_static(Headers::ORGANIZATION_SUBDOMAIN);
    req.headers_mut().remove(&org_header);

    let host = request_host(&req);
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    let Evaluation { context, decision } = edge
        .evaluate(&host, &path, query.as_deref(), req.headers())
        .await;

    let mut response = match decision {
        AdmissionDecision::Allow => next.run(req).await,
        AdmissionDecision::RewriteTo { path, query, headers } => {
            match rewrite_request(&mut req, &path, query.as_deref(), &headers) {
                Ok(()) => next.run(req).await,
                Err(e) => {
                    error!("Failed to rewrite {host}{path}: {e}");
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            }
        }
        AdmissionDecision::RedirectTo { location, status } => redirect_response(status, &location),
        AdmissionDecision::Deny { status, body } => deny_response(status, &body),
    };

    if let Some(value) = context
        .tenant_id
        .as_deref()
        .and_then(|t| HeaderValue::from_str(t).ok())
    {
        response.headers_mut().insert(org_header, value);
    }
    response
}

fn redirect_response(status: u16, location: &str) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::TEMPORARY_REDIRECT);
    match HeaderValue::from_str(location) {
        Ok(location) => (status, [(LOCATION, location)]).into_response(),
        Err(_) => {
            error!("Refusing redirect to invalid location: {location:?}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn deny_response(status: u16, body: &ErrorBody) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::FORBIDDEN);
    (status, Json(body.clone())).into_response()
}

/// `Host` header, falling back to the URI authority (HTTP/2).
fn request_host(req: &Request) -> String {
    req.headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|a| a.to_string()))
        .unwrap_or_default()
}

fn rewrite_request(
    req: &mut Request,
    path: &str,
    query: Option<&str>,
    headers: &[(String, String)],
) -> Result<(), String> {
    let path_and_query = match query {
        Some(q) => format!("{path}?{q}"),
        None => path.to_string(),
    };

    let mut parts = req.uri().clone().into_parts();
    parts.path_and_query =
        Some(PathAndQuery::try_from(path_and_query).map_err(|e| e.to_string())?);
    *req.uri_mut() = Uri::from_parts(parts).map_err(|e| e.to_string())?;

    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| e.to_string())?;
        let value = HeaderValue::from_str(value).map_err(|e| e.to_string())?;
        req.headers_mut().insert(name, value);
    }
    Ok(())
}
