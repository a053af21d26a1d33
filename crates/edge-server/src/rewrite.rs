//! Tenant path rewriting.
//!
//! Every rewrite carries `x-organization-subdomain` so downstream handlers
//! read tenant context without re-parsing the host. A `subdomain` query
//! parameter sent by the client never survives a rewrite.

use edge_protocol::{AdmissionDecision, Headers, QueryParams};
use url::form_urlencoded;

use crate::routes::is_api_path;

/// Build the internal route for `tenant` serving `path`.
///
/// - `/api/...`: path kept, client `subdomain` pairs dropped, tenant added
///   as `subdomain` query parameter.
/// - public paths other than `/`: path kept.
/// - `/`: rewritten to `/<tenant>`.
/// - anything else: rewritten to `/<tenant><path>`.
pub fn rewrite_for_tenant(
    tenant: &str,
    path: &str,
    query: Option<&str>,
    is_public: bool,
) -> AdmissionDecision {
    let headers = vec![(Headers::ORGANIZATION_SUBDOMAIN.to_string(), tenant.to_string())];

    let (path, query) = if is_api_path(path) {
        (path.to_string(), Some(append_query(query, QueryParams::SUBDOMAIN, tenant)))
    } else if is_public && path != "/" {
        (path.to_string(), query.map(str::to_string))
    } else if path == "/" {
        (format!("/{tenant}"), query.map(str::to_string))
    } else {
        (format!("/{tenant}{path}"), query.map(str::to_string))
    };

    AdmissionDecision::RewriteTo {
        path,
        query,
        headers,
    }
}

fn append_query(existing: Option<&str>, key: &str, value: &str) -> String {
    let mut out = strip_query_param(existing, key).unwrap_or_default();
    form_urlencoded::Serializer::for_suffix(&mut out, 0).append_pair(key, value);
    out
}

/// Remove every `key` pair from `query`, keeping the other pairs in order.
///
/// A query without `key` is returned untouched. `None` when nothing remains.
pub fn strip_query_param(query: Option<&str>, key: &str) -> Option<String> {
    let query = query.filter(|q| !q.is_empty())?;
    if !has_query_param(query, key) {
        return Some(query.to_string());
    }

    let mut kept = form_urlencoded::Serializer::new(String::new());
    let mut remaining = 0;
    for (k, v) in form_urlencoded::parse(query.as_bytes()).filter(|(k, _)| k != key) {
        kept.append_pair(&k, &v);
        remaining += 1;
    }
    (remaining > 0).then(|| kept.finish())
}

pub fn has_query_param(query: &str, key: &str) -> bool {
    form_urlencoded::parse(query.as_bytes()).any(|(k, _)| k == key)
}
