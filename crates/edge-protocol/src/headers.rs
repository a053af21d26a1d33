//! Header and query parameter names shared by the edge and its backends.

/// HTTP header names.
pub struct Headers;

impl Headers {
    /// Tenant id resolved from the host. Set on rewrites and forwarded calls.
    pub const ORGANIZATION_SUBDOMAIN: &str = "x-organization-subdomain";
}

/// Query parameter names.
pub struct QueryParams;

impl QueryParams {
    /// Post-login return path.
    pub const REDIRECT_TO: &str = "redirectTo";
    /// Tenant id on rewritten API calls.
    pub const SUBDOMAIN: &str = "subdomain";
    /// Session token on stream connection URLs.
    pub const TOKEN: &str = "token";
}
