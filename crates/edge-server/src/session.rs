//! Session lookup and identity verification seams.
//!
//! [`IdentityProvider::verify`] is the only way to obtain a
//! [`VerifiedUser`]. The unverified claim decoder never feeds it.

use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use edge_protocol::{EdgeError, VerifiedUser};
use secrecy::SecretString;

/// Cookie headers above this size are ignored.
const MAX_COOKIE_SIZE: usize = 16 * 1024;

/// Default cookie holding the provider's access token.
pub const DEFAULT_SESSION_COOKIE: &str = "sb-access-token";

/// An authenticated session confirmed by the identity provider.
#[derive(Debug)]
pub struct Session {
    pub access_token: SecretString,
    pub user: VerifiedUser,
}

/// Outcome of a session lookup that reached the provider.
#[derive(Debug)]
pub enum SessionLookup {
    Active(Session),
    /// No session cookie on the request.
    Missing,
    /// The provider looked at the session and refused it (expired, revoked, ...).
    Rejected(String),
}

/// Reads the active session for a request from its cookies.
///
/// Returning `Err` means the provider itself failed; the evaluator lets the
/// request through in that case.
pub trait SessionProvider: Send + Sync + 'static {
    fn session(
        &self,
        headers: &HeaderMap,
    ) -> impl std::future::Future<Output = Result<SessionLookup, EdgeError>> + Send;
}

/// Confirms a token with the identity provider and returns its user.
///
/// `Err(EdgeError::Unauthenticated)` means the provider rejected the token.
/// Any other error is a provider failure.
pub trait IdentityProvider: Send + Sync + 'static {
    fn verify(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<VerifiedUser, EdgeError>> + Send;
}

/// Session provider that never finds a session.
///
/// Protected routes always redirect to login.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSessionProvider;

impl SessionProvider for NoSessionProvider {
    async fn session(&self, _headers: &HeaderMap) -> Result<SessionLookup, EdgeError> {
        Ok(SessionLookup::Missing)
    }
}

/// Reads an access token from a cookie and verifies it with an [`IdentityProvider`].
#[derive(Debug, Clone)]
pub struct CookieSessionProvider<I> {
    identity: I,
    cookie_name: String,
}

impl<I: IdentityProvider> CookieSessionProvider<I> {
    pub fn new(identity: I) -> Self {
        Self {
            identity,
            cookie_name: DEFAULT_SESSION_COOKIE.into(),
        }
    }

    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn identity(&self) -> &I {
        &self.identity
    }
}

impl<I: IdentityProvider> SessionProvider for CookieSessionProvider<I> {
    async fn session(&self, headers: &HeaderMap) -> Result<SessionLookup, EdgeError> {
        let Some(token) = read_cookie(headers, &self.cookie_name) else {
            return Ok(SessionLookup::Missing);
        };

        match self.identity.verify(&token).await {
            Ok(user) => Ok(SessionLookup::Active(Session {
                access_token: SecretString::from(token),
                user,
            })),
            Err(EdgeError::Unauthenticated(reason)) => Ok(SessionLookup::Rejected(reason)),
            Err(e) => Err(EdgeError::SessionProvider(e.to_string())),
        }
    }
}

/// Value of cookie `name`, unquoted. Empty values count as absent.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        if header.len() > MAX_COOKIE_SIZE {
            continue;
        }
        let Ok(cookies) = header.to_str() else {
            continue;
        };
        for cookie in cookies.split(';') {
            let Some((key, value)) = cookie.trim().split_once('=') else {
                continue;
            };
            if key.trim() != name {
                continue;
            }
            let value = value.trim().trim_matches('"');
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_read_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; sb-access-token=\"abc.def.ghi\"; other=1"),
        );
        assert_eq!(read_cookie(&headers, "sb-access-token").as_deref(), Some("abc.def.ghi"));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_read_cookie_skips_empty() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("sb-access-token="));
        assert_eq!(read_cookie(&headers, "sb-access-token"), None);
    }
}
