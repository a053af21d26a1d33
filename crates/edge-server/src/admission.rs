//! Explicit admission checks for handlers that forward to the backend.
//!
//! These read the `Authorization` header, decode the credential without
//! verifying it, and fail with a structured 401/403. The backend re-checks
//! the raw credential; this is a fast early rejection, not the boundary.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use edge_protocol::{ClaimSet, EdgeError, bearer_token, decode_unverified};
use secrecy::SecretString;

use crate::middleware::deny_response;

/// Maximum accepted token size (8KB)
const MAX_TOKEN_SIZE: usize = 8 * 1024;

/// A credential that passed an admission check, returned unchanged for forwarding.
#[derive(Debug)]
pub struct Admitted {
    pub credential: SecretString,
    /// Unverified claims. Do not treat as proof of identity.
    pub claims: ClaimSet,
}

/// Require a well-formed bearer credential.
///
/// A missing or non-Bearer header is "Authentication required". A bearer
/// token over [`MAX_TOKEN_SIZE`] is present but unusable, so it fails as
/// "Invalid token format" before any decoding.
pub fn require_bearer(headers: &HeaderMap) -> Result<Admitted, EdgeError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .ok_or_else(EdgeError::authentication_required)?;

    if token.len() > MAX_TOKEN_SIZE {
        return Err(EdgeError::invalid_token_format());
    }

    let claims = decode_unverified(token).map_err(|_| EdgeError::invalid_token_format())?;

    Ok(Admitted {
        credential: SecretString::from(token.to_string()),
        claims,
    })
}

/// Require a well-formed bearer credential whose claims assert admin, owner,
/// or super-admin.
pub fn require_admin(headers: &HeaderMap) -> Result<Admitted, EdgeError> {
    let admitted = require_bearer(headers)?;
    if !admitted.claims.has_admin_claim() {
        return Err(EdgeError::admin_required());
    }
    Ok(admitted)
}

/// Rejection carrying the admission error as a `{ "error": ... }` response.
#[derive(Debug)]
pub struct AdmissionRejection(pub EdgeError);

impl IntoResponse for AdmissionRejection {
    fn into_response(self) -> Response {
        deny_response(self.0.status(), &self.0.body())
    }
}

impl From<EdgeError> for AdmissionRejection {
    fn from(e: EdgeError) -> Self {
        Self(e)
    }
}

/// Extractor: any well-formed bearer credential.
#[derive(Debug)]
pub struct BearerCredential(pub Admitted);

impl<S: Send + Sync> FromRequestParts<S> for BearerCredential {
    type Rejection = AdmissionRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(require_bearer(&parts.headers)?))
    }
}

/// Extractor: bearer credential with admin claims.
#[derive(Debug)]
pub struct AdminCredential(pub Admitted);

impl<S: Send + Sync> FromRequestParts<S> for AdminCredential {
    type Rejection = AdmissionRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(require_admin(&parts.headers)?))
    }
}
