//! Edge error taxonomy and the JSON error body returned to callers.

use serde::{Deserialize, Serialize};

use crate::decision::AdmissionDecision;

/// Errors produced anywhere in the edge pipeline.
///
/// Only the admission checks surface these to callers as HTTP responses.
/// Decode and session-lookup failures are recovered locally and converted
/// into the nearest safe [`AdmissionDecision`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EdgeError {
    /// Credential is not a three-segment token with a JSON object payload.
    #[error("malformed token")]
    MalformedToken,

    /// The session provider could not be reached or failed internally.
    #[error("session provider error: {0}")]
    SessionProvider(String),

    /// Missing or malformed credential on an explicit admission check.
    #[error("{0}")]
    Unauthenticated(String),

    /// Well-formed credential lacking the required claim.
    #[error("{0}")]
    Forbidden(String),

    /// Reserved-subdomain guard.
    #[error("not found")]
    NotFound,

    /// Stream session is not open.
    #[error("not connected")]
    NotConnected,

    /// Request body could not be forwarded as JSON.
    #[error("{0}")]
    BadRequest(String),

    /// Backend or identity provider transport failure.
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl EdgeError {
    pub fn authentication_required() -> Self {
        Self::Unauthenticated("Authentication required".into())
    }

    pub fn invalid_token_format() -> Self {
        Self::Unauthenticated("Invalid token format".into())
    }

    pub fn admin_required() -> Self {
        Self::Forbidden("Admin access required".into())
    }

    /// HTTP status code this error maps to when surfaced.
    pub fn status(&self) -> u16 {
        match self {
            Self::Unauthenticated(_) | Self::MalformedToken => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound => 404,
            Self::BadRequest(_) => 400,
            Self::NotConnected | Self::SessionProvider(_) => 503,
            Self::Upstream(_) => 502,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody::new(self.to_string())
    }

    /// Convert into a terminal `Deny` decision.
    pub fn to_decision(&self) -> AdmissionDecision {
        AdmissionDecision::Deny {
            status: self.status(),
            body: self.body(),
        }
    }
}

/// JSON body of every structured error response: `{ "error": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}
