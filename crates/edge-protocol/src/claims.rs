//! Unverified claim decoding.
//!
//! [`decode_unverified`] reads the payload segment of a bearer token without
//! checking its signature. The result is only fit for routing and UX
//! decisions. Anything security relevant goes through a verified
//! identity lookup that returns a [`VerifiedUser`](crate::VerifiedUser).

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::EdgeError;
use crate::identity::UserRole;

/// base64url, padding optional. Identity providers differ on whether they pad.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Role / super-admin metadata group carried inside the token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_super_admin: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,

    /// Fields we do not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ClaimMetadata {
    fn has_admin_role(&self) -> bool {
        self.role
            .as_deref()
            .and_then(UserRole::parse)
            .is_some_and(|r| r.is_admin_equivalent())
    }
}

/// Decoded, **unverified** body of a bearer credential.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimSet {
    /// Subject (user ID)
    #[serde(rename = "sub", default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Expiration time (Unix timestamp)
    #[serde(rename = "exp", default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,

    /// Issued at (Unix timestamp)
    #[serde(rename = "iat", default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<i64>,

    #[serde(rename = "iss", default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    #[serde(rename = "aud", default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<Value>,

    /// Provider-level role (e.g. "authenticated"), not the application role.
    #[serde(rename = "role", default, skip_serializing_if = "Option::is_none")]
    pub token_role: Option<String>,

    /// User-editable metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_metadata: Option<ClaimMetadata>,

    /// Metadata only the provider's admin API can write. Wins over `user_metadata`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_metadata: Option<ClaimMetadata>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ClaimSet {
    /// Expired when `exp` is in the past, or missing altogether.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp())
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        match self.expires_at {
            Some(exp) => exp < now,
            None => true,
        }
    }

    /// True iff any metadata group grants admin, owner, or super-admin.
    pub fn has_admin_claim(&self) -> bool {
        [self.user_metadata.as_ref(), self.app_metadata.as_ref()]
            .into_iter()
            .flatten()
            .any(|m| m.has_admin_role() || m.is_super_admin == Some(true))
    }

    /// Super-admin flag, `app_metadata` first.
    pub fn is_super_admin(&self) -> bool {
        self.app_value(|m| m.is_super_admin).unwrap_or(false)
    }

    /// Application role string, `app_metadata` first.
    pub fn role(&self) -> Option<&str> {
        self.app_value(|m| m.role.as_deref())
    }

    pub fn user_role(&self) -> Option<UserRole> {
        self.role().and_then(UserRole::parse)
    }

    pub fn organization_id(&self) -> Option<&str> {
        self.app_value(|m| m.organization_id.as_deref())
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    fn app_value<'a, T>(&'a self, pick: impl Fn(&'a ClaimMetadata) -> Option<T>) -> Option<T> {
        self.app_metadata
            .as_ref()
            .and_then(&pick)
            .or_else(|| self.user_metadata.as_ref().and_then(&pick))
    }
}

/// Decode the payload of a `header.payload.signature` token. No signature check.
pub fn decode_unverified(token: &str) -> Result<ClaimSet, EdgeError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        return Err(EdgeError::MalformedToken);
    }

    let payload = URL_SAFE_LENIENT
        .decode(segments[1])
        .map_err(|_| EdgeError::MalformedToken)?;

    let value: Value = serde_json::from_slice(&payload).map_err(|_| EdgeError::MalformedToken)?;
    if !value.is_object() {
        return Err(EdgeError::MalformedToken);
    }

    serde_json::from_value(value).map_err(|_| EdgeError::MalformedToken)
}

/// Strip the `Bearer ` scheme from an `Authorization` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let token = header_value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}
