//! User identity types returned by the identity provider.

use serde::{Deserialize, Serialize};

use crate::claims::ClaimMetadata;

/// Application role of a user within an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Owner,
    Admin,
    Member,
    Viewer,
}

impl UserRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owner" => Some(Self::Owner),
            "admin" => Some(Self::Admin),
            "member" => Some(Self::Member),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
            Self::Viewer => "viewer",
        }
    }

    /// Owners are treated as admins everywhere.
    pub fn is_admin_equivalent(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user confirmed by the identity provider.
///
/// Only produced by an `IdentityProvider` after the provider accepted the
/// token. Never build one from [`decode_unverified`](crate::decode_unverified)
/// output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Option<ClaimMetadata>,
    #[serde(default)]
    pub app_metadata: Option<ClaimMetadata>,
}

impl VerifiedUser {
    /// Role from `app_metadata`, falling back to `user_metadata`, then `member`.
    pub fn role(&self) -> UserRole {
        self.metadata_value(|m| m.role.as_deref().and_then(UserRole::parse))
            .unwrap_or(UserRole::Member)
    }

    pub fn is_super_admin(&self) -> bool {
        self.metadata_value(|m| m.is_super_admin).unwrap_or(false)
    }

    pub fn is_admin(&self) -> bool {
        self.is_super_admin() || self.role().is_admin_equivalent()
    }

    pub fn organization_id(&self) -> Option<&str> {
        self.metadata_value(|m| m.organization_id.as_deref())
    }

    fn metadata_value<'a, T>(&'a self, pick: impl Fn(&'a ClaimMetadata) -> Option<T>) -> Option<T> {
        self.app_metadata
            .as_ref()
            .and_then(&pick)
            .or_else(|| self.user_metadata.as_ref().and_then(&pick))
    }
}
