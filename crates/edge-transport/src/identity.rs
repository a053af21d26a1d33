//! HTTP identity provider client.
//!
//! Verifies access tokens against the provider's user endpoint and
//! exchanges refresh tokens for fresh access tokens.

use std::time::Duration;

use edge_protocol::{EdgeError, VerifiedUser};
use edge_server::IdentityProvider;
use parking_lot::Mutex;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use crate::stream::TokenSource;

const USER_PATH: &str = "auth/v1/user";
const TOKEN_PATH: &str = "auth/v1/token";

/// Identity provider connection settings.
#[derive(Debug)]
pub struct IdentityConfig {
    pub base_url: Url,
    /// Project API key sent as the `apikey` header.
    pub api_key: SecretString,
    /// Request timeout (default: 5s)
    pub timeout: Duration,
}

impl IdentityConfig {
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Self {
        Self {
            base_url,
            api_key: SecretString::from(api_key.into()),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Access and refresh token pair issued by the provider.
#[derive(Debug)]
pub struct TokenPair {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Identity provider reached over HTTP.
#[derive(Debug)]
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    config: IdentityConfig,
}

impl HttpIdentityProvider {
    pub fn new(config: IdentityConfig) -> Result<Self, EdgeError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EdgeError::SessionProvider(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> Result<Url, EdgeError> {
        let mut base = self.config.base_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        base.join(path)
            .map_err(|e| EdgeError::SessionProvider(format!("Invalid identity URL: {e}")))
    }

    /// Exchange a refresh token for a new token pair.
    pub async fn refresh_session(&self, refresh_token: &SecretString) -> Result<TokenPair, EdgeError> {
        let mut url = self.endpoint(TOKEN_PATH)?;
        url.query_pairs_mut().append_pair("grant_type", "refresh_token");

        let response = self
            .client
            .post(url)
            .header("apikey", self.config.api_key.expose_secret())
            .json(&json!({ "refresh_token": refresh_token.expose_secret() }))
            .send()
            .await
            .map_err(|e| EdgeError::SessionProvider(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            return Err(EdgeError::Unauthenticated("Refresh token rejected".into()));
        }
        if !status.is_success() {
            return Err(EdgeError::SessionProvider(format!("token refresh failed: {status}")));
        }

        let body = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| EdgeError::SessionProvider(e.to_string()))?;
        Ok(TokenPair {
            access_token: SecretString::from(body.access_token),
            refresh_token: SecretString::from(body.refresh_token),
            expires_in: body.expires_in,
        })
    }
}

impl IdentityProvider for HttpIdentityProvider {
    async fn verify(&self, token: &str) -> Result<VerifiedUser, EdgeError> {
        let url = self.endpoint(USER_PATH)?;
        let response = self
            .client
            .get(url)
            .header("apikey", self.config.api_key.expose_secret())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| EdgeError::SessionProvider(e.to_string()))?;

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                debug!("Identity provider rejected token ({status})");
                Err(EdgeError::Unauthenticated("Invalid or expired token".into()))
            }
            s if s.is_success() => response
                .json::<VerifiedUser>()
                .await
                .map_err(|e| EdgeError::SessionProvider(format!("Malformed user response: {e}"))),
            s => {
                warn!("Identity provider returned {s}");
                Err(EdgeError::SessionProvider(format!("identity provider returned {s}")))
            }
        }
    }
}

/// Token source that refreshes the access token before every connection attempt.
#[derive(Debug)]
pub struct RefreshingTokenSource {
    provider: std::sync::Arc<HttpIdentityProvider>,
    refresh_token: Mutex<SecretString>,
}

impl RefreshingTokenSource {
    pub fn new(provider: std::sync::Arc<HttpIdentityProvider>, refresh_token: impl Into<String>) -> Self {
        Self {
            provider,
            refresh_token: Mutex::new(SecretString::from(refresh_token.into())),
        }
    }
}

impl TokenSource for RefreshingTokenSource {
    async fn session_token(&self) -> Result<SecretString, EdgeError> {
        let current = SecretString::from(self.refresh_token.lock().expose_secret().to_string());
        let pair = self.provider.refresh_session(&current).await?;
        *self.refresh_token.lock() = pair.refresh_token;
        Ok(pair.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_keeps_base_path() {
        let config = IdentityConfig::new(Url::parse("http://localhost:54321/project").unwrap(), "key");
        let provider = HttpIdentityProvider::new(config).unwrap();
        assert_eq!(
            provider.endpoint(USER_PATH).unwrap().as_str(),
            "http://localhost:54321/project/auth/v1/user"
        );
    }
}
