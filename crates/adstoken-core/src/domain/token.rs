//! OAuth token types exchanged with the provider

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default token type when the provider omits it
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Lifetime assumed for an access token when the provider omits `expires_in`
pub const DEFAULT_ACCESS_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Credentials returned by the provider's token endpoint.
///
/// Every field is optional: a refresh response usually carries no refresh
/// token, and providers are free to omit expiry, type and scope.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct OAuthCredentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

impl OAuthCredentials {
    /// Build credentials from a token endpoint `expires_in` value
    pub fn with_expires_in(mut self, expires_in_secs: i64) -> Self {
        self.expires_at = Some(Utc::now() + Duration::seconds(expires_in_secs));
        self
    }

    /// Refresh token, if present and non-empty
    pub fn usable_refresh_token(&self) -> Option<&str> {
        self.refresh_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Outcome of a successful access-token refresh
#[derive(Clone, Serialize)]
pub struct TokenResult {
    #[serde(skip_serializing)]
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub token_type: String,
    pub scope: Option<String>,
}

impl std::fmt::Debug for TokenResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResult")
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
