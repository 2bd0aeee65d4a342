//! Client entity - a registered Google Ads API integration

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered API client and its OAuth credential state.
///
/// The refresh token is stored once at registration and never rotated.
/// The access token and its expiry are replaced on every successful refresh.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientRecord {
    /// Unique identifier
    pub id: Uuid,

    /// Human-readable name
    pub client_name: String,

    /// Google Ads customer ID this client acts for
    pub client_customer_id: String,

    /// OAuth application (client) ID the tokens were issued under
    pub oauth_client_id: String,

    /// Long-lived refresh token (secret)
    #[serde(skip_serializing, default)]
    pub refresh_token: String,

    /// Current access token (secret)
    #[serde(skip_serializing, default)]
    pub access_token: String,

    /// When the current access token expires
    pub access_token_expires_at: DateTime<Utc>,

    /// Inactive clients are excluded from refresh
    pub is_active: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ClientRecord {
    /// Create a new active client record
    pub fn new(
        client_name: impl Into<String>,
        client_customer_id: impl Into<String>,
        oauth_client_id: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            client_name: client_name.into(),
            client_customer_id: client_customer_id.into(),
            oauth_client_id: oauth_client_id.into(),
            refresh_token: refresh_token.into(),
            access_token: String::new(),
            access_token_expires_at: now,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the initial access token and its expiry
    pub fn with_access_token(
        mut self,
        access_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        self.access_token = access_token.into();
        self.access_token_expires_at = expires_at;
        self
    }
}

impl fmt::Debug for ClientRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRecord")
            .field("id", &self.id)
            .field("client_name", &self.client_name)
            .field("client_customer_id", &self.client_customer_id)
            .field("oauth_client_id", &self.oauth_client_id)
            .field("refresh_token", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .field("access_token_expires_at", &self.access_token_expires_at)
            .field("is_active", &self.is_active)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}
