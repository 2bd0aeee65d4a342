//! Token Service - credential state transitions for one client at a time
//!
//! Every error this service returns has already been written to the error
//! log. Storage failures are logged as `DATABASE_ERROR` with the name of the
//! failing operation.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
    ClientRecord, ErrorKind, NewErrorLog, OAuthCredentials, TokenResult,
    DEFAULT_ACCESS_TOKEN_LIFETIME_SECS, DEFAULT_TOKEN_TYPE, SYSTEM_CLIENT_ID,
};
use crate::error::{ProviderError, TokenError};
use crate::provider::OAuthProvider;
use crate::repository::ClientRepository;
use crate::service::ErrorLogSink;

/// Which refresh failures take a client out of rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeactivationPolicy {
    /// Any refresh failure deactivates the client
    #[default]
    Always,
    /// Only a rejected refresh token deactivates; transient failures are
    /// retried on the next cycle
    PermanentOnly,
}

impl DeactivationPolicy {
    pub fn should_deactivate(&self, kind: ErrorKind) -> bool {
        match self {
            DeactivationPolicy::Always => true,
            DeactivationPolicy::PermanentOnly => kind == ErrorKind::InvalidRefreshToken,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeactivationPolicy::Always => "always",
            DeactivationPolicy::PermanentOnly => "permanent-only",
        }
    }
}

impl fmt::Display for DeactivationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeactivationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "always" => Ok(DeactivationPolicy::Always),
            "permanent-only" | "permanent" => Ok(DeactivationPolicy::PermanentOnly),
            other => Err(format!(
                "unknown deactivation policy '{}' (expected 'always' or 'permanent-only')",
                other
            )),
        }
    }
}

/// Owns the refresh protocol for individual clients
pub struct TokenService {
    clients: Arc<dyn ClientRepository>,
    provider: Arc<dyn OAuthProvider>,
    error_log: Arc<dyn ErrorLogSink>,
    deactivation_policy: DeactivationPolicy,
}

impl TokenService {
    pub fn new(
        clients: Arc<dyn ClientRepository>,
        provider: Arc<dyn OAuthProvider>,
        error_log: Arc<dyn ErrorLogSink>,
    ) -> Self {
        Self {
            clients,
            provider,
            error_log,
            deactivation_policy: DeactivationPolicy::default(),
        }
    }

    pub fn with_deactivation_policy(mut self, policy: DeactivationPolicy) -> Self {
        self.deactivation_policy = policy;
        self
    }

    pub fn deactivation_policy(&self) -> DeactivationPolicy {
        self.deactivation_policy
    }

    pub fn provider(&self) -> Arc<dyn OAuthProvider> {
        self.provider.clone()
    }

    /// Register a client from the credentials of a completed authorization.
    ///
    /// A refresh token is required. Without one nothing is written.
    pub async fn store_new_client(
        &self,
        client_name: &str,
        client_customer_id: &str,
        oauth_client_id: &str,
        tokens: &OAuthCredentials,
    ) -> Result<ClientRecord, TokenError> {
        let Some(refresh_token) = tokens.usable_refresh_token() else {
            let err = TokenError::MissingRefreshToken;
            self.error_log
                .log_error(
                    NewErrorLog::new(oauth_client_id, err.kind(), err.to_string()).with_details(
                        json!({
                            "operation": "store_new_client",
                            "clientName": client_name,
                            "clientCustomerId": client_customer_id,
                            "hasAccessToken": tokens.access_token.is_some(),
                        }),
                    ),
                )
                .await;
            return Err(err);
        };

        let client = ClientRecord::new(
            client_name,
            client_customer_id,
            oauth_client_id,
            refresh_token,
        )
        .with_access_token(
            tokens.access_token.clone().unwrap_or_default(),
            tokens.expires_at.unwrap_or_else(Utc::now),
        );

        if let Err(e) = self.clients.create(&client).await {
            return Err(self
                .storage_failure(
                    oauth_client_id,
                    "store_new_client",
                    e,
                    json!({
                        "clientName": client_name,
                        "clientCustomerId": client_customer_id,
                    }),
                )
                .await);
        }

        info!(
            client_id = %client.id,
            client_customer_id = %client.client_customer_id,
            expires_at = %client.access_token_expires_at,
            "[TokenService] Stored new client"
        );

        Ok(client)
    }

    /// Exchange the client's refresh token for a new access token.
    ///
    /// On failure the client is deactivated according to the configured
    /// policy and the original failure is returned.
    pub async fn refresh_access_token(&self, client_id: &Uuid) -> Result<TokenResult, TokenError> {
        let Some(client) = self.get_client_by_id(client_id).await? else {
            let err = TokenError::ClientNotFound(*client_id);
            self.error_log
                .log_error(
                    NewErrorLog::new(client_id.to_string(), err.kind(), "Client not found")
                        .with_details(json!({ "operation": "refresh_access_token" })),
                )
                .await;
            return Err(err);
        };

        match self.exchange_and_store(&client).await {
            Ok(result) => {
                info!(
                    client_id = %client.id,
                    expires_at = %result.expires_at,
                    "[TokenService] Refreshed access token"
                );
                Ok(result)
            }
            Err(e) => {
                self.handle_refresh_failure(&client, &e).await;
                Err(e)
            }
        }
    }

    async fn exchange_and_store(&self, client: &ClientRecord) -> Result<TokenResult, TokenError> {
        debug!(client_id = %client.id, "[TokenService] Requesting new access token");

        let credentials = self
            .provider
            .refresh_access_token(&client.refresh_token)
            .await?;

        let access_token = credentials
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::new("Token response did not contain an access token"))?;
        let expires_at = credentials
            .expires_at
            .unwrap_or_else(|| Utc::now() + Duration::seconds(DEFAULT_ACCESS_TOKEN_LIFETIME_SECS));

        self.update_access_token(&client.id, &access_token, expires_at)
            .await?;

        Ok(TokenResult {
            access_token,
            expires_at,
            token_type: credentials
                .token_type
                .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string()),
            scope: credentials.scope,
        })
    }

    /// Log a refresh failure and apply the deactivation policy.
    ///
    /// Storage failures were already logged where they happened.
    async fn handle_refresh_failure(&self, client: &ClientRecord, err: &TokenError) {
        let kind = err.kind();

        if let Some(provider_err) = err.provider() {
            warn!(
                client_id = %client.id,
                error_type = %kind,
                status = ?provider_err.status,
                "[TokenService] Token refresh failed: {}",
                provider_err
            );

            self.error_log
                .log_error(
                    NewErrorLog::new(client.id.to_string(), kind, provider_err.message.clone())
                        .with_stack(err.stack())
                        .with_details(json!({
                            "operation": "refresh_access_token",
                            "lastTokenRefresh": client.updated_at,
                            "tokenExpiryDate": client.access_token_expires_at,
                            "statusCode": provider_err.status,
                            "response": provider_err.body,
                        })),
                )
                .await;
        }

        if self.deactivation_policy.should_deactivate(kind) {
            // The refresh failure is what the caller sees; a failed
            // deactivation is only logged.
            let _ = self.deactivate_client(&client.id).await;
        } else {
            info!(
                client_id = %client.id,
                error_type = %kind,
                policy = %self.deactivation_policy,
                "[TokenService] Keeping client active after transient failure"
            );
        }
    }

    async fn update_access_token(
        &self,
        client_id: &Uuid,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), TokenError> {
        let outcome = self
            .clients
            .update_access_token(client_id, access_token, expires_at)
            .await
            .and_then(|updated| {
                if updated {
                    Ok(())
                } else {
                    Err(anyhow::anyhow!("No client row with id {}", client_id))
                }
            });

        match outcome {
            Ok(()) => Ok(()),
            Err(e) => Err(self
                .storage_failure(
                    &client_id.to_string(),
                    "update_access_token",
                    e,
                    json!({ "tokenExpiryDate": expires_at }),
                )
                .await),
        }
    }

    /// Get a client by ID. Inactive clients are not returned.
    pub async fn get_client_by_id(
        &self,
        client_id: &Uuid,
    ) -> Result<Option<ClientRecord>, TokenError> {
        match self.clients.get_active(client_id).await {
            Ok(client) => Ok(client),
            Err(e) => Err(self
                .storage_failure(&client_id.to_string(), "get_client_by_id", e, json!({}))
                .await),
        }
    }

    /// Take a client out of refresh rotation. Idempotent.
    pub async fn deactivate_client(&self, client_id: &Uuid) -> Result<(), TokenError> {
        match self.clients.deactivate(client_id).await {
            Ok(found) => {
                info!(client_id = %client_id, found, "[TokenService] Client deactivated");
                self.error_log
                    .log_error(
                        NewErrorLog::new(
                            client_id.to_string(),
                            ErrorKind::ClientDeactivated,
                            "Client deactivated due to token refresh failure",
                        )
                        .with_details(json!({
                            "operation": "deactivate_client",
                            "deactivationTime": Utc::now(),
                        })),
                    )
                    .await;
                Ok(())
            }
            Err(e) => Err(self
                .storage_failure(&client_id.to_string(), "deactivate_client", e, json!({}))
                .await),
        }
    }

    /// Active clients whose access token expires within `threshold` from now.
    ///
    /// A row that cannot be read is logged against its own client and left
    /// out; the remaining clients are still returned.
    pub async fn get_expiring_tokens(
        &self,
        threshold: Duration,
    ) -> Result<Vec<ClientRecord>, TokenError> {
        let cutoff = Utc::now() + threshold;
        match self.clients.list_expiring(cutoff).await {
            Ok(scan) => {
                for row in scan.unreadable {
                    self.storage_failure(
                        &row.client_id,
                        "get_expiring_tokens",
                        row.error,
                        json!({ "thresholdMinutes": threshold.num_minutes() }),
                    )
                    .await;
                }
                Ok(scan.clients)
            }
            Err(e) => Err(self
                .storage_failure(
                    SYSTEM_CLIENT_ID,
                    "get_expiring_tokens",
                    e,
                    json!({ "thresholdMinutes": threshold.num_minutes() }),
                )
                .await),
        }
    }

    /// Log a storage failure and wrap it
    async fn storage_failure(
        &self,
        client_id: &str,
        operation: &'static str,
        source: anyhow::Error,
        mut details: Value,
    ) -> TokenError {
        let message = format!("{:#}", source);
        let err = TokenError::storage(operation, source);

        if let Value::Object(map) = &mut details {
            map.insert("operation".to_string(), Value::from(operation));
        }

        warn!(client_id, operation, "[TokenService] Storage failure: {}", message);
        self.error_log
            .log_error(
                NewErrorLog::new(client_id, ErrorKind::DatabaseError, message)
                    .with_stack(err.stack())
                    .with_details(details),
            )
            .await;
        err
    }
}
