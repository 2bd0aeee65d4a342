//! Typed failures of the token lifecycle.
//!
//! Constructing an error has no side effects. The layer that raises it is
//! responsible for writing the error log entry first.

use thiserror::Error;
use uuid::Uuid;

use crate::domain::ErrorKind;

/// Failure reported by the OAuth provider's token endpoint
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    /// Provider message, including the OAuth error code when one was returned
    pub message: String,
    /// HTTP status of the token endpoint response, if one was received
    pub status: Option<u16>,
    /// Raw response body, if one was received
    pub body: Option<String>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            body: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Whether the provider rejected the grant or token itself
    pub fn is_invalid_grant(&self) -> bool {
        self.message.contains("invalid_grant") || self.message.contains("invalid_token")
    }
}

/// Errors raised by the token service and the refresh scheduler
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Refresh token is required for new client setup")]
    MissingRefreshToken,

    #[error("Client {0} not found")]
    ClientNotFound(Uuid),

    #[error("Token refresh failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Database operation {operation} failed: {source}")]
    Storage {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl TokenError {
    pub fn storage(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Storage { operation, source }
    }

    /// Classify into the persisted error taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            TokenError::MissingRefreshToken => ErrorKind::OauthConfigError,
            TokenError::ClientNotFound(_) => ErrorKind::ClientDeactivated,
            TokenError::Provider(e) if e.is_invalid_grant() => ErrorKind::InvalidRefreshToken,
            TokenError::Provider(_) => ErrorKind::TokenRefreshFailed,
            TokenError::Storage { .. } => ErrorKind::DatabaseError,
        }
    }

    /// Upstream provider failure, if this is one
    pub fn provider(&self) -> Option<&ProviderError> {
        match self {
            TokenError::Provider(e) => Some(e),
            _ => None,
        }
    }

    /// Render the error and its sources, one per line
    pub fn stack(&self) -> String {
        let mut rendered = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            rendered.push_str("\ncaused by: ");
            rendered.push_str(&err.to_string());
            source = err.source();
        }
        rendered
    }
}
