//! Error log entities - the append-only failure audit trail

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client ID used for failures that are not scoped to a single client
pub const SYSTEM_CLIENT_ID: &str = "system";

/// Fixed taxonomy of logged failures.
///
/// Persisted as the SCREAMING_SNAKE_CASE string.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    TokenRefreshFailed,
    InvalidRefreshToken,
    ClientDeactivated,
    OauthConfigError,
    ApiError,
    DatabaseError,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 6] = [
        ErrorKind::TokenRefreshFailed,
        ErrorKind::InvalidRefreshToken,
        ErrorKind::ClientDeactivated,
        ErrorKind::OauthConfigError,
        ErrorKind::ApiError,
        ErrorKind::DatabaseError,
    ];

    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TokenRefreshFailed => "TOKEN_REFRESH_FAILED",
            ErrorKind::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            ErrorKind::ClientDeactivated => "CLIENT_DEACTIVATED",
            ErrorKind::OauthConfigError => "OAUTH_CONFIG_ERROR",
            ErrorKind::ApiError => "API_ERROR",
            ErrorKind::DatabaseError => "DATABASE_ERROR",
        }
    }

    /// Parse from storage representation
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Whether this kind denotes a failure that retrying cannot fix
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidRefreshToken | ErrorKind::OauthConfigError
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure to be appended to the error log
#[derive(Debug, Clone, PartialEq)]
pub struct NewErrorLog {
    pub client_id: String,
    pub error_type: ErrorKind,
    pub error_message: String,
    /// Rendered source chain of the underlying error
    pub error_stack: Option<String>,
    /// Structured context: operation name, timestamps, upstream status
    pub additional_details: Option<Value>,
}

impl NewErrorLog {
    pub fn new(
        client_id: impl Into<String>,
        error_type: ErrorKind,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            error_type,
            error_message: error_message.into(),
            error_stack: None,
            additional_details: None,
        }
    }

    /// Entry scoped to the whole system rather than one client
    pub fn system(error_type: ErrorKind, error_message: impl Into<String>) -> Self {
        Self::new(SYSTEM_CLIENT_ID, error_type, error_message)
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.error_stack = Some(stack.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.additional_details = Some(details);
        self
    }

    /// Name of the operation recorded in the details, if any
    pub fn operation(&self) -> Option<&str> {
        self.additional_details
            .as_ref()
            .and_then(|d| d.get("operation"))
            .and_then(Value::as_str)
    }
}

/// A persisted error log row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorLogEntry {
    pub id: i64,
    pub client_id: String,
    pub error_type: ErrorKind,
    pub error_message: String,
    pub error_stack: Option<String>,
    pub additional_details: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Filters for querying the error log. Results are newest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorLogFilter {
    pub client_id: Option<String>,
    pub error_type: Option<ErrorKind>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ErrorLogFilter {
    pub fn for_client(client_id: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, error_type: ErrorKind) -> Self {
        self.error_type = Some(error_type);
        self
    }

    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn paginate(mut self, limit: u32, offset: u32) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }
}

/// Aggregate counts per error kind over a time range
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorStat {
    pub error_type: ErrorKind,
    pub error_count: u64,
    pub affected_clients_count: u64,
}
