//! Repository traits for data access
//!
//! These traits define the interface for data storage without specifying
//! the implementation (SQLite, in-memory, etc.)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{ClientRecord, ErrorLogEntry, ErrorLogFilter, ErrorStat, NewErrorLog};

/// Result type for repository operations
pub type RepoResult<T> = anyhow::Result<T>;

/// A stored client row that matched a query but could not be decoded
#[derive(Debug)]
pub struct UnreadableClient {
    /// Raw ID column of the row
    pub client_id: String,
    pub error: anyhow::Error,
}

/// Outcome of the expiring-client scan.
///
/// Rows that fail to decode are reported next to the readable clients
/// instead of failing the whole scan.
#[derive(Debug, Default)]
pub struct ExpiringClients {
    pub clients: Vec<ClientRecord>,
    pub unreadable: Vec<UnreadableClient>,
}

/// Client repository trait
///
/// Every mutation is a single-row update.
#[async_trait]
pub trait ClientRepository: Send + Sync {
    /// Insert a new client record
    async fn create(&self, client: &ClientRecord) -> RepoResult<()>;

    /// Get a client by ID regardless of its active flag
    async fn get(&self, id: &Uuid) -> RepoResult<Option<ClientRecord>>;

    /// Get a client by ID only if it is active
    async fn get_active(&self, id: &Uuid) -> RepoResult<Option<ClientRecord>>;

    /// Active clients whose access token expires at or before `cutoff`
    async fn list_expiring(&self, cutoff: DateTime<Utc>) -> RepoResult<ExpiringClients>;

    /// Replace the access token and its expiry.
    ///
    /// Returns false if no such client exists.
    async fn update_access_token(
        &self,
        id: &Uuid,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<bool>;

    /// Mark a client inactive. Returns false if no such client exists.
    async fn deactivate(&self, id: &Uuid) -> RepoResult<bool>;
}

/// Append-only error log repository trait
#[async_trait]
pub trait ErrorLogRepository: Send + Sync {
    /// Append an entry, returning its ID
    async fn insert(&self, entry: &NewErrorLog) -> RepoResult<i64>;

    /// Query entries, newest first
    async fn query(&self, filter: &ErrorLogFilter) -> RepoResult<Vec<ErrorLogEntry>>;

    /// Counts per error kind created within `[start, end]`, largest first
    async fn stats(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> RepoResult<Vec<ErrorStat>>;
}
