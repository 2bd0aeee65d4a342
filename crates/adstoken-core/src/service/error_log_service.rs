//! Error Log Service - durable, best-effort failure audit trail
//!
//! Writing never fails from the caller's point of view: a failed insert is
//! reported through `tracing` and dropped.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, warn};

use crate::domain::{ErrorLogEntry, ErrorLogFilter, ErrorStat, NewErrorLog};
use crate::repository::ErrorLogRepository;

/// Default number of entries returned by `client_error_history`
pub const DEFAULT_HISTORY_LIMIT: u32 = 100;

/// Sink that every layer writes failures to
#[async_trait]
pub trait ErrorLogSink: Send + Sync {
    /// Append an entry. Must not fail or panic.
    async fn log_error(&self, entry: NewErrorLog);
}

/// Error log backed by an `ErrorLogRepository`
pub struct ErrorLogService {
    repository: Arc<dyn ErrorLogRepository>,
}

impl ErrorLogService {
    pub fn new(repository: Arc<dyn ErrorLogRepository>) -> Self {
        Self { repository }
    }

    /// Query entries with optional filters and pagination
    pub async fn get_error_logs(&self, filter: &ErrorLogFilter) -> Result<Vec<ErrorLogEntry>> {
        self.repository.query(filter).await
    }

    /// Counts per error kind over a time range
    pub async fn get_error_stats(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ErrorStat>> {
        if start > end {
            anyhow::bail!("Invalid range: start {} is after end {}", start, end);
        }
        self.repository.stats(start, end).await
    }

    /// Most recent entries for one client
    pub async fn get_client_error_history(
        &self,
        client_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<ErrorLogEntry>> {
        let filter = ErrorLogFilter::for_client(client_id)
            .paginate(limit.unwrap_or(DEFAULT_HISTORY_LIMIT), 0);
        self.repository.query(&filter).await
    }
}

#[async_trait]
impl ErrorLogSink for ErrorLogService {
    async fn log_error(&self, entry: NewErrorLog) {
        warn!(
            client_id = %entry.client_id,
            error_type = %entry.error_type,
            operation = entry.operation().unwrap_or("-"),
            "[ErrorLog] {}",
            entry.error_message
        );

        if let Err(e) = self.repository.insert(&entry).await {
            error!(
                client_id = %entry.client_id,
                error_type = %entry.error_type,
                "[ErrorLog] Failed to persist error log entry: {:#}",
                e
            );
        }
    }
}
