//! Repository implementations using SQLite.

mod client_repository;
mod error_log_repository;

pub use client_repository::SqliteClientRepository;
pub use error_log_repository::SqliteErrorLogRepository;

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp for storage.
///
/// Fixed-width UTC with millisecond precision, so text comparison in SQL
/// matches chronological order.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return dt.and_utc();
    }
    tracing::warn!("[Storage] Unparseable timestamp {:?}, using epoch", s);
    DateTime::<Utc>::default()
}
