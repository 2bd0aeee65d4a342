//! SQLite implementation of ErrorLogRepository.

use std::sync::Arc;

use adstoken_core::{ErrorKind, ErrorLogEntry, ErrorLogFilter, ErrorLogRepository, ErrorStat, NewErrorLog};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter};
use tokio::sync::Mutex;

use super::{format_datetime, parse_datetime};
use crate::Database;

struct RawErrorLogRow {
    id: i64,
    client_id: String,
    error_type: String,
    error_message: String,
    error_stack: Option<String>,
    additional_details: Option<String>,
    created_at: String,
}

/// SQLite-backed append-only error log.
pub struct SqliteErrorLogRepository {
    db: Arc<Mutex<Database>>,
}

impl SqliteErrorLogRepository {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    const SELECT_COLUMNS: &'static str =
        "id, client_id, error_type, error_message, error_stack, additional_details, created_at";

    fn extract_row(row: &rusqlite::Row) -> rusqlite::Result<RawErrorLogRow> {
        Ok(RawErrorLogRow {
            id: row.get(0)?,
            client_id: row.get(1)?,
            error_type: row.get(2)?,
            error_message: row.get(3)?,
            error_stack: row.get(4)?,
            additional_details: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn build_entry(row: RawErrorLogRow) -> Result<ErrorLogEntry> {
        let error_type = ErrorKind::parse(&row.error_type)
            .ok_or_else(|| anyhow::anyhow!("Unknown error type: {}", row.error_type))?;
        let additional_details = row
            .additional_details
            .map(|d| serde_json::from_str(&d))
            .transpose()
            .with_context(|| format!("Invalid additional_details in error log {}", row.id))?;

        Ok(ErrorLogEntry {
            id: row.id,
            client_id: row.client_id,
            error_type,
            error_message: row.error_message,
            error_stack: row.error_stack,
            additional_details,
            created_at: parse_datetime(&row.created_at),
        })
    }

    /// Build the WHERE clause and bound values for a filter.
    fn where_clause(filter: &ErrorLogFilter) -> (String, Vec<SqlValue>) {
        let mut conditions = Vec::new();
        let mut values = Vec::new();

        if let Some(client_id) = &filter.client_id {
            values.push(SqlValue::Text(client_id.clone()));
            conditions.push(format!("client_id = ?{}", values.len()));
        }
        if let Some(error_type) = filter.error_type {
            values.push(SqlValue::Text(error_type.as_str().to_string()));
            conditions.push(format!("error_type = ?{}", values.len()));
        }
        if let Some(start) = &filter.start_date {
            values.push(SqlValue::Text(format_datetime(start)));
            conditions.push(format!("created_at >= ?{}", values.len()));
        }
        if let Some(end) = &filter.end_date {
            values.push(SqlValue::Text(format_datetime(end)));
            conditions.push(format!("created_at <= ?{}", values.len()));
        }

        if conditions.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", conditions.join(" AND ")), values)
        }
    }
}

#[async_trait]
impl ErrorLogRepository for SqliteErrorLogRepository {
    async fn insert(&self, entry: &NewErrorLog) -> Result<i64> {
        let details = entry
            .additional_details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let db = self.db.lock().await;
        let conn = db.connection();
        conn.execute(
            "INSERT INTO error_logs (client_id, error_type, error_message, error_stack, additional_details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.client_id,
                entry.error_type.as_str(),
                entry.error_message,
                entry.error_stack,
                details,
                format_datetime(&Utc::now()),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    async fn query(&self, filter: &ErrorLogFilter) -> Result<Vec<ErrorLogEntry>> {
        let (where_sql, mut values) = Self::where_clause(filter);
        let mut sql = format!(
            "SELECT {} FROM error_logs{} ORDER BY created_at DESC, id DESC",
            Self::SELECT_COLUMNS,
            where_sql
        );

        if filter.limit.is_some() || filter.offset.is_some() {
            // LIMIT -1 means no limit in SQLite
            values.push(SqlValue::Integer(filter.limit.map(i64::from).unwrap_or(-1)));
            sql.push_str(&format!(" LIMIT ?{}", values.len()));
            values.push(SqlValue::Integer(filter.offset.map(i64::from).unwrap_or(0)));
            sql.push_str(&format!(" OFFSET ?{}", values.len()));
        }

        let rows = {
            let db = self.db.lock().await;
            let conn = db.connection();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values), Self::extract_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        rows.into_iter().map(Self::build_entry).collect()
    }

    async fn stats(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<ErrorStat>> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let mut stmt = conn.prepare(
            "SELECT error_type, COUNT(*) AS error_count, COUNT(DISTINCT client_id)
             FROM error_logs
             WHERE created_at >= ?1 AND created_at <= ?2
             GROUP BY error_type
             ORDER BY error_count DESC, error_type",
        )?;

        let rows = stmt
            .query_map(params![format_datetime(&start), format_datetime(&end)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(error_type, count, clients)| {
                Ok(ErrorStat {
                    error_type: ErrorKind::parse(&error_type)
                        .ok_or_else(|| anyhow::anyhow!("Unknown error type: {}", error_type))?,
                    error_count: count as u64,
                    affected_clients_count: clients as u64,
                })
            })
            .collect()
    }
}
