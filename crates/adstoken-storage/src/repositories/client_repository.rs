//! SQLite implementation of ClientRepository.
//!
//! Both token columns are encrypted with the column name as associated data.
//! Expiry and the active flag stay plaintext so the refresh query can use the
//! `(is_active, access_token_expires_at)` index.

use std::sync::Arc;

use adstoken_core::{ClientRecord, ClientRepository, ExpiringClients, UnreadableClient};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use super::{format_datetime, parse_datetime};
use crate::crypto::TokenCipher;
use crate::Database;

const REFRESH_TOKEN_COLUMN: &str = "refresh_token";
const ACCESS_TOKEN_COLUMN: &str = "access_token";

/// Raw row data extracted from SQLite before decryption.
struct RawClientRow {
    id: String,
    client_name: String,
    client_customer_id: String,
    oauth_client_id: String,
    refresh_token: String, // Encrypted
    access_token: String,  // Encrypted
    access_token_expires_at: String,
    is_active: bool,
    created_at: String,
    updated_at: String,
}

/// SQLite-backed client repository with token encryption.
pub struct SqliteClientRepository {
    db: Arc<Mutex<Database>>,
    cipher: Arc<TokenCipher>,
}

impl SqliteClientRepository {
    /// Create a new client repository.
    pub fn new(db: Arc<Mutex<Database>>, cipher: Arc<TokenCipher>) -> Self {
        Self { db, cipher }
    }

    /// Standard column list for SELECT queries.
    const SELECT_COLUMNS: &'static str = "id, client_name, client_customer_id, oauth_client_id, \
         refresh_token, access_token, access_token_expires_at, is_active, created_at, updated_at";

    /// Extract raw row data from a rusqlite Row.
    fn extract_row(row: &rusqlite::Row) -> rusqlite::Result<RawClientRow> {
        Ok(RawClientRow {
            id: row.get(0)?,
            client_name: row.get(1)?,
            client_customer_id: row.get(2)?,
            oauth_client_id: row.get(3)?,
            refresh_token: row.get(4)?,
            access_token: row.get(5)?,
            access_token_expires_at: row.get(6)?,
            is_active: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    /// Build a ClientRecord from extracted row data.
    fn build_client(&self, row: RawClientRow) -> Result<ClientRecord> {
        let id = Uuid::parse_str(&row.id)
            .with_context(|| format!("Invalid client id in database: {}", row.id))?;

        Ok(ClientRecord {
            id,
            client_name: row.client_name,
            client_customer_id: row.client_customer_id,
            oauth_client_id: row.oauth_client_id,
            refresh_token: self
                .cipher
                .open(REFRESH_TOKEN_COLUMN, &row.refresh_token)
                .with_context(|| format!("Client {}", id))?,
            access_token: self
                .cipher
                .open(ACCESS_TOKEN_COLUMN, &row.access_token)
                .with_context(|| format!("Client {}", id))?,
            access_token_expires_at: parse_datetime(&row.access_token_expires_at),
            is_active: row.is_active,
            created_at: parse_datetime(&row.created_at),
            updated_at: parse_datetime(&row.updated_at),
        })
    }

    async fn fetch_one(&self, sql: &str, id: &Uuid) -> Result<Option<ClientRecord>> {
        let raw = {
            let db = self.db.lock().await;
            let conn = db.connection();
            let mut stmt = conn.prepare(sql)?;
            stmt.query_row(params![id.to_string()], Self::extract_row)
                .optional()?
        };

        raw.map(|r| self.build_client(r)).transpose()
    }
}

#[async_trait]
impl ClientRepository for SqliteClientRepository {
    async fn create(&self, client: &ClientRecord) -> Result<()> {
        let refresh_token = self.cipher.seal(REFRESH_TOKEN_COLUMN, &client.refresh_token)?;
        let access_token = self.cipher.seal(ACCESS_TOKEN_COLUMN, &client.access_token)?;

        let db = self.db.lock().await;
        db.connection().execute(
            "INSERT INTO clients (id, client_name, client_customer_id, oauth_client_id, refresh_token,
                                  access_token, access_token_expires_at, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                client.id.to_string(),
                client.client_name,
                client.client_customer_id,
                client.oauth_client_id,
                refresh_token,
                access_token,
                format_datetime(&client.access_token_expires_at),
                client.is_active,
                format_datetime(&client.created_at),
                format_datetime(&client.updated_at),
            ],
        )?;

        Ok(())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<ClientRecord>> {
        let sql = format!("SELECT {} FROM clients WHERE id = ?1", Self::SELECT_COLUMNS);
        self.fetch_one(&sql, id).await
    }

    async fn get_active(&self, id: &Uuid) -> Result<Option<ClientRecord>> {
        let sql = format!(
            "SELECT {} FROM clients WHERE id = ?1 AND is_active = 1",
            Self::SELECT_COLUMNS
        );
        self.fetch_one(&sql, id).await
    }

    async fn list_expiring(&self, cutoff: DateTime<Utc>) -> Result<ExpiringClients> {
        let rows = {
            let db = self.db.lock().await;
            let conn = db.connection();
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM clients
                 WHERE is_active = 1 AND access_token_expires_at <= ?1
                 ORDER BY access_token_expires_at",
                Self::SELECT_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![format_datetime(&cutoff)], Self::extract_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut scan = ExpiringClients::default();
        for row in rows {
            let client_id = row.id.clone();
            match self.build_client(row) {
                Ok(client) => scan.clients.push(client),
                Err(error) => {
                    warn!(
                        client_id = %client_id,
                        "[ClientRepository] Skipping unreadable client row: {:#}",
                        error
                    );
                    scan.unreadable.push(UnreadableClient { client_id, error });
                }
            }
        }

        Ok(scan)
    }

    async fn update_access_token(
        &self,
        id: &Uuid,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let sealed = self.cipher.seal(ACCESS_TOKEN_COLUMN, access_token)?;

        let db = self.db.lock().await;
        let rows = db.connection().execute(
            "UPDATE clients SET access_token = ?2, access_token_expires_at = ?3, updated_at = ?4
             WHERE id = ?1",
            params![
                id.to_string(),
                sealed,
                format_datetime(&expires_at),
                format_datetime(&Utc::now()),
            ],
        )?;

        Ok(rows > 0)
    }

    async fn deactivate(&self, id: &Uuid) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.connection().execute(
            "UPDATE clients SET is_active = 0, updated_at = ?2 WHERE id = ?1",
            params![id.to_string(), format_datetime(&Utc::now())],
        )?;

        Ok(rows > 0)
    }
}
