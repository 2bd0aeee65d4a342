//! adstoken storage layer
//!
//! SQLite database with field-level encryption for OAuth tokens.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │      Repository Traits (adstoken-core)               │
//! │   ClientRepository, ErrorLogRepository               │
//! ├──────────────────────────────────────────────────────┤
//! │            SQLite Implementations                    │
//! │ SqliteClientRepository, SqliteErrorLogRepository     │
//! ├──────────────────────────────────────────────────────┤
//! │         TokenCipher (AES-256-GCM)                    │
//! │   refresh_token / access_token columns only          │
//! ├──────────────────────────────────────────────────────┤
//! │                   Database                           │
//! │                   (SQLite)                           │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use adstoken_storage::{Database, SqliteClientRepository, SqliteErrorLogRepository, TokenCipher};
//! use std::sync::Arc;
//! use tokio::sync::Mutex;
//!
//! let db = Arc::new(Mutex::new(Database::open(&path)?));
//! let cipher = Arc::new(TokenCipher::from_hex(&key_hex)?);
//!
//! let clients = SqliteClientRepository::new(db.clone(), cipher);
//! let error_logs = SqliteErrorLogRepository::new(db);
//! ```

pub mod crypto;
mod database;
mod repositories;

pub use crypto::{generate_key, generate_key_hex, TokenCipher, KEY_SIZE};
pub use database::Database;
pub use repositories::*;

/// Default database file name.
pub const DATABASE_FILE: &str = "adstoken.db";

/// Get the default database path for the current platform.
pub fn default_database_path() -> Option<std::path::PathBuf> {
    dirs::data_local_dir().map(|p| p.join("adstoken").join(DATABASE_FILE))
}
