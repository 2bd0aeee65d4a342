//! Domain entities and value objects
//!
//! - `ClientRecord` - a registered integration and its credential state
//! - `OAuthCredentials` / `TokenResult` - token endpoint payloads
//! - `ErrorKind` and error log rows

mod client;
mod error_log;
mod token;

pub use client::*;
pub use error_log::*;
pub use token::*;
