//! # AdsToken Core Library
//!
//! Domain logic for keeping Google Ads API OAuth credentials fresh.
//!
//! ## Modules
//!
//! - `domain` - Client records, token payloads, the error taxonomy
//! - `error` - Typed token lifecycle errors
//! - `provider` - OAuth provider trait
//! - `repository` - Data access traits
//! - `service` - Token service, error log service, retry policy

pub mod domain;
pub mod error;
pub mod provider;
pub mod repository;
pub mod service;

// Re-export commonly used types
pub use domain::*;
pub use error::{ProviderError, TokenError};
pub use provider::OAuthProvider;
pub use repository::*;
pub use service::*;
