//! Domain services
//!
//! Business logic that operates on domain entities via repositories.

mod error_log_service;
pub mod retry;
mod token_service;

pub use error_log_service::{ErrorLogService, ErrorLogSink, DEFAULT_HISTORY_LIMIT};
pub use retry::{RetryPolicy, Retryable};
pub use token_service::{DeactivationPolicy, TokenService};
