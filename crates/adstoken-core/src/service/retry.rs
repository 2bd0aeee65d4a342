//! Retry policy for callers wrapping token operations
//!
//! Transient failures (connection resets, timeouts, 429/503/504) are retried
//! with capped exponential backoff plus jitter. Rejected grants and client
//! credentials are never retried.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::domain::ErrorKind;
use crate::error::{ProviderError, TokenError};

/// Upper bound of the exponential part of the delay
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Upper bound of the random jitter added to every delay
pub const MAX_JITTER: Duration = Duration::from_secs(1);

const RETRYABLE_MARKERS: &[&str] = &[
    "ECONNRESET",
    "connection reset",
    "ETIMEDOUT",
    "timed out",
    "429",
    "503",
    "504",
];

const PERMANENT_MARKERS: &[&str] = &["invalid_grant", "invalid_client", "invalid_token"];

const RETRYABLE_STATUS: &[u16] = &[429, 503, 504];

/// Errors that can tell whether another attempt may succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        if is_permanent_message(&self.message) {
            return false;
        }
        if self.status.is_some_and(|s| RETRYABLE_STATUS.contains(&s)) {
            return true;
        }
        is_retryable_message(&self.message)
    }
}

impl Retryable for TokenError {
    fn is_retryable(&self) -> bool {
        match self {
            e if e.kind() == ErrorKind::InvalidRefreshToken => false,
            TokenError::Provider(e) => e.is_retryable(),
            TokenError::Storage { source, .. } => is_retryable_message(&format!("{:#}", source)),
            TokenError::MissingRefreshToken | TokenError::ClientNotFound(_) => false,
        }
    }
}

/// Whether an error message names a transient network or capacity failure.
///
/// Matching ignores ASCII case: OS errors render as "Connection reset".
pub fn is_retryable_message(message: &str) -> bool {
    !is_permanent_message(message) && contains_any(message, RETRYABLE_MARKERS)
}

fn is_permanent_message(message: &str) -> bool {
    contains_any(message, PERMANENT_MARKERS)
}

fn contains_any(message: &str, markers: &[&str]) -> bool {
    let message = message.to_ascii_lowercase();
    markers
        .iter()
        .any(|m| message.contains(&m.to_ascii_lowercase()))
}

/// Exponential part of the delay before retry `attempt` (0-based), capped
pub fn backoff_delay(attempt: u32, base_delay: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base_delay
        .checked_mul(factor)
        .unwrap_or(MAX_RETRY_DELAY)
        .min(MAX_RETRY_DELAY)
}

/// Delay before retry `attempt`: capped backoff plus random jitter
pub fn retry_delay(attempt: u32, base_delay: Duration) -> Duration {
    let jitter_ms = rand::thread_rng().gen_range(0..MAX_JITTER.as_millis() as u64);
    backoff_delay(attempt, base_delay) + Duration::from_millis(jitter_ms)
}

/// Retry settings
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Never retry
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 < max_attempts && e.is_retryable() => {
                    let delay = retry_delay(attempt, self.base_delay);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "[Retry] Transient failure, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!(operation, attempts = attempt + 1, "[Retry] Giving up");
                    return Err(e);
                }
            }
        }
    }
}
