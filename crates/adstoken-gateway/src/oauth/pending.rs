//! CSRF states of authorizations that have been started but not completed

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, warn};

/// How long a consent page may stay open before its callback is rejected
pub const STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Authorizations that may be in progress at once
pub const MAX_PENDING_STATES: usize = 1024;

/// One-shot CSRF states keyed by value
#[derive(Debug)]
pub struct PendingStates {
    states: DashMap<String, Instant>,
    ttl: Duration,
    max_pending: usize,
}

impl Default for PendingStates {
    fn default() -> Self {
        Self::new(STATE_TTL)
    }
}

impl PendingStates {
    pub fn new(ttl: Duration) -> Self {
        Self {
            states: DashMap::new(),
            ttl,
            max_pending: MAX_PENDING_STATES,
        }
    }

    pub fn with_limit(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Remember a state issued with a consent URL.
    ///
    /// Returns false, remembering nothing, when the limit of unexpired
    /// states is reached.
    pub fn insert(&self, state: impl Into<String>) -> bool {
        self.purge_expired();
        if self.states.len() >= self.max_pending {
            warn!(
                pending = self.states.len(),
                "[OAuth] Too many authorizations in progress"
            );
            return false;
        }
        self.states.insert(state.into(), Instant::now() + self.ttl);
        true
    }

    /// Consume a state. Returns false if it is unknown, already used or expired.
    pub fn take(&self, state: &str) -> bool {
        match self.states.remove(state) {
            Some((_, expires_at)) => expires_at > Instant::now(),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        let before = self.states.len();
        self.states.retain(|_, expires_at| *expires_at > now);
        let purged = before.saturating_sub(self.states.len());
        if purged > 0 {
            debug!(purged, "[OAuth] Dropped expired authorization states");
        }
    }
}
