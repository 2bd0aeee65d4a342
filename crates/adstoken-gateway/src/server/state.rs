//! Shared state handed to every HTTP handler

use std::sync::Arc;

use adstoken_core::{ErrorLogService, RetryPolicy, TokenService};

use crate::oauth::{GoogleOAuthProvider, PendingStates};
use crate::refresh::RefreshScheduler;

/// Name and account a client is registered under when its authorization completes
#[derive(Debug, Clone)]
pub struct ClientRegistration {
    pub client_name: String,
    pub client_customer_id: String,
}

impl Default for ClientRegistration {
    fn default() -> Self {
        Self {
            client_name: "Demo Client".to_string(),
            client_customer_id: String::new(),
        }
    }
}

/// App state shared by all routes
#[derive(Clone)]
pub struct AppState {
    pub token_service: Arc<TokenService>,
    pub scheduler: Arc<RefreshScheduler>,
    pub error_logs: Arc<ErrorLogService>,
    /// Builds consent URLs. Code exchange goes through the token service's provider.
    pub consent: Arc<GoogleOAuthProvider>,
    pub pending_states: Arc<PendingStates>,
    pub registration: ClientRegistration,
    /// Retry policy for the authorization-code exchange
    pub exchange_retry: RetryPolicy,
}
