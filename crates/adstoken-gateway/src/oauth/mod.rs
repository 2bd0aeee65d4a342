//! OAuth provider adapters

mod google;
mod pending;

pub use google::{
    AuthorizationRequest, GoogleOAuthConfig, GoogleOAuthProvider, ADWORDS_SCOPE,
    DEFAULT_REDIRECT_URI, GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL,
};
pub use pending::{PendingStates, MAX_PENDING_STATES, STATE_TTL};
