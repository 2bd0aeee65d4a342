//! AdsToken Gateway
//!
//! Everything that talks to the outside world:
//! - Google OAuth provider adapter (`oauth2` crate)
//! - Background refresh scheduler
//! - HTTP front door for authorization, manual refresh and the error log

pub mod oauth;
pub mod refresh;
pub mod server;

pub use oauth::{AuthorizationRequest, GoogleOAuthConfig, GoogleOAuthProvider, PendingStates};
pub use refresh::{CycleReport, RefreshConfig, RefreshScheduler, MAX_REFRESH_THRESHOLD};
pub use server::{build_router, AppState, ClientRegistration, GatewayConfig, GatewayServer};
