//! OAuth provider seam
//!
//! The authorization-code and refresh-token grants are performed by an
//! external OAuth library. The token service only sees this trait.

use async_trait::async_trait;

use crate::domain::OAuthCredentials;
use crate::error::ProviderError;

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Exchange an authorization code for the initial credentials
    async fn exchange_code(&self, code: &str) -> Result<OAuthCredentials, ProviderError>;

    /// Obtain a new access token with a stored refresh token
    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<OAuthCredentials, ProviderError>;
}
