//! Google OAuth 2.0 provider
//!
//! Wraps the `oauth2` crate's basic client for the authorization-code and
//! refresh-token grants against Google's token endpoint.

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use adstoken_core::{OAuthCredentials, OAuthProvider, ProviderError};
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicTokenResponse, BasicTokenType};
use oauth2::{
    AsyncHttpClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, HttpClientError, HttpRequest, HttpResponse, RedirectUrl,
    RefreshToken, RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use tracing::debug;

/// Google's consent page
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google's token endpoint
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Scope required by the Google Ads API
pub const ADWORDS_SCOPE: &str = "https://www.googleapis.com/auth/adwords";

/// Default redirect URI for the local callback route
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000/oauth/callback";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type GoogleClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

type TokenRequestError = RequestTokenError<HttpClientError<oauth2::reqwest::Error>, BasicErrorResponse>;

/// OAuth application settings
#[derive(Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
    pub request_timeout: Duration,
}

impl GoogleOAuthConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            scopes: vec![ADWORDS_SCOPE.to_string()],
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Point the provider at different endpoints (used by tests)
    pub fn with_endpoints(mut self, auth_url: impl Into<String>, token_url: impl Into<String>) -> Self {
        self.auth_url = auth_url.into();
        self.token_url = token_url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl fmt::Debug for GoogleOAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleOAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// HTTP client for a single token request that remembers the response
/// status. `oauth2` drops the status when it reports an error response.
struct StatusRecorder<'a> {
    http: &'a oauth2::reqwest::Client,
    status: AtomicU16,
}

impl<'a> StatusRecorder<'a> {
    fn new(http: &'a oauth2::reqwest::Client) -> Self {
        Self {
            http,
            status: AtomicU16::new(0),
        }
    }

    fn status(&self) -> Option<u16> {
        match self.status.load(Ordering::Relaxed) {
            0 => None,
            status => Some(status),
        }
    }
}

impl<'c> AsyncHttpClient<'c> for StatusRecorder<'_> {
    type Error = HttpClientError<oauth2::reqwest::Error>;
    type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + Send + 'c>>;

    fn call(&'c self, request: HttpRequest) -> Self::Future {
        Box::pin(async move {
            let response = self.http.call(request).await?;
            self.status
                .store(response.status().as_u16(), Ordering::Relaxed);
            Ok(response)
        })
    }
}

/// A consent URL and the CSRF state embedded in it
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// Google implementation of [`OAuthProvider`]
pub struct GoogleOAuthProvider {
    client: GoogleClient,
    http: oauth2::reqwest::Client,
    scopes: Vec<String>,
    client_id: String,
}

impl GoogleOAuthProvider {
    pub fn new(config: &GoogleOAuthConfig) -> anyhow::Result<Self> {
        let client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(config.auth_url.clone()).context("Invalid authorization URL")?)
            .set_token_uri(TokenUrl::new(config.token_url.clone()).context("Invalid token URL")?)
            .set_redirect_uri(
                RedirectUrl::new(config.redirect_uri.clone()).context("Invalid redirect URI")?,
            );

        // Following redirects from a token endpoint would leak the client secret
        let http = oauth2::reqwest::ClientBuilder::new()
            .redirect(oauth2::reqwest::redirect::Policy::none())
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            http,
            scopes: config.scopes.clone(),
            client_id: config.client_id.clone(),
        })
    }

    /// OAuth application ID tokens are issued under
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Build the consent URL. Offline access with forced consent, so the
    /// callback always receives a refresh token.
    pub fn authorize_url(&self) -> AuthorizationRequest {
        let mut request = self.client.authorize_url(CsrfToken::new_random);
        for scope in &self.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }
        let (url, state) = request
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();

        AuthorizationRequest {
            url: url.to_string(),
            state: state.secret().clone(),
        }
    }
}

#[async_trait]
impl OAuthProvider for GoogleOAuthProvider {
    async fn exchange_code(&self, code: &str) -> Result<OAuthCredentials, ProviderError> {
        debug!("[GoogleOAuth] Exchanging authorization code");

        let http = StatusRecorder::new(&self.http);
        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&http)
            .await
            .map_err(|e| provider_error(e, http.status()))?;

        Ok(credentials_from(&response))
    }

    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<OAuthCredentials, ProviderError> {
        debug!("[GoogleOAuth] Refreshing access token");

        let refresh_token = RefreshToken::new(refresh_token.to_string());
        let http = StatusRecorder::new(&self.http);
        let response = self
            .client
            .exchange_refresh_token(&refresh_token)
            .request_async(&http)
            .await
            .map_err(|e| provider_error(e, http.status()))?;

        Ok(credentials_from(&response))
    }
}

fn credentials_from(response: &BasicTokenResponse) -> OAuthCredentials {
    OAuthCredentials {
        access_token: Some(response.access_token().secret().clone()),
        refresh_token: response.refresh_token().map(|t| t.secret().clone()),
        expires_at: response
            .expires_in()
            .map(|d| Utc::now() + chrono::Duration::seconds(d.as_secs() as i64)),
        token_type: Some(token_type_name(response.token_type())),
        scope: response.scopes().map(|scopes| {
            scopes
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        }),
    }
}

fn token_type_name(token_type: &BasicTokenType) -> String {
    match token_type {
        BasicTokenType::Bearer => "Bearer".to_string(),
        BasicTokenType::Mac => "MAC".to_string(),
        BasicTokenType::Extension(other) => other.clone(),
    }
}

/// Flatten an `oauth2` failure into a provider error.
///
/// The OAuth error code leads the message so classification can find
/// `invalid_grant`. `status` is the HTTP status of the token endpoint's
/// response, when one arrived.
fn provider_error(err: TokenRequestError, status: Option<u16>) -> ProviderError {
    let err = match err {
        RequestTokenError::ServerResponse(response) => {
            let mut message = response.error().to_string();
            if let Some(description) = response.error_description() {
                message = format!("{}: {}", message, description);
            }
            let mut err = ProviderError::new(message);
            if let Ok(body) = serde_json::to_string(&response) {
                err = err.with_body(body);
            }
            err
        }
        RequestTokenError::Request(e) => {
            let transport_status = match &e {
                HttpClientError::Reqwest(inner) => inner.status().map(|s| s.as_u16()),
                _ => None,
            };
            let err = ProviderError::new(error_chain(&e));
            match transport_status {
                Some(status) => err.with_status(status),
                None => err,
            }
        }
        RequestTokenError::Parse(e, body) => {
            ProviderError::new(format!("Failed to parse token response: {}", e))
                .with_body(String::from_utf8_lossy(&body).into_owned())
        }
        RequestTokenError::Other(message) => ProviderError::new(message),
    };

    match (err.status, status) {
        (None, Some(status)) => err.with_status(status),
        _ => err,
    }
}

/// Render an error with all of its sources. Transport errors keep the
/// useful part ("connection reset", "timed out") in the source chain.
fn error_chain(err: &dyn StdError) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
