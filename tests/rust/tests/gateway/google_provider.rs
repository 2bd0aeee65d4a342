//! GoogleOAuthProvider against a wiremock token endpoint

use std::time::Duration;

use adstoken_core::{ErrorKind, OAuthProvider, RetryPolicy, Retryable, TokenError};
use adstoken_gateway::oauth::DEFAULT_REDIRECT_URI;
use adstoken_gateway::{GoogleOAuthConfig, GoogleOAuthProvider};
use chrono::Utc;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider_for(server: &MockServer) -> GoogleOAuthProvider {
    let config = GoogleOAuthConfig::new("test-app", "test-secret", DEFAULT_REDIRECT_URI)
        .with_endpoints(
            format!("{}/o/oauth2/v2/auth", server.uri()),
            format!("{}/token", server.uri()),
        )
        .with_request_timeout(Duration::from_secs(5));
    GoogleOAuthProvider::new(&config).unwrap()
}

#[tokio::test]
async fn test_refresh_maps_token_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=1%2F%2F0stored"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.refreshed",
            "expires_in": 3599,
            "token_type": "Bearer",
            "scope": "https://www.googleapis.com/auth/adwords"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let credentials = provider_for(&server)
        .refresh_access_token("1//0stored")
        .await
        .unwrap();

    assert_eq!(credentials.access_token.as_deref(), Some("ya29.refreshed"));
    assert_eq!(credentials.refresh_token, None);
    assert_eq!(credentials.token_type.as_deref(), Some("Bearer"));
    assert_eq!(
        credentials.scope.as_deref(),
        Some("https://www.googleapis.com/auth/adwords")
    );
    let expires_at = credentials.expires_at.unwrap();
    assert!(expires_at > Utc::now() + chrono::Duration::minutes(58));
    assert!(expires_at <= Utc::now() + chrono::Duration::seconds(3599));
}

#[tokio::test]
async fn test_exchange_returns_refresh_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=4%2F0code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.initial",
            "refresh_token": "1//0issued",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .mount(&server)
        .await;

    let credentials = provider_for(&server)
        .exchange_code("4/0code")
        .await
        .unwrap();

    assert_eq!(credentials.usable_refresh_token(), Some("1//0issued"));
    assert_eq!(credentials.access_token.as_deref(), Some("ya29.initial"));
}

#[tokio::test]
async fn test_invalid_grant_keeps_oauth_error_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        })))
        .mount(&server)
        .await;

    let err = provider_for(&server)
        .refresh_access_token("1//0revoked")
        .await
        .unwrap_err();

    assert_eq!(err.message, "invalid_grant: Token has been expired or revoked.");
    assert_eq!(err.status, Some(400));
    assert!(err.body.as_deref().unwrap().contains("invalid_grant"));
    assert!(!err.is_retryable());
    assert_eq!(TokenError::from(err).kind(), ErrorKind::InvalidRefreshToken);
}

#[tokio::test]
async fn test_unparseable_error_response_keeps_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&server)
        .await;

    let err = provider_for(&server)
        .exchange_code("4/0code")
        .await
        .unwrap_err();

    assert_eq!(err.status, Some(503));
    assert_eq!(err.body.as_deref(), Some("Service Unavailable"));
    assert!(err.is_retryable());
    assert_eq!(
        TokenError::from(err).kind(),
        ErrorKind::TokenRefreshFailed
    );
}

#[tokio::test]
async fn test_rate_limited_refresh_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": "rate_limit_exceeded"
        })))
        .mount(&server)
        .await;

    let err = provider_for(&server)
        .refresh_access_token("1//0stored")
        .await
        .unwrap_err();

    assert_eq!(err.status, Some(429));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_exchange_retries_through_unavailable_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.after-retry",
            "refresh_token": "1//0issued",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let policy = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
    };
    let credentials = policy
        .run("exchange_code", || provider.exchange_code("4/0code"))
        .await
        .unwrap();

    assert_eq!(credentials.access_token.as_deref(), Some("ya29.after-retry"));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_a_refresh_failure() {
    let server = MockServer::start().await;
    let provider = provider_for(&server);
    drop(server);

    let err = provider.refresh_access_token("1//0stored").await.unwrap_err();

    assert_eq!(TokenError::from(err).kind(), ErrorKind::TokenRefreshFailed);
}
