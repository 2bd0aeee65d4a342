//! Router tests driven through `tower::ServiceExt::oneshot`

use std::sync::Arc;

use adstoken_core::{
    ErrorKind, ErrorLogService, ErrorLogSink, NewErrorLog, OAuthCredentials, RetryPolicy,
    TokenService,
};
use adstoken_gateway::oauth::{DEFAULT_REDIRECT_URI, STATE_TTL};
use adstoken_gateway::{
    build_router, AppState, ClientRegistration, GoogleOAuthConfig, GoogleOAuthProvider,
    PendingStates, RefreshConfig, RefreshScheduler,
};
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use serde_json::Value;
use tests::{fixtures, MemoryErrorLog, MockClientRepository, MockOAuthProvider};
use tower::ServiceExt;
use uuid::Uuid;

struct TestGateway {
    state: AppState,
    clients: Arc<MockClientRepository>,
    provider: Arc<MockOAuthProvider>,
    errors: Arc<MemoryErrorLog>,
}

impl TestGateway {
    fn new() -> Self {
        let clients = Arc::new(MockClientRepository::new());
        let provider = Arc::new(MockOAuthProvider::new());
        let errors = Arc::new(MemoryErrorLog::new());
        let error_logs = Arc::new(ErrorLogService::new(errors.clone()));

        let token_service = Arc::new(TokenService::new(
            clients.clone(),
            provider.clone(),
            error_logs.clone(),
        ));
        let scheduler = Arc::new(RefreshScheduler::new(
            token_service.clone(),
            error_logs.clone(),
            RefreshConfig::default(),
        ));
        let consent = Arc::new(
            GoogleOAuthProvider::new(&GoogleOAuthConfig::new(
                fixtures::OAUTH_CLIENT_ID,
                "test-secret",
                DEFAULT_REDIRECT_URI,
            ))
            .unwrap(),
        );

        let state = AppState {
            token_service,
            scheduler,
            error_logs,
            consent,
            pending_states: Arc::new(PendingStates::default()),
            registration: ClientRegistration {
                client_name: "Acme Ads".to_string(),
                client_customer_id: "123-456-7890".to_string(),
            },
            exchange_retry: RetryPolicy::none(),
        };

        Self {
            state,
            clients,
            provider,
            errors,
        }
    }

    fn router(&self) -> Router {
        build_router(self.state.clone(), false)
    }

    async fn send(&self, method: Method, uri: &str) -> (StatusCode, Value) {
        let response = self
            .router()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri).await
    }
}

// =============================================================================
// Health and landing page
// =============================================================================

#[tokio::test]
async fn test_health() {
    let gateway = TestGateway::new();

    let (status, body) = gateway.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["scheduler_running"], false);
}

#[tokio::test]
async fn test_index_links_to_authorize() {
    let gateway = TestGateway::new();

    let response = gateway
        .router()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("/oauth/authorize"));
}

// =============================================================================
// Authorization
// =============================================================================

#[tokio::test]
async fn test_authorize_redirects_with_state() {
    let gateway = TestGateway::new();

    let response = gateway
        .router()
        .oneshot(
            Request::builder()
                .uri("/oauth/authorize")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(location.starts_with("https://accounts.google.com/"));
    assert!(location.contains("access_type=offline"));
    assert!(location.contains("prompt=consent"));
    assert_eq!(gateway.state.pending_states.len(), 1);
}

#[tokio::test]
async fn test_authorize_refuses_when_too_many_in_progress() {
    let mut gateway = TestGateway::new();
    gateway.state.pending_states = Arc::new(PendingStates::new(STATE_TTL).with_limit(2));

    for _ in 0..2 {
        let (status, _) = gateway.get("/oauth/authorize").await;
        assert_eq!(status, StatusCode::FOUND);
    }

    let (status, body) = gateway.get("/oauth/authorize").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["error"].as_str().unwrap().contains("Too many"));
    assert_eq!(gateway.state.pending_states.len(), 2);
}

#[tokio::test]
async fn test_callback_registers_client() {
    let gateway = TestGateway::new();
    gateway.state.pending_states.insert("state-1");

    let (status, body) = gateway
        .get("/oauth/callback?code=4/0auth-code&state=state-1")
        .await;

    assert_eq!(status, StatusCode::OK);
    let client_id: Uuid = serde_json::from_value(body["client_id"].clone()).unwrap();
    let stored = gateway.clients.snapshot(&client_id).unwrap();
    assert_eq!(stored.client_name, "Acme Ads");
    assert_eq!(stored.client_customer_id, "123-456-7890");
    assert_eq!(stored.oauth_client_id, fixtures::OAUTH_CLIENT_ID);
    assert!(stored.is_active);
    assert_eq!(gateway.provider.exchange_calls(), 1);
    // Secrets never leave the process
    assert!(body.get("access_token").is_none());
    assert!(body.get("refresh_token").is_none());
}

#[tokio::test]
async fn test_callback_state_is_single_use() {
    let gateway = TestGateway::new();
    gateway.state.pending_states.insert("state-1");

    let (first, _) = gateway.get("/oauth/callback?code=a&state=state-1").await;
    let (second, body) = gateway.get("/oauth/callback?code=a&state=state-1").await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unknown or expired authorization state");
    assert_eq!(gateway.clients.len(), 1);
}

#[tokio::test]
async fn test_callback_requires_code_and_state() {
    let gateway = TestGateway::new();
    gateway.state.pending_states.insert("state-1");

    let (status, body) = gateway.get("/oauth/callback?state=state-1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Authorization code is required");

    let (status, _) = gateway.get("/oauth/callback?code=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = gateway.get("/oauth/callback?code=abc&state=forged").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(gateway.provider.exchange_calls(), 0);
    assert!(gateway.clients.is_empty());
}

#[tokio::test]
async fn test_callback_reports_denied_consent() {
    let gateway = TestGateway::new();

    let (status, body) = gateway.get("/oauth/callback?error=access_denied").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("access_denied"));
}

#[tokio::test]
async fn test_callback_exchange_failure_is_logged() {
    let gateway = TestGateway::new();
    gateway.state.pending_states.insert("state-1");
    gateway
        .provider
        .script_exchange(vec![Err(adstoken_core::ProviderError::new(
            "invalid_grant: Malformed auth code.",
        )
        .with_status(400))]);

    let (status, body) = gateway.get("/oauth/callback?code=bad&state=state-1").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "authorization failed");
    assert!(gateway.clients.is_empty());

    let logged = gateway.errors.of_kind(ErrorKind::OauthConfigError);
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].client_id, fixtures::OAUTH_CLIENT_ID);
}

#[tokio::test]
async fn test_callback_without_refresh_token_stores_nothing() {
    let gateway = TestGateway::new();
    gateway.state.pending_states.insert("state-1");
    gateway.provider.script_exchange(vec![Ok(OAuthCredentials {
        refresh_token: None,
        ..fixtures::consent_credentials()
    })]);

    let (status, _) = gateway.get("/oauth/callback?code=abc&state=state-1").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(gateway.clients.is_empty());
    assert_eq!(gateway.errors.count(ErrorKind::OauthConfigError), 1);
}

// =============================================================================
// Manual refresh
// =============================================================================

#[tokio::test]
async fn test_manual_refresh() {
    let gateway = TestGateway::new();
    let client = fixtures::fresh_client("acme");
    gateway.clients.insert(client.clone());

    let (status, body) = gateway
        .send(Method::POST, &format!("/clients/{}/refresh", client.id))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["client_id"], client.id.to_string());
    assert_eq!(body["token_type"], "Bearer");
    assert!(body.get("access_token").is_none());
    assert_ne!(
        gateway.clients.snapshot(&client.id).unwrap().access_token,
        client.access_token
    );
}

#[tokio::test]
async fn test_manual_refresh_unknown_client_is_404() {
    let gateway = TestGateway::new();

    let (status, body) = gateway
        .send(Method::POST, &format!("/clients/{}/refresh", Uuid::new_v4()))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Client not found");
}

#[tokio::test]
async fn test_manual_refresh_rejected_token_is_502() {
    let gateway = TestGateway::new();
    let client = fixtures::due_client("revoked");
    gateway.clients.insert(client.clone());
    gateway
        .provider
        .fail_refresh(&client.refresh_token, fixtures::invalid_grant());

    let (status, _) = gateway
        .send(Method::POST, &format!("/clients/{}/refresh", client.id))
        .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(!gateway.clients.snapshot(&client.id).unwrap().is_active);
}

#[tokio::test]
async fn test_manual_refresh_rejects_malformed_id() {
    let gateway = TestGateway::new();

    let (status, _) = gateway.send(Method::POST, "/clients/not-a-uuid/refresh").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Error log
// =============================================================================

async fn seed_errors(gateway: &TestGateway) {
    let entries = [
        ("client-a", ErrorKind::TokenRefreshFailed),
        ("client-a", ErrorKind::ClientDeactivated),
        ("client-b", ErrorKind::TokenRefreshFailed),
    ];
    for (client_id, kind) in entries {
        gateway
            .state
            .error_logs
            .log_error(NewErrorLog::new(client_id, kind, "seeded"))
            .await;
    }
}

#[tokio::test]
async fn test_list_errors_with_filters() {
    let gateway = TestGateway::new();
    seed_errors(&gateway).await;

    let (status, body) = gateway.get("/errors").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);

    let (_, body) = gateway
        .get("/errors?error_type=TOKEN_REFRESH_FAILED&client_id=client-b")
        .await;
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["client_id"], "client-b");
    assert_eq!(rows[0]["error_type"], "TOKEN_REFRESH_FAILED");

    let (_, body) = gateway.get("/errors?limit=1&offset=1").await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_list_errors_rejects_unknown_kind() {
    let gateway = TestGateway::new();

    let (status, body) = gateway.get("/errors?error_type=NOT_A_KIND").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unknown error_type");
}

#[tokio::test]
async fn test_error_stats() {
    let gateway = TestGateway::new();
    seed_errors(&gateway).await;

    let (status, body) = gateway.get("/errors/stats").await;

    assert_eq!(status, StatusCode::OK);
    let stats = body["stats"].as_array().unwrap();
    assert_eq!(stats[0]["error_type"], "TOKEN_REFRESH_FAILED");
    assert_eq!(stats[0]["error_count"], 2);
    assert_eq!(stats[0]["affected_clients_count"], 2);
}

#[tokio::test]
async fn test_error_stats_rejects_inverted_range() {
    let gateway = TestGateway::new();

    let (status, _) = gateway
        .get("/errors/stats?start=2025-02-01T00:00:00Z&end=2025-01-01T00:00:00Z")
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_client_error_history() {
    let gateway = TestGateway::new();
    seed_errors(&gateway).await;

    let (status, body) = gateway.get("/clients/client-a/errors").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (_, body) = gateway.get("/clients/client-a/errors?limit=1").await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}
