//! HTTP handlers for the gateway server

use adstoken_core::{
    ErrorKind, ErrorLogFilter, ErrorLogSink, NewErrorLog, TokenError, DEFAULT_HISTORY_LIMIT,
};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::AppState;

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub scheduler_running: bool,
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    debug!("[Gateway] Health check");
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        scheduler_running: state.scheduler.is_running(),
    })
}

/// Landing page with a link that starts authorization
pub async fn index() -> Html<&'static str> {
    Html(
        "<h1>Google Ads OAuth Token Management</h1>\n\
         <p>Click below to start the OAuth process:</p>\n\
         <a href=\"/oauth/authorize\">Authorize with Google Ads</a>\n",
    )
}

/// Redirect to the provider's consent page
pub async fn oauth_authorize(State(state): State<AppState>) -> Response {
    let request = state.consent.authorize_url();
    if !state.pending_states.insert(request.state) {
        return error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many authorizations in progress, try again later",
        );
    }

    info!("[OAuth] Redirecting to consent page");
    (StatusCode::FOUND, [(header::LOCATION, request.url)]).into_response()
}

/// Query parameters of the provider's redirect back to us
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Registered client, as returned by the callback
#[derive(Debug, Serialize, Deserialize)]
pub struct CallbackResponse {
    pub client_id: Uuid,
    pub access_token_expires_at: DateTime<Utc>,
}

/// Complete an authorization: exchange the code and register the client
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    if let Some(denied) = params.error {
        warn!(error = %denied, "[OAuth] Authorization was not granted");
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("Authorization was not granted: {}", denied),
        );
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "Authorization code is required");
    };

    let state_ok = params
        .state
        .as_deref()
        .is_some_and(|s| state.pending_states.take(s));
    if !state_ok {
        warn!("[OAuth] Callback with unknown or expired state");
        return error_response(
            StatusCode::BAD_REQUEST,
            "Unknown or expired authorization state",
        );
    }

    let oauth_client_id = state.consent.client_id().to_string();
    let provider = state.token_service.provider();
    let exchange = {
        let provider = &provider;
        let code = code.as_str();
        state
            .exchange_retry
            .run("exchange_code", move || provider.exchange_code(code))
            .await
    };

    let tokens = match exchange {
        Ok(tokens) => tokens,
        Err(e) => {
            error!(status = ?e.status, "[OAuth] Code exchange failed: {}", e);
            state
                .error_logs
                .log_error(
                    NewErrorLog::new(&oauth_client_id, ErrorKind::OauthConfigError, e.message.clone())
                        .with_details(json!({
                            "operation": "exchange_code",
                            "statusCode": e.status,
                            "response": e.body,
                        })),
                )
                .await;
            return error_response(StatusCode::BAD_GATEWAY, "authorization failed");
        }
    };

    let registration = &state.registration;
    match state
        .token_service
        .store_new_client(
            &registration.client_name,
            &registration.client_customer_id,
            &oauth_client_id,
            &tokens,
        )
        .await
    {
        Ok(client) => {
            info!(client_id = %client.id, "[OAuth] Authorization complete");
            Json(CallbackResponse {
                client_id: client.id,
                access_token_expires_at: client.access_token_expires_at,
            })
            .into_response()
        }
        Err(e) => {
            error!(error_type = %e.kind(), "[OAuth] Failed to register client: {}", e);
            error_response(StatusCode::BAD_GATEWAY, "authorization failed")
        }
    }
}

/// Result of a manual refresh. The access token itself is not returned.
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub client_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub token_type: String,
    pub scope: Option<String>,
}

/// Refresh one client now
pub async fn refresh_client(
    State(state): State<AppState>,
    Path(client_id): Path<Uuid>,
) -> Response {
    match state.scheduler.refresh_specific_client(&client_id).await {
        Ok(result) => Json(RefreshResponse {
            client_id,
            expires_at: result.expires_at,
            token_type: result.token_type,
            scope: result.scope,
        })
        .into_response(),
        Err(TokenError::ClientNotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, "Client not found")
        }
        Err(e @ TokenError::Provider(_)) => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Filters accepted by `GET /errors`
#[derive(Debug, Default, Deserialize)]
pub struct ErrorLogQuery {
    pub client_id: Option<String>,
    pub error_type: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Query the error log
pub async fn list_errors(
    State(state): State<AppState>,
    Query(query): Query<ErrorLogQuery>,
) -> Response {
    let error_type = match query.error_type.as_deref().map(ErrorKind::parse) {
        None => None,
        Some(Some(kind)) => Some(kind),
        Some(None) => {
            return error_response(StatusCode::BAD_REQUEST, "Unknown error_type");
        }
    };

    let filter = ErrorLogFilter {
        client_id: query.client_id,
        error_type,
        start_date: query.start,
        end_date: query.end,
        limit: query.limit,
        offset: query.offset,
    };

    match state.error_logs.get_error_logs(&filter).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => {
            error!("[Gateway] Failed to query error log: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to query error log")
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Error counts per kind; the last 24 hours unless a range is given
pub async fn error_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Response {
    let end = query.end.unwrap_or_else(Utc::now);
    let start = query.start.unwrap_or_else(|| end - Duration::hours(24));
    if start > end {
        return error_response(StatusCode::BAD_REQUEST, "start must not be after end");
    }

    match state.error_logs.get_error_stats(start, end).await {
        Ok(stats) => Json(json!({ "start": start, "end": end, "stats": stats })).into_response(),
        Err(e) => {
            error!("[Gateway] Failed to compute error stats: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to compute error stats")
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

/// Most recent error log entries for one client
pub async fn client_errors(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    match state
        .error_logs
        .get_client_error_history(&client_id, Some(limit))
        .await
    {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => {
            error!(client_id = %client_id, "[Gateway] Failed to load error history: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load error history")
        }
    }
}
