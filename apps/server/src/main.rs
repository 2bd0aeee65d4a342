//! adstoken - keeps Google Ads API OAuth access tokens fresh
//!
//! Wires the SQLite store, the Google OAuth provider, the token service and
//! the refresh scheduler together, then serves the HTTP front door until
//! Ctrl-C or SIGTERM.

mod config;
mod logging;

use std::sync::Arc;

use adstoken_core::{ErrorLogService, RetryPolicy, TokenService};
use adstoken_gateway::{AppState, GatewayServer, GoogleOAuthProvider, PendingStates, RefreshScheduler};
use adstoken_storage::{Database, SqliteClientRepository, SqliteErrorLogRepository, TokenCipher};
use anyhow::Context;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().context("Invalid configuration")?;
    let _log_guard = logging::init_tracing(&config.log_dir)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        database = ?config.database_path,
        policy = %config.deactivation_policy,
        "[App] Starting adstoken"
    );

    let db = Arc::new(Mutex::new(Database::open(&config.database_path)?));
    let cipher = Arc::new(
        TokenCipher::from_hex(&config.encryption_key).context("Invalid TOKEN_ENCRYPTION_KEY")?,
    );

    let clients = Arc::new(SqliteClientRepository::new(db.clone(), cipher));
    let error_logs = Arc::new(ErrorLogService::new(Arc::new(SqliteErrorLogRepository::new(db))));
    let google = Arc::new(GoogleOAuthProvider::new(&config.oauth)?);

    let token_service = Arc::new(
        TokenService::new(clients, google.clone(), error_logs.clone())
            .with_deactivation_policy(config.deactivation_policy),
    );
    let scheduler = Arc::new(RefreshScheduler::new(
        token_service.clone(),
        error_logs.clone(),
        config.refresh.clone(),
    ));
    scheduler.start();

    let state = AppState {
        token_service,
        scheduler: scheduler.clone(),
        error_logs,
        consent: google,
        pending_states: Arc::new(PendingStates::default()),
        registration: config.registration.clone(),
        exchange_retry: RetryPolicy::default(),
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let served = GatewayServer::new(config.gateway.clone(), state)
        .run(shutdown)
        .await;

    scheduler.shutdown().await;
    info!("[App] Stopped");

    served
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!("[App] Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("[App] Shutdown requested");
    shutdown.cancel();
}
