//! Background refresh loop
//!
//! One task per running scheduler. Each cycle lists the active clients whose
//! access token expires within the threshold and refreshes them through a
//! bounded pool. A failing client never stops the others, and a failing
//! cycle never stops the loop.

use std::sync::Arc;
use std::time::Duration;

use adstoken_core::{
    ClientRecord, ErrorKind, ErrorLogSink, NewErrorLog, TokenError, TokenResult, TokenService,
};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Largest accepted expiry window. Access tokens live for an hour, so a
/// window this wide already refreshes every client on every cycle.
pub const MAX_REFRESH_THRESHOLD: Duration = Duration::from_secs(24 * 60 * 60);

/// Scheduler settings
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Pause between the end of one cycle and the start of the next
    pub interval: Duration,
    /// Refresh tokens expiring within this window
    pub threshold: Duration,
    /// Refreshes in flight at once within a cycle
    pub max_concurrent_refreshes: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            threshold: Duration::from_secs(5 * 60),
            max_concurrent_refreshes: 4,
        }
    }
}

/// Outcome of one refresh cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Clients found expiring
    pub discovered: usize,
    pub refreshed: usize,
    pub failed: usize,
    /// The expiring-client query itself failed
    pub discovery_failed: bool,
}

/// The spawned loop task. A stopped loop stays here, cancelled, until the
/// next start or shutdown takes it over.
struct RunningLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RunningLoop {
    fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }
}

/// Keeps every active client's access token fresh
pub struct RefreshScheduler {
    token_service: Arc<TokenService>,
    error_log: Arc<dyn ErrorLogSink>,
    config: RefreshConfig,
    running: Mutex<Option<RunningLoop>>,
}

impl RefreshScheduler {
    pub fn new(
        token_service: Arc<TokenService>,
        error_log: Arc<dyn ErrorLogSink>,
        config: RefreshConfig,
    ) -> Self {
        Self {
            token_service,
            error_log,
            config,
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    /// Start the loop. Returns false if it is already running.
    ///
    /// If a stopped loop is still finishing its last cycle, the new loop
    /// waits for it before scheduling anything.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(RunningLoop::is_active) {
            info!("[RefreshScheduler] Already running");
            return false;
        }

        let previous = running
            .take()
            .filter(|r| !r.handle.is_finished())
            .map(|r| r.handle);

        let cancel = CancellationToken::new();
        let scheduler = Arc::clone(self);
        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(async move { scheduler.run_loop(loop_cancel, previous).await });

        *running = Some(RunningLoop { cancel, handle });
        info!(
            interval_secs = self.config.interval.as_secs(),
            threshold_secs = self.config.threshold.as_secs(),
            concurrency = self.config.max_concurrent_refreshes,
            "[RefreshScheduler] Started"
        );
        true
    }

    /// Stop scheduling cycles. A cycle already in flight runs to completion.
    pub fn stop(&self) {
        let running = self.running.lock();
        if let Some(running) = running.as_ref().filter(|r| r.is_active()) {
            running.cancel.cancel();
            info!("[RefreshScheduler] Stopped");
        }
    }

    /// Stop and wait for the loop task to exit
    pub async fn shutdown(&self) {
        let running = self.running.lock().take();
        if let Some(running) = running {
            running.cancel.cancel();
            if let Err(e) = running.handle.await {
                warn!("[RefreshScheduler] Loop task ended abnormally: {}", e);
            }
            info!("[RefreshScheduler] Shut down");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().as_ref().is_some_and(RunningLoop::is_active)
    }

    async fn run_loop(&self, cancel: CancellationToken, previous: Option<JoinHandle<()>>) {
        if let Some(previous) = previous {
            debug!("[RefreshScheduler] Waiting for the stopped loop to finish its cycle");
            if let Err(e) = previous.await {
                warn!("[RefreshScheduler] Previous loop task ended abnormally: {}", e);
            }
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }

            let report = self.run_cycle().await;
            if report.discovered > 0 {
                info!(
                    discovered = report.discovered,
                    refreshed = report.refreshed,
                    failed = report.failed,
                    "[RefreshScheduler] Cycle complete"
                );
            }

            if cancel.is_cancelled() {
                break;
            }
        }
        debug!("[RefreshScheduler] Loop exited");
    }

    /// Run one discovery and refresh pass
    pub async fn run_cycle(&self) -> CycleReport {
        let threshold = chrono::Duration::from_std(self.config.threshold.min(MAX_REFRESH_THRESHOLD))
            .unwrap_or_else(|_| chrono::Duration::minutes(5));

        // The token service has already logged the failure for this cycle
        let clients = match self.token_service.get_expiring_tokens(threshold).await {
            Ok(clients) => clients,
            Err(e) => {
                warn!("[RefreshScheduler] Skipping cycle, could not list expiring clients: {}", e);
                return CycleReport {
                    discovery_failed: true,
                    ..Default::default()
                };
            }
        };

        let discovered = clients.len();
        if discovered == 0 {
            debug!("[RefreshScheduler] No tokens due for refresh");
            return CycleReport::default();
        }
        debug!(count = discovered, "[RefreshScheduler] Found clients with expiring tokens");

        let outcomes: Vec<bool> = stream::iter(clients)
            .map(|client| async move {
                self.refresh_client(&client, "refresh_cycle").await.is_ok()
            })
            .buffer_unordered(self.config.max_concurrent_refreshes.max(1))
            .collect()
            .await;

        let refreshed = outcomes.iter().filter(|ok| **ok).count();
        CycleReport {
            discovered,
            refreshed,
            failed: discovered - refreshed,
            discovery_failed: false,
        }
    }

    /// Refresh one client on demand, outside the schedule
    pub async fn refresh_specific_client(&self, client_id: &Uuid) -> Result<TokenResult, TokenError> {
        let Some(client) = self.token_service.get_client_by_id(client_id).await? else {
            let err = TokenError::ClientNotFound(*client_id);
            self.error_log
                .log_error(
                    NewErrorLog::new(client_id.to_string(), err.kind(), err.to_string())
                        .with_details(json!({
                            "operation": "refresh_specific_client",
                            "timestamp": Utc::now(),
                        })),
                )
                .await;
            return Err(err);
        };

        self.refresh_client(&client, "refresh_specific_client").await
    }

    async fn refresh_client(
        &self,
        client: &ClientRecord,
        operation: &'static str,
    ) -> Result<TokenResult, TokenError> {
        debug!(client_id = %client.id, operation, "[RefreshScheduler] Refreshing token");

        match self.token_service.refresh_access_token(&client.id).await {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!(
                    client_id = %client.id,
                    error_type = %e.kind(),
                    operation,
                    "[RefreshScheduler] Token refresh failed: {}",
                    e
                );
                let provider = e.provider();
                self.error_log
                    .log_error(
                        NewErrorLog::new(
                            client.id.to_string(),
                            ErrorKind::TokenRefreshFailed,
                            format!("Token refresh failed for client {}", client.id),
                        )
                        .with_stack(e.stack())
                        .with_details(json!({
                            "operation": operation,
                            "clientName": client.client_name,
                            "clientCustomerId": client.client_customer_id,
                            "lastRefresh": client.updated_at,
                            "statusCode": provider.and_then(|p| p.status),
                        })),
                    )
                    .await;
                Err(e)
            }
        }
    }
}
