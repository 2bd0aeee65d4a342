//! Loop start, stop and re-arming under paused time

use std::sync::atomic::Ordering;
use std::time::Duration;

use adstoken_core::ErrorKind;
use pretty_assertions::assert_eq;
use tests::harness::TokenHarness;
use tests::fixtures;

use super::{scheduler, INTERVAL};

#[tokio::test(start_paused = true)]
async fn test_first_cycle_runs_after_one_interval() {
    let h = TokenHarness::with_clients(vec![fixtures::due_client("c")]);
    let scheduler = scheduler(&h, 4);

    assert!(scheduler.start());
    tokio::time::sleep(INTERVAL - Duration::from_secs(1)).await;
    assert!(h.provider.refresh_calls().is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.provider.refresh_calls().len(), 1);

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_double_start_runs_one_loop() {
    let h = TokenHarness::with_clients(vec![fixtures::due_client("c")]);
    let scheduler = scheduler(&h, 4);

    assert!(scheduler.start());
    assert!(!scheduler.start());
    assert!(scheduler.is_running());

    tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;

    // A second loop would have refreshed the same client twice
    assert_eq!(h.provider.refresh_calls().len(), 1);

    scheduler.shutdown().await;
    assert!(!scheduler.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_discovery_failure_rearms_the_loop() {
    let h = TokenHarness::with_clients(vec![fixtures::due_client("c")]);
    h.clients.fail_list_expiring.store(true, Ordering::SeqCst);
    let scheduler = scheduler(&h, 4);
    scheduler.start();

    tokio::time::sleep(INTERVAL * 2 + Duration::from_secs(30)).await;

    assert!(scheduler.is_running());
    assert_eq!(h.errors.count(ErrorKind::DatabaseError), 2);
    assert!(h.provider.refresh_calls().is_empty());

    // Storage recovers; the next cycle refreshes normally
    h.clients.fail_list_expiring.store(false, Ordering::SeqCst);
    tokio::time::sleep(INTERVAL).await;

    assert_eq!(h.provider.refresh_calls().len(), 1);
    assert_eq!(h.errors.count(ErrorKind::DatabaseError), 2);

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_lets_inflight_cycle_finish() {
    let client = fixtures::due_client("slow");
    let h = TokenHarness::with_clients(vec![client.clone()]);
    h.provider.set_latency(Duration::from_secs(5));
    let scheduler = scheduler(&h, 4);
    scheduler.start();

    // Mid-refresh
    tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
    assert_eq!(h.provider.refresh_calls().len(), 1);
    assert_eq!(h.clients.update_count(), 0);

    scheduler.stop();
    assert!(!scheduler.is_running());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.clients.update_count(), 1);

    // No further cycles after stop
    tokio::time::sleep(INTERVAL * 3).await;
    assert_eq!(h.provider.refresh_calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_restart_waits_for_stopped_cycle() {
    let h = TokenHarness::with_clients(vec![
        fixtures::due_client("a"),
        fixtures::due_client("b"),
    ]);
    // Each refresh outlasts several intervals
    h.provider.set_latency(INTERVAL * 3);
    let scheduler = scheduler(&h, 2);
    assert!(scheduler.start());

    tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
    assert_eq!(h.provider.refresh_calls().len(), 2);

    scheduler.stop();
    assert!(scheduler.start());
    assert!(scheduler.is_running());

    // A new loop running alongside would rediscover both clients while the
    // first cycle is still waiting on the provider
    tokio::time::sleep(INTERVAL * 5).await;

    assert_eq!(h.provider.max_in_flight(), 2);
    assert_eq!(h.provider.refresh_calls().len(), 2);
    assert_eq!(h.clients.update_count(), 2);
    assert!(scheduler.is_running());

    scheduler.shutdown().await;
    assert!(!scheduler.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_shutdown() {
    let h = TokenHarness::new();
    let scheduler = scheduler(&h, 4);

    assert!(scheduler.start());
    scheduler.shutdown().await;
    assert!(!scheduler.is_running());

    assert!(scheduler.start());
    assert!(scheduler.is_running());
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_stop_without_start_is_noop() {
    let h = TokenHarness::new();
    let scheduler = scheduler(&h, 4);

    scheduler.stop();
    scheduler.shutdown().await;
    assert!(!scheduler.is_running());
}
