//! Background scheduler tests on a paused clock.

mod common;

use common::*;
use reconciliation_service::services::{AuditSink, SyncScheduler};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

async fn wait_for_calls(bank: &FakeBank, expected: usize) {
    while bank.account_calls() < expected {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn scheduler_runs_silent_cycles_on_each_tick() {
    let bank = FakeBank::new(vec![account("acc-1", "250000")], vec![rolex_transaction()]);
    let (service, audit) = service_with(bank.clone(), FakeInvoices::new(vec![rolex_invoice()]));
    let token = CancellationToken::new();

    let handle = SyncScheduler::spawn(service.clone(), Duration::from_secs(300), token.clone())
        .expect("scheduler should start");

    wait_for_calls(&bank, 1).await;

    tokio::time::advance(Duration::from_secs(300)).await;
    wait_for_calls(&bank, 2).await;

    token.cancel();
    handle.await.unwrap();

    assert_eq!(bank.account_calls(), 2);

    let records = audit.recent(10).await;
    assert!(!records.is_empty());
    let last = service.sync_status().await.last_result.unwrap();
    assert!(last.silent);
}

#[tokio::test(start_paused = true)]
async fn cancelled_scheduler_stops_before_next_tick() {
    let bank = FakeBank::new(vec![account("acc-1", "250000")], vec![]);
    let (service, _) = service_with(bank.clone(), FakeInvoices::new(vec![]));
    let token = CancellationToken::new();

    let handle = SyncScheduler::spawn(service, Duration::from_secs(60), token.clone())
        .expect("scheduler should start");
    wait_for_calls(&bank, 1).await;

    token.cancel();
    handle.await.unwrap();

    tokio::time::advance(Duration::from_secs(600)).await;
    tokio::task::yield_now().await;
    assert_eq!(bank.account_calls(), 1);
}

#[tokio::test]
async fn zero_interval_disables_scheduler() {
    let bank = FakeBank::new(vec![], vec![]);
    let (service, _) = service_with(bank.clone(), FakeInvoices::new(vec![]));

    let handle = SyncScheduler::spawn(service, Duration::ZERO, CancellationToken::new());

    assert!(handle.is_none());
    assert_eq!(bank.account_calls(), 0);
}
