mod common;

use cardlane::application::queue::{ForwardOutcome, OfflineQueue};
use cardlane::config::StoreAndForwardConfig;
use cardlane::domain::ports::RecordStore;
use cardlane::domain::stored::{StoredState, StoredTransactionRecord};
use cardlane::domain::transaction::{OperatorMetadata, TransactionKind, TransactionStatus};
use cardlane::error::TerminalError;
use cardlane::infrastructure::in_memory::InMemoryRecordStore;
use cardlane::infrastructure::simulated::SimulatedHost;
use chrono::{Duration as ChronoDuration, Utc};
use common::{Lane, connect, lane};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn operator() -> OperatorMetadata {
    OperatorMetadata {
        lane_id: "1".to_string(),
        clerk_id: "123456".to_string(),
        shift_id: "9876".to_string(),
        ticket_number: "5555".to_string(),
    }
}

/// Runs an offline sale and returns the id of the record it produced.
async fn store_offline(lane: &Lane, amount: Decimal, reference: &str) -> String {
    lane.link.set_host_reachable(false);
    let result = lane
        .terminal
        .process_sale(amount, reference, operator())
        .await
        .unwrap();
    assert_eq!(result.status, TransactionStatus::StoredOffline);
    lane.link.set_host_reachable(true);
    result.host_transaction_id.unwrap()
}

fn record(id: &str, state: StoredState, amount: Decimal, age_days: i64) -> StoredTransactionRecord {
    StoredTransactionRecord {
        id: id.to_string(),
        state,
        total_amount: amount,
        created_on: Utc::now() - ChronoDuration::days(age_days),
        card: None,
        transaction_type: TransactionKind::Sale,
    }
}

#[tokio::test]
async fn stored_record_is_retrievable_by_id() {
    let lane = lane();
    connect(&lane).await;
    let id = store_offline(&lane, dec!(1.31), "REF-1").await;

    let stored = lane.terminal.get_stored_transaction(&id).await.unwrap();
    assert_eq!(stored.state, StoredState::Stored);
    assert_eq!(stored.total_amount, dec!(1.31));
    assert_eq!(stored.transaction_type, TransactionKind::Sale);
    assert!(stored.card.is_some());
}

#[tokio::test]
async fn forward_settles_a_stored_record() {
    let lane = lane();
    connect(&lane).await;
    let id = store_offline(&lane, dec!(1.31), "REF-1").await;

    let result = lane.terminal.forward_transaction(&id).await.unwrap();
    assert!(matches!(result.outcome, ForwardOutcome::Settled { .. }));
    assert_eq!(lane.host.submissions(), 1);

    let stored = lane.terminal.get_stored_transaction(&id).await.unwrap();
    assert_eq!(stored.state, StoredState::Processed);
}

#[tokio::test]
async fn forwarding_a_processed_record_never_resubmits() {
    let lane = lane();
    connect(&lane).await;
    let id = store_offline(&lane, dec!(1.31), "REF-1").await;

    lane.terminal.forward_transaction(&id).await.unwrap();
    let second = lane.terminal.forward_transaction(&id).await.unwrap();
    assert_eq!(second.outcome, ForwardOutcome::AlreadyProcessed);
    assert_eq!(lane.host.submissions(), 1);
}

#[tokio::test]
async fn failed_forward_retains_the_record_for_retry() {
    let lane = lane();
    connect(&lane).await;
    let id = store_offline(&lane, dec!(1.31), "REF-1").await;

    lane.host.set_reachable(false);
    let result = lane.terminal.forward_transaction(&id).await.unwrap();
    assert!(matches!(result.outcome, ForwardOutcome::Retained { .. }));
    assert_eq!(
        lane.terminal.get_stored_transaction(&id).await.unwrap().state,
        StoredState::Stored
    );

    lane.host.set_reachable(true);
    let retry = lane.terminal.forward_transaction(&id).await.unwrap();
    assert!(matches!(retry.outcome, ForwardOutcome::Settled { .. }));
}

#[tokio::test]
async fn forwarding_an_unknown_id_is_not_found() {
    let lane = lane();
    let err = lane.terminal.forward_transaction("tp-missing").await.unwrap_err();
    assert!(matches!(err, TerminalError::NotFound(_)));
}

#[tokio::test]
async fn concurrent_forwards_of_one_record_submit_once() {
    let lane = lane();
    connect(&lane).await;
    let id = store_offline(&lane, dec!(1.31), "REF-1").await;

    let (a, b) = tokio::join!(
        lane.terminal.forward_transaction(&id),
        lane.terminal.forward_transaction(&id),
    );
    let outcomes = [a.unwrap().outcome, b.unwrap().outcome];
    assert!(outcomes.iter().any(|o| matches!(o, ForwardOutcome::Settled { .. })));
    assert_eq!(lane.host.submissions(), 1);
}

#[tokio::test]
async fn forward_all_reports_one_outcome_per_stored_record() {
    let lane = lane();
    connect(&lane).await;
    let first = store_offline(&lane, dec!(10.00), "REF-1").await;
    let second = store_offline(&lane, dec!(20.00), "REF-2").await;

    let results = lane.terminal.forward_all_stored().await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| matches!(r.outcome, ForwardOutcome::Settled { .. })));
    assert_eq!(lane.host.submissions(), 2);

    for id in [&first, &second] {
        assert_eq!(
            lane.terminal.get_stored_transaction(id).await.unwrap().state,
            StoredState::Processed
        );
    }
}

#[tokio::test]
async fn delete_marks_the_record_and_hides_it_from_listings() {
    let lane = lane();
    connect(&lane).await;
    let id = store_offline(&lane, dec!(1.31), "REF-1").await;

    assert!(lane.terminal.delete_stored_transaction(&id).await.unwrap());
    // Idempotent: the second call and unknown ids report false.
    assert!(!lane.terminal.delete_stored_transaction(&id).await.unwrap());
    assert!(!lane.terminal.delete_stored_transaction("tp-missing").await.unwrap());

    assert!(lane.terminal.list_stored_transactions().await.unwrap().is_empty());
    let err = lane.terminal.forward_transaction(&id).await.unwrap_err();
    assert!(matches!(err, TerminalError::NotFound(_)));

    // Reclamation physically purges what delete only marked.
    assert_eq!(lane.terminal.reclaim_stored_transactions().await.unwrap(), 1);
    assert!(lane.store.get(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn listing_is_ordered_by_creation_time() {
    let lane = lane();
    connect(&lane).await;
    let first = store_offline(&lane, dec!(10.00), "REF-1").await;
    let second = store_offline(&lane, dec!(20.00), "REF-2").await;

    let listed = lane.terminal.list_stored_transactions().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, first);
    assert_eq!(listed[1].id, second);
}

#[tokio::test]
async fn reconnecting_auto_forwards_when_enabled() {
    let mut config = common::fast_config();
    config.store_and_forward.should_auto_forward = true;
    let lane = common::lane_with(config);
    connect(&lane).await;
    let id = store_offline(&lane, dec!(1.31), "REF-1").await;

    lane.terminal.disconnect().await.unwrap();
    connect(&lane).await;

    // Settlement runs in the background; give it a moment.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(
        lane.terminal.get_stored_transaction(&id).await.unwrap().state,
        StoredState::Processed
    );
    assert_eq!(lane.host.submissions(), 1);
}

#[tokio::test]
async fn forward_all_picks_up_pending_secondary_auth_records() {
    let store = InMemoryRecordStore::new();
    let host = Arc::new(SimulatedHost::new());
    let queue = OfflineQueue::new(
        Box::new(store.clone()),
        Box::new(host.clone()),
        StoreAndForwardConfig::default(),
    );
    store.put(record("tp-pending", StoredState::PendingSecondaryAuth, dec!(5), 0)).await.unwrap();

    let results = queue.forward_all().await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0].outcome, ForwardOutcome::Settled { .. }));
    assert_eq!(host.submissions(), 1);
    assert_eq!(
        store.get("tp-pending").await.unwrap().unwrap().state,
        StoredState::Processed
    );
}

#[tokio::test]
async fn delete_during_a_slow_forward_is_never_overwritten() {
    let store = InMemoryRecordStore::new();
    let host = Arc::new(SimulatedHost::new());
    host.set_forward_delay(std::time::Duration::from_millis(100)).await;
    let queue = Arc::new(OfflineQueue::new(
        Box::new(store.clone()),
        Box::new(host.clone()),
        StoreAndForwardConfig::default(),
    ));
    store.put(record("tp-race", StoredState::Stored, dec!(5), 0)).await.unwrap();

    let q = queue.clone();
    let forward = tokio::spawn(async move { q.forward("tp-race").await });
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;

    // Waits out the in-flight forward, then still wins.
    assert!(queue.delete("tp-race").await.unwrap());
    let result = forward.await.unwrap().unwrap();
    assert!(matches!(result.outcome, ForwardOutcome::Settled { .. }));
    assert_eq!(
        store.get("tp-race").await.unwrap().unwrap().state,
        StoredState::Deleted
    );
}

#[tokio::test]
async fn stale_processing_record_is_forwardable_again() {
    let store = InMemoryRecordStore::new();
    let host = Arc::new(SimulatedHost::new());
    let queue = OfflineQueue::new(
        Box::new(store.clone()),
        Box::new(host.clone()),
        StoreAndForwardConfig::default(),
    );
    // As left behind by a forward that died before persisting its outcome.
    store.put(record("tp-stale", StoredState::Processing, dec!(5), 0)).await.unwrap();

    let result = queue.forward("tp-stale").await.unwrap();
    assert!(matches!(result.outcome, ForwardOutcome::Settled { .. }));
    assert_eq!(host.submissions(), 1);
    assert_eq!(
        store.get("tp-stale").await.unwrap().unwrap().state,
        StoredState::Processed
    );
}

#[tokio::test]
async fn reclaim_purges_only_expired_processed_and_deleted_records() {
    let store = InMemoryRecordStore::new();
    let queue = OfflineQueue::new(
        Box::new(store.clone()),
        Box::new(Arc::new(SimulatedHost::new())),
        StoreAndForwardConfig::default(),
    );

    store.put(record("tp-old-processed", StoredState::Processed, dec!(10), 3)).await.unwrap();
    store.put(record("tp-new-processed", StoredState::Processed, dec!(10), 0)).await.unwrap();
    store.put(record("tp-deleted", StoredState::Deleted, dec!(10), 0)).await.unwrap();
    store.put(record("tp-old-stored", StoredState::Stored, dec!(10), 30)).await.unwrap();
    store.put(record("tp-processing", StoredState::Processing, dec!(10), 30)).await.unwrap();

    let purged = queue.reclaim().await.unwrap();
    assert_eq!(purged, 2);

    assert!(store.get("tp-old-processed").await.unwrap().is_none());
    assert!(store.get("tp-deleted").await.unwrap().is_none());
    assert!(store.get("tp-new-processed").await.unwrap().is_some());
    assert!(store.get("tp-old-stored").await.unwrap().is_some());
    assert!(store.get("tp-processing").await.unwrap().is_some());
}
