mod common;

use cardlane::domain::stored::StoredState;
use cardlane::domain::transaction::{OperatorMetadata, TransactionStatus};
use cardlane::error::{ErrorCode, TerminalError};
use common::{connect, fast_config, lane, lane_with};
use rust_decimal_macros::dec;
use std::time::Duration;

fn operator() -> OperatorMetadata {
    OperatorMetadata {
        lane_id: "1".to_string(),
        clerk_id: "123456".to_string(),
        shift_id: "9876".to_string(),
        ticket_number: "5555".to_string(),
    }
}

#[tokio::test]
async fn sale_is_approved_when_host_is_reachable() {
    let lane = lane();
    connect(&lane).await;

    let result = lane
        .terminal
        .process_sale(dec!(1.31), "1234567890A", operator())
        .await
        .unwrap();

    assert!(result.is_approved());
    assert_eq!(result.approved_amount, Some(dec!(1.31)));
    assert!(result.host_transaction_id.is_some());
    assert!(result.approval_code.is_some());
    assert!(result.card.is_some());
}

#[tokio::test]
async fn refund_and_authorization_follow_the_sale_path() {
    let lane = lane();
    connect(&lane).await;

    let refund = lane
        .terminal
        .process_refund(dec!(5.00), "REF-R", operator())
        .await
        .unwrap();
    assert!(refund.is_approved());

    let auth = lane
        .terminal
        .process_authorization(dec!(25.00), "REF-AUTH", operator())
        .await
        .unwrap();
    assert!(auth.is_approved());
    assert_eq!(auth.approved_amount, Some(dec!(25.00)));
}

#[tokio::test]
async fn sale_is_stored_offline_when_host_is_unreachable() {
    let lane = lane();
    connect(&lane).await;
    lane.link.set_host_reachable(false);

    let result = lane
        .terminal
        .process_sale(dec!(1.31), "1234567890A", operator())
        .await
        .unwrap();

    assert_eq!(result.status, TransactionStatus::StoredOffline);
    assert_ne!(result.status, TransactionStatus::Approved);

    let stored = lane
        .terminal
        .list_stored_transactions_by_state(StoredState::Stored)
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].total_amount, dec!(1.31));
    // The ledger id backfills the host transaction id.
    assert_eq!(result.host_transaction_id.as_deref(), Some(stored[0].id.as_str()));
}

#[tokio::test]
async fn oversized_offline_sale_fails_without_creating_a_record() {
    let mut config = fast_config();
    config.store_and_forward.transaction_amount_limit = dec!(100);
    config.store_and_forward.unprocessed_total_amount_limit = dec!(1000);
    let lane = lane_with(config);
    connect(&lane).await;
    lane.link.set_host_reachable(false);

    let result = lane
        .terminal
        .process_sale(dec!(500), "REF-BIG", operator())
        .await
        .unwrap();

    assert_eq!(result.status, TransactionStatus::Error);
    assert_eq!(result.error.unwrap().code, ErrorCode::QueueLimitExceeded);
    assert!(lane.terminal.list_stored_transactions().await.unwrap().is_empty());
}

#[tokio::test]
async fn aggregate_limit_caps_the_outstanding_total() {
    let mut config = fast_config();
    config.store_and_forward.transaction_amount_limit = dec!(100);
    config.store_and_forward.unprocessed_total_amount_limit = dec!(100);
    let lane = lane_with(config);
    connect(&lane).await;
    lane.link.set_host_reachable(false);

    let first = lane
        .terminal
        .process_sale(dec!(60), "REF-1", operator())
        .await
        .unwrap();
    assert_eq!(first.status, TransactionStatus::StoredOffline);

    let second = lane
        .terminal
        .process_sale(dec!(60), "REF-2", operator())
        .await
        .unwrap();
    assert_eq!(second.status, TransactionStatus::Error);
    assert_eq!(second.error.unwrap().code, ErrorCode::QueueLimitExceeded);
    assert_eq!(lane.terminal.list_stored_transactions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn storing_disabled_fails_the_transaction_outright() {
    let mut config = fast_config();
    config.store_and_forward.storing_transactions_allowed = false;
    let lane = lane_with(config);
    connect(&lane).await;
    lane.link.set_host_reachable(false);

    let result = lane
        .terminal
        .process_sale(dec!(1.31), "REF-OFF", operator())
        .await
        .unwrap();
    assert_eq!(result.status, TransactionStatus::Error);
    assert_eq!(result.error.unwrap().code, ErrorCode::HostUnreachable);
    assert!(lane.terminal.list_stored_transactions().await.unwrap().is_empty());
}

#[tokio::test]
async fn second_sale_is_rejected_while_the_first_is_in_flight() {
    let lane = lane();
    connect(&lane).await;
    lane.link
        .set_completion_delay(Duration::from_millis(200))
        .await;

    let terminal = lane.terminal.clone();
    let first = tokio::spawn(async move {
        terminal.process_sale(dec!(1.00), "REF-A", operator()).await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = lane
        .terminal
        .process_sale(dec!(2.00), "REF-B", operator())
        .await
        .unwrap_err();
    assert!(matches!(err, TerminalError::DeviceBusy(_)));

    let first = first.await.unwrap().unwrap();
    assert_eq!(first.status, TransactionStatus::Approved);
    assert!(!lane.link.overlap_observed());
}

#[tokio::test]
async fn dispatches_never_overlap_at_the_device() {
    let lane = lane();
    connect(&lane).await;

    for i in 0..5 {
        let result = lane
            .terminal
            .process_sale(dec!(1.00), format!("REF-{i}"), operator())
            .await
            .unwrap();
        assert_eq!(result.status, TransactionStatus::Approved);
    }
    assert!(!lane.link.overlap_observed());
}

#[tokio::test]
async fn declined_sale_is_a_result_not_an_error() {
    let lane = lane();
    connect(&lane).await;
    lane.link.set_decline_next(true);

    let result = lane
        .terminal
        .process_sale(dec!(9.99), "REF-D", operator())
        .await
        .unwrap();
    assert_eq!(result.status, TransactionStatus::Declined);
    assert!(result.error.is_none());
    assert!(result.approved_amount.is_none());
}

#[tokio::test]
async fn sale_without_a_connection_is_rejected() {
    let lane = lane();
    let err = lane
        .terminal
        .process_sale(dec!(1.31), "REF-NC", operator())
        .await
        .unwrap_err();
    assert!(matches!(err, TerminalError::NotConnected));
}

#[tokio::test]
async fn card_absent_void_skips_the_connected_precondition() {
    let lane = lane();
    // No connect at all: void is routed backend-only.
    let result = lane.terminal.process_void("REF-V", "H-42").await.unwrap();
    assert_eq!(result.status, TransactionStatus::Approved);
}

#[tokio::test]
async fn void_without_original_transaction_id_is_invalid() {
    let lane = lane();
    let err = lane.terminal.process_void("REF-V", "").await.unwrap_err();
    assert!(matches!(err, TerminalError::InvalidRequest(_)));
}

#[tokio::test]
async fn watchdog_times_out_a_silent_device_and_frees_the_lane() {
    let lane = lane();
    connect(&lane).await;
    lane.link.set_silent_transaction(true);

    let result = lane
        .terminal
        .process_sale(dec!(1.00), "REF-S", operator())
        .await
        .unwrap();
    assert_eq!(result.status, TransactionStatus::Error);
    assert_eq!(result.error.unwrap().code, ErrorCode::TransactionTimeout);

    // A stuck flow must not poison the lane for the next transaction.
    lane.link.set_silent_transaction(false);
    let result = lane
        .terminal
        .process_sale(dec!(1.00), "REF-T", operator())
        .await
        .unwrap();
    assert_eq!(result.status, TransactionStatus::Approved);
}

#[tokio::test]
async fn late_completion_after_the_watchdog_is_ignored() {
    let lane = lane();
    connect(&lane).await;
    // Completion lands well after the 500ms watchdog.
    lane.link
        .set_completion_delay(Duration::from_millis(800))
        .await;

    let timed_out = lane
        .terminal
        .process_sale(dec!(1.00), "REF-LATE", operator())
        .await
        .unwrap();
    assert_eq!(timed_out.status, TransactionStatus::Error);
    assert_eq!(timed_out.error.unwrap().code, ErrorCode::TransactionTimeout);

    // The stale completion for REF-LATE lands while the next sale is waiting;
    // it must not resolve it.
    lane.link
        .set_completion_delay(Duration::from_millis(400))
        .await;
    let next = lane
        .terminal
        .process_sale(dec!(2.00), "REF-NEXT", operator())
        .await
        .unwrap();
    assert_eq!(next.status, TransactionStatus::Approved);
    assert_eq!(next.approved_amount, Some(dec!(2.00)));
}

#[tokio::test]
async fn cancel_always_succeeds_for_the_caller() {
    let lane = lane();
    connect(&lane).await;
    lane.terminal.cancel_transaction().await;
    assert!(lane.link.cancels() >= 1);
}

#[tokio::test]
async fn linked_refund_carries_the_original_transaction() {
    let lane = lane();
    connect(&lane).await;

    let sale = lane
        .terminal
        .process_sale(dec!(10.00), "REF-SALE", operator())
        .await
        .unwrap();
    let original = sale.host_transaction_id.unwrap();

    let refund = lane
        .terminal
        .process_linked_refund(dec!(10.00), "REF-LR", original)
        .await
        .unwrap();
    assert_eq!(refund.status, TransactionStatus::Approved);
}
