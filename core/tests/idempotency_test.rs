//! Idempotency tests.
//!
//! Retries under the same key must replay the original outcome and never
//! debit inventory or charge twice.
//!
//! Run with: `cargo test --test idempotency_test`

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use chrono::Duration;
use ticketing_core::environment::Clock;
use ticketing_core::error::PurchaseError;
use ticketing_core::types::PurchaserId;
use ticketing_testing::{FixedClock, TestHarness};

const KEY: &str = "checkout-7f3a9c2e41d8b6a0";

#[tokio::test]
async fn test_same_key_twice_returns_identical_receipt_and_debits_once() {
    let harness = TestHarness::new();
    let event = harness.publish_event(10).await;

    let first = harness
        .engine
        .purchase(harness.purchaser, event.id, 2, KEY)
        .await
        .unwrap();
    let second = harness
        .engine
        .purchase(harness.purchaser, event.id, 2, KEY)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(harness.inventory(&event).await.available, 8);
    assert_eq!(harness.store.order_count().await, 1);
    assert_eq!(harness.store.ticket_count().await, 2);
    assert_eq!(harness.payments.authorize_calls(), 1);
}

#[tokio::test]
async fn test_same_key_for_different_purchase_is_rejected() {
    let harness = TestHarness::new();
    let event = harness.publish_event(10).await;

    harness
        .engine
        .purchase(harness.purchaser, event.id, 2, KEY)
        .await
        .unwrap();
    let result = harness
        .engine
        .purchase(harness.purchaser, event.id, 3, KEY)
        .await;

    assert_eq!(result, Err(PurchaseError::IdempotencyKeyReused));
    assert!(!PurchaseError::IdempotencyKeyReused.is_retriable());
    assert_eq!(harness.inventory(&event).await.available, 8);
}

#[tokio::test]
async fn test_keys_are_scoped_per_purchaser() {
    let harness = TestHarness::new();
    let event = harness.publish_event(10).await;
    let other = PurchaserId::new();

    let mine = harness
        .engine
        .purchase(harness.purchaser, event.id, 1, KEY)
        .await
        .unwrap();
    let theirs = harness.engine.purchase(other, event.id, 1, KEY).await.unwrap();

    assert_ne!(mine.order_id, theirs.order_id);
    assert_eq!(harness.inventory(&event).await.available, 8);
}

#[tokio::test]
async fn test_expired_key_starts_a_new_purchase() {
    let harness = TestHarness::new();
    let event = harness.publish_event(10).await;

    let first = harness
        .engine
        .purchase(harness.purchaser, event.id, 1, KEY)
        .await
        .unwrap();

    let next_day = FixedClock::new(harness.clock.now() + Duration::hours(25));
    let second = harness
        .engine_at(next_day)
        .purchase(harness.purchaser, event.id, 1, KEY)
        .await
        .unwrap();

    assert_ne!(first.order_id, second.order_id);
    assert_eq!(harness.inventory(&event).await.available, 8);
    assert_eq!(harness.store.idempotency_count().await, 1);
}

#[tokio::test]
async fn test_key_reused_after_purge_places_a_new_order() {
    let harness = TestHarness::new();
    let event = harness.publish_event(10).await;

    let first = harness
        .engine
        .purchase(harness.purchaser, event.id, 1, KEY)
        .await
        .unwrap();

    let next_day = harness.engine_at(FixedClock::new(harness.clock.now() + Duration::hours(25)));
    assert_eq!(next_day.purge_expired_idempotency().await.unwrap(), 1);
    let second = next_day
        .purchase(harness.purchaser, event.id, 1, KEY)
        .await
        .unwrap();

    assert_ne!(first.order_id, second.order_id);
    assert_eq!(harness.store.order_count().await, 2);
    assert_eq!(harness.payments.approved_orders().len(), 2);
    assert_eq!(harness.inventory(&event).await.available, 8);
}

#[tokio::test]
async fn test_key_is_honored_within_retention() {
    let harness = TestHarness::new();
    let event = harness.publish_event(10).await;

    let first = harness
        .engine
        .purchase(harness.purchaser, event.id, 1, KEY)
        .await
        .unwrap();

    let later = FixedClock::new(harness.clock.now() + Duration::hours(23));
    let replay = harness
        .engine_at(later)
        .purchase(harness.purchaser, event.id, 1, KEY)
        .await
        .unwrap();

    assert_eq!(first, replay);
    assert_eq!(harness.inventory(&event).await.available, 9);
}

#[tokio::test]
async fn test_purge_removes_only_expired_records() {
    let harness = TestHarness::new();
    let event = harness.publish_event(10).await;

    harness
        .engine
        .purchase(harness.purchaser, event.id, 1, "checkout-early-000000001")
        .await
        .unwrap();
    let later = FixedClock::new(harness.clock.now() + Duration::hours(12));
    let later_engine = harness.engine_at(later);
    later_engine
        .purchase(harness.purchaser, event.id, 1, "checkout-late-0000000001")
        .await
        .unwrap();

    let sweep_at = harness.clock.now() + Duration::hours(30);
    let purged = harness
        .engine
        .idempotency()
        .purge_expired(sweep_at)
        .await
        .unwrap();

    assert_eq!(purged, 1);
    assert_eq!(harness.store.idempotency_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_retries_of_one_key_charge_once() {
    let harness = TestHarness::new();
    let event = harness.publish_event(10).await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let engine = harness.engine.clone();
        let purchaser = harness.purchaser;
        let event_id = event.id;
        tasks.push(tokio::spawn(async move {
            engine.purchase(purchaser, event_id, 2, KEY).await
        }));
    }

    let mut receipts = Vec::new();
    for task in tasks {
        receipts.push(task.await.unwrap().unwrap());
    }

    assert!(receipts.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(harness.inventory(&event).await.available, 8);
    assert_eq!(harness.store.order_count().await, 1);
    assert_eq!(harness.payments.authorize_calls(), 1);
}
