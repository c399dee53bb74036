//! Event catalog and query tests.
//!
//! Run with: `cargo test --test catalog_test`

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use chrono::Duration;
use ticketing_core::environment::Clock;
use ticketing_core::error::PurchaseError;
use ticketing_core::types::{
    DEFAULT_PAGE_SIZE, EventChanges, EventId, EventStatus, MAX_PAGE_SIZE, Money, NewEvent,
    OrderId, PurchaserId,
};
use ticketing_testing::{FixedClock, TestHarness};

fn new_event(harness: &TestHarness, capacity: u32) -> NewEvent {
    NewEvent {
        title: "Bali Arts Festival".to_string(),
        venue: "Taman Budaya".to_string(),
        starts_at: harness.clock.now() + Duration::days(60),
        unit_price: Money::from_cents(75_000),
        capacity,
    }
}

#[tokio::test]
async fn test_publish_creates_full_inventory() {
    let harness = TestHarness::new();

    let event = harness
        .engine
        .publish_event(new_event(&harness, 500))
        .await
        .unwrap();

    assert_eq!(event.status, EventStatus::Published);
    let inventory = harness.engine.inventory(event.id).await.unwrap();
    assert_eq!(inventory.total_capacity, 500);
    assert_eq!(inventory.available, 500);
    assert_eq!(inventory.version, 0);
    assert_eq!(harness.engine.get_event(event.id).await.unwrap(), event);
}

#[tokio::test]
async fn test_publish_validation() {
    let harness = TestHarness::new();

    let zero_capacity = new_event(&harness, 0);
    let mut untitled = new_event(&harness, 10);
    untitled.title = "   ".to_string();
    let mut in_the_past = new_event(&harness, 10);
    in_the_past.starts_at = harness.clock.now() - Duration::hours(1);

    for invalid in [zero_capacity, untitled, in_the_past] {
        let result = harness.engine.publish_event(invalid).await;
        assert!(matches!(result, Err(PurchaseError::Validation(_))));
    }
    let page = harness.engine.list_events(1, DEFAULT_PAGE_SIZE).await.unwrap();
    assert!(page.events.is_empty());
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn test_cancel_event_is_idempotent() {
    let harness = TestHarness::new();
    let event = harness.publish_event(10).await;

    let cancelled = harness.engine.cancel_event(event.id).await.unwrap();
    let again = harness.engine.cancel_event(event.id).await.unwrap();

    assert_eq!(cancelled.status, EventStatus::Cancelled);
    assert_eq!(again, cancelled);
}

#[tokio::test]
async fn test_unknown_event_lookups() {
    let harness = TestHarness::new();
    let missing = EventId::new();

    assert_eq!(
        harness.engine.cancel_event(missing).await,
        Err(PurchaseError::EventNotFound(missing))
    );
    assert_eq!(
        harness.engine.get_event(missing).await,
        Err(PurchaseError::EventNotFound(missing))
    );
    assert_eq!(
        harness.engine.inventory(missing).await,
        Err(PurchaseError::EventNotFound(missing))
    );
}

#[tokio::test]
async fn test_list_events_soonest_first() {
    let harness = TestHarness::new();
    let mut later = new_event(&harness, 10);
    later.starts_at = harness.clock.now() + Duration::days(90);
    let mut sooner = new_event(&harness, 10);
    sooner.starts_at = harness.clock.now() + Duration::days(7);

    let later = harness.engine.publish_event(later).await.unwrap();
    let sooner = harness.engine.publish_event(sooner).await.unwrap();

    let ids: Vec<EventId> = harness
        .engine
        .list_events(1, DEFAULT_PAGE_SIZE)
        .await
        .unwrap()
        .events
        .into_iter()
        .map(|event| event.id)
        .collect();
    assert_eq!(ids, vec![sooner.id, later.id]);
}

#[tokio::test]
async fn test_list_events_pages_through_the_catalog() {
    let harness = TestHarness::new();
    let mut published = Vec::new();
    for days in 1..=5 {
        let mut event = new_event(&harness, 10);
        event.starts_at = harness.clock.now() + Duration::days(days);
        published.push(harness.engine.publish_event(event).await.unwrap().id);
    }

    let first = harness.engine.list_events(1, 2).await.unwrap();
    let last = harness.engine.list_events(3, 2).await.unwrap();
    let beyond = harness.engine.list_events(4, 2).await.unwrap();

    assert_eq!(first.total, 5);
    assert_eq!(first.page, 1);
    assert_eq!(first.page_size, 2);
    let first_ids: Vec<EventId> = first.events.iter().map(|event| event.id).collect();
    assert_eq!(first_ids, published[..2].to_vec());
    assert_eq!(last.events.len(), 1);
    assert_eq!(last.events[0].id, published[4]);
    assert!(beyond.events.is_empty());
    assert_eq!(beyond.total, 5);
}

#[tokio::test]
async fn test_list_events_page_bounds() {
    let harness = TestHarness::new();
    harness.publish_event(10).await;

    assert!(matches!(
        harness.engine.list_events(0, 10).await,
        Err(PurchaseError::Validation(_))
    ));
    assert!(matches!(
        harness.engine.list_events(1, 0).await,
        Err(PurchaseError::Validation(_))
    ));
    let capped = harness.engine.list_events(1, 10_000).await.unwrap();
    assert_eq!(capped.page_size, MAX_PAGE_SIZE);
    assert_eq!(capped.events.len(), 1);
}

#[tokio::test]
async fn test_update_event_changes_given_fields_only() {
    let harness = TestHarness::new();
    let event = harness.publish_event(10).await;
    let later = harness.engine_at(FixedClock::new(harness.clock.now() + Duration::minutes(1)));
    let new_start = harness.clock.now() + Duration::days(45);

    let updated = later
        .update_event(
            event.id,
            EventChanges {
                title: Some("Jakarta Jazz Night II".to_string()),
                starts_at: Some(new_start),
                unit_price: Some(Money::from_cents(175_000)),
                ..EventChanges::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.title, "Jakarta Jazz Night II");
    assert_eq!(updated.venue, event.venue);
    assert_eq!(updated.starts_at, new_start);
    assert_eq!(updated.unit_price, Money::from_cents(175_000));
    assert_eq!(updated.status, EventStatus::Published);
    assert!(updated.updated_at > event.updated_at);
    assert_eq!(harness.engine.get_event(event.id).await.unwrap(), updated);
    assert_eq!(harness.inventory(&event).await.total_capacity, 10);
}

#[tokio::test]
async fn test_price_change_applies_to_later_orders_only() {
    let harness = TestHarness::new();
    let event = harness.publish_event(10).await;
    let before = harness
        .engine
        .purchase(harness.purchaser, event.id, 1, "price-change-key-0001")
        .await
        .unwrap();

    harness
        .engine
        .update_event(
            event.id,
            EventChanges {
                unit_price: Some(Money::from_cents(200_000)),
                ..EventChanges::default()
            },
        )
        .await
        .unwrap();
    let after = harness
        .engine
        .purchase(harness.purchaser, event.id, 1, "price-change-key-0002")
        .await
        .unwrap();

    assert_eq!(before.total_price, event.unit_price);
    assert_eq!(after.total_price, Money::from_cents(200_000));
    let original = harness.engine.get_order(before.order_id).await.unwrap();
    assert_eq!(original.order.unit_price, event.unit_price);
}

#[tokio::test]
async fn test_update_event_validation() {
    let harness = TestHarness::new();
    let event = harness.publish_event(10).await;

    let blank_venue = EventChanges {
        venue: Some(" ".to_string()),
        ..EventChanges::default()
    };
    let in_the_past = EventChanges {
        starts_at: Some(harness.clock.now() - Duration::days(1)),
        ..EventChanges::default()
    };
    for invalid in [blank_venue, in_the_past] {
        let result = harness.engine.update_event(event.id, invalid).await;
        assert!(matches!(result, Err(PurchaseError::Validation(_))));
    }

    let missing = EventId::new();
    assert_eq!(
        harness
            .engine
            .update_event(missing, EventChanges::default())
            .await,
        Err(PurchaseError::EventNotFound(missing))
    );
    assert_eq!(harness.engine.get_event(event.id).await.unwrap(), event);
}

#[tokio::test]
async fn test_cancelled_event_cannot_be_updated() {
    let harness = TestHarness::new();
    let event = harness.publish_event(10).await;
    harness.engine.cancel_event(event.id).await.unwrap();

    let result = harness
        .engine
        .update_event(
            event.id,
            EventChanges {
                title: Some("Back on".to_string()),
                ..EventChanges::default()
            },
        )
        .await;

    assert!(matches!(
        result,
        Err(PurchaseError::EventNotPurchasable { .. })
    ));
    let stored = harness.engine.get_event(event.id).await.unwrap();
    assert_eq!(stored.status, EventStatus::Cancelled);
    assert_eq!(stored.title, event.title);
}

#[tokio::test]
async fn test_delete_event_without_orders() {
    let harness = TestHarness::new();
    let event = harness.publish_event(10).await;

    harness.engine.delete_event(event.id).await.unwrap();

    assert_eq!(
        harness.engine.get_event(event.id).await,
        Err(PurchaseError::EventNotFound(event.id))
    );
    assert_eq!(
        harness.engine.inventory(event.id).await,
        Err(PurchaseError::EventNotFound(event.id))
    );
    assert_eq!(
        harness.engine.delete_event(event.id).await,
        Err(PurchaseError::EventNotFound(event.id))
    );
}

#[tokio::test]
async fn test_delete_event_with_orders_is_refused() {
    let harness = TestHarness::new();
    let event = harness.publish_event(10).await;
    let receipt = harness
        .engine
        .purchase(harness.purchaser, event.id, 2, "delete-guard-key-0001")
        .await
        .unwrap();
    harness.engine.refund(receipt.order_id).await.unwrap();

    let result = harness.engine.delete_event(event.id).await;

    assert_eq!(
        result,
        Err(PurchaseError::EventHasOrders {
            event_id: event.id,
            orders: 1,
        })
    );
    assert_eq!(harness.engine.get_event(event.id).await.unwrap().id, event.id);
    assert_eq!(harness.inventory(&event).await.available, 10);
}

#[tokio::test]
async fn test_list_orders_newest_first_and_scoped_to_purchaser() {
    let harness = TestHarness::new();
    let event = harness.publish_event(10).await;

    let older = harness
        .engine
        .purchase(harness.purchaser, event.id, 1, "orders-query-key-00001")
        .await
        .unwrap();
    let newer = harness
        .engine_at(FixedClock::new(harness.clock.now() + Duration::minutes(5)))
        .purchase(harness.purchaser, event.id, 1, "orders-query-key-00002")
        .await
        .unwrap();
    harness
        .engine
        .purchase(PurchaserId::new(), event.id, 1, "orders-query-key-00003")
        .await
        .unwrap();

    let ids: Vec<OrderId> = harness
        .engine
        .list_orders(harness.purchaser)
        .await
        .unwrap()
        .into_iter()
        .map(|order| order.id)
        .collect();
    assert_eq!(ids, vec![newer.order_id, older.order_id]);
}

#[tokio::test]
async fn test_get_unknown_order() {
    let harness = TestHarness::new();
    let missing = OrderId::new();
    assert_eq!(
        harness.engine.get_order(missing).await,
        Err(PurchaseError::OrderNotFound(missing))
    );
}
