//! Concurrency tests.
//!
//! Many purchasers racing for the last tickets of an event. Whatever the
//! interleaving, the number of tickets issued never exceeds capacity and the
//! inventory counter always matches the tickets issued.
//!
//! Run with: `cargo test --test concurrency_test`

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use proptest::prelude::*;
use ticketing_core::error::PurchaseError;
use ticketing_core::types::PurchaserId;
use ticketing_testing::TestHarness;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_last_tickets_race_never_oversells() {
    let harness = TestHarness::new();
    let event = harness.publish_event(20).await;

    let mut tasks = Vec::new();
    for n in 0..50 {
        let engine = harness.engine.clone();
        let event_id = event.id;
        tasks.push(tokio::spawn(async move {
            let key = format!("race-purchase-key-{n:04}");
            engine.purchase(PurchaserId::new(), event_id, 1, &key).await
        }));
    }

    let mut confirmed = 0;
    let mut sold_out = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => confirmed += 1,
            Err(PurchaseError::InsufficientInventory { .. }) => sold_out += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(confirmed, 20);
    assert_eq!(sold_out, 30);
    let inventory = harness.inventory(&event).await;
    assert_eq!(inventory.available, 0);
    assert_eq!(harness.store.ticket_count().await, 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_quantities_race_never_oversells() {
    let harness = TestHarness::new();
    let event = harness.publish_event(25).await;

    let mut tasks = Vec::new();
    for n in 0..30_u32 {
        let engine = harness.engine.clone();
        let event_id = event.id;
        let quantity = n % 4 + 1;
        tasks.push(tokio::spawn(async move {
            let key = format!("mixed-purchase-key-{n:04}");
            engine
                .purchase(PurchaserId::new(), event_id, quantity, &key)
                .await
                .map(|receipt| receipt.quantity)
        }));
    }

    let mut sold = 0;
    for task in tasks {
        if let Ok(quantity) = task.await.unwrap() {
            sold += quantity;
        }
    }

    let inventory = harness.inventory(&event).await;
    assert!(sold <= 25);
    assert_eq!(inventory.available, 25 - sold);
    assert_eq!(harness.store.ticket_count().await, sold as usize);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_sold_tickets_never_exceed_capacity(
        capacity in 1_u32..40,
        quantities in prop::collection::vec(1_u32..=10, 1..25),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let harness = TestHarness::new();
            let event = harness.publish_event(capacity).await;

            let mut sold = 0;
            for (n, quantity) in quantities.iter().enumerate() {
                let key = format!("prop-purchase-key-{n:04}");
                match harness.engine.purchase(harness.purchaser, event.id, *quantity, &key).await {
                    Ok(receipt) => {
                        prop_assert_eq!(receipt.ticket_codes.len(), *quantity as usize);
                        sold += quantity;
                    }
                    Err(PurchaseError::InsufficientInventory { available, .. }) => {
                        prop_assert!(available < *quantity);
                        prop_assert_eq!(available, capacity - sold);
                    }
                    Err(other) => prop_assert!(false, "unexpected error: {}", other),
                }
            }

            let inventory = harness.inventory(&event).await;
            prop_assert!(sold <= capacity);
            prop_assert_eq!(inventory.available, capacity - sold);
            prop_assert_eq!(harness.store.ticket_count().await, sold as usize);
            Ok(())
        })?;
    }
}
