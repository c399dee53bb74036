//! Background sweep of expired idempotency records.

use std::time::Duration;
use ticketing_core::purchase::PurchaseEngine;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Spawn a task that purges expired idempotency records every `interval`
/// until `shutdown` flips to `true` or its sender is dropped.
///
/// A failed sweep is logged and retried on the next tick.
pub fn spawn_idempotency_purge(
    engine: PurchaseEngine,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_secs = interval.as_secs(), "Idempotency purge task started");

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = engine.purge_expired_idempotency().await {
                        tracing::warn!(error = %e, "Idempotency purge failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Idempotency purge task stopped");
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use ticketing_core::environment::Clock;
    use ticketing_testing::TestHarness;
    use ticketing_testing::mocks::FixedClock;

    #[tokio::test]
    async fn test_purge_removes_expired_records_and_stops() {
        let harness = TestHarness::new();
        let event = harness.publish_event(10).await;
        harness
            .engine
            .purchase(harness.purchaser, event.id, 2, "purge-task-key-0001")
            .await
            .unwrap();
        assert_eq!(harness.store.idempotency_count().await, 1);

        let later = FixedClock::new(harness.clock.now() + ChronoDuration::hours(25));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn_idempotency_purge(
            harness.engine_at(later),
            Duration::from_millis(10),
            shutdown_rx,
        );

        tokio::time::timeout(Duration::from_secs(2), async {
            while harness.store.idempotency_count().await > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("expired record should be purged");

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("purge task should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_live_records_survive_purge() {
        let harness = TestHarness::new();
        let event = harness.publish_event(10).await;
        harness
            .engine
            .purchase(harness.purchaser, event.id, 1, "purge-task-key-0002")
            .await
            .unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn_idempotency_purge(
            harness.engine.clone(),
            Duration::from_millis(10),
            shutdown_rx,
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(shutdown_tx);
        handle.await.unwrap();

        assert_eq!(harness.store.idempotency_count().await, 1);
    }
}
