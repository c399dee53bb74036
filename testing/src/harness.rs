//! Engine wired to in-memory collaborators.

use crate::memory_store::InMemoryTicketingStore;
use crate::mocks::{FixedClock, MockPaymentGateway, test_clock};
use chrono::Duration;
use std::sync::Arc;
use ticketing_core::environment::{Clock, PurchaseEnvironment, TicketCodeGenerator};
use ticketing_core::purchase::{PurchaseEngine, PurchasePolicy};
use ticketing_core::types::{Event, EventInventory, Money, NewEvent, PurchaserId};

/// Ticket price used by [`TestHarness::publish_event`].
pub const TEST_TICKET_PRICE: Money = Money::from_cents(150_000);

/// A purchase engine over an [`InMemoryTicketingStore`], a
/// [`MockPaymentGateway`] and the fixed [`test_clock`].
pub struct TestHarness {
    /// Engine under test
    pub engine: PurchaseEngine,
    /// Backing store, for assertions
    pub store: Arc<InMemoryTicketingStore>,
    /// Payment double, for scripting and assertions
    pub payments: Arc<MockPaymentGateway>,
    /// Clock the engine sees
    pub clock: FixedClock,
    /// A purchaser to buy with
    pub purchaser: PurchaserId,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// Harness with the default policy and random ticket codes.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(PurchasePolicy::default())
    }

    /// Harness with a custom policy.
    #[must_use]
    pub fn with_policy(policy: PurchasePolicy) -> Self {
        Self::build(policy, None, test_clock())
    }

    /// Harness with scripted ticket codes.
    #[must_use]
    pub fn with_codes(codes: Arc<dyn TicketCodeGenerator>) -> Self {
        Self::build(PurchasePolicy::default(), Some(codes), test_clock())
    }

    /// Fully custom harness.
    #[must_use]
    pub fn build(
        policy: PurchasePolicy,
        codes: Option<Arc<dyn TicketCodeGenerator>>,
        clock: FixedClock,
    ) -> Self {
        let store = Arc::new(InMemoryTicketingStore::new());
        let payments = Arc::new(MockPaymentGateway::approving());
        let mut env = PurchaseEnvironment::new(store.clone(), payments.clone())
            .with_clock(Arc::new(clock.clone()));
        if let Some(codes) = codes {
            env = env.with_codes(codes);
        }
        Self {
            engine: PurchaseEngine::new(env, policy),
            store,
            payments,
            clock,
            purchaser: PurchaserId::new(),
        }
    }

    /// Same store and gateway, engine seeing a different clock.
    #[must_use]
    pub fn engine_at(&self, clock: FixedClock) -> PurchaseEngine {
        let env = PurchaseEnvironment::new(self.store.clone(), self.payments.clone())
            .with_clock(Arc::new(clock));
        PurchaseEngine::new(env, self.engine.policy().clone())
    }

    /// Publish an event starting in 30 days with `capacity` tickets.
    ///
    /// # Panics
    ///
    /// Panics if publishing fails.
    #[allow(clippy::expect_used)]
    pub async fn publish_event(&self, capacity: u32) -> Event {
        self.engine
            .publish_event(NewEvent {
                title: "Jakarta Jazz Night".to_string(),
                venue: "Istora Senayan".to_string(),
                starts_at: self.clock.now() + Duration::days(30),
                unit_price: TEST_TICKET_PRICE,
                capacity,
            })
            .await
            .expect("publishing a test event should succeed")
    }

    /// Current inventory of an event.
    ///
    /// # Panics
    ///
    /// Panics if the event does not exist.
    #[allow(clippy::expect_used)]
    pub async fn inventory(&self, event: &Event) -> EventInventory {
        self.engine
            .inventory(event.id)
            .await
            .expect("test event should have inventory")
    }
}
