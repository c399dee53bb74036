//! # Ticketing Testing
//!
//! Test doubles and fixtures for the ticketing engine.
//!
//! This crate provides:
//! - [`InMemoryTicketingStore`]: transactional in-memory store
//! - [`mocks::MockPaymentGateway`]: scriptable payment processor
//! - [`mocks::FixedClock`]: deterministic time
//! - [`mocks::SequenceTicketCodes`]: scripted ticket codes
//! - [`TestHarness`]: an engine wired to all of the above
//!
//! ## Example
//!
//! ```ignore
//! use ticketing_testing::TestHarness;
//!
//! #[tokio::test]
//! async fn test_purchase() {
//!     let harness = TestHarness::new();
//!     let event = harness.publish_event(10).await;
//!     let receipt = harness
//!         .engine
//!         .purchase(harness.purchaser, event.id, 2, "test-key-0000000001")
//!         .await
//!         .unwrap();
//!     assert_eq!(receipt.ticket_codes.len(), 2);
//! }
//! ```

mod harness;
mod memory_store;

pub use harness::{TEST_TICKET_PRICE, TestHarness};
pub use memory_store::{InMemoryTicketingStore, InMemoryUnitOfWork};

use chrono::{DateTime, Utc};
use ticketing_core::environment::Clock;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use futures::future::BoxFuture;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Mutex, MutexGuard, PoisonError};
    use std::time::Duration;
    use ticketing_core::environment::{
        AuthorizationOutcome, PaymentError, PaymentGateway, RandomTicketCodes, TicketCodeGenerator,
    };
    use ticketing_core::types::{Money, OrderId, PurchaserId, TicketCode};

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use ticketing_testing::mocks::FixedClock;
    /// use ticketing_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Behaviour of [`MockPaymentGateway::authorize`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum PaymentMode {
        /// Approve every charge
        Approve,
        /// Decline with the given reason
        Decline(String),
        /// Fail as if the processor were unreachable
        Fail(String),
        /// Approve after sleeping
        Delay(Duration),
        /// Never answer
        Hang,
    }

    #[derive(Debug, Clone)]
    struct Refund {
        order_id: OrderId,
        reference: String,
        amount: Money,
        refund_id: String,
    }

    /// Scriptable payment gateway.
    ///
    /// Approved references and refunds are stable per order id, so repeating
    /// either call for the same order moves money once.
    #[derive(Debug)]
    pub struct MockPaymentGateway {
        mode: Mutex<PaymentMode>,
        references: Mutex<HashMap<OrderId, String>>,
        refunds: Mutex<Vec<Refund>>,
        authorize_calls: AtomicUsize,
        refund_calls: AtomicUsize,
        fail_refunds: AtomicBool,
    }

    impl Default for MockPaymentGateway {
        fn default() -> Self {
            Self::new(PaymentMode::Approve)
        }
    }

    impl MockPaymentGateway {
        /// Create a gateway in `mode`.
        #[must_use]
        pub fn new(mode: PaymentMode) -> Self {
            Self {
                mode: Mutex::new(mode),
                references: Mutex::new(HashMap::new()),
                refunds: Mutex::new(Vec::new()),
                authorize_calls: AtomicUsize::new(0),
                refund_calls: AtomicUsize::new(0),
                fail_refunds: AtomicBool::new(false),
            }
        }

        /// Gateway approving every charge.
        #[must_use]
        pub fn approving() -> Self {
            Self::new(PaymentMode::Approve)
        }

        /// Gateway declining every charge.
        #[must_use]
        pub fn declining(reason: &str) -> Self {
            Self::new(PaymentMode::Decline(reason.to_string()))
        }

        /// Change behaviour for subsequent calls.
        pub fn set_mode(&self, mode: PaymentMode) {
            *lock(&self.mode) = mode;
        }

        /// Make refunds fail.
        pub fn fail_refunds(&self, fail: bool) {
            self.fail_refunds.store(fail, Ordering::SeqCst);
        }

        /// How many times `authorize` was called.
        pub fn authorize_calls(&self) -> usize {
            self.authorize_calls.load(Ordering::SeqCst)
        }

        /// Orders that received an approved authorization.
        pub fn approved_orders(&self) -> Vec<OrderId> {
            lock(&self.references).keys().copied().collect()
        }

        /// How many times `refund` was called, repeats included.
        pub fn refund_calls(&self) -> usize {
            self.refund_calls.load(Ordering::SeqCst)
        }

        /// Money actually refunded, one entry per order, as
        /// `(authorization reference, amount)`.
        pub fn refunds(&self) -> Vec<(String, Money)> {
            lock(&self.refunds)
                .iter()
                .map(|refund| (refund.reference.clone(), refund.amount))
                .collect()
        }

        fn approve(&self, order_id: OrderId) -> AuthorizationOutcome {
            let reference = lock(&self.references)
                .entry(order_id)
                .or_insert_with(|| format!("txn_{}", order_id.as_uuid().simple()))
                .clone();
            AuthorizationOutcome::Approved { reference }
        }
    }

    impl PaymentGateway for MockPaymentGateway {
        fn authorize(
            &self,
            order_id: OrderId,
            _amount: Money,
            _purchaser_id: PurchaserId,
        ) -> BoxFuture<'_, Result<AuthorizationOutcome, PaymentError>> {
            self.authorize_calls.fetch_add(1, Ordering::SeqCst);
            let mode = lock(&self.mode).clone();
            Box::pin(async move {
                match mode {
                    PaymentMode::Approve => Ok(self.approve(order_id)),
                    PaymentMode::Decline(reason) => Ok(AuthorizationOutcome::Declined { reason }),
                    PaymentMode::Fail(message) => Err(PaymentError::Unavailable(message)),
                    PaymentMode::Delay(delay) => {
                        tokio::time::sleep(delay).await;
                        Ok(self.approve(order_id))
                    }
                    PaymentMode::Hang => futures::future::pending().await,
                }
            })
        }

        fn refund<'a>(
            &'a self,
            order_id: OrderId,
            reference: &'a str,
            amount: Money,
        ) -> BoxFuture<'a, Result<String, PaymentError>> {
            self.refund_calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if self.fail_refunds.load(Ordering::SeqCst) {
                    return Err(PaymentError::Unavailable("refund service down".to_string()));
                }
                let mut refunds = lock(&self.refunds);
                if let Some(existing) = refunds.iter().find(|refund| refund.order_id == order_id) {
                    return Ok(existing.refund_id.clone());
                }
                let refund_id = format!("rfd_{}", refunds.len() + 1);
                refunds.push(Refund {
                    order_id,
                    reference: reference.to_string(),
                    amount,
                    refund_id: refund_id.clone(),
                });
                Ok(refund_id)
            })
        }
    }

    /// Hands out scripted codes first, then random ones.
    #[derive(Debug, Default)]
    pub struct SequenceTicketCodes {
        scripted: Mutex<VecDeque<TicketCode>>,
    }

    impl SequenceTicketCodes {
        /// Create a generator that returns `codes` in order before falling
        /// back to random codes.
        #[must_use]
        pub fn new<I, S>(codes: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                scripted: Mutex::new(codes.into_iter().map(TicketCode::new).collect()),
            }
        }

        /// Scripted codes not yet handed out.
        pub fn remaining(&self) -> usize {
            lock(&self.scripted).len()
        }
    }

    impl TicketCodeGenerator for SequenceTicketCodes {
        fn generate(&self) -> TicketCode {
            lock(&self.scripted)
                .pop_front()
                .unwrap_or_else(|| RandomTicketCodes.generate())
        }
    }
}

/// Install a `tracing` subscriber for tests, honoring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, MockPaymentGateway, PaymentMode, SequenceTicketCodes, test_clock};
