//! Injected collaborators of the purchase engine.
//!
//! The engine never reaches for global state: time, ticket codes, payments
//! and storage are supplied through traits so production and tests can swap
//! implementations.

use crate::store::TicketingStore;
use crate::types::{Money, OrderId, PurchaserId, TicketCode};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::sync::Arc;
use thiserror::Error;

/// Clock trait for getting current time
///
/// Abstracted so tests can pin "now" to a fixed instant.
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Source of ticket admission codes.
pub trait TicketCodeGenerator: Send + Sync {
    /// Produce a fresh code. Uniqueness is ultimately enforced by the store.
    fn generate(&self) -> TicketCode;
}

/// Unguessable codes: `TKT-` followed by the 32 hex digits of a v4 UUID.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomTicketCodes;

impl TicketCodeGenerator for RandomTicketCodes {
    fn generate(&self) -> TicketCode {
        let hex = uuid::Uuid::new_v4().simple().to_string().to_ascii_uppercase();
        TicketCode::new(format!("TKT-{hex}"))
    }
}

/// Payment gateway error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    /// The processor refused the charge
    #[error("Payment declined: {reason}")]
    Declined {
        /// Decline reason
        reason: String,
    },

    /// The processor did not answer in time
    #[error("Gateway timeout")]
    Timeout,

    /// The processor could not be reached or failed
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),
}

/// Result of an authorization request that reached the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    /// Funds captured
    Approved {
        /// Gateway transaction reference
        reference: String,
    },
    /// Charge refused
    Declined {
        /// Decline reason
        reason: String,
    },
}

/// Payment gateway trait
///
/// Narrow interface in front of the external payment processor.
pub trait PaymentGateway: Send + Sync {
    /// Authorize and capture `amount` for an order.
    ///
    /// Implementations must be idempotent per `order_id`: repeating the call
    /// for the same order never charges twice.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError`] if the processor fails.
    fn authorize(
        &self,
        order_id: OrderId,
        amount: Money,
        purchaser_id: PurchaserId,
    ) -> BoxFuture<'_, Result<AuthorizationOutcome, PaymentError>>;

    /// Refund `amount` of an order against its authorization `reference`,
    /// returning the refund reference.
    ///
    /// Implementations must be idempotent per `order_id`: a repeated refund
    /// for the same order returns the first refund reference and moves no
    /// money.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError`] if the refund is refused or the processor
    /// fails.
    fn refund<'a>(
        &'a self,
        order_id: OrderId,
        reference: &'a str,
        amount: Money,
    ) -> BoxFuture<'a, Result<String, PaymentError>>;
}

/// Dependencies of the purchase engine.
#[derive(Clone)]
pub struct PurchaseEnvironment {
    /// Transactional storage
    pub store: Arc<dyn TicketingStore>,
    /// Payment processor
    pub payments: Arc<dyn PaymentGateway>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Ticket code source
    pub codes: Arc<dyn TicketCodeGenerator>,
}

impl PurchaseEnvironment {
    /// Production wiring: system clock and random ticket codes.
    #[must_use]
    pub fn new(store: Arc<dyn TicketingStore>, payments: Arc<dyn PaymentGateway>) -> Self {
        Self {
            store,
            payments,
            clock: Arc::new(SystemClock),
            codes: Arc::new(RandomTicketCodes),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the ticket code generator.
    #[must_use]
    pub fn with_codes(mut self, codes: Arc<dyn TicketCodeGenerator>) -> Self {
        self.codes = codes;
        self
    }
}
