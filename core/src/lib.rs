//! # Ticketing Core
//!
//! Purchase transaction engine for event ticketing.
//!
//! The hard part of selling tickets is the purchase itself: debiting finite
//! event inventory and creating the order plus one ticket per unit as a
//! single atomic, concurrency-safe operation that never oversells. This crate
//! holds that engine together with the contracts it relies on:
//!
//! - **types**: events, inventory counters, orders, tickets, idempotency records
//! - **store**: transactional storage traits ([`store::TicketingStore`],
//!   [`store::UnitOfWork`])
//! - **environment**: injected clock, payment gateway and ticket code generator
//! - **purchase**: [`purchase::PurchaseEngine`], the transaction itself
//! - **idempotency**: safe client retries
//! - **lifecycle**: refunds and ticket redemption
//! - **catalog**: event publishing and read queries
//!
//! ## Example
//!
//! ```ignore
//! use ticketing_core::prelude::*;
//!
//! let env = PurchaseEnvironment::new(store, payments);
//! let engine = PurchaseEngine::new(env, PurchasePolicy::default());
//!
//! let receipt = engine
//!     .purchase(purchaser_id, event_id, 2, "checkout-7f3a9c2e41d8")
//!     .await?;
//! assert_eq!(receipt.ticket_codes.len(), 2);
//! ```

pub mod catalog;
pub mod environment;
pub mod error;
pub mod idempotency;
pub mod lifecycle;
pub mod metrics;
pub mod purchase;
pub mod store;
pub mod types;

/// Commonly used items.
pub mod prelude {
    pub use crate::environment::{
        AuthorizationOutcome, Clock, PaymentError, PaymentGateway, PurchaseEnvironment,
        RandomTicketCodes, SystemClock, TicketCodeGenerator,
    };
    pub use crate::error::{ErrorKind, PurchaseError, StoreError};
    pub use crate::idempotency::{IdempotencyDecision, IdempotencyGuard};
    pub use crate::purchase::{PurchaseEngine, PurchasePolicy};
    pub use crate::store::{
        EventCatalog, IdempotencyStore, InventoryStore, OrderStore, StoreResult, TicketingStore,
        UnitOfWork,
    };
    pub use crate::types::*;
}
