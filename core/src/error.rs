//! Error types for the ticketing engine.
//!
//! [`StoreError`] is what store implementations return; [`PurchaseError`] is
//! what callers of the engine see. Store failures are classified at the
//! engine boundary so driver detail never leaks to callers.

use crate::types::{EventId, OrderId};
use thiserror::Error;

/// Errors raised by store implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A row that must exist was missing.
    #[error("Record not found")]
    NotFound,

    /// A uniqueness constraint rejected the write.
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation {
        /// Name of the violated constraint
        constraint: String,
    },

    /// Driver or connection failure.
    #[error("Database error: {0}")]
    Database(String),

    /// Statement or lock wait exceeded its budget.
    #[error("Store operation timed out")]
    Timeout,

    /// Stored data contradicts a domain invariant.
    #[error("Store invariant violated: {0}")]
    InvariantViolation(String),
}

/// Coarse error classification, used for metrics labels and HTTP mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed request or reused idempotency key
    Validation,
    /// Not enough tickets left
    InsufficientInventory,
    /// Payment declined, failed or timed out
    PaymentFailed,
    /// Referenced entity does not exist
    NotFound,
    /// Entity exists but is in the wrong state for the request
    NotPurchasable,
    /// Concurrent write, or a delete blocked by dependent rows
    Conflict,
    /// Anything else
    Internal,
}

impl ErrorKind {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation_error",
            Self::InsufficientInventory => "insufficient_inventory",
            Self::PaymentFailed => "payment_failed",
            Self::NotFound => "not_found",
            Self::NotPurchasable => "not_purchasable",
            Self::Conflict => "conflict",
            Self::Internal => "internal_error",
        }
    }
}

/// Errors returned by engine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PurchaseError {
    /// Request failed validation before any transaction was opened.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The event does not have enough tickets left.
    #[error(
        "Insufficient inventory for event {event_id}: requested {requested}, available {available}"
    )]
    InsufficientInventory {
        /// Event requested
        event_id: EventId,
        /// Tickets requested
        requested: u32,
        /// Tickets available when the debit was refused
        available: u32,
    },

    /// Payment was declined, failed or timed out.
    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    /// Unknown event.
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// The event exists but cannot be purchased.
    #[error("Event {event_id} is not purchasable: {reason}")]
    EventNotPurchasable {
        /// Event requested
        event_id: EventId,
        /// Why sales are refused
        reason: String,
    },

    /// Unknown order.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Unknown ticket code.
    #[error("Ticket not found")]
    TicketNotFound,

    /// Lifecycle transition not allowed.
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: &'static str,
        /// Requested status
        to: &'static str,
    },

    /// Ticket cannot be redeemed in its current status.
    #[error("Ticket cannot be redeemed: status is {status}")]
    TicketNotRedeemable {
        /// Current ticket status
        status: &'static str,
    },

    /// A uniqueness constraint rejected a concurrent write.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The idempotency key belongs to a different live purchase.
    #[error("Idempotency key was already used for a different purchase")]
    IdempotencyKeyReused,

    /// The event still has orders and cannot be deleted.
    #[error("Event {event_id} has {orders} order(s) and cannot be deleted")]
    EventHasOrders {
        /// Event requested
        event_id: EventId,
        /// Orders referencing the event
        orders: u64,
    },

    /// Refund refused because tickets were already used or transferred.
    #[error("Refund blocked: {used} ticket(s) already used or transferred")]
    RefundBlocked {
        /// Number of tickets no longer valid
        used: usize,
    },

    /// Unexpected failure. The message is safe to show to callers.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PurchaseError {
    /// Coarse classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::IdempotencyKeyReused => ErrorKind::Validation,
            Self::InsufficientInventory { .. } => ErrorKind::InsufficientInventory,
            Self::PaymentFailed(_) => ErrorKind::PaymentFailed,
            Self::EventNotFound(_) | Self::OrderNotFound(_) | Self::TicketNotFound => {
                ErrorKind::NotFound
            }
            Self::EventNotPurchasable { .. }
            | Self::InvalidTransition { .. }
            | Self::TicketNotRedeemable { .. }
            | Self::RefundBlocked { .. } => ErrorKind::NotPurchasable,
            Self::Conflict(_) | Self::EventHasOrders { .. } => ErrorKind::Conflict,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the caller may retry the same request (with the same key).
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::PaymentFailed(_) | Self::Conflict(_) | Self::Internal(_)
        )
    }
}

impl From<StoreError> for PurchaseError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::UniqueViolation { constraint } => {
                Self::Conflict(format!("concurrent write rejected by {constraint}"))
            }
            StoreError::Timeout => {
                tracing::warn!("Store operation timed out");
                Self::Internal("storage timed out".to_string())
            }
            StoreError::NotFound => Self::Internal("record unexpectedly missing".to_string()),
            StoreError::Database(detail) => {
                tracing::error!(error = %detail, "Store failure");
                Self::Internal("storage failure".to_string())
            }
            StoreError::InvariantViolation(detail) => {
                tracing::error!(error = %detail, "Store invariant violated");
                Self::Internal("storage invariant violated".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_detail_is_not_exposed() {
        let error: PurchaseError =
            StoreError::Database("connection reset by peer at 10.0.0.7".to_string()).into();
        assert_eq!(error, PurchaseError::Internal("storage failure".to_string()));
        assert!(!error.to_string().contains("10.0.0.7"));
    }

    #[test]
    fn test_unique_violation_becomes_conflict() {
        let error: PurchaseError = StoreError::UniqueViolation {
            constraint: "tickets_code_key".to_string(),
        }
        .into();
        assert_eq!(error.kind(), ErrorKind::Conflict);
        assert!(error.is_retriable());
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            PurchaseError::EventNotFound(EventId::new()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            PurchaseError::Validation("quantity".to_string()).kind().as_str(),
            "validation_error"
        );
        assert!(!PurchaseError::InsufficientInventory {
            event_id: EventId::new(),
            requested: 2,
            available: 1,
        }
        .is_retriable());
    }

    #[test]
    fn test_key_reuse_is_a_permanent_validation_error() {
        let error = PurchaseError::IdempotencyKeyReused;
        assert_eq!(error.kind(), ErrorKind::Validation);
        assert!(!error.is_retriable());
    }

    #[test]
    fn test_event_with_orders_conflicts_without_retry() {
        let error = PurchaseError::EventHasOrders {
            event_id: EventId::new(),
            orders: 2,
        };
        assert_eq!(error.kind(), ErrorKind::Conflict);
        assert!(!error.is_retriable());
    }
}
