//! Idempotency guard for purchase requests.
//!
//! Clients send an `Idempotency-Key` with every purchase. The first request
//! under a key performs the purchase and stores its receipt; retries under
//! the same key get that receipt back without touching inventory or payment.
//! Keys are scoped per purchaser and retained for a configurable window.

use crate::error::PurchaseError;
use crate::store::TicketingStore;
use crate::types::{EventId, IdempotencyKey, IdempotencyRecord, PurchaseReceipt};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Default retention of idempotency records.
pub const DEFAULT_RETENTION_HOURS: i64 = 24;

/// What to do with an incoming purchase request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyDecision {
    /// No live record: perform the purchase.
    New,
    /// A completed purchase exists for this key: return it unchanged.
    Reuse(PurchaseReceipt),
}

/// Looks up and builds idempotency records.
#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn TicketingStore>,
    retention: Duration,
}

impl IdempotencyGuard {
    /// Create a guard over `store` keeping records for `retention`.
    #[must_use]
    pub fn new(store: Arc<dyn TicketingStore>, retention: Duration) -> Self {
        Self { store, retention }
    }

    /// Retention window of new records
    #[must_use]
    pub const fn retention(&self) -> Duration {
        self.retention
    }

    /// Decide whether a request is new or a retry.
    ///
    /// # Errors
    ///
    /// Returns [`PurchaseError::IdempotencyKeyReused`] if a live record
    /// exists for the key but was created for a different event or quantity,
    /// and
    /// [`PurchaseError::Internal`] on store failure.
    pub async fn begin_or_reuse(
        &self,
        key: &IdempotencyKey,
        event_id: EventId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<IdempotencyDecision, PurchaseError> {
        let Some(record) = self.store.lookup_idempotency(key).await? else {
            return Ok(IdempotencyDecision::New);
        };
        Self::decide(record, event_id, quantity, now)
    }

    /// Decision for an already loaded record.
    ///
    /// # Errors
    ///
    /// Returns [`PurchaseError::IdempotencyKeyReused`] on a fingerprint
    /// mismatch.
    pub fn decide(
        record: IdempotencyRecord,
        event_id: EventId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<IdempotencyDecision, PurchaseError> {
        if record.is_expired(now) {
            tracing::debug!(
                key = %record.key,
                "Idempotency record expired, treating request as new"
            );
            return Ok(IdempotencyDecision::New);
        }
        if !record.matches_request(event_id, quantity) {
            tracing::warn!(
                key = %record.key,
                stored_event = %record.event_id,
                stored_quantity = record.quantity,
                "Idempotency key reused for a different purchase"
            );
            return Err(PurchaseError::IdempotencyKeyReused);
        }
        Ok(IdempotencyDecision::Reuse(record.receipt))
    }

    /// Build the record to save alongside a completed purchase.
    #[must_use]
    pub fn record(
        &self,
        key: IdempotencyKey,
        receipt: &PurchaseReceipt,
        now: DateTime<Utc>,
    ) -> IdempotencyRecord {
        IdempotencyRecord {
            key,
            event_id: receipt.event_id,
            quantity: receipt.quantity,
            order_id: receipt.order_id,
            receipt: receipt.clone(),
            created_at: now,
            expires_at: now + self.retention,
        }
    }

    /// Delete records past retention.
    ///
    /// # Errors
    ///
    /// Returns [`PurchaseError::Internal`] on store failure.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, PurchaseError> {
        let purged = self.store.purge_expired_idempotency(now).await?;
        if purged > 0 {
            tracing::info!(purged, "Purged expired idempotency records");
        }
        Ok(purged)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Money, OrderId, OrderStatus, PurchaserId};

    fn record(expires_at: DateTime<Utc>, event_id: EventId) -> IdempotencyRecord {
        let order_id = OrderId::new();
        let receipt = PurchaseReceipt {
            order_id,
            event_id,
            quantity: 2,
            ticket_codes: Vec::new(),
            status: OrderStatus::Confirmed,
            total_price: Money::from_cents(200),
            payment_reference: Some("txn_1".to_string()),
        };
        IdempotencyRecord {
            key: IdempotencyKey::new(PurchaserId::new(), "retry-key-000000001").unwrap(),
            event_id,
            quantity: 2,
            order_id,
            receipt,
            created_at: expires_at - Duration::hours(DEFAULT_RETENTION_HOURS),
            expires_at,
        }
    }

    #[test]
    fn test_live_matching_record_is_reused() {
        let now = Utc::now();
        let event_id = EventId::new();
        let stored = record(now + Duration::hours(1), event_id);
        let decision = IdempotencyGuard::decide(stored.clone(), event_id, 2, now);
        assert_eq!(decision, Ok(IdempotencyDecision::Reuse(stored.receipt)));
    }

    #[test]
    fn test_expired_record_is_new() {
        let now = Utc::now();
        let event_id = EventId::new();
        let stored = record(now - Duration::seconds(1), event_id);
        assert_eq!(
            IdempotencyGuard::decide(stored, EventId::new(), 5, now),
            Ok(IdempotencyDecision::New)
        );
    }

    #[test]
    fn test_mismatched_fingerprint_conflicts() {
        let now = Utc::now();
        let event_id = EventId::new();
        let stored = record(now + Duration::hours(1), event_id);
        let decision = IdempotencyGuard::decide(stored, event_id, 3, now);
        assert_eq!(decision, Err(PurchaseError::IdempotencyKeyReused));
    }
}
