//! Purchase transaction engine.
//!
//! A purchase debits event inventory, writes the order and its tickets,
//! authorizes payment and records the idempotency entry inside one store
//! transaction. Either every write commits or none does:
//!
//! ```text
//! validate → idempotency lookup → BEGIN
//!   → load event → conditional debit → insert order (key-derived id) + tickets
//!   → authorize payment (bounded) → confirm order → save idempotency record
//! → COMMIT
//! ```
//!
//! The engine holds no mutable state of its own; all coordination between
//! concurrent purchasers (in this process or another) happens in the store's
//! conditional writes and row locks. Dropping a purchase future before it
//! completes drops its unit of work, which rolls back.

use crate::environment::{AuthorizationOutcome, PurchaseEnvironment};
use crate::error::PurchaseError;
use crate::idempotency::{DEFAULT_RETENTION_HOURS, IdempotencyDecision, IdempotencyGuard};
use crate::metrics;
use crate::store::UnitOfWork;
use crate::types::{
    Event, EventId, IdempotencyKey, Order, OrderId, OrderStatus, PurchaseReceipt, PurchaserId,
    Ticket, UsedTicketPolicy,
};
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// Tunables of the purchase engine.
#[derive(Debug, Clone)]
pub struct PurchasePolicy {
    /// Maximum tickets in one order
    pub max_per_order: u32,
    /// Upper bound on a single payment gateway call
    pub payment_timeout: Duration,
    /// How long idempotency records are honored
    pub idempotency_retention: chrono::Duration,
    /// Treatment of used tickets during refunds
    pub used_ticket_policy: UsedTicketPolicy,
    /// Whole-attempt retries after a uniqueness conflict
    pub conflict_retries: u32,
}

impl Default for PurchasePolicy {
    fn default() -> Self {
        Self {
            max_per_order: 10,
            payment_timeout: Duration::from_secs(10),
            idempotency_retention: chrono::Duration::hours(DEFAULT_RETENTION_HOURS),
            used_ticket_policy: UsedTicketPolicy::RefundUnused,
            conflict_retries: 1,
        }
    }
}

/// Orders one idempotency key may place across expired records.
const MAX_KEY_GENERATIONS: u32 = 64;

enum Attempt {
    Completed(PurchaseReceipt),
    Replayed(PurchaseReceipt),
}

/// Executes purchases, refunds, redemptions and catalog changes.
#[derive(Clone)]
pub struct PurchaseEngine {
    pub(crate) env: PurchaseEnvironment,
    pub(crate) policy: PurchasePolicy,
    pub(crate) idempotency: IdempotencyGuard,
}

impl PurchaseEngine {
    /// Build an engine.
    #[must_use]
    pub fn new(env: PurchaseEnvironment, policy: PurchasePolicy) -> Self {
        let idempotency = IdempotencyGuard::new(env.store.clone(), policy.idempotency_retention);
        Self {
            env,
            policy,
            idempotency,
        }
    }

    /// Active policy
    #[must_use]
    pub const fn policy(&self) -> &PurchasePolicy {
        &self.policy
    }

    /// Idempotency guard, for retention sweeps.
    #[must_use]
    pub const fn idempotency(&self) -> &IdempotencyGuard {
        &self.idempotency
    }

    /// Delete idempotency records that expired before the engine clock's now.
    ///
    /// # Errors
    ///
    /// Returns [`PurchaseError::Internal`] on store failure.
    pub async fn purge_expired_idempotency(&self) -> Result<u64, PurchaseError> {
        self.idempotency.purge_expired(self.env.clock.now()).await
    }

    /// Buy `quantity` tickets for `event_id`.
    ///
    /// Retrying with the same `idempotency_key` returns the original receipt
    /// without debiting inventory or charging again.
    ///
    /// # Errors
    ///
    /// - [`PurchaseError::Validation`] for a bad quantity or key
    /// - [`PurchaseError::EventNotFound`] / [`PurchaseError::EventNotPurchasable`]
    /// - [`PurchaseError::InsufficientInventory`] when the event cannot cover
    ///   the request
    /// - [`PurchaseError::PaymentFailed`] on decline, gateway error or timeout
    /// - [`PurchaseError::IdempotencyKeyReused`] when the key belongs to a
    ///   different live purchase
    /// - [`PurchaseError::Conflict`] when a uniqueness conflict persists
    ///   after retrying
    /// - [`PurchaseError::Internal`] on store failure
    ///
    /// Every error leaves inventory, orders and tickets untouched.
    #[tracing::instrument(
        skip_all,
        fields(purchaser_id = %purchaser_id, event_id = %event_id, quantity = quantity)
    )]
    pub async fn purchase(
        &self,
        purchaser_id: PurchaserId,
        event_id: EventId,
        quantity: u32,
        idempotency_key: &str,
    ) -> Result<PurchaseReceipt, PurchaseError> {
        let result = self
            .purchase_with_retry(purchaser_id, event_id, quantity, idempotency_key)
            .await;

        match &result {
            Ok(Attempt::Completed(receipt)) => {
                metrics::record_purchase("confirmed");
                metrics::record_tickets_sold(receipt.quantity);
                tracing::info!(order_id = %receipt.order_id, "Purchase confirmed");
            }
            Ok(Attempt::Replayed(receipt)) => {
                metrics::record_purchase("replayed");
                tracing::info!(
                    order_id = %receipt.order_id,
                    "Returned stored purchase for idempotency key"
                );
            }
            Err(error) => {
                metrics::record_purchase(error.kind().as_str());
                tracing::warn!(error = %error, "Purchase failed");
            }
        }

        result.map(|attempt| match attempt {
            Attempt::Completed(receipt) | Attempt::Replayed(receipt) => receipt,
        })
    }

    async fn purchase_with_retry(
        &self,
        purchaser_id: PurchaserId,
        event_id: EventId,
        quantity: u32,
        idempotency_key: &str,
    ) -> Result<Attempt, PurchaseError> {
        self.validate_quantity(quantity)?;
        let key = IdempotencyKey::new(purchaser_id, idempotency_key)?;

        let mut retries = 0;
        loop {
            match self.attempt(&key, event_id, quantity).await {
                // Only store uniqueness conflicts are transient.
                Err(PurchaseError::Conflict(reason))
                    if retries < self.policy.conflict_retries =>
                {
                    retries += 1;
                    metrics::record_purchase_retry();
                    tracing::warn!(reason = %reason, retries, "Purchase conflicted, retrying");
                }
                result => return result,
            }
        }
    }

    fn validate_quantity(&self, quantity: u32) -> Result<(), PurchaseError> {
        if quantity == 0 || quantity > self.policy.max_per_order {
            return Err(PurchaseError::Validation(format!(
                "quantity must be between 1 and {}",
                self.policy.max_per_order
            )));
        }
        Ok(())
    }

    async fn attempt(
        &self,
        key: &IdempotencyKey,
        event_id: EventId,
        quantity: u32,
    ) -> Result<Attempt, PurchaseError> {
        let now = self.env.clock.now();

        if let IdempotencyDecision::Reuse(receipt) = self
            .idempotency
            .begin_or_reuse(key, event_id, quantity, now)
            .await?
        {
            return Ok(Attempt::Replayed(receipt));
        }

        let mut uow = self.env.store.begin().await?;
        let result = self
            .purchase_in(uow.as_mut(), key, event_id, quantity, now)
            .await;
        finish(uow, result).await
    }

    async fn purchase_in(
        &self,
        uow: &mut dyn UnitOfWork,
        key: &IdempotencyKey,
        event_id: EventId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<Attempt, PurchaseError> {
        // A concurrent request under the same key may have committed since the
        // lookup above; the in-transaction read waits for it.
        if let Some(record) = uow.find_idempotency(key).await? {
            if let IdempotencyDecision::Reuse(receipt) =
                IdempotencyGuard::decide(record, event_id, quantity, now)?
            {
                return Ok(Attempt::Replayed(receipt));
            }
        }

        let event = uow
            .event(event_id)
            .await?
            .ok_or(PurchaseError::EventNotFound(event_id))?;
        if let Some(reason) = event.unavailable_reason(now) {
            return Err(PurchaseError::EventNotPurchasable {
                event_id,
                reason: reason.to_string(),
            });
        }

        if !uow.try_debit(event_id, quantity).await? {
            // A delete that won the inventory lock leaves no counter behind.
            let inventory = uow
                .inventory(event_id)
                .await?
                .ok_or(PurchaseError::EventNotFound(event_id))?;
            return Err(PurchaseError::InsufficientInventory {
                event_id,
                requested: quantity,
                available: inventory.available,
            });
        }

        let order_id = unused_order_id(uow, key).await?;
        let mut order = pending_order(order_id, &event, key, quantity, now)?;
        uow.insert_order(&order).await?;

        let tickets: Vec<Ticket> = (0..quantity)
            .map(|_| Ticket::issue(order.id, self.env.codes.generate(), now))
            .collect();
        uow.insert_tickets(&tickets).await?;

        let reference = self.authorize_payment(&order).await?;
        order.payment_reference = Some(reference);
        order.transition(OrderStatus::Paid, now)?;
        order.transition(OrderStatus::Confirmed, now)?;
        uow.update_order(&order).await?;

        let receipt = PurchaseReceipt {
            order_id: order.id,
            event_id,
            quantity,
            ticket_codes: tickets.into_iter().map(|ticket| ticket.code).collect(),
            status: order.status,
            total_price: order.total_price,
            payment_reference: order.payment_reference.clone(),
        };
        let record = self.idempotency.record(key.clone(), &receipt, now);
        uow.save_idempotency(&record, now).await?;

        Ok(Attempt::Completed(receipt))
    }

    async fn authorize_payment(&self, order: &Order) -> Result<String, PurchaseError> {
        let started = Instant::now();
        let outcome = tokio::time::timeout(
            self.policy.payment_timeout,
            self.env
                .payments
                .authorize(order.id, order.total_price, order.purchaser_id),
        )
        .await;
        metrics::record_payment_duration(started.elapsed().as_secs_f64());

        match outcome {
            Err(_) => {
                tracing::warn!(
                    order_id = %order.id,
                    timeout_ms = self.policy.payment_timeout.as_millis(),
                    "Payment authorization timed out"
                );
                Err(PurchaseError::PaymentFailed(
                    "payment authorization timed out".to_string(),
                ))
            }
            Ok(Err(error)) => {
                tracing::warn!(order_id = %order.id, error = %error, "Payment gateway error");
                Err(PurchaseError::PaymentFailed(error.to_string()))
            }
            Ok(Ok(AuthorizationOutcome::Declined { reason })) => {
                tracing::info!(order_id = %order.id, reason = %reason, "Payment declined");
                Err(PurchaseError::PaymentFailed(format!("payment declined: {reason}")))
            }
            Ok(Ok(AuthorizationOutcome::Approved { reference })) => Ok(reference),
        }
    }
}

/// Committed orders keep their derived id, and a rolled-back attempt leaves
/// none behind, so the first free generation belongs to this purchase.
async fn unused_order_id(
    uow: &mut dyn UnitOfWork,
    key: &IdempotencyKey,
) -> Result<OrderId, PurchaseError> {
    for generation in 0..MAX_KEY_GENERATIONS {
        let candidate = OrderId::for_key(key, generation);
        if uow.order(candidate).await?.is_none() {
            return Ok(candidate);
        }
    }
    Err(PurchaseError::Validation(
        "idempotency key has been reused too many times".to_string(),
    ))
}

fn pending_order(
    id: OrderId,
    event: &Event,
    key: &IdempotencyKey,
    quantity: u32,
    now: DateTime<Utc>,
) -> Result<Order, PurchaseError> {
    let total_price = event
        .unit_price
        .checked_mul(quantity)
        .ok_or_else(|| PurchaseError::Validation("order total is too large".to_string()))?;
    Ok(Order {
        id,
        event_id: event.id,
        purchaser_id: key.purchaser_id(),
        quantity,
        unit_price: event.unit_price,
        total_price,
        status: OrderStatus::Pending,
        payment_reference: None,
        idempotency_key: key.nonce().to_string(),
        created_at: now,
        updated_at: now,
    })
}

/// Commit on success, roll back on failure.
pub(crate) async fn finish<T>(
    uow: Box<dyn UnitOfWork>,
    result: Result<T, PurchaseError>,
) -> Result<T, PurchaseError> {
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback_error) = uow.rollback().await {
                tracing::error!(error = %rollback_error, "Failed to roll back transaction");
            }
            Err(error)
        }
    }
}
