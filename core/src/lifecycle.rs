//! Post-purchase order and ticket lifecycle: refunds and redemption.

use crate::error::PurchaseError;
use crate::metrics;
use crate::purchase::{PurchaseEngine, finish};
use crate::store::UnitOfWork;
use crate::types::{
    Money, Order, OrderId, OrderStatus, RefundReceipt, Ticket, TicketCode, TicketStatus,
    UsedTicketPolicy,
};
use chrono::{DateTime, Utc};

impl PurchaseEngine {
    /// Refund a confirmed order.
    ///
    /// Valid tickets are cancelled and credited back to the event inventory.
    /// Tickets already used or transferred are handled by the configured
    /// [`UsedTicketPolicy`]: excluded and flagged for reconciliation, or the
    /// whole refund is refused. The ticket updates, inventory credit and
    /// order status change commit together.
    ///
    /// # Errors
    ///
    /// - [`PurchaseError::OrderNotFound`] for an unknown order
    /// - [`PurchaseError::InvalidTransition`] unless the order is confirmed
    /// - [`PurchaseError::RefundBlocked`] under [`UsedTicketPolicy::Reject`]
    /// - [`PurchaseError::PaymentFailed`] if the gateway refuses the refund
    /// - [`PurchaseError::Internal`] on store failure or an inventory credit
    ///   that would exceed capacity
    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn refund(&self, order_id: OrderId) -> Result<RefundReceipt, PurchaseError> {
        let now = self.env.clock.now();
        let mut uow = self.env.store.begin().await?;
        let result = self.refund_in(uow.as_mut(), order_id, now).await;
        let receipt = finish(uow, result).await?;

        metrics::record_refund(receipt.credited);
        tracing::info!(
            credited = receipt.credited,
            flagged = receipt.flagged_for_reconciliation.len(),
            refund_amount = receipt.refund_amount.cents(),
            "Order refunded"
        );
        Ok(receipt)
    }

    async fn refund_in(
        &self,
        uow: &mut dyn UnitOfWork,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<RefundReceipt, PurchaseError> {
        let mut order = uow
            .lock_order(order_id)
            .await?
            .ok_or(PurchaseError::OrderNotFound(order_id))?;
        if !order.status.can_transition_to(OrderStatus::Refunded) {
            return Err(PurchaseError::InvalidTransition {
                from: order.status.as_str(),
                to: OrderStatus::Refunded.as_str(),
            });
        }

        let (mut refundable, retained): (Vec<Ticket>, Vec<Ticket>) = uow
            .tickets_for_order(order_id)
            .await?
            .into_iter()
            .partition(|ticket| ticket.status == TicketStatus::Valid);

        let flagged: Vec<TicketCode> = retained
            .into_iter()
            .filter(|ticket| ticket.status != TicketStatus::Cancelled)
            .map(|ticket| ticket.code)
            .collect();
        if !flagged.is_empty() && self.policy.used_ticket_policy == UsedTicketPolicy::Reject {
            return Err(PurchaseError::RefundBlocked {
                used: flagged.len(),
            });
        }

        let credited = u32::try_from(refundable.len())
            .map_err(|_| PurchaseError::Internal("ticket count out of range".to_string()))?;
        if credited > 0 && !uow.credit(order.event_id, credited).await? {
            tracing::error!(
                event_id = %order.event_id,
                credited,
                "Refund credit would exceed event capacity"
            );
            return Err(PurchaseError::Internal(
                "inventory credit exceeds capacity".to_string(),
            ));
        }

        for ticket in &mut refundable {
            ticket.transition(TicketStatus::Cancelled, now)?;
            uow.update_ticket(ticket).await?;
        }

        let refund_amount = order
            .unit_price
            .checked_mul(credited)
            .ok_or_else(|| PurchaseError::Internal("refund amount out of range".to_string()))?;

        order.transition(OrderStatus::Refunded, now)?;
        uow.update_order(&order).await?;

        // Gateway refund runs after every store write of the unit.
        let refund_reference = self.refund_payment(&order, refund_amount).await?;

        Ok(RefundReceipt {
            order_id,
            status: order.status,
            cancelled_tickets: refundable.into_iter().map(|ticket| ticket.code).collect(),
            flagged_for_reconciliation: flagged,
            credited,
            refund_amount,
            refund_reference,
        })
    }

    async fn refund_payment(
        &self,
        order: &Order,
        amount: Money,
    ) -> Result<Option<String>, PurchaseError> {
        let Some(reference) = order.payment_reference.as_deref() else {
            return Ok(None);
        };
        if amount.is_zero() {
            return Ok(None);
        }

        match tokio::time::timeout(
            self.policy.payment_timeout,
            self.env.payments.refund(order.id, reference, amount),
        )
        .await
        {
            Ok(Ok(refund_reference)) => Ok(Some(refund_reference)),
            Ok(Err(error)) => {
                tracing::warn!(order_id = %order.id, error = %error, "Gateway refund failed");
                Err(PurchaseError::PaymentFailed(error.to_string()))
            }
            Err(_) => {
                tracing::warn!(order_id = %order.id, "Gateway refund timed out");
                Err(PurchaseError::PaymentFailed("refund timed out".to_string()))
            }
        }
    }

    /// Mark a ticket as used at the door.
    ///
    /// # Errors
    ///
    /// - [`PurchaseError::TicketNotFound`] for an unknown code
    /// - [`PurchaseError::TicketNotRedeemable`] if the ticket is not valid or
    ///   its order is not confirmed
    /// - [`PurchaseError::Internal`] on store failure
    #[tracing::instrument(skip(self), fields(code = %code))]
    pub async fn redeem_ticket(&self, code: &TicketCode) -> Result<Ticket, PurchaseError> {
        let now = self.env.clock.now();
        let mut uow = self.env.store.begin().await?;
        let result = redeem_in(uow.as_mut(), code, now).await;
        let ticket = finish(uow, result).await?;

        metrics::record_redemption();
        tracing::info!(ticket_id = %ticket.id, order_id = %ticket.order_id, "Ticket redeemed");
        Ok(ticket)
    }
}

async fn redeem_in(
    uow: &mut dyn UnitOfWork,
    code: &TicketCode,
    now: DateTime<Utc>,
) -> Result<Ticket, PurchaseError> {
    let mut ticket = uow
        .lock_ticket_by_code(code)
        .await?
        .ok_or(PurchaseError::TicketNotFound)?;
    if ticket.status != TicketStatus::Valid {
        return Err(PurchaseError::TicketNotRedeemable {
            status: ticket.status.as_str(),
        });
    }

    let order = uow
        .order(ticket.order_id)
        .await?
        .ok_or_else(|| PurchaseError::Internal("ticket without order".to_string()))?;
    if order.status != OrderStatus::Confirmed {
        return Err(PurchaseError::TicketNotRedeemable {
            status: order.status.as_str(),
        });
    }

    ticket.transition(TicketStatus::Used, now)?;
    uow.update_ticket(&ticket).await?;
    Ok(ticket)
}
