//! Sandbox payment gateway for development deployments.
//!
//! Approves every authorization and refund. Production deployments plug a
//! real processor in behind [`PaymentGateway`].

use futures::future::BoxFuture;
use std::sync::Arc;
use ticketing_core::environment::{AuthorizationOutcome, PaymentError, PaymentGateway};
use ticketing_core::types::{Money, OrderId, PurchaserId};

/// Gateway that always approves.
///
/// Authorization and refund references are derived from the order id, so
/// repeating either call for one order returns the same reference.
#[derive(Clone, Debug, Default)]
pub struct SandboxPaymentGateway;

impl SandboxPaymentGateway {
    /// Creates a new sandbox gateway
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Creates an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared(self) -> Arc<dyn PaymentGateway> {
        Arc::new(self)
    }
}

impl PaymentGateway for SandboxPaymentGateway {
    fn authorize(
        &self,
        order_id: OrderId,
        amount: Money,
        purchaser_id: PurchaserId,
    ) -> BoxFuture<'_, Result<AuthorizationOutcome, PaymentError>> {
        Box::pin(async move {
            let reference = format!("sandbox_txn_{}", order_id.as_uuid().simple());

            tracing::info!(
                order_id = %order_id,
                purchaser_id = %purchaser_id,
                amount = amount.cents(),
                reference = %reference,
                "Sandbox payment approved"
            );

            Ok(AuthorizationOutcome::Approved { reference })
        })
    }

    fn refund<'a>(
        &'a self,
        order_id: OrderId,
        reference: &'a str,
        amount: Money,
    ) -> BoxFuture<'a, Result<String, PaymentError>> {
        Box::pin(async move {
            let refund_id = format!("sandbox_refund_{}", order_id.as_uuid().simple());

            tracing::info!(
                order_id = %order_id,
                reference = %reference,
                amount = amount.cents(),
                refund_id = %refund_id,
                "Sandbox refund processed"
            );

            Ok(refund_id)
        })
    }
}
