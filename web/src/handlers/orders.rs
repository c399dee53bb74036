//! Order endpoints.
//!
//! Every route requires `X-Purchaser-Id`. Orders of other purchasers are
//! reported as not found.
//!
//! - POST /api/orders - Buy tickets (requires `Idempotency-Key`)
//! - GET /api/orders - The purchaser's orders, newest first
//! - GET /api/orders/:id - One order with its tickets
//! - POST /api/orders/:id/refund - Refund an order

use crate::error::AppError;
use crate::extractors::{IdempotencyKeyHeader, Purchaser};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use ticketing_core::types::{
    EventId, Order, OrderDetails, OrderId, PurchaseReceipt, PurchaserId, RefundReceipt,
};

/// Request to buy tickets.
#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    /// Event to buy for
    pub event_id: EventId,
    /// Number of tickets
    pub quantity: u32,
}

/// Buy tickets.
///
/// Retrying with the same `Idempotency-Key` returns the original receipt
/// without charging again.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/orders \
///   -H "X-Purchaser-Id: 6f1c2a9e-0d2b-4a8e-9f55-0b7e4c1d2a33" \
///   -H "Idempotency-Key: checkout-7f3a9c2e41d8" \
///   -H "Content-Type: application/json" \
///   -d '{"event_id": "…", "quantity": 2}'
/// ```
///
/// # Errors
///
/// - 422 for a bad quantity or key
/// - 404 for an unknown event, 409 when it is not on sale
/// - 409 when inventory cannot cover the request or the key was used for a
///   different purchase
/// - 402 when payment fails
pub async fn purchase(
    State(state): State<AppState>,
    Purchaser(purchaser_id): Purchaser,
    IdempotencyKeyHeader(key): IdempotencyKeyHeader,
    Json(request): Json<PurchaseRequest>,
) -> Result<(StatusCode, Json<PurchaseReceipt>), AppError> {
    let receipt = state
        .engine
        .purchase(purchaser_id, request.event_id, request.quantity, &key)
        .await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

/// The purchaser's orders, newest first.
///
/// # Errors
///
/// Returns 500 on store failure.
pub async fn list_orders(
    State(state): State<AppState>,
    Purchaser(purchaser_id): Purchaser,
) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(state.engine.list_orders(purchaser_id).await?))
}

/// One order with its tickets.
///
/// # Errors
///
/// Returns 404 if the order does not exist or belongs to someone else.
pub async fn get_order(
    State(state): State<AppState>,
    Purchaser(purchaser_id): Purchaser,
    Path(order_id): Path<OrderId>,
) -> Result<Json<OrderDetails>, AppError> {
    Ok(Json(owned_order(&state, purchaser_id, order_id).await?))
}

/// Refund an order, voiding its tickets and returning them to inventory.
///
/// # Errors
///
/// - 404 if the order does not exist or belongs to someone else
/// - 409 if the order is not refundable or used tickets block the refund
/// - 402 if the payment processor refuses the refund
pub async fn refund_order(
    State(state): State<AppState>,
    Purchaser(purchaser_id): Purchaser,
    Path(order_id): Path<OrderId>,
) -> Result<Json<RefundReceipt>, AppError> {
    owned_order(&state, purchaser_id, order_id).await?;
    Ok(Json(state.engine.refund(order_id).await?))
}

async fn owned_order(
    state: &AppState,
    purchaser_id: PurchaserId,
    order_id: OrderId,
) -> Result<OrderDetails, AppError> {
    let details = state.engine.get_order(order_id).await?;
    if details.order.purchaser_id != purchaser_id {
        return Err(AppError::not_found("Order", order_id));
    }
    Ok(details)
}
