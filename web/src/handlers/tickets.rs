//! Ticket endpoints.
//!
//! - POST /api/tickets/:code/redeem - Mark a ticket used at the gate

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use ticketing_core::types::{Ticket, TicketCode};

/// Redeem a ticket at the gate.
///
/// # Errors
///
/// Returns 404 for an unknown code and 409 if the ticket was already used
/// or was cancelled by a refund.
pub async fn redeem_ticket(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Ticket>, AppError> {
    let ticket = state.engine.redeem_ticket(&TicketCode::new(code)).await?;
    Ok(Json(ticket))
}
