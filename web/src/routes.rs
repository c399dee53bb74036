//! Router configuration for the ticketing server.
//!
//! Builds the complete Axum router with all endpoints.

use crate::handlers::{events, health_check, orders, tickets};
use crate::middleware::with_request_tracking;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};

/// Build the application router.
///
/// # Routes
///
/// ```text
/// GET  /health
/// POST /api/events
/// GET  /api/events
/// GET  /api/events/:id
/// PUT  /api/events/:id
/// DELETE /api/events/:id
/// POST /api/events/:id/cancel
/// GET  /api/events/:id/availability
/// POST /api/orders
/// GET  /api/orders
/// GET  /api/orders/:id
/// POST /api/orders/:id/refund
/// POST /api/tickets/:code/redeem
/// ```
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Event catalog
        .route("/events", post(events::create_event).get(events::list_events))
        .route(
            "/events/:id",
            get(events::get_event)
                .put(events::update_event)
                .delete(events::delete_event),
        )
        .route("/events/:id/cancel", post(events::cancel_event))
        .route("/events/:id/availability", get(events::availability))
        // Orders
        .route("/orders", post(orders::purchase).get(orders::list_orders))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/refund", post(orders::refund_order))
        // Gate
        .route("/tickets/:code/redeem", post(tickets::redeem_ticket));

    let router = Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes);

    with_request_tracking(router).with_state(state)
}
