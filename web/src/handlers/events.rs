//! Event catalog endpoints.
//!
//! - POST /api/events - Publish an event with its ticket capacity
//! - GET /api/events - List events by start time, one page at a time
//! - GET /api/events/:id - Get event details
//! - PUT /api/events/:id - Edit title, venue, start time or price
//! - DELETE /api/events/:id - Delete an event nobody ordered from
//! - POST /api/events/:id/cancel - Cancel an event
//! - GET /api/events/:id/availability - Remaining inventory

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ticketing_core::types::{
    DEFAULT_PAGE_SIZE, Event, EventChanges, EventId, EventInventory, EventPage, Money, NewEvent,
};

/// Request to publish an event.
#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    /// Event title
    pub title: String,
    /// Venue name
    pub venue: String,
    /// Event start time
    pub starts_at: DateTime<Utc>,
    /// Price of one ticket in cents
    pub unit_price_cents: u64,
    /// Number of tickets on sale
    pub capacity: u32,
}

/// Request to edit an event. Omitted fields keep their value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateEventRequest {
    /// Updated title
    pub title: Option<String>,
    /// Updated venue
    pub venue: Option<String>,
    /// Updated start time
    pub starts_at: Option<DateTime<Utc>>,
    /// Updated ticket price in cents
    pub unit_price_cents: Option<u64>,
}

/// Query parameters for listing events.
#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    /// Page number (1-indexed)
    #[serde(default = "first_page")]
    pub page: u32,
    /// Page size (default: 10, max: 100)
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

const fn first_page() -> u32 {
    1
}

const fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// Remaining inventory of an event.
#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    /// Event ID
    pub event_id: EventId,
    /// Tickets the event was published with
    pub total_capacity: u32,
    /// Tickets still on sale
    pub available: u32,
    /// Tickets currently held by orders
    pub sold: u32,
}

impl From<EventInventory> for AvailabilityResponse {
    fn from(inventory: EventInventory) -> Self {
        Self {
            event_id: inventory.event_id,
            total_capacity: inventory.total_capacity,
            available: inventory.available,
            sold: inventory.total_capacity.saturating_sub(inventory.available),
        }
    }
}

/// Publish a new event.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/events \
///   -H "Content-Type: application/json" \
///   -d '{
///     "title": "Jakarta Jazz Night",
///     "venue": "Istora Senayan",
///     "starts_at": "2026-06-01T19:00:00Z",
///     "unit_price_cents": 150000,
///     "capacity": 500
///   }'
/// ```
///
/// # Errors
///
/// Returns 422 for a blank title or venue, a start time in the past, or a
/// zero capacity.
pub async fn create_event(
    State(state): State<AppState>,
    Json(request): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<Event>), AppError> {
    let event = state
        .engine
        .publish_event(NewEvent {
            title: request.title,
            venue: request.venue,
            starts_at: request.starts_at,
            unit_price: Money::from_cents(request.unit_price_cents),
            capacity: request.capacity,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(event)))
}

/// List events ordered by start time.
///
/// # Example
///
/// ```bash
/// curl "http://localhost:8080/api/events?page=2&page_size=20"
/// ```
///
/// # Errors
///
/// Returns 422 for a zero page or page size and 500 on store failure.
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<ListEventsQuery>,
) -> Result<Json<EventPage>, AppError> {
    Ok(Json(
        state.engine.list_events(query.page, query.page_size).await?,
    ))
}

/// Get one event.
///
/// # Errors
///
/// Returns 404 if the event does not exist.
pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> Result<Json<Event>, AppError> {
    Ok(Json(state.engine.get_event(event_id).await?))
}

/// Edit an event.
///
/// # Example
///
/// ```bash
/// curl -X PUT http://localhost:8080/api/events/550e8400-e29b-41d4-a716-446655440000 \
///   -H "Content-Type: application/json" \
///   -d '{ "venue": "Jakarta International Expo", "unit_price_cents": 175000 }'
/// ```
///
/// # Errors
///
/// Returns 404 if the event does not exist, 409 if it was cancelled, and 422
/// for a blank title or venue or a start time in the past.
pub async fn update_event(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
    Json(request): Json<UpdateEventRequest>,
) -> Result<Json<Event>, AppError> {
    let changes = EventChanges {
        title: request.title,
        venue: request.venue,
        starts_at: request.starts_at,
        unit_price: request.unit_price_cents.map(Money::from_cents),
    };
    Ok(Json(state.engine.update_event(event_id, changes).await?))
}

/// Delete an event.
///
/// # Errors
///
/// Returns 404 if the event does not exist and 409 once any order was placed
/// for it.
pub async fn delete_event(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> Result<StatusCode, AppError> {
    state.engine.delete_event(event_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Cancel an event. Existing orders stay refundable; cancelling twice
/// returns the cancelled event again.
///
/// # Errors
///
/// Returns 404 if the event does not exist.
pub async fn cancel_event(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> Result<Json<Event>, AppError> {
    Ok(Json(state.engine.cancel_event(event_id).await?))
}

/// Remaining inventory of an event.
///
/// # Errors
///
/// Returns 404 if the event does not exist.
pub async fn availability(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let inventory = state.engine.inventory(event_id).await?;
    Ok(Json(inventory.into()))
}
