//! Domain types for event ticketing.
//!
//! Value objects and entities shared by the purchase engine, the store
//! contracts and their implementations: events and their inventory counters,
//! orders, individual tickets and idempotency records.

use crate::error::PurchaseError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an event
    EventId
);
uuid_id!(
    /// Unique identifier for a purchase order
    OrderId
);
uuid_id!(
    /// Unique identifier for an issued ticket
    TicketId
);
uuid_id!(
    /// Identity of a purchaser, validated before it reaches the engine
    PurchaserId
);

// ============================================================================
// Money
// ============================================================================

/// Monetary amount in minor currency units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from minor units
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in minor units
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Multiplies by a unit count with overflow checking
    #[must_use]
    pub const fn checked_mul(self, count: u32) -> Option<Self> {
        match self.0.checked_mul(count as u64) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Adds two amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Events and inventory
// ============================================================================

/// Sales status of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Published and open for sales
    Published,
    /// Sales closed by the organizer
    SalesClosed,
    /// Event was cancelled
    Cancelled,
}

impl EventStatus {
    /// Convert status to its storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::SalesClosed => "sales_closed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse status from its storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "published" => Some(Self::Published),
            "sales_closed" => Some(Self::SalesClosed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ticketed event (concert, conference, etc.).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event identifier
    pub id: EventId,
    /// Display title
    pub title: String,
    /// Venue name
    pub venue: String,
    /// When the event starts
    pub starts_at: DateTime<Utc>,
    /// Price of a single ticket
    pub unit_price: Money,
    /// Sales status
    pub status: EventStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Reason the event cannot be purchased at `now`, if any.
    #[must_use]
    pub fn unavailable_reason(&self, now: DateTime<Utc>) -> Option<&'static str> {
        match self.status {
            EventStatus::Cancelled => Some("event has been cancelled"),
            EventStatus::SalesClosed => Some("ticket sales are closed"),
            EventStatus::Published if self.starts_at <= now => Some("event has already started"),
            EventStatus::Published => None,
        }
    }
}

/// Parameters for publishing a new event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewEvent {
    /// Display title
    pub title: String,
    /// Venue name
    pub venue: String,
    /// When the event starts
    pub starts_at: DateTime<Utc>,
    /// Price of a single ticket
    pub unit_price: Money,
    /// Number of tickets that can ever be sold
    pub capacity: u32,
}

/// Edits to an existing event. `None` keeps the current value.
///
/// Capacity is fixed once published. A new price applies to later orders
/// only; existing orders keep the price they were placed at.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventChanges {
    /// New title
    pub title: Option<String>,
    /// New venue
    pub venue: Option<String>,
    /// New start time
    pub starts_at: Option<DateTime<Utc>>,
    /// New ticket price
    pub unit_price: Option<Money>,
}

impl EventChanges {
    /// True when no field would change.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.venue.is_none()
            && self.starts_at.is_none()
            && self.unit_price.is_none()
    }
}

/// Events per page when the caller does not ask for a size.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Largest page of events served at once.
pub const MAX_PAGE_SIZE: u32 = 100;

/// One page of the event catalog, soonest first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPage {
    /// Events on this page
    pub events: Vec<Event>,
    /// Events in the whole catalog
    pub total: u64,
    /// 1-based page number
    pub page: u32,
    /// Page size used
    pub page_size: u32,
}

/// Per-event ticket counter.
///
/// `available` never drops below zero and never exceeds `total_capacity`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInventory {
    /// Event this counter belongs to
    pub event_id: EventId,
    /// Total number of tickets for the event
    pub total_capacity: u32,
    /// Tickets still available for purchase
    pub available: u32,
    /// Incremented on every mutation
    pub version: i64,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl EventInventory {
    /// Fresh inventory with every ticket available.
    #[must_use]
    pub const fn new(event_id: EventId, total_capacity: u32, now: DateTime<Utc>) -> Self {
        Self {
            event_id,
            total_capacity,
            available: total_capacity,
            version: 0,
            updated_at: now,
        }
    }

    /// Tickets currently debited from the counter.
    #[must_use]
    pub const fn sold(&self) -> u32 {
        self.total_capacity.saturating_sub(self.available)
    }
}

// ============================================================================
// Orders
// ============================================================================

/// Order lifecycle status.
///
/// ```text
/// Pending ──► Paid ──► Confirmed ──► Refunded
///    │         │          ▲
///    │         ▼          │
///    ├────► Cancelled     │
///    └────────────────────┘
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order row written, payment not yet authorized
    Pending,
    /// Payment authorized
    Paid,
    /// Tickets issued and valid
    Confirmed,
    /// Abandoned before confirmation (terminal)
    Cancelled,
    /// Reversed after confirmation (terminal)
    Refunded,
}

impl OrderStatus {
    /// Convert status to its storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    /// Parse status from its storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "confirmed" => Some(Self::Confirmed),
            "cancelled" => Some(Self::Cancelled),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }

    /// Terminal statuses never transition again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Refunded)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Paid | Self::Confirmed | Self::Cancelled)
                | (Self::Paid, Self::Confirmed | Self::Cancelled)
                | (Self::Confirmed, Self::Refunded)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A purchase order for one event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order identifier
    pub id: OrderId,
    /// Event the tickets are for
    pub event_id: EventId,
    /// Purchaser owning the order
    pub purchaser_id: PurchaserId,
    /// Number of tickets (one ticket row per unit)
    pub quantity: u32,
    /// Price per ticket at purchase time
    pub unit_price: Money,
    /// `unit_price * quantity`
    pub total_price: Money,
    /// Current lifecycle status
    pub status: OrderStatus,
    /// Reference returned by the payment gateway
    pub payment_reference: Option<String>,
    /// Client nonce the order was created under
    pub idempotency_key: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Move to `next`, enforcing the lifecycle.
    ///
    /// # Errors
    ///
    /// Returns [`PurchaseError::InvalidTransition`] when the lifecycle forbids
    /// the move (including any move out of a terminal status).
    pub fn transition(
        &mut self,
        next: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PurchaseError> {
        if !self.status.can_transition_to(next) {
            return Err(PurchaseError::InvalidTransition {
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

// ============================================================================
// Tickets
// ============================================================================

/// Ticket lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Admits entry
    Valid,
    /// Scanned at the door
    Used,
    /// Voided by a refund
    Cancelled,
    /// Handed over to another holder
    Transferred,
}

impl TicketStatus {
    /// Convert status to its storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Used => "used",
            Self::Cancelled => "cancelled",
            Self::Transferred => "transferred",
        }
    }

    /// Parse status from its storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "valid" => Some(Self::Valid),
            "used" => Some(Self::Used),
            "cancelled" => Some(Self::Cancelled),
            "transferred" => Some(Self::Transferred),
            _ => None,
        }
    }

    /// Only valid tickets can change status.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Valid, Self::Used | Self::Cancelled | Self::Transferred)
        )
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Printed/scanned code identifying a ticket at the door.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketCode(String);

impl TicketCode {
    /// Wrap an already generated code.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Borrow the code as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One admission right belonging to an order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket identifier
    pub id: TicketId,
    /// Parent order
    pub order_id: OrderId,
    /// Unique admission code
    pub code: TicketCode,
    /// Current lifecycle status
    pub status: TicketStatus,
    /// First redemption time, written once
    pub used_at: Option<DateTime<Utc>>,
    /// Issue timestamp
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    /// Issue a new valid ticket for `order_id`.
    #[must_use]
    pub fn issue(order_id: OrderId, code: TicketCode, now: DateTime<Utc>) -> Self {
        Self {
            id: TicketId::new(),
            order_id,
            code,
            status: TicketStatus::Valid,
            used_at: None,
            created_at: now,
        }
    }

    /// Move to `next`, stamping `used_at` on first use.
    ///
    /// # Errors
    ///
    /// Returns [`PurchaseError::InvalidTransition`] if the ticket is no longer
    /// valid.
    pub fn transition(
        &mut self,
        next: TicketStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PurchaseError> {
        if !self.status.can_transition_to(next) {
            return Err(PurchaseError::InvalidTransition {
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        if next == TicketStatus::Used && self.used_at.is_none() {
            self.used_at = Some(now);
        }
        self.status = next;
        Ok(())
    }
}

// ============================================================================
// Idempotency
// ============================================================================

/// Minimum accepted length of a client idempotency nonce.
pub const MIN_IDEMPOTENCY_KEY_LEN: usize = 16;

/// Maximum accepted length of a client idempotency nonce.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// Idempotency key scoped to a purchaser, so keys never collide across users.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey {
    purchaser_id: PurchaserId,
    nonce: String,
}

impl IdempotencyKey {
    /// Build a key from a client-supplied nonce.
    ///
    /// # Errors
    ///
    /// Returns [`PurchaseError::Validation`] if the nonce is outside
    /// 16..=128 characters or contains whitespace/control characters.
    pub fn new(purchaser_id: PurchaserId, nonce: &str) -> Result<Self, PurchaseError> {
        let len = nonce.chars().count();
        if !(MIN_IDEMPOTENCY_KEY_LEN..=MAX_IDEMPOTENCY_KEY_LEN).contains(&len) {
            return Err(PurchaseError::Validation(format!(
                "Idempotency key must be between {MIN_IDEMPOTENCY_KEY_LEN} and \
                 {MAX_IDEMPOTENCY_KEY_LEN} characters"
            )));
        }
        if nonce.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(PurchaseError::Validation(
                "Idempotency key must not contain whitespace or control characters".to_string(),
            ));
        }
        Ok(Self {
            purchaser_id,
            nonce: nonce.to_string(),
        })
    }

    /// Purchaser the key is scoped to
    #[must_use]
    pub const fn purchaser_id(&self) -> PurchaserId {
        self.purchaser_id
    }

    /// Client-supplied nonce
    #[must_use]
    pub fn nonce(&self) -> &str {
        &self.nonce
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.purchaser_id, self.nonce)
    }
}

/// Namespace of order ids derived from idempotency keys.
const ORDER_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_93b7_4d0a_8e51_c3f9_27d4_b860);

impl OrderId {
    /// Id of the `generation`-th order placed under `key`.
    ///
    /// Every attempt of one purchase derives the same id, so the payment
    /// gateway recognizes a retried charge. A key whose record expired moves
    /// on to the next generation.
    #[must_use]
    pub fn for_key(key: &IdempotencyKey, generation: u32) -> Self {
        let name = format!("{key}#{generation}");
        Self(Uuid::new_v5(&ORDER_ID_NAMESPACE, name.as_bytes()))
    }
}

/// Outcome of a completed purchase, returned to callers and replayed on retry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    /// Created order
    pub order_id: OrderId,
    /// Event purchased
    pub event_id: EventId,
    /// Number of tickets
    pub quantity: u32,
    /// Codes of the issued tickets
    pub ticket_codes: Vec<TicketCode>,
    /// Final order status
    pub status: OrderStatus,
    /// Amount charged
    pub total_price: Money,
    /// Payment gateway reference
    pub payment_reference: Option<String>,
}

/// Stored mapping from an idempotency key to its purchase outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// Purchaser-scoped key
    pub key: IdempotencyKey,
    /// Event requested under this key
    pub event_id: EventId,
    /// Quantity requested under this key
    pub quantity: u32,
    /// Resulting order
    pub order_id: OrderId,
    /// Result replayed to retries
    pub receipt: PurchaseReceipt,
    /// First attempt time
    pub created_at: DateTime<Utc>,
    /// End of the retention window
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// Expired records are treated as if they never existed.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether a retry asks for the same purchase as the original request.
    #[must_use]
    pub fn matches_request(&self, event_id: EventId, quantity: u32) -> bool {
        self.event_id == event_id && self.quantity == quantity
    }
}

// ============================================================================
// Query and refund results
// ============================================================================

/// An order together with its tickets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    /// The order
    pub order: Order,
    /// Child tickets
    pub tickets: Vec<Ticket>,
}

/// How a refund treats tickets that were already used or transferred.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsedTicketPolicy {
    /// Refund and credit only the still-valid tickets; flag the rest for
    /// manual reconciliation.
    #[default]
    RefundUnused,
    /// Refuse the whole refund if any ticket is no longer valid.
    Reject,
}

impl UsedTicketPolicy {
    /// Parse the policy from configuration.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "refund_unused" | "partial" => Some(Self::RefundUnused),
            "reject" | "block" => Some(Self::Reject),
            _ => None,
        }
    }
}

/// Outcome of a refund.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundReceipt {
    /// Refunded order
    pub order_id: OrderId,
    /// Final order status
    pub status: OrderStatus,
    /// Tickets voided by the refund
    pub cancelled_tickets: Vec<TicketCode>,
    /// Tickets left untouched because they were used or transferred
    pub flagged_for_reconciliation: Vec<TicketCode>,
    /// Tickets credited back to the event inventory
    pub credited: u32,
    /// Amount returned to the purchaser
    pub refund_amount: Money,
    /// Gateway refund reference, when money moved
    pub refund_reference: Option<String>,
}
