//! Storage contracts for the ticketing engine.
//!
//! All mutations happen inside a [`UnitOfWork`] opened with
//! [`TicketingStore::begin`]. A unit of work is one database transaction:
//! it is either committed as a whole or rolled back as a whole. Dropping a
//! unit of work without committing rolls it back, so a cancelled caller
//! never leaves a partial purchase behind.
//!
//! # Inventory
//!
//! [`InventoryStore::try_debit`] must be a single atomic conditional write,
//! never a read followed by a write:
//!
//! ```sql
//! UPDATE event_inventory
//!    SET available = available - $2, version = version + 1
//!  WHERE event_id = $1 AND available >= $2
//! ```
//!
//! Zero affected rows means there were not enough tickets.

use crate::error::StoreError;
use crate::types::{
    Event, EventId, EventInventory, IdempotencyKey, IdempotencyRecord, Order, OrderDetails,
    OrderId, PurchaserId, Ticket, TicketCode,
};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

/// Store result alias.
pub type StoreResult<T> = Result<T, StoreError>;

/// Inventory counter operations.
pub trait InventoryStore: Send {
    /// Read the counter for an event.
    fn inventory(
        &mut self,
        event_id: EventId,
    ) -> BoxFuture<'_, StoreResult<Option<EventInventory>>>;

    /// Read the counter and lock it for the rest of the transaction. Holding
    /// this lock keeps purchases from debiting the event.
    fn lock_inventory(
        &mut self,
        event_id: EventId,
    ) -> BoxFuture<'_, StoreResult<Option<EventInventory>>>;

    /// Atomically take `quantity` tickets. Returns `false`, changing nothing,
    /// when fewer than `quantity` are available.
    fn try_debit(&mut self, event_id: EventId, quantity: u32) -> BoxFuture<'_, StoreResult<bool>>;

    /// Atomically give back `quantity` tickets. Returns `false`, changing
    /// nothing, when the credit would exceed total capacity.
    fn credit(&mut self, event_id: EventId, quantity: u32) -> BoxFuture<'_, StoreResult<bool>>;
}

/// Order and ticket rows.
pub trait OrderStore: Send {
    /// Insert a new order.
    fn insert_order<'a>(&'a mut self, order: &'a Order) -> BoxFuture<'a, StoreResult<()>>;

    /// Insert tickets. A duplicate code fails with
    /// [`StoreError::UniqueViolation`].
    fn insert_tickets<'a>(&'a mut self, tickets: &'a [Ticket]) -> BoxFuture<'a, StoreResult<()>>;

    /// Persist status, payment reference and `updated_at` of an order.
    fn update_order<'a>(&'a mut self, order: &'a Order) -> BoxFuture<'a, StoreResult<()>>;

    /// Read an order without locking it.
    fn order(&mut self, order_id: OrderId) -> BoxFuture<'_, StoreResult<Option<Order>>>;

    /// Read an order and lock it for the rest of the transaction.
    fn lock_order(&mut self, order_id: OrderId) -> BoxFuture<'_, StoreResult<Option<Order>>>;

    /// Tickets belonging to an order, in issue order, locked for the rest of
    /// the transaction.
    ///
    /// Lock order is order row first, then ticket rows; a ticket locked on its
    /// own (see [`OrderStore::lock_ticket_by_code`]) must not be followed by
    /// an order lock in the same transaction.
    fn tickets_for_order(&mut self, order_id: OrderId) -> BoxFuture<'_, StoreResult<Vec<Ticket>>>;

    /// Read a ticket by code and lock it for the rest of the transaction.
    fn lock_ticket_by_code<'a>(
        &'a mut self,
        code: &'a TicketCode,
    ) -> BoxFuture<'a, StoreResult<Option<Ticket>>>;

    /// Persist status and `used_at` of a ticket.
    fn update_ticket<'a>(&'a mut self, ticket: &'a Ticket) -> BoxFuture<'a, StoreResult<()>>;

    /// Orders of any status placed for an event.
    fn count_orders_for_event(&mut self, event_id: EventId) -> BoxFuture<'_, StoreResult<u64>>;
}

/// Idempotency records.
pub trait IdempotencyStore: Send {
    /// Read the record for a key, expired or not.
    ///
    /// Also serializes the transaction against any other transaction that
    /// looks up the same key, until commit or rollback.
    fn find_idempotency<'a>(
        &'a mut self,
        key: &'a IdempotencyKey,
    ) -> BoxFuture<'a, StoreResult<Option<IdempotencyRecord>>>;

    /// Save a record. An existing record is replaced only if it expired
    /// before `now`; a live one fails with [`StoreError::UniqueViolation`].
    fn save_idempotency<'a>(
        &'a mut self,
        record: &'a IdempotencyRecord,
        now: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<()>>;
}

/// Event rows.
pub trait EventCatalog: Send {
    /// Insert an event together with its inventory counter.
    fn insert_event<'a>(
        &'a mut self,
        event: &'a Event,
        inventory: &'a EventInventory,
    ) -> BoxFuture<'a, StoreResult<()>>;

    /// Read an event.
    fn event(&mut self, event_id: EventId) -> BoxFuture<'_, StoreResult<Option<Event>>>;

    /// Read an event and lock it for the rest of the transaction.
    fn lock_event(&mut self, event_id: EventId) -> BoxFuture<'_, StoreResult<Option<Event>>>;

    /// Persist every mutable field of an event: title, venue, start time,
    /// price, status and `updated_at`.
    fn update_event<'a>(&'a mut self, event: &'a Event) -> BoxFuture<'a, StoreResult<()>>;

    /// Remove an event together with its inventory counter. Fails with
    /// [`StoreError::NotFound`] for an unknown event.
    fn delete_event(&mut self, event_id: EventId) -> BoxFuture<'_, StoreResult<()>>;
}

/// One atomic transaction over every store.
pub trait UnitOfWork: InventoryStore + OrderStore + IdempotencyStore + EventCatalog {
    /// Make every write of this unit visible.
    fn commit(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>>;

    /// Discard every write of this unit.
    fn rollback(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>>;
}

/// Entry point to ticketing storage.
pub trait TicketingStore: Send + Sync {
    /// Open a transaction.
    fn begin(&self) -> BoxFuture<'_, StoreResult<Box<dyn UnitOfWork>>>;

    /// Read an order with its tickets.
    fn get_order(&self, order_id: OrderId) -> BoxFuture<'_, StoreResult<Option<OrderDetails>>>;

    /// Orders of a purchaser, newest first.
    fn list_orders(&self, purchaser_id: PurchaserId) -> BoxFuture<'_, StoreResult<Vec<Order>>>;

    /// Read an event.
    fn get_event(&self, event_id: EventId) -> BoxFuture<'_, StoreResult<Option<Event>>>;

    /// Up to `limit` events after skipping `offset`, soonest first.
    fn list_events(&self, offset: u64, limit: u32) -> BoxFuture<'_, StoreResult<Vec<Event>>>;

    /// Number of events in the catalog.
    fn count_events(&self) -> BoxFuture<'_, StoreResult<u64>>;

    /// Read the inventory counter for an event.
    fn get_inventory(
        &self,
        event_id: EventId,
    ) -> BoxFuture<'_, StoreResult<Option<EventInventory>>>;

    /// Read an idempotency record outside any transaction.
    fn lookup_idempotency<'a>(
        &'a self,
        key: &'a IdempotencyKey,
    ) -> BoxFuture<'a, StoreResult<Option<IdempotencyRecord>>>;

    /// Delete idempotency records that expired before `now`, returning how
    /// many were removed.
    fn purge_expired_idempotency(&self, now: DateTime<Utc>) -> BoxFuture<'_, StoreResult<u64>>;
}
