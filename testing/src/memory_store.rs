//! In-memory [`TicketingStore`] with real transaction semantics.
//!
//! Units of work hold an exclusive lock on the whole state, so transactions
//! are serialized. The state is snapshotted when a unit of work begins and
//! restored if it is rolled back or dropped without committing.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use ticketing_core::error::StoreError;
use ticketing_core::store::{
    EventCatalog, IdempotencyStore, InventoryStore, OrderStore, StoreResult, TicketingStore,
    UnitOfWork,
};
use ticketing_core::types::{
    Event, EventId, EventInventory, IdempotencyKey, IdempotencyRecord, Order, OrderDetails,
    OrderId, PurchaserId, Ticket, TicketCode, TicketStatus,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Debug, Default)]
struct State {
    events: HashMap<EventId, Event>,
    inventory: HashMap<EventId, EventInventory>,
    orders: Vec<Order>,
    tickets: Vec<Ticket>,
    idempotency: HashMap<IdempotencyKey, IdempotencyRecord>,
}

impl State {
    fn order_mut(&mut self, order_id: OrderId) -> Option<&mut Order> {
        self.orders.iter_mut().find(|order| order.id == order_id)
    }

    fn order(&self, order_id: OrderId) -> Option<&Order> {
        self.orders.iter().find(|order| order.id == order_id)
    }

    fn tickets_for(&self, order_id: OrderId) -> Vec<Ticket> {
        self.tickets
            .iter()
            .filter(|ticket| ticket.order_id == order_id)
            .cloned()
            .collect()
    }
}

/// In-memory ticketing store.
#[derive(Clone, Default)]
pub struct InMemoryTicketingStore {
    state: Arc<Mutex<State>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl InMemoryTicketingStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail (and roll back) with a database error.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Number of tickets stored.
    pub async fn ticket_count(&self) -> usize {
        self.state.lock().await.tickets.len()
    }

    /// Number of idempotency records stored.
    pub async fn idempotency_count(&self) -> usize {
        self.state.lock().await.idempotency.len()
    }

    /// Overwrite a ticket's status, bypassing the lifecycle. Used to set up
    /// states the engine has no operation for, such as transferred tickets.
    pub async fn force_ticket_status(&self, code: &TicketCode, status: TicketStatus) -> bool {
        let mut state = self.state.lock().await;
        match state.tickets.iter_mut().find(|ticket| &ticket.code == code) {
            Some(ticket) => {
                ticket.status = status;
                true
            }
            None => false,
        }
    }
}

/// Transaction over [`InMemoryTicketingStore`].
pub struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<State>,
    snapshot: Option<State>,
    fail_commit: Arc<AtomicBool>,
    committed: bool,
}

impl Drop for InMemoryUnitOfWork {
    fn drop(&mut self) {
        if !self.committed {
            if let Some(snapshot) = self.snapshot.take() {
                *self.guard = snapshot;
                tracing::debug!("In-memory transaction rolled back");
            }
        }
    }
}

fn unique_violation(constraint: &str) -> StoreError {
    StoreError::UniqueViolation {
        constraint: constraint.to_string(),
    }
}

impl InventoryStore for InMemoryUnitOfWork {
    fn inventory(
        &mut self,
        event_id: EventId,
    ) -> BoxFuture<'_, StoreResult<Option<EventInventory>>> {
        Box::pin(async move { Ok(self.guard.inventory.get(&event_id).cloned()) })
    }

    fn lock_inventory(
        &mut self,
        event_id: EventId,
    ) -> BoxFuture<'_, StoreResult<Option<EventInventory>>> {
        self.inventory(event_id)
    }

    fn try_debit(&mut self, event_id: EventId, quantity: u32) -> BoxFuture<'_, StoreResult<bool>> {
        Box::pin(async move {
            let Some(inventory) = self.guard.inventory.get_mut(&event_id) else {
                return Ok(false);
            };
            if inventory.available < quantity {
                return Ok(false);
            }
            inventory.available -= quantity;
            inventory.version += 1;
            inventory.updated_at = Utc::now();
            Ok(true)
        })
    }

    fn credit(&mut self, event_id: EventId, quantity: u32) -> BoxFuture<'_, StoreResult<bool>> {
        Box::pin(async move {
            let Some(inventory) = self.guard.inventory.get_mut(&event_id) else {
                return Ok(false);
            };
            match inventory.available.checked_add(quantity) {
                Some(available) if available <= inventory.total_capacity => {
                    inventory.available = available;
                    inventory.version += 1;
                    inventory.updated_at = Utc::now();
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }
}

impl OrderStore for InMemoryUnitOfWork {
    fn insert_order<'a>(&'a mut self, order: &'a Order) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            if self.guard.order(order.id).is_some() {
                return Err(unique_violation("ticket_orders_pkey"));
            }
            if !self.guard.events.contains_key(&order.event_id) {
                return Err(StoreError::InvariantViolation(format!(
                    "order references unknown event {}",
                    order.event_id
                )));
            }
            self.guard.orders.push(order.clone());
            Ok(())
        })
    }

    fn insert_tickets<'a>(&'a mut self, tickets: &'a [Ticket]) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            for (index, ticket) in tickets.iter().enumerate() {
                let taken = self.guard.tickets.iter().any(|t| t.code == ticket.code)
                    || tickets[..index].iter().any(|t| t.code == ticket.code);
                if taken {
                    return Err(unique_violation("tickets_code_key"));
                }
                if self.guard.order(ticket.order_id).is_none() {
                    return Err(StoreError::InvariantViolation(format!(
                        "ticket references unknown order {}",
                        ticket.order_id
                    )));
                }
            }
            self.guard.tickets.extend_from_slice(tickets);
            Ok(())
        })
    }

    fn update_order<'a>(&'a mut self, order: &'a Order) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let stored = self.guard.order_mut(order.id).ok_or(StoreError::NotFound)?;
            stored.status = order.status;
            stored.payment_reference.clone_from(&order.payment_reference);
            stored.updated_at = order.updated_at;
            Ok(())
        })
    }

    fn order(&mut self, order_id: OrderId) -> BoxFuture<'_, StoreResult<Option<Order>>> {
        Box::pin(async move { Ok(self.guard.order(order_id).cloned()) })
    }

    fn lock_order(&mut self, order_id: OrderId) -> BoxFuture<'_, StoreResult<Option<Order>>> {
        Box::pin(async move { Ok(self.guard.order(order_id).cloned()) })
    }

    fn tickets_for_order(&mut self, order_id: OrderId) -> BoxFuture<'_, StoreResult<Vec<Ticket>>> {
        Box::pin(async move { Ok(self.guard.tickets_for(order_id)) })
    }

    fn lock_ticket_by_code<'a>(
        &'a mut self,
        code: &'a TicketCode,
    ) -> BoxFuture<'a, StoreResult<Option<Ticket>>> {
        Box::pin(async move {
            Ok(self
                .guard
                .tickets
                .iter()
                .find(|ticket| &ticket.code == code)
                .cloned())
        })
    }

    fn update_ticket<'a>(&'a mut self, ticket: &'a Ticket) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let stored = self
                .guard
                .tickets
                .iter_mut()
                .find(|t| t.id == ticket.id)
                .ok_or(StoreError::NotFound)?;
            stored.status = ticket.status;
            stored.used_at = stored.used_at.or(ticket.used_at);
            Ok(())
        })
    }

    fn count_orders_for_event(&mut self, event_id: EventId) -> BoxFuture<'_, StoreResult<u64>> {
        Box::pin(async move {
            let orders = self
                .guard
                .orders
                .iter()
                .filter(|order| order.event_id == event_id)
                .count();
            Ok(orders as u64)
        })
    }
}

impl IdempotencyStore for InMemoryUnitOfWork {
    fn find_idempotency<'a>(
        &'a mut self,
        key: &'a IdempotencyKey,
    ) -> BoxFuture<'a, StoreResult<Option<IdempotencyRecord>>> {
        Box::pin(async move { Ok(self.guard.idempotency.get(key).cloned()) })
    }

    fn save_idempotency<'a>(
        &'a mut self,
        record: &'a IdempotencyRecord,
        now: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            if let Some(existing) = self.guard.idempotency.get(&record.key) {
                if !existing.is_expired(now) {
                    return Err(unique_violation("idempotency_records_pkey"));
                }
            }
            self.guard
                .idempotency
                .insert(record.key.clone(), record.clone());
            Ok(())
        })
    }
}

impl EventCatalog for InMemoryUnitOfWork {
    fn insert_event<'a>(
        &'a mut self,
        event: &'a Event,
        inventory: &'a EventInventory,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            if self.guard.events.contains_key(&event.id) {
                return Err(unique_violation("events_pkey"));
            }
            if inventory.available > inventory.total_capacity {
                return Err(StoreError::InvariantViolation(
                    "available exceeds total capacity".to_string(),
                ));
            }
            self.guard.events.insert(event.id, event.clone());
            self.guard.inventory.insert(event.id, inventory.clone());
            Ok(())
        })
    }

    fn event(&mut self, event_id: EventId) -> BoxFuture<'_, StoreResult<Option<Event>>> {
        Box::pin(async move { Ok(self.guard.events.get(&event_id).cloned()) })
    }

    fn lock_event(&mut self, event_id: EventId) -> BoxFuture<'_, StoreResult<Option<Event>>> {
        self.event(event_id)
    }

    fn update_event<'a>(&'a mut self, event: &'a Event) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let stored = self
                .guard
                .events
                .get_mut(&event.id)
                .ok_or(StoreError::NotFound)?;
            stored.title.clone_from(&event.title);
            stored.venue.clone_from(&event.venue);
            stored.starts_at = event.starts_at;
            stored.unit_price = event.unit_price;
            stored.status = event.status;
            stored.updated_at = event.updated_at;
            Ok(())
        })
    }

    fn delete_event(&mut self, event_id: EventId) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            if self.guard.orders.iter().any(|order| order.event_id == event_id) {
                return Err(StoreError::InvariantViolation(format!(
                    "event {event_id} is still referenced by orders"
                )));
            }
            self.guard.inventory.remove(&event_id);
            self.guard
                .events
                .remove(&event_id)
                .map(|_| ())
                .ok_or(StoreError::NotFound)
        })
    }
}

impl UnitOfWork for InMemoryUnitOfWork {
    fn commit(mut self: Box<Self>) -> BoxFuture<'static, StoreResult<()>> {
        let result = if self.fail_commit.swap(false, Ordering::SeqCst) {
            Err(StoreError::Database("injected commit failure".to_string()))
        } else {
            self.committed = true;
            Ok(())
        };
        drop(self);
        Box::pin(async move { result })
    }

    fn rollback(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>> {
        drop(self);
        Box::pin(async { Ok(()) })
    }
}

impl TicketingStore for InMemoryTicketingStore {
    fn begin(&self) -> BoxFuture<'_, StoreResult<Box<dyn UnitOfWork>>> {
        Box::pin(async move {
            let guard = Arc::clone(&self.state).lock_owned().await;
            let snapshot = guard.clone();
            let uow: Box<dyn UnitOfWork> = Box::new(InMemoryUnitOfWork {
                guard,
                snapshot: Some(snapshot),
                fail_commit: Arc::clone(&self.fail_next_commit),
                committed: false,
            });
            Ok(uow)
        })
    }

    fn get_order(&self, order_id: OrderId) -> BoxFuture<'_, StoreResult<Option<OrderDetails>>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state.order(order_id).map(|order| OrderDetails {
                order: order.clone(),
                tickets: state.tickets_for(order_id),
            }))
        })
    }

    fn list_orders(&self, purchaser_id: PurchaserId) -> BoxFuture<'_, StoreResult<Vec<Order>>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            let mut orders: Vec<Order> = state
                .orders
                .iter()
                .rev()
                .filter(|order| order.purchaser_id == purchaser_id)
                .cloned()
                .collect();
            orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(orders)
        })
    }

    fn get_event(&self, event_id: EventId) -> BoxFuture<'_, StoreResult<Option<Event>>> {
        Box::pin(async move { Ok(self.state.lock().await.events.get(&event_id).cloned()) })
    }

    fn list_events(&self, offset: u64, limit: u32) -> BoxFuture<'_, StoreResult<Vec<Event>>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            let mut events: Vec<&Event> = state.events.values().collect();
            events.sort_by(|a, b| a.starts_at.cmp(&b.starts_at).then(a.id.cmp(&b.id)));
            let offset = usize::try_from(offset).unwrap_or(usize::MAX);
            Ok(events
                .into_iter()
                .skip(offset)
                .take(limit as usize)
                .cloned()
                .collect())
        })
    }

    fn count_events(&self) -> BoxFuture<'_, StoreResult<u64>> {
        Box::pin(async move { Ok(self.state.lock().await.events.len() as u64) })
    }

    fn get_inventory(
        &self,
        event_id: EventId,
    ) -> BoxFuture<'_, StoreResult<Option<EventInventory>>> {
        Box::pin(async move { Ok(self.state.lock().await.inventory.get(&event_id).cloned()) })
    }

    fn lookup_idempotency<'a>(
        &'a self,
        key: &'a IdempotencyKey,
    ) -> BoxFuture<'a, StoreResult<Option<IdempotencyRecord>>> {
        Box::pin(async move { Ok(self.state.lock().await.idempotency.get(key).cloned()) })
    }

    fn purge_expired_idempotency(&self, now: DateTime<Utc>) -> BoxFuture<'_, StoreResult<u64>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let before = state.idempotency.len();
            state.idempotency.retain(|_, record| !record.is_expired(now));
            Ok((before - state.idempotency.len()) as u64)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ticketing_core::types::{EventStatus, Money};

    fn event(now: DateTime<Utc>) -> (Event, EventInventory) {
        let event = Event {
            id: EventId::new(),
            title: "Rock Festival".to_string(),
            venue: "Gelora Bung Karno".to_string(),
            starts_at: now + Duration::days(10),
            unit_price: Money::from_cents(50_000),
            status: EventStatus::Published,
            created_at: now,
            updated_at: now,
        };
        let inventory = EventInventory::new(event.id, 5, now);
        (event, inventory)
    }

    async fn seeded(store: &InMemoryTicketingStore) -> EventId {
        let (event, inventory) = event(Utc::now());
        let mut uow = store.begin().await.unwrap();
        uow.insert_event(&event, &inventory).await.unwrap();
        uow.commit().await.unwrap();
        event.id
    }

    #[tokio::test]
    async fn test_debit_is_conditional() {
        let store = InMemoryTicketingStore::new();
        let event_id = seeded(&store).await;

        let mut uow = store.begin().await.unwrap();
        assert!(uow.try_debit(event_id, 5).await.unwrap());
        assert!(!uow.try_debit(event_id, 1).await.unwrap());
        assert!(!uow.credit(event_id, 6).await.unwrap());
        assert!(uow.credit(event_id, 2).await.unwrap());
        uow.commit().await.unwrap();

        let inventory = store.get_inventory(event_id).await.unwrap().unwrap();
        assert_eq!(inventory.available, 2);
        assert_eq!(inventory.version, 2);
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_rolls_back() {
        let store = InMemoryTicketingStore::new();
        let event_id = seeded(&store).await;

        {
            let mut uow = store.begin().await.unwrap();
            assert!(uow.try_debit(event_id, 3).await.unwrap());
        }

        let inventory = store.get_inventory(event_id).await.unwrap().unwrap();
        assert_eq!(inventory.available, 5);
    }

    #[tokio::test]
    async fn test_injected_commit_failure_rolls_back() {
        let store = InMemoryTicketingStore::new();
        let event_id = seeded(&store).await;
        store.fail_next_commit();

        let mut uow = store.begin().await.unwrap();
        assert!(uow.try_debit(event_id, 1).await.unwrap());
        assert!(uow.commit().await.is_err());

        let inventory = store.get_inventory(event_id).await.unwrap().unwrap();
        assert_eq!(inventory.available, 5);
    }
}
