//! Event catalog and read-side queries.

use crate::error::PurchaseError;
use crate::purchase::{PurchaseEngine, finish};
use crate::store::UnitOfWork;
use crate::types::{
    Event, EventChanges, EventId, EventInventory, EventPage, EventStatus, MAX_PAGE_SIZE, NewEvent,
    Order, OrderDetails, OrderId, PurchaserId,
};
use chrono::{DateTime, Utc};

impl PurchaseEngine {
    /// Publish an event and create its inventory with every ticket available.
    ///
    /// # Errors
    ///
    /// Returns [`PurchaseError::Validation`] for an empty title or venue, zero
    /// capacity or a start time in the past, and [`PurchaseError::Internal`]
    /// on store failure.
    #[tracing::instrument(
        skip_all,
        fields(title = %new_event.title, capacity = new_event.capacity)
    )]
    pub async fn publish_event(&self, new_event: NewEvent) -> Result<Event, PurchaseError> {
        let now = self.env.clock.now();
        if new_event.title.trim().is_empty() {
            return Err(PurchaseError::Validation("title must not be empty".to_string()));
        }
        if new_event.venue.trim().is_empty() {
            return Err(PurchaseError::Validation("venue must not be empty".to_string()));
        }
        if new_event.capacity == 0 {
            return Err(PurchaseError::Validation(
                "capacity must be at least 1".to_string(),
            ));
        }
        if new_event.starts_at <= now {
            return Err(PurchaseError::Validation(
                "event must start in the future".to_string(),
            ));
        }

        let event = Event {
            id: EventId::new(),
            title: new_event.title,
            venue: new_event.venue,
            starts_at: new_event.starts_at,
            unit_price: new_event.unit_price,
            status: EventStatus::Published,
            created_at: now,
            updated_at: now,
        };
        let inventory = EventInventory::new(event.id, new_event.capacity, now);

        let mut uow = self.env.store.begin().await?;
        let result = uow
            .insert_event(&event, &inventory)
            .await
            .map_err(PurchaseError::from);
        finish(uow, result).await?;

        tracing::info!(event_id = %event.id, "Event published");
        Ok(event)
    }

    /// Cancel an event. Cancelling twice is a no-op.
    ///
    /// Existing orders are left as they are; refunds go through
    /// [`PurchaseEngine::refund`].
    ///
    /// # Errors
    ///
    /// Returns [`PurchaseError::EventNotFound`] for an unknown event.
    #[tracing::instrument(skip(self), fields(event_id = %event_id))]
    pub async fn cancel_event(&self, event_id: EventId) -> Result<Event, PurchaseError> {
        let now = self.env.clock.now();
        let mut uow = self.env.store.begin().await?;
        let result = async {
            let mut event = uow
                .lock_event(event_id)
                .await?
                .ok_or(PurchaseError::EventNotFound(event_id))?;
            if event.status != EventStatus::Cancelled {
                event.status = EventStatus::Cancelled;
                event.updated_at = now;
                uow.update_event(&event).await?;
                tracing::info!("Event cancelled");
            }
            Ok::<_, PurchaseError>(event)
        }
        .await;
        finish(uow, result).await
    }

    /// Edit the title, venue, start time or price of an event.
    ///
    /// Empty `changes` return the event untouched.
    ///
    /// # Errors
    ///
    /// - [`PurchaseError::EventNotFound`] for an unknown event
    /// - [`PurchaseError::EventNotPurchasable`] for a cancelled event
    /// - [`PurchaseError::Validation`] for a blank title or venue, or a start
    ///   time in the past
    #[tracing::instrument(skip(self, changes), fields(event_id = %event_id))]
    pub async fn update_event(
        &self,
        event_id: EventId,
        changes: EventChanges,
    ) -> Result<Event, PurchaseError> {
        let now = self.env.clock.now();
        validate_changes(&changes, now)?;

        let mut uow = self.env.store.begin().await?;
        let result = update_in(uow.as_mut(), event_id, changes, now).await;
        finish(uow, result).await
    }

    /// Delete an event that never sold a ticket.
    ///
    /// # Errors
    ///
    /// - [`PurchaseError::EventNotFound`] for an unknown event
    /// - [`PurchaseError::EventHasOrders`] while any order, refunded or not,
    ///   references the event
    #[tracing::instrument(skip(self), fields(event_id = %event_id))]
    pub async fn delete_event(&self, event_id: EventId) -> Result<(), PurchaseError> {
        let mut uow = self.env.store.begin().await?;
        let result = delete_in(uow.as_mut(), event_id).await;
        finish(uow, result).await?;

        tracing::info!("Event deleted");
        Ok(())
    }

    /// Look up an event.
    ///
    /// # Errors
    ///
    /// Returns [`PurchaseError::EventNotFound`] for an unknown event.
    pub async fn get_event(&self, event_id: EventId) -> Result<Event, PurchaseError> {
        self.env
            .store
            .get_event(event_id)
            .await?
            .ok_or(PurchaseError::EventNotFound(event_id))
    }

    /// One page of events, soonest first. Pages start at 1; sizes above
    /// [`MAX_PAGE_SIZE`] are capped.
    ///
    /// # Errors
    ///
    /// Returns [`PurchaseError::Validation`] for a zero page or page size and
    /// [`PurchaseError::Internal`] on store failure.
    pub async fn list_events(&self, page: u32, page_size: u32) -> Result<EventPage, PurchaseError> {
        if page == 0 {
            return Err(PurchaseError::Validation("page starts at 1".to_string()));
        }
        if page_size == 0 {
            return Err(PurchaseError::Validation(
                "page_size must be at least 1".to_string(),
            ));
        }
        let page_size = page_size.min(MAX_PAGE_SIZE);
        let offset = u64::from(page - 1) * u64::from(page_size);

        let events = self.env.store.list_events(offset, page_size).await?;
        let total = self.env.store.count_events().await?;
        Ok(EventPage {
            events,
            total,
            page,
            page_size,
        })
    }

    /// Current inventory counter of an event.
    ///
    /// # Errors
    ///
    /// Returns [`PurchaseError::EventNotFound`] for an unknown event.
    pub async fn inventory(&self, event_id: EventId) -> Result<EventInventory, PurchaseError> {
        self.env
            .store
            .get_inventory(event_id)
            .await?
            .ok_or(PurchaseError::EventNotFound(event_id))
    }

    /// An order with its tickets.
    ///
    /// # Errors
    ///
    /// Returns [`PurchaseError::OrderNotFound`] for an unknown order.
    pub async fn get_order(&self, order_id: OrderId) -> Result<OrderDetails, PurchaseError> {
        self.env
            .store
            .get_order(order_id)
            .await?
            .ok_or(PurchaseError::OrderNotFound(order_id))
    }

    /// Orders of a purchaser, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`PurchaseError::Internal`] on store failure.
    pub async fn list_orders(
        &self,
        purchaser_id: PurchaserId,
    ) -> Result<Vec<Order>, PurchaseError> {
        Ok(self.env.store.list_orders(purchaser_id).await?)
    }
}

fn validate_changes(changes: &EventChanges, now: DateTime<Utc>) -> Result<(), PurchaseError> {
    if changes.title.as_deref().is_some_and(|title| title.trim().is_empty()) {
        return Err(PurchaseError::Validation("title must not be empty".to_string()));
    }
    if changes.venue.as_deref().is_some_and(|venue| venue.trim().is_empty()) {
        return Err(PurchaseError::Validation("venue must not be empty".to_string()));
    }
    if changes.starts_at.is_some_and(|starts_at| starts_at <= now) {
        return Err(PurchaseError::Validation(
            "event must start in the future".to_string(),
        ));
    }
    Ok(())
}

async fn update_in(
    uow: &mut dyn UnitOfWork,
    event_id: EventId,
    changes: EventChanges,
    now: DateTime<Utc>,
) -> Result<Event, PurchaseError> {
    let mut event = uow
        .lock_event(event_id)
        .await?
        .ok_or(PurchaseError::EventNotFound(event_id))?;
    if event.status == EventStatus::Cancelled {
        return Err(PurchaseError::EventNotPurchasable {
            event_id,
            reason: "cancelled events cannot be changed".to_string(),
        });
    }
    if changes.is_empty() {
        return Ok(event);
    }

    if let Some(title) = changes.title {
        event.title = title;
    }
    if let Some(venue) = changes.venue {
        event.venue = venue;
    }
    if let Some(starts_at) = changes.starts_at {
        event.starts_at = starts_at;
    }
    if let Some(unit_price) = changes.unit_price {
        event.unit_price = unit_price;
    }
    event.updated_at = now;
    uow.update_event(&event).await?;

    tracing::info!("Event updated");
    Ok(event)
}

async fn delete_in(uow: &mut dyn UnitOfWork, event_id: EventId) -> Result<(), PurchaseError> {
    // Inventory before event rows, the lock order of a purchase.
    uow.lock_inventory(event_id)
        .await?
        .ok_or(PurchaseError::EventNotFound(event_id))?;

    let orders = uow.count_orders_for_event(event_id).await?;
    if orders > 0 {
        return Err(PurchaseError::EventHasOrders { event_id, orders });
    }
    uow.delete_event(event_id).await?;
    Ok(())
}
