//! One purchase, refund or redemption as a single Postgres transaction.

use crate::rows::{
    EVENT_COLUMNS, IDEMPOTENCY_COLUMNS, INVENTORY_COLUMNS, ORDER_COLUMNS, TICKET_COLUMNS,
    cents_to_db, count_to_db, event_from_row, idempotency_from_row, inventory_from_row,
    order_from_row, receipt_to_db, store_error, ticket_from_row,
};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::{Postgres, Transaction};
use ticketing_core::error::StoreError;
use ticketing_core::store::{
    EventCatalog, IdempotencyStore, InventoryStore, OrderStore, StoreResult, UnitOfWork,
};
use ticketing_core::types::{
    Event, EventId, EventInventory, IdempotencyKey, IdempotencyRecord, Order, OrderId, Ticket,
    TicketCode,
};

/// Unit of work backed by a `sqlx` transaction.
///
/// Dropping it without calling [`UnitOfWork::commit`] rolls the transaction
/// back when the connection returns to the pool.
pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl PostgresUnitOfWork {
    pub(crate) const fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }
}

impl std::fmt::Debug for PostgresUnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresUnitOfWork").finish_non_exhaustive()
    }
}

impl InventoryStore for PostgresUnitOfWork {
    fn inventory(
        &mut self,
        event_id: EventId,
    ) -> BoxFuture<'_, StoreResult<Option<EventInventory>>> {
        Box::pin(async move {
            let sql =
                format!("SELECT {INVENTORY_COLUMNS} FROM event_inventory WHERE event_id = $1");
            sqlx::query(&sql)
                .bind(*event_id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(store_error)?
                .as_ref()
                .map(inventory_from_row)
                .transpose()
        })
    }

    fn lock_inventory(
        &mut self,
        event_id: EventId,
    ) -> BoxFuture<'_, StoreResult<Option<EventInventory>>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {INVENTORY_COLUMNS} FROM event_inventory WHERE event_id = $1 FOR UPDATE"
            );
            sqlx::query(&sql)
                .bind(*event_id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(store_error)?
                .as_ref()
                .map(inventory_from_row)
                .transpose()
        })
    }

    fn try_debit(&mut self, event_id: EventId, quantity: u32) -> BoxFuture<'_, StoreResult<bool>> {
        Box::pin(async move {
            let quantity = count_to_db(quantity, "quantity")?;
            let result = sqlx::query(
                r"
                UPDATE event_inventory
                   SET available = available - $2,
                       version = version + 1,
                       updated_at = now()
                 WHERE event_id = $1 AND available >= $2
                ",
            )
            .bind(*event_id.as_uuid())
            .bind(quantity)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;

            Ok(result.rows_affected() == 1)
        })
    }

    fn credit(&mut self, event_id: EventId, quantity: u32) -> BoxFuture<'_, StoreResult<bool>> {
        Box::pin(async move {
            let quantity = count_to_db(quantity, "quantity")?;
            let result = sqlx::query(
                r"
                UPDATE event_inventory
                   SET available = available + $2,
                       version = version + 1,
                       updated_at = now()
                 WHERE event_id = $1 AND available + $2 <= total_capacity
                ",
            )
            .bind(*event_id.as_uuid())
            .bind(quantity)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;

            Ok(result.rows_affected() == 1)
        })
    }
}

impl OrderStore for PostgresUnitOfWork {
    fn insert_order<'a>(&'a mut self, order: &'a Order) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO ticket_orders
                    (id, event_id, purchaser_id, quantity, unit_price_cents, total_price_cents,
                     status, payment_reference, idempotency_key, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ",
            )
            .bind(*order.id.as_uuid())
            .bind(*order.event_id.as_uuid())
            .bind(*order.purchaser_id.as_uuid())
            .bind(count_to_db(order.quantity, "quantity")?)
            .bind(cents_to_db(order.unit_price, "unit_price")?)
            .bind(cents_to_db(order.total_price, "total_price")?)
            .bind(order.status.as_str())
            .bind(order.payment_reference.as_deref())
            .bind(order.idempotency_key.as_str())
            .bind(order.created_at)
            .bind(order.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;

            Ok(())
        })
    }

    fn insert_tickets<'a>(&'a mut self, tickets: &'a [Ticket]) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            for ticket in tickets {
                sqlx::query(
                    r"
                    INSERT INTO tickets (id, order_id, code, status, used_at, created_at)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    ",
                )
                .bind(*ticket.id.as_uuid())
                .bind(*ticket.order_id.as_uuid())
                .bind(ticket.code.as_str())
                .bind(ticket.status.as_str())
                .bind(ticket.used_at)
                .bind(ticket.created_at)
                .execute(&mut *self.tx)
                .await
                .map_err(store_error)?;
            }
            Ok(())
        })
    }

    fn update_order<'a>(&'a mut self, order: &'a Order) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE ticket_orders
                   SET status = $2, payment_reference = $3, updated_at = $4
                 WHERE id = $1
                ",
            )
            .bind(*order.id.as_uuid())
            .bind(order.status.as_str())
            .bind(order.payment_reference.as_deref())
            .bind(order.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;

            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    fn order(&mut self, order_id: OrderId) -> BoxFuture<'_, StoreResult<Option<Order>>> {
        Box::pin(async move {
            let sql = format!("SELECT {ORDER_COLUMNS} FROM ticket_orders WHERE id = $1");
            sqlx::query(&sql)
                .bind(*order_id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(store_error)?
                .as_ref()
                .map(order_from_row)
                .transpose()
        })
    }

    fn lock_order(&mut self, order_id: OrderId) -> BoxFuture<'_, StoreResult<Option<Order>>> {
        Box::pin(async move {
            let sql =
                format!("SELECT {ORDER_COLUMNS} FROM ticket_orders WHERE id = $1 FOR UPDATE");
            sqlx::query(&sql)
                .bind(*order_id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(store_error)?
                .as_ref()
                .map(order_from_row)
                .transpose()
        })
    }

    fn tickets_for_order(&mut self, order_id: OrderId) -> BoxFuture<'_, StoreResult<Vec<Ticket>>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {TICKET_COLUMNS} FROM tickets WHERE order_id = $1 \
                 ORDER BY issue_seq FOR UPDATE"
            );
            sqlx::query(&sql)
                .bind(*order_id.as_uuid())
                .fetch_all(&mut *self.tx)
                .await
                .map_err(store_error)?
                .iter()
                .map(ticket_from_row)
                .collect()
        })
    }

    fn lock_ticket_by_code<'a>(
        &'a mut self,
        code: &'a TicketCode,
    ) -> BoxFuture<'a, StoreResult<Option<Ticket>>> {
        Box::pin(async move {
            let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE code = $1 FOR UPDATE");
            sqlx::query(&sql)
                .bind(code.as_str())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(store_error)?
                .as_ref()
                .map(ticket_from_row)
                .transpose()
        })
    }

    fn update_ticket<'a>(&'a mut self, ticket: &'a Ticket) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let result = sqlx::query("UPDATE tickets SET status = $2, used_at = $3 WHERE id = $1")
                .bind(*ticket.id.as_uuid())
                .bind(ticket.status.as_str())
                .bind(ticket.used_at)
                .execute(&mut *self.tx)
                .await
                .map_err(store_error)?;

            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    fn count_orders_for_event(&mut self, event_id: EventId) -> BoxFuture<'_, StoreResult<u64>> {
        Box::pin(async move {
            let orders: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM ticket_orders WHERE event_id = $1")
                    .bind(*event_id.as_uuid())
                    .fetch_one(&mut *self.tx)
                    .await
                    .map_err(store_error)?;
            u64::try_from(orders)
                .map_err(|_| StoreError::InvariantViolation("negative order count".to_string()))
        })
    }
}

impl IdempotencyStore for PostgresUnitOfWork {
    fn find_idempotency<'a>(
        &'a mut self,
        key: &'a IdempotencyKey,
    ) -> BoxFuture<'a, StoreResult<Option<IdempotencyRecord>>> {
        Box::pin(async move {
            // Held until commit or rollback; concurrent retries of one key queue here.
            sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
                .bind(key.to_string())
                .execute(&mut *self.tx)
                .await
                .map_err(store_error)?;

            let sql = format!(
                "SELECT {IDEMPOTENCY_COLUMNS} FROM idempotency_records \
                 WHERE purchaser_id = $1 AND idempotency_key = $2"
            );
            sqlx::query(&sql)
                .bind(*key.purchaser_id().as_uuid())
                .bind(key.nonce())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(store_error)?
                .as_ref()
                .map(idempotency_from_row)
                .transpose()
        })
    }

    fn save_idempotency<'a>(
        &'a mut self,
        record: &'a IdempotencyRecord,
        now: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                INSERT INTO idempotency_records
                    (purchaser_id, idempotency_key, event_id, quantity, order_id, receipt,
                     created_at, expires_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (purchaser_id, idempotency_key) DO UPDATE
                   SET event_id = EXCLUDED.event_id,
                       quantity = EXCLUDED.quantity,
                       order_id = EXCLUDED.order_id,
                       receipt = EXCLUDED.receipt,
                       created_at = EXCLUDED.created_at,
                       expires_at = EXCLUDED.expires_at
                 WHERE idempotency_records.expires_at <= $9
                ",
            )
            .bind(*record.key.purchaser_id().as_uuid())
            .bind(record.key.nonce())
            .bind(*record.event_id.as_uuid())
            .bind(count_to_db(record.quantity, "quantity")?)
            .bind(*record.order_id.as_uuid())
            .bind(receipt_to_db(&record.receipt)?)
            .bind(record.created_at)
            .bind(record.expires_at)
            .bind(now)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;

            // The conflicting row is still live.
            if result.rows_affected() == 0 {
                return Err(StoreError::UniqueViolation {
                    constraint: "idempotency_records_pkey".to_string(),
                });
            }
            Ok(())
        })
    }
}

impl EventCatalog for PostgresUnitOfWork {
    fn insert_event<'a>(
        &'a mut self,
        event: &'a Event,
        inventory: &'a EventInventory,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO events
                    (id, title, venue, starts_at, unit_price_cents, status, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ",
            )
            .bind(*event.id.as_uuid())
            .bind(event.title.as_str())
            .bind(event.venue.as_str())
            .bind(event.starts_at)
            .bind(cents_to_db(event.unit_price, "unit_price")?)
            .bind(event.status.as_str())
            .bind(event.created_at)
            .bind(event.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;

            sqlx::query(
                r"
                INSERT INTO event_inventory
                    (event_id, total_capacity, available, version, updated_at)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(*inventory.event_id.as_uuid())
            .bind(count_to_db(inventory.total_capacity, "total_capacity")?)
            .bind(count_to_db(inventory.available, "available")?)
            .bind(inventory.version)
            .bind(inventory.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;

            Ok(())
        })
    }

    fn event(&mut self, event_id: EventId) -> BoxFuture<'_, StoreResult<Option<Event>>> {
        Box::pin(async move {
            let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
            sqlx::query(&sql)
                .bind(*event_id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(store_error)?
                .as_ref()
                .map(event_from_row)
                .transpose()
        })
    }

    fn lock_event(&mut self, event_id: EventId) -> BoxFuture<'_, StoreResult<Option<Event>>> {
        Box::pin(async move {
            let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1 FOR UPDATE");
            sqlx::query(&sql)
                .bind(*event_id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(store_error)?
                .as_ref()
                .map(event_from_row)
                .transpose()
        })
    }

    fn update_event<'a>(&'a mut self, event: &'a Event) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE events
                   SET title = $2, venue = $3, starts_at = $4, unit_price_cents = $5,
                       status = $6, updated_at = $7
                 WHERE id = $1
                ",
            )
            .bind(*event.id.as_uuid())
            .bind(event.title.as_str())
            .bind(event.venue.as_str())
            .bind(event.starts_at)
            .bind(cents_to_db(event.unit_price, "unit_price")?)
            .bind(event.status.as_str())
            .bind(event.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;

            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    fn delete_event(&mut self, event_id: EventId) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query("DELETE FROM event_inventory WHERE event_id = $1")
                .bind(*event_id.as_uuid())
                .execute(&mut *self.tx)
                .await
                .map_err(store_error)?;

            // Orders reference events ON DELETE RESTRICT.
            let result = sqlx::query("DELETE FROM events WHERE id = $1")
                .bind(*event_id.as_uuid())
                .execute(&mut *self.tx)
                .await
                .map_err(store_error)?;

            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }
}

impl UnitOfWork for PostgresUnitOfWork {
    fn commit(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>> {
        let Self { tx } = *self;
        Box::pin(async move { tx.commit().await.map_err(store_error) })
    }

    fn rollback(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>> {
        let Self { tx } = *self;
        Box::pin(async move { tx.rollback().await.map_err(store_error) })
    }
}
