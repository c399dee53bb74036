//! Row decoding and error mapping shared by the store and its transactions.

use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row};
use ticketing_core::error::StoreError;
use ticketing_core::store::StoreResult;
use ticketing_core::types::{
    Event, EventId, EventInventory, EventStatus, IdempotencyKey, IdempotencyRecord, Money, Order,
    OrderId, OrderStatus, PurchaseReceipt, PurchaserId, Ticket, TicketCode, TicketId, TicketStatus,
};

pub(crate) const EVENT_COLUMNS: &str =
    "id, title, venue, starts_at, unit_price_cents, status, created_at, updated_at";

pub(crate) const INVENTORY_COLUMNS: &str =
    "event_id, total_capacity, available, version, updated_at";

pub(crate) const ORDER_COLUMNS: &str = "id, event_id, purchaser_id, quantity, unit_price_cents, \
     total_price_cents, status, payment_reference, idempotency_key, created_at, updated_at";

pub(crate) const TICKET_COLUMNS: &str = "id, order_id, code, status, used_at, created_at";

pub(crate) const IDEMPOTENCY_COLUMNS: &str = "purchaser_id, idempotency_key, event_id, quantity, \
     order_id, receipt, created_at, expires_at";

/// Postgres error codes that mean a statement gave up waiting.
const QUERY_CANCELED: &str = "57014";
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// Map a driver error onto the store contract.
pub(crate) fn store_error(error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &error {
        if db_err.is_unique_violation() {
            let constraint = db_err.constraint().unwrap_or("unique").to_string();
            metrics::counter!(
                "ticketing_store_unique_violations_total",
                "constraint" => constraint.clone()
            )
            .increment(1);
            return StoreError::UniqueViolation { constraint };
        }
        if db_err.is_check_violation() || db_err.is_foreign_key_violation() {
            return StoreError::InvariantViolation(db_err.message().to_string());
        }
        if matches!(
            db_err.code().as_deref(),
            Some(QUERY_CANCELED | LOCK_NOT_AVAILABLE)
        ) {
            tracing::warn!(code = ?db_err.code(), "Statement exceeded its time budget");
            return StoreError::Timeout;
        }
    }

    match error {
        sqlx::Error::PoolTimedOut => StoreError::Timeout,
        sqlx::Error::RowNotFound => StoreError::NotFound,
        other => StoreError::Database(other.to_string()),
    }
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name).map_err(store_error)
}

fn invariant(message: String) -> StoreError {
    StoreError::InvariantViolation(message)
}

/// Counts are `u32` in the domain and `INTEGER` in the schema.
pub(crate) fn count_to_db(value: u32, field: &str) -> StoreResult<i32> {
    i32::try_from(value).map_err(|_| invariant(format!("{field} {value} exceeds INTEGER range")))
}

fn count_from_db(value: i32, field: &str) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| invariant(format!("{field} {value} is negative")))
}

/// Money is `u64` cents in the domain and `BIGINT` in the schema.
pub(crate) fn cents_to_db(money: Money, field: &str) -> StoreResult<i64> {
    i64::try_from(money.cents())
        .map_err(|_| invariant(format!("{field} {} exceeds BIGINT range", money.cents())))
}

fn cents_from_db(value: i64, field: &str) -> StoreResult<Money> {
    u64::try_from(value)
        .map(Money::from_cents)
        .map_err(|_| invariant(format!("{field} {value} is negative")))
}

pub(crate) fn event_from_row(row: &PgRow) -> StoreResult<Event> {
    let status: String = column(row, "status")?;
    Ok(Event {
        id: EventId::from_uuid(column(row, "id")?),
        title: column(row, "title")?,
        venue: column(row, "venue")?,
        starts_at: column(row, "starts_at")?,
        unit_price: cents_from_db(column(row, "unit_price_cents")?, "unit_price_cents")?,
        status: EventStatus::parse(&status)
            .ok_or_else(|| invariant(format!("unknown event status '{status}'")))?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

pub(crate) fn inventory_from_row(row: &PgRow) -> StoreResult<EventInventory> {
    Ok(EventInventory {
        event_id: EventId::from_uuid(column(row, "event_id")?),
        total_capacity: count_from_db(column(row, "total_capacity")?, "total_capacity")?,
        available: count_from_db(column(row, "available")?, "available")?,
        version: column(row, "version")?,
        updated_at: column(row, "updated_at")?,
    })
}

pub(crate) fn order_from_row(row: &PgRow) -> StoreResult<Order> {
    let status: String = column(row, "status")?;
    Ok(Order {
        id: OrderId::from_uuid(column(row, "id")?),
        event_id: EventId::from_uuid(column(row, "event_id")?),
        purchaser_id: PurchaserId::from_uuid(column(row, "purchaser_id")?),
        quantity: count_from_db(column(row, "quantity")?, "quantity")?,
        unit_price: cents_from_db(column(row, "unit_price_cents")?, "unit_price_cents")?,
        total_price: cents_from_db(column(row, "total_price_cents")?, "total_price_cents")?,
        status: OrderStatus::parse(&status)
            .ok_or_else(|| invariant(format!("unknown order status '{status}'")))?,
        payment_reference: column(row, "payment_reference")?,
        idempotency_key: column(row, "idempotency_key")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

pub(crate) fn ticket_from_row(row: &PgRow) -> StoreResult<Ticket> {
    let status: String = column(row, "status")?;
    let code: String = column(row, "code")?;
    Ok(Ticket {
        id: TicketId::from_uuid(column(row, "id")?),
        order_id: OrderId::from_uuid(column(row, "order_id")?),
        code: TicketCode::new(code),
        status: TicketStatus::parse(&status)
            .ok_or_else(|| invariant(format!("unknown ticket status '{status}'")))?,
        used_at: column(row, "used_at")?,
        created_at: column(row, "created_at")?,
    })
}

pub(crate) fn idempotency_from_row(row: &PgRow) -> StoreResult<IdempotencyRecord> {
    let purchaser_id = PurchaserId::from_uuid(column(row, "purchaser_id")?);
    let nonce: String = column(row, "idempotency_key")?;
    let key = IdempotencyKey::new(purchaser_id, &nonce)
        .map_err(|e| invariant(format!("stored idempotency key rejected: {e}")))?;
    let receipt: serde_json::Value = column(row, "receipt")?;
    let receipt: PurchaseReceipt = serde_json::from_value(receipt)
        .map_err(|e| invariant(format!("stored receipt is malformed: {e}")))?;

    Ok(IdempotencyRecord {
        key,
        event_id: EventId::from_uuid(column(row, "event_id")?),
        quantity: count_from_db(column(row, "quantity")?, "quantity")?,
        order_id: OrderId::from_uuid(column(row, "order_id")?),
        receipt,
        created_at: column(row, "created_at")?,
        expires_at: column(row, "expires_at")?,
    })
}

pub(crate) fn receipt_to_db(receipt: &PurchaseReceipt) -> StoreResult<serde_json::Value> {
    serde_json::to_value(receipt).map_err(|e| invariant(format!("receipt not serializable: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        assert_eq!(store_error(sqlx::Error::RowNotFound), StoreError::NotFound);
        assert_eq!(store_error(sqlx::Error::PoolTimedOut), StoreError::Timeout);
    }

    #[test]
    fn test_count_conversions_reject_out_of_range() {
        assert_eq!(count_to_db(7, "quantity").unwrap(), 7);
        assert!(count_to_db(u32::MAX, "quantity").is_err());
        assert!(count_from_db(-1, "available").is_err());
    }

    #[test]
    fn test_money_conversions_reject_out_of_range() {
        assert_eq!(cents_to_db(Money::from_cents(150_000), "total").unwrap(), 150_000);
        assert!(cents_to_db(Money::from_cents(u64::MAX), "total").is_err());
        assert!(cents_from_db(-5, "total").is_err());
    }
}
