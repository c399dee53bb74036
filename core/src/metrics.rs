//! Business metrics for ticket purchasing.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `ticketing_purchases_total{outcome}` - Purchase attempts by outcome
//! - `ticketing_tickets_sold_total` - Tickets issued by confirmed purchases
//! - `ticketing_purchase_retries_total` - Attempts retried after a uniqueness conflict
//! - `ticketing_refunds_total` - Orders refunded
//! - `ticketing_tickets_refunded_total` - Tickets credited back by refunds
//! - `ticketing_tickets_redeemed_total` - Tickets scanned at the door
//!
//! ## Histograms
//! - `ticketing_payment_duration_seconds` - Payment authorization latency

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Register metric descriptions. Call once at startup.
pub fn register_business_metrics() {
    describe_counter!(
        "ticketing_purchases_total",
        "Total purchase attempts by outcome (confirmed, replayed, or an error kind)"
    );
    describe_counter!(
        "ticketing_tickets_sold_total",
        "Total number of tickets sold"
    );
    describe_counter!(
        "ticketing_purchase_retries_total",
        "Purchase attempts retried after a uniqueness conflict"
    );
    describe_counter!("ticketing_refunds_total", "Total number of refunded orders");
    describe_counter!(
        "ticketing_tickets_refunded_total",
        "Total number of tickets credited back to inventory by refunds"
    );
    describe_counter!(
        "ticketing_tickets_redeemed_total",
        "Total number of tickets redeemed at entry"
    );
    describe_histogram!(
        "ticketing_payment_duration_seconds",
        "Time taken to authorize a payment"
    );

    tracing::info!("Business metrics registered");
}

/// Record the outcome of a purchase call.
pub fn record_purchase(outcome: &'static str) {
    counter!("ticketing_purchases_total", "outcome" => outcome).increment(1);
}

/// Record tickets issued by a confirmed purchase.
pub fn record_tickets_sold(quantity: u32) {
    counter!("ticketing_tickets_sold_total").increment(u64::from(quantity));
}

/// Record a retried purchase attempt.
pub fn record_purchase_retry() {
    counter!("ticketing_purchase_retries_total").increment(1);
}

/// Record a completed refund.
pub fn record_refund(credited: u32) {
    counter!("ticketing_refunds_total").increment(1);
    counter!("ticketing_tickets_refunded_total").increment(u64::from(credited));
}

/// Record a redeemed ticket.
pub fn record_redemption() {
    counter!("ticketing_tickets_redeemed_total").increment(1);
}

/// Record payment authorization latency.
pub fn record_payment_duration(seconds: f64) {
    histogram!("ticketing_payment_duration_seconds").record(seconds);
}
