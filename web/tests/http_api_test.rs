//! HTTP API tests.
//!
//! Drive the full router over the in-memory store with
//! `tower::ServiceExt::oneshot`.
//!
//! Run with: `cargo test --test http_api_test`

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use chrono::Duration;
use serde_json::{Value, json};
use ticketing_core::environment::Clock;
use ticketing_core::types::{Event, PurchaserId};
use ticketing_testing::{PaymentMode, TestHarness};
use ticketing_web::extractors::{IDEMPOTENCY_KEY_HEADER, PURCHASER_ID_HEADER};
use ticketing_web::middleware::CORRELATION_ID_HEADER;
use ticketing_web::{AppState, build_router};
use tower::ServiceExt;

fn app(harness: &TestHarness) -> Router {
    build_router(AppState::new(harness.engine.clone()))
}

async fn send(
    app: Router,
    method: Method,
    uri: &str,
    headers: &[(&str, String)],
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, value.as_str());
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response body should be JSON")
    };
    (status, value)
}

fn buyer(purchaser: PurchaserId, key: &str) -> Vec<(&'static str, String)> {
    vec![
        (PURCHASER_ID_HEADER, purchaser.to_string()),
        (IDEMPOTENCY_KEY_HEADER, key.to_string()),
    ]
}

fn owner(purchaser: PurchaserId) -> Vec<(&'static str, String)> {
    vec![(PURCHASER_ID_HEADER, purchaser.to_string())]
}

async fn buy(
    harness: &TestHarness,
    event: &Event,
    quantity: u32,
    key: &str,
) -> (StatusCode, Value) {
    send(
        app(harness),
        Method::POST,
        "/api/orders",
        &buyer(harness.purchaser, key),
        Some(json!({ "event_id": event.id, "quantity": quantity })),
    )
    .await
}

#[tokio::test]
async fn test_health() {
    let harness = TestHarness::new();

    let (status, body) = send(app(&harness), Method::GET, "/health", &[], None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_correlation_id_is_returned() {
    let harness = TestHarness::new();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let response = app(&harness).oneshot(request).await.unwrap();

    assert!(response.headers().contains_key(CORRELATION_ID_HEADER));
}

#[tokio::test]
async fn test_create_event_then_query_availability() {
    let harness = TestHarness::new();
    let starts_at = harness.clock.now() + Duration::days(14);

    let (status, event) = send(
        app(&harness),
        Method::POST,
        "/api/events",
        &[],
        Some(json!({
            "title": "Java Rockin'land",
            "venue": "Gambir Expo",
            "starts_at": starts_at,
            "unit_price_cents": 90_000,
            "capacity": 250
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(event["status"], "published");
    let id = event["id"].as_str().unwrap().to_string();

    let (status, fetched) =
        send(app(&harness), Method::GET, &format!("/api/events/{id}"), &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["title"], "Java Rockin'land");

    let (status, availability) = send(
        app(&harness),
        Method::GET,
        &format!("/api/events/{id}/availability"),
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(availability["total_capacity"], 250);
    assert_eq!(availability["available"], 250);
    assert_eq!(availability["sold"], 0);

    let (status, listing) = send(app(&harness), Method::GET, "/api/events", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["events"].as_array().unwrap().len(), 1);
    assert_eq!(listing["total"], 1);
    assert_eq!(listing["page"], 1);
    assert_eq!(listing["page_size"], 10);
}

#[tokio::test]
async fn test_list_events_honors_page_parameters() {
    let harness = TestHarness::new();
    for _ in 0..3 {
        harness.publish_event(10).await;
    }

    let (status, second) = send(
        app(&harness),
        Method::GET,
        "/api/events?page=2&page_size=2",
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["events"].as_array().unwrap().len(), 1);
    assert_eq!(second["total"], 3);
    assert_eq!(second["page"], 2);

    let (status, body) =
        send(app(&harness), Method::GET, "/api/events?page=0", &[], None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn test_update_event_over_http() {
    let harness = TestHarness::new();
    let event = harness.publish_event(10).await;

    let (status, updated) = send(
        app(&harness),
        Method::PUT,
        &format!("/api/events/{}", event.id),
        &[],
        Some(json!({ "venue": "Jakarta International Expo", "unit_price_cents": 175_000 })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["venue"], "Jakarta International Expo");
    assert_eq!(updated["title"], event.title.as_str());
    assert_eq!(updated["unit_price"], 175_000);

    let (status, body) = send(
        app(&harness),
        Method::PUT,
        &format!("/api/events/{}", event.id),
        &[],
        Some(json!({ "title": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn test_delete_event_over_http() {
    let harness = TestHarness::new();
    let unsold = harness.publish_event(10).await;
    let sold = harness.publish_event(10).await;
    buy(&harness, &sold, 1, "http-delete-key-00001").await;

    let (status, body) = send(
        app(&harness),
        Method::DELETE,
        &format!("/api/events/{}", unsold.id),
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, _) = send(
        app(&harness),
        Method::GET,
        &format!("/api/events/{}", unsold.id),
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        app(&harness),
        Method::DELETE,
        &format!("/api/events/{}", sold.id),
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conflict");
}

#[tokio::test]
async fn test_create_event_with_zero_capacity_is_unprocessable() {
    let harness = TestHarness::new();

    let (status, body) = send(
        app(&harness),
        Method::POST,
        "/api/events",
        &[],
        Some(json!({
            "title": "Empty Hall",
            "venue": "Nowhere",
            "starts_at": harness.clock.now() + Duration::days(1),
            "unit_price_cents": 1_000,
            "capacity": 0
        })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn test_purchase_returns_receipt_and_debits_inventory() {
    let harness = TestHarness::new();
    let event = harness.publish_event(10).await;

    let (status, receipt) = buy(&harness, &event, 2, "http-purchase-key-001").await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(receipt["status"], "confirmed");
    assert_eq!(receipt["quantity"], 2);
    assert_eq!(receipt["ticket_codes"].as_array().unwrap().len(), 2);
    assert_eq!(harness.inventory(&event).await.available, 8);
}

#[tokio::test]
async fn test_replayed_purchase_returns_same_receipt() {
    let harness = TestHarness::new();
    let event = harness.publish_event(10).await;

    let (_, first) = buy(&harness, &event, 2, "http-replay-key-0001").await;
    let (status, second) = buy(&harness, &event, 2, "http-replay-key-0001").await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first, second);
    assert_eq!(harness.inventory(&event).await.available, 8);
    assert_eq!(harness.payments.authorize_calls(), 1);
}

#[tokio::test]
async fn test_reused_key_for_different_quantity_is_unprocessable() {
    let harness = TestHarness::new();
    let event = harness.publish_event(10).await;

    buy(&harness, &event, 2, "http-reused-key-0001").await;
    let (status, body) = buy(&harness, &event, 3, "http-reused-key-0001").await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "validation_error");
    assert_eq!(harness.inventory(&event).await.available, 8);
}

#[tokio::test]
async fn test_missing_headers_are_rejected() {
    let harness = TestHarness::new();
    let event = harness.publish_event(10).await;
    let body = json!({ "event_id": event.id, "quantity": 1 });

    let (status, error) = send(
        app(&harness),
        Method::POST,
        "/api/orders",
        &[(IDEMPOTENCY_KEY_HEADER, "http-no-purchaser-01".to_string())],
        Some(body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error["code"], "unauthorized");

    let (status, error) = send(
        app(&harness),
        Method::POST,
        "/api/orders",
        &owner(harness.purchaser),
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "bad_request");

    assert_eq!(harness.inventory(&event).await.available, 10);
}

#[tokio::test]
async fn test_invalid_quantity_and_short_key_are_unprocessable() {
    let harness = TestHarness::new();
    let event = harness.publish_event(10).await;

    let (status, body) = buy(&harness, &event, 0, "http-zero-quantity-01").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "validation_error");

    let (status, _) = buy(&harness, &event, 1, "short").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_sold_out_event_conflicts() {
    let harness = TestHarness::new();
    let event = harness.publish_event(2).await;

    let (status, _) = buy(&harness, &event, 2, "http-sellout-key-0001").await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = buy(&harness, &event, 1, "http-sellout-key-0002").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "insufficient_inventory");
    assert_eq!(harness.inventory(&event).await.available, 0);
}

#[tokio::test]
async fn test_declined_payment_is_payment_required() {
    let harness = TestHarness::new();
    let event = harness.publish_event(5).await;
    harness
        .payments
        .set_mode(PaymentMode::Decline("insufficient funds".to_string()));

    let (status, body) = buy(&harness, &event, 2, "http-declined-key-001").await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["code"], "payment_failed");
    assert_eq!(harness.inventory(&event).await.available, 5);
}

#[tokio::test]
async fn test_cancelled_event_is_not_purchasable() {
    let harness = TestHarness::new();
    let event = harness.publish_event(5).await;

    let (status, cancelled) = send(
        app(&harness),
        Method::POST,
        &format!("/api/events/{}/cancel", event.id),
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let (status, body) = buy(&harness, &event, 1, "http-cancelled-key-01").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "not_purchasable");
}

#[tokio::test]
async fn test_unknown_resources_are_not_found() {
    let harness = TestHarness::new();
    let missing = uuid::Uuid::new_v4();

    let (status, body) = send(
        app(&harness),
        Method::GET,
        &format!("/api/events/{missing}"),
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (status, _) = send(
        app(&harness),
        Method::GET,
        &format!("/api/orders/{missing}"),
        &owner(harness.purchaser),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        app(&harness),
        Method::POST,
        "/api/tickets/TKT-DOES-NOT-EXIST/redeem",
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_orders_are_scoped_to_their_purchaser() {
    let harness = TestHarness::new();
    let event = harness.publish_event(10).await;
    let (_, receipt) = buy(&harness, &event, 1, "http-scoped-key-00001").await;
    let order_id = receipt["order_id"].as_str().unwrap().to_string();
    let stranger = PurchaserId::new();

    let (status, details) = send(
        app(&harness),
        Method::GET,
        &format!("/api/orders/{order_id}"),
        &owner(harness.purchaser),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["order"]["id"], order_id.as_str());
    assert_eq!(details["tickets"].as_array().unwrap().len(), 1);

    let (status, _) = send(
        app(&harness),
        Method::GET,
        &format!("/api/orders/{order_id}"),
        &owner(stranger),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        app(&harness),
        Method::POST,
        &format!("/api/orders/{order_id}/refund"),
        &owner(stranger),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, mine) = send(
        app(&harness),
        Method::GET,
        "/api/orders",
        &owner(harness.purchaser),
        None,
    )
    .await;
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let (_, theirs) = send(app(&harness), Method::GET, "/api/orders", &owner(stranger), None).await;
    assert!(theirs.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_refund_returns_tickets_to_inventory() {
    let harness = TestHarness::new();
    let event = harness.publish_event(10).await;
    let (_, receipt) = buy(&harness, &event, 3, "http-refund-key-00001").await;
    let order_id = receipt["order_id"].as_str().unwrap().to_string();

    let (status, refund) = send(
        app(&harness),
        Method::POST,
        &format!("/api/orders/{order_id}/refund"),
        &owner(harness.purchaser),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(refund["status"], "refunded");
    assert_eq!(refund["credited"], 3);
    assert_eq!(refund["cancelled_tickets"].as_array().unwrap().len(), 3);
    assert_eq!(harness.inventory(&event).await.available, 10);

    let (status, _) = send(
        app(&harness),
        Method::POST,
        &format!("/api/orders/{order_id}/refund"),
        &owner(harness.purchaser),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_redeem_ticket_once() {
    let harness = TestHarness::new();
    let event = harness.publish_event(10).await;
    let (_, receipt) = buy(&harness, &event, 1, "http-redeem-key-00001").await;
    let code = receipt["ticket_codes"][0].as_str().unwrap().to_string();
    let uri = format!("/api/tickets/{code}/redeem");

    let (status, ticket) = send(app(&harness), Method::POST, &uri, &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ticket["status"], "used");
    assert_eq!(ticket["code"], code.as_str());

    let (status, body) = send(app(&harness), Method::POST, &uri, &[], None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "not_purchasable");
}
