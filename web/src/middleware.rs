//! Request correlation for the ticketing API.
//!
//! Every request carries an `x-correlation-id`, either the caller's or a
//! fresh UUID, and the response echoes it. The `http_request` span records
//! the correlation id and the purchaser, so the engine spans of a purchase
//! (`purchase`, `refund`, ...) nest under one request in the logs.

use crate::extractors::PURCHASER_ID_HEADER;
use axum::Router;
use axum::http::{HeaderName, Request};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{MakeSpan, TraceLayer};
use tracing::Span;
use tracing::field::Empty;

/// Header name for correlation ID.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

const fn correlation_header() -> HeaderName {
    HeaderName::from_static(CORRELATION_ID_HEADER)
}

/// Builds the `http_request` span for a request.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
        };

        let span = tracing::info_span!(
            "http_request",
            correlation_id = Empty,
            purchaser_id = Empty,
            method = %request.method(),
            uri = %request.uri(),
        );
        if let Some(correlation_id) = header(CORRELATION_ID_HEADER) {
            span.record("correlation_id", correlation_id);
        }
        // Unvalidated here; the extractor rejects a malformed id.
        if let Some(purchaser_id) = header(PURCHASER_ID_HEADER) {
            span.record("purchaser_id", purchaser_id);
        }
        span
    }
}

/// Assign, trace and echo correlation ids on every route of `router`.
///
/// The id is set before the trace span opens, so generated ids are
/// recorded too.
pub fn with_request_tracking<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(TraceLayer::new_for_http().make_span_with(RequestSpan))
        .layer(PropagateRequestIdLayer::new(correlation_header()))
        .layer(SetRequestIdLayer::new(correlation_header(), MakeRequestUuid))
}
