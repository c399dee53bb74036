//! Custom Axum extractors.
//!
//! - [`Purchaser`]: purchaser identity from `X-Purchaser-Id`
//! - [`IdempotencyKeyHeader`]: client retry key from `Idempotency-Key`
//!
//! Identity is authenticated upstream (gateway or auth proxy); these
//! extractors only parse what the proxy forwarded.
//!
//! # Examples
//!
//! ```ignore
//! async fn handler(
//!     purchaser: Purchaser,
//!     key: IdempotencyKeyHeader,
//!     Json(request): Json<PurchaseRequest>,
//! ) -> Result<Json<PurchaseReceipt>, AppError> {
//!     tracing::info!(purchaser_id = %purchaser.0, "Processing purchase");
//!     ...
//! }
//! ```

use crate::error::AppError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use ticketing_core::types::PurchaserId;

/// Header carrying the authenticated purchaser id.
pub const PURCHASER_ID_HEADER: &str = "X-Purchaser-Id";

/// Header carrying the client-chosen idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Authenticated purchaser.
///
/// Rejects with 401 when the header is missing or not a UUID.
#[derive(Debug, Clone, Copy)]
pub struct Purchaser(pub PurchaserId);

#[async_trait]
impl<S> FromRequestParts<S> for Purchaser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(PURCHASER_ID_HEADER)
            .ok_or_else(|| {
                AppError::unauthorized(format!("Missing {PURCHASER_ID_HEADER} header"))
            })?;

        value
            .to_str()
            .ok()
            .and_then(|s| s.parse::<PurchaserId>().ok())
            .map(Self)
            .ok_or_else(|| AppError::unauthorized(format!("Invalid {PURCHASER_ID_HEADER} header")))
    }
}

/// Raw `Idempotency-Key` header value.
///
/// Length and character rules are enforced by the engine, so a malformed key
/// is reported as a validation error alongside other request problems.
#[derive(Debug, Clone)]
pub struct IdempotencyKeyHeader(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for IdempotencyKeyHeader
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .ok_or_else(|| {
                AppError::bad_request(format!("Missing {IDEMPOTENCY_KEY_HEADER} header"))
            })?
            .to_str()
            .map_err(|_| {
                AppError::bad_request(format!("Invalid {IDEMPOTENCY_KEY_HEADER} header value"))
            })?;

        Ok(Self(key.to_string()))
    }
}
