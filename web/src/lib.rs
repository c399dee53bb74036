//! # Ticketing Web
//!
//! Axum HTTP surface for the ticketing purchase engine.
//!
//! Handlers are thin: they parse the request, call one
//! [`PurchaseEngine`](ticketing_core::purchase::PurchaseEngine) operation and
//! map the result. Engine errors become JSON bodies through [`AppError`].
//!
//! # Request Flow
//!
//! 1. **Correlation id** is read from `X-Correlation-ID` (or generated) and an
//!    `http_request` span is opened
//! 2. **Extractors** pull the purchaser and idempotency key from headers
//! 3. **Engine** runs the operation inside one store transaction
//! 4. **Result** is serialized, or mapped to a status code and error body
//!
//! # Example
//!
//! ```ignore
//! use ticketing_web::{AppState, build_router};
//!
//! let app = build_router(AppState::new(engine));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod payments;
pub mod purge;
pub mod routes;
pub mod shutdown;
pub mod state;
pub mod telemetry;

pub use config::{Config, ConfigError};
pub use error::AppError;
pub use routes::build_router;
pub use state::AppState;
