//! Application state for Axum handlers.

use ticketing_core::purchase::PurchaseEngine;

/// Application state shared across all HTTP handlers.
///
/// Cloned per request; the engine holds its store and gateway behind `Arc`s.
#[derive(Clone)]
pub struct AppState {
    /// Purchase engine serving every endpoint
    pub engine: PurchaseEngine,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub const fn new(engine: PurchaseEngine) -> Self {
        Self { engine }
    }
}
