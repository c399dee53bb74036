//! Logging and Prometheus metrics setup for the server binary.

use axum::{Router, extract::State, routing::get};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Histogram buckets for `*_duration_seconds` metrics.
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Errors from telemetry setup.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Install the global tracing subscriber.
///
/// `filter` is an `EnvFilter` directive; an unparseable directive falls back
/// to `info`.
pub fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn prometheus_builder() -> Result<PrometheusBuilder, TelemetryError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            LATENCY_BUCKETS,
        )
        .map_err(|e| TelemetryError::Build(e.to_string()))
}

/// Install the Prometheus recorder and describe the business metrics.
///
/// # Errors
///
/// Returns [`TelemetryError`] if the exporter cannot be built or a recorder
/// is already installed.
pub fn install_metrics() -> Result<PrometheusHandle, TelemetryError> {
    let handle = prometheus_builder()?
        .install_recorder()
        .map_err(|e| TelemetryError::Install(e.to_string()))?;
    ticketing_core::metrics::register_business_metrics();
    Ok(handle)
}

/// Router exposing `GET /metrics` in the Prometheus text format.
pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(handle)
}

#[allow(clippy::unused_async)]
async fn render_metrics(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}
