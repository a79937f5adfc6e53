//! The `/metrics` and `/health` HTTP endpoints, served on
//! `JRS_METRICS_HOST:JRS_METRICS_PORT`.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};
use tracing::{debug, error};

use crate::metrics::MetricsRegistry;

/// `GET /metrics` — Prometheus text exposition format.
pub async fn metrics_handler(
    State(registry): State<&'static MetricsRegistry>,
) -> Result<impl IntoResponse, ExportError> {
    debug!("serving metrics");

    let encoder = TextEncoder::new();
    let metric_families = registry.registry().gather();

    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).map_err(|e| {
        error!("failed to encode metrics: {e}");
        ExportError::Encoding(e.to_string())
    })?;

    let body = String::from_utf8(buffer).map_err(|e| {
        error!("metrics output was not valid utf-8: {e}");
        ExportError::Encoding(e.to_string())
    })?;

    Ok((StatusCode::OK, [("content-type", "text/plain; version=0.0.4; charset=utf-8")], body))
}

/// `GET /health` — a trivial liveness probe for the metrics listener itself.
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Build the router mounted on the metrics listener.
pub fn router(registry: &'static MetricsRegistry) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(registry)
}

/// Failure encoding the metrics exposition body.
#[derive(Debug)]
pub enum ExportError {
    /// The Prometheus text encoder failed.
    Encoding(String),
}

impl IntoResponse for ExportError {
    fn into_response(self) -> Response {
        let Self::Encoding(message) = self;
        (StatusCode::INTERNAL_SERVER_ERROR, format!("encoding error: {message}")).into_response()
    }
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self::Encoding(message) = self;
        write!(f, "encoding error: {message}")
    }
}

impl std::error::Error for ExportError {}
