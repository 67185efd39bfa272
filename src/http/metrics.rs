//! `/metrics` — Prometheus text exposition.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::Encoder;

use crate::health::format_metrics_payload;
use crate::http::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/metrics", get(metrics))
}

/// Always returns 200: an empty registry still encodes to an empty (but
/// valid) exposition payload.
async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let context = state.context();
    let encoder = prometheus::TextEncoder::new();
    let families = context.metrics.registry.gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&families, &mut buffer) {
        tracing::error!(error = %err, "failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain".to_string())],
            String::new(),
        );
    }

    let raw = String::from_utf8_lossy(&buffer).into_owned();
    let formatted = format_metrics_payload(&raw);

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        formatted,
    )
}
