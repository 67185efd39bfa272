//! `/health`, `/health/details`, `/health/livez`, `/health/readyz`, `/reload`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;

use crate::health::{generate_health_report, generate_readiness_report};
use crate::http::AppState;
use crate::reload::reload_configuration;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/details", get(health_details))
        .route("/health/livez", get(livez))
        .route("/health/readyz", get(readyz))
        .route("/reload", post(reload))
}

#[derive(Serialize)]
struct HealthBody {
    status: String,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let (status, code, _) = generate_health_report(&state.context().metrics, false);
    let code = StatusCode::from_u16(code).unwrap_or(StatusCode::OK);
    (code, Json(HealthBody { status: status.to_string() }))
}

#[derive(Serialize)]
struct HealthDetailsBody {
    status: String,
    chains: Vec<crate::health::ChainHealthEntry>,
}

async fn health_details(State(state): State<AppState>) -> impl IntoResponse {
    let (status, code, chains) = generate_health_report(&state.context().metrics, true);
    let code = StatusCode::from_u16(code).unwrap_or(StatusCode::OK);
    (
        code,
        Json(HealthDetailsBody {
            status: status.to_string(),
            chains,
        }),
    )
}

async fn livez() -> impl IntoResponse {
    (StatusCode::OK, "alive")
}

#[derive(Serialize)]
struct ReadyBody {
    ready: bool,
    chains: Vec<crate::health::ChainReadinessEntry>,
}

async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    let threshold = state.context().settings().health.readiness_stale_threshold_seconds;
    let (ready, chains) = generate_readiness_report(&state.context().metrics, now, threshold);
    let code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(ReadyBody { ready, chains }))
}

#[derive(Serialize)]
struct ReloadBody {
    success: bool,
    message: String,
}

async fn reload(State(state): State<AppState>) -> impl IntoResponse {
    let (success, message) = reload_configuration(&state.manager, state.context().metrics.clone(), state.pool.clone()).await;
    let code = if success { StatusCode::OK } else { StatusCode::BAD_REQUEST };
    (code, Json(ReloadBody { success, message }))
}
