pub mod health;
pub mod metrics;

use std::sync::Arc;

use axum::Router;

use crate::context;
use crate::poller::manager::PollerManager;

/// Routes always resolve the *current* `ApplicationContext` through
/// [`context::get_application_context`] rather than a value captured at
/// router-construction time, since reload swaps the global context out from
/// under any already-built `Router`.
#[derive(Clone)]
pub struct AppState {
    pub manager: PollerManager,
    pub pool: Arc<crate::rpc::ConnectionPoolManager>,
}

impl AppState {
    pub fn new(manager: PollerManager, pool: Arc<crate::rpc::ConnectionPoolManager>) -> Self {
        Self { manager, pool }
    }

    pub fn context(&self) -> Arc<context::ApplicationContext> {
        context::get_application_context().expect("application context is initialized before serving requests")
    }
}

/// The health listener's router: `/health`, `/health/details`,
/// `/health/livez`, `/health/readyz`, plus the reload endpoint.
pub fn health_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .with_state(state)
}

/// The metrics listener's router: `/metrics` only.
pub fn metrics_router(state: AppState) -> Router {
    Router::new()
        .merge(metrics::routes())
        .with_state(state)
}
