use std::sync::Arc;

use blockchain_exporter::context::{self, ApplicationContext};
use blockchain_exporter::http::{self, AppState};
use blockchain_exporter::metrics::MetricsState;
use blockchain_exporter::poller::manager::{get_poller_manager, reset_poller_manager};
use blockchain_exporter::rpc::ConnectionPoolManager;
use blockchain_exporter::runtime_settings::{reset_runtime_settings_cache, RuntimeSettings};
use blockchain_exporter::signals;

/// The health listener is the task-creation "owner"; the metrics listener
/// reuses whatever tasks the health listener already spawned, mirroring the
/// original's two-FastAPI-apps-one-lifespan design.
const HEALTH_OWNER: usize = 1;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = blockchain_exporter::settings::AppSettings::from_env();
    blockchain_exporter::logging::init(&settings.logging);

    let runtime = match RuntimeSettings::load(None) {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::warn!(error = %err, "failed to load configuration, starting with no configured blockchains");
            RuntimeSettings {
                app: settings.clone(),
                blockchains: Vec::new(),
                config_path: settings.config.resolve_config_path(),
            }
        }
    };
    let runtime = Arc::new(runtime);

    let metrics = Arc::new(MetricsState::new());
    let pool = Arc::new(ConnectionPoolManager::new(std::time::Duration::from_secs_f64(
        runtime.app.poller.rpc_request_timeout_seconds,
    )));

    metrics.set_up(true);
    metrics.set_configured_blockchains(runtime.blockchains.len());

    let app_context = Arc::new(ApplicationContext::new(metrics.clone(), runtime.clone(), pool.clone()));
    context::set_application_context(app_context.clone());

    let manager = get_poller_manager();
    manager.create_tasks(app_context.clone(), HEALTH_OWNER).await;

    let health_state = AppState::new(manager.clone(), pool.clone());
    let metrics_state = AppState::new(manager.clone(), pool.clone());

    let health_addr = format!("0.0.0.0:{}", runtime.app.server.health_port);
    let metrics_addr = format!("0.0.0.0:{}", runtime.app.server.metrics_port);

    let health_listener = tokio::net::TcpListener::bind(&health_addr).await?;
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr).await?;

    tracing::info!(address = %health_addr, "health listener starting");
    tracing::info!(address = %metrics_addr, "metrics listener starting");

    let health_router = http::health_router(health_state);
    let metrics_router = http::metrics_router(metrics_state);

    let sighup_manager = manager.clone();
    let sighup_pool = pool.clone();
    tokio::spawn(signals::run_sighup_reload_loop(sighup_manager, sighup_pool));

    let health_server = axum::serve(health_listener, health_router).with_graceful_shutdown(signals::wait_for_shutdown_signal());
    let metrics_server = axum::serve(metrics_listener, metrics_router).with_graceful_shutdown(signals::wait_for_shutdown_signal());

    let (health_result, metrics_result) = tokio::join!(health_server, metrics_server);
    health_result?;
    metrics_result?;

    metrics.set_up(false);
    if manager.should_cleanup(HEALTH_OWNER).await {
        manager.shutdown_tasks(std::time::Duration::from_secs_f64(2.0), &metrics).await;
    }
    manager.reset().await;
    reset_poller_manager();
    context::reset_application_context();
    reset_runtime_settings_cache();
    pool.clear_pool();

    Ok(())
}
