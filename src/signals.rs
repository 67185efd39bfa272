//! Graceful shutdown (SIGTERM/SIGINT) and in-band reload (SIGHUP) wiring.

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};

use crate::context;
use crate::poller::manager::PollerManager;
use crate::rpc::ConnectionPoolManager;

/// Resolves once SIGTERM or SIGINT is received.
pub async fn wait_for_shutdown_signal() {
    let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut interrupt = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = term.recv() => tracing::info!("received SIGTERM"),
        _ = interrupt.recv() => tracing::info!("received SIGINT"),
    }
}

/// Reload configuration every time SIGHUP is received, for as long as the
/// process runs. Intended to be spawned as its own background task.
pub async fn run_sighup_reload_loop(manager: PollerManager, pool: Arc<ConnectionPoolManager>) {
    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(err) => {
            tracing::warn!(error = %err, "failed to install SIGHUP handler, reload-on-signal disabled");
            return;
        }
    };

    loop {
        hangup.recv().await;
        tracing::info!("received SIGHUP, reloading configuration");
        let Some(ctx) = context::get_application_context() else {
            tracing::warn!("no application context available, skipping reload");
            continue;
        };
        let (success, message) = crate::reload::reload_configuration(&manager, ctx.metrics.clone(), pool.clone()).await;
        if success {
            tracing::info!(%message, "configuration reload complete");
        } else {
            tracing::error!(%message, "configuration reload failed");
        }
    }
}
