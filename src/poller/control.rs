//! The adaptive per-chain polling loop: one `tokio::spawn`'d task per
//! configured blockchain, looping forever until cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::context::ApplicationContext;
use crate::logging::DurationLogger;
use crate::models::{chain_identity, ChainRuntimeContext};
use crate::poller::collect::collect_chain_metrics;
use crate::poller::intervals::determine_poll_interval_seconds;

/// Run the polling loop for one chain until `cancel` fires. The configured
/// interval is re-read every iteration and adopted if it changed; failures
/// accumulate a `consecutive_failures` counter that drives exponential
/// backoff (not reset by an interval change, only by a poll that succeeds).
pub async fn poll_blockchain(ctx_template: ChainRuntimeContext, app_ctx: Arc<ApplicationContext>, cancel: CancellationToken) {
    let mut interval_seconds = determine_poll_interval_seconds(
        ctx_template.config.poll_interval.as_deref(),
        &app_ctx.settings().poller.default_interval,
    );
    let max_backoff = app_ctx.settings().poller.max_failure_backoff_seconds;

    let mut consecutive_failures: u32 = 0;
    let identity = chain_identity(&ctx_template.config);

    loop {
        if cancel.is_cancelled() {
            return;
        }

        let _duration_logger = DurationLogger::start("poll_iteration");
        let started = tokio::time::Instant::now();
        let rpc = app_ctx.create_rpc_client(&ctx_template.config);
        let mut ctx = ctx_template.clone();

        let outcome = tokio::select! {
            result = collect_chain_metrics(&mut ctx, &rpc) => result,
            _ = cancel.cancelled() => return,
        };

        match outcome {
            Some(()) => {
                consecutive_failures = 0;
            }
            None => {
                tracing::warn!(blockchain = %ctx.config.name, "poll iteration failed");
                ctx.metrics.record_poll_failure(&identity, &ctx.chain_id_label);
                consecutive_failures = consecutive_failures.saturating_add(1);
            }
        }

        app_ctx.release_rpc_client(&ctx_template.config, &rpc);

        let new_interval_seconds = determine_poll_interval_seconds(
            ctx_template.config.poll_interval.as_deref(),
            &app_ctx.settings().poller.default_interval,
        );
        if new_interval_seconds != interval_seconds {
            tracing::debug!(blockchain = %ctx.config.name, old = interval_seconds, new = new_interval_seconds, "poll interval changed");
            interval_seconds = new_interval_seconds;
        }

        let elapsed = started.elapsed().as_secs_f64();
        ctx.metrics.record_poll_duration(&ctx.config.name, &ctx.chain_id_label, elapsed);
        ctx.metrics
            .set_poll_consecutive_failures(&ctx.config.name, &ctx.chain_id_label, consecutive_failures);

        let target_seconds = if consecutive_failures > 0 {
            let backoff = (interval_seconds * 2f64.powi((consecutive_failures - 1) as i32)).min(max_backoff);
            if backoff > 0.0 {
                ctx.metrics.record_poll_backoff_duration(&ctx.config.name, &ctx.chain_id_label, backoff);
            }
            backoff
        } else {
            interval_seconds
        };
        let sleep_seconds = (target_seconds - elapsed).max(0.0);

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs_f64(sleep_seconds)) => {}
            _ = cancel.cancelled() => return,
        }
    }
}
