//! In-band configuration reload, triggered over HTTP or SIGHUP.

use std::sync::Arc;

use crate::context::{self, ApplicationContext};
use crate::error::ConfigError;
use crate::metrics::MetricsState;
use crate::models::chain_identity;
use crate::poller::manager::PollerManager;
use crate::rpc::ConnectionPoolManager;
use crate::runtime_settings::{self, RuntimeSettings};

/// Reload the configuration file, diff the blockchain list against what was
/// previously loaded, tear down metrics for removed chains, and hand the
/// poller manager the old/new lists so it can reconcile running tasks.
///
/// No process-wide state is mutated unless the new configuration loads and
/// validates successfully; on any failure the previous state is left
/// untouched.
pub async fn reload_configuration(manager: &PollerManager, metrics: Arc<MetricsState>, pool: Arc<ConnectionPoolManager>) -> (bool, String) {
    let old_context = context::get_application_context();
    let old_blockchains = old_context
        .as_ref()
        .map(|c| c.blockchains().to_vec())
        .unwrap_or_default();

    runtime_settings::reset_runtime_settings_cache();

    let config_path = old_context
        .as_ref()
        .map(|c| c.runtime.config_path.clone())
        .unwrap_or_else(|| std::path::PathBuf::from("config.toml"));

    let new_runtime = match RuntimeSettings::load(Some(&config_path)) {
        Ok(runtime) => Arc::new(runtime),
        Err(ConfigError::NotFound { path }) => {
            return (false, format!("Configuration file not found: {path}"));
        }
        Err(ConfigError::Validation { path, message }) => {
            return (false, format!("Configuration error: {path}: {message}"));
        }
        Err(other) => {
            return (false, format!("Unexpected error during reload: {other}"));
        }
    };

    let new_context = Arc::new(ApplicationContext::new(metrics.clone(), new_runtime.clone(), pool));

    let new_blockchains = new_runtime.blockchains.clone();

    let old_identities: std::collections::HashSet<_> = old_blockchains.iter().map(|c| chain_identity(c)).collect();
    let new_identities: std::collections::HashSet<_> = new_blockchains.iter().map(|c| chain_identity(c)).collect();

    let removed: Vec<_> = old_identities.difference(&new_identities).cloned().collect();
    let added: Vec<_> = new_identities.difference(&old_identities).cloned().collect();

    for identity in &removed {
        if metrics.clear_cached_metrics(identity) {
            tracing::info!(blockchain = %identity.0, "cleared cached metrics for removed chain");
        }
    }

    metrics.set_configured_blockchains(new_blockchains.len());
    context::set_application_context(new_context.clone());

    manager.reload_tasks(&old_blockchains, &new_blockchains, new_context).await;

    (
        true,
        format!(
            "Configuration reloaded successfully. Added: {}, Removed: {}, Total: {}",
            added.len(),
            removed.len(),
            new_blockchains.len()
        ),
    )
}
