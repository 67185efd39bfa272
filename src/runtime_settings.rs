//! The current pairing of process settings with the loaded chain list.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{self, BlockchainConfig};
use crate::error::ConfigError;
use crate::settings::AppSettings;

/// Snapshot of everything read from the environment and the config file at
/// one point in time. Reload builds a fresh one and swaps it in.
#[derive(Clone)]
pub struct RuntimeSettings {
    pub app: AppSettings,
    pub blockchains: Vec<Arc<BlockchainConfig>>,
    pub config_path: PathBuf,
}

impl RuntimeSettings {
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let app = AppSettings::from_env();
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| app.config.resolve_config_path());
        let blockchains = config::load_blockchain_configs(&config_path)?
            .into_iter()
            .map(Arc::new)
            .collect();
        Ok(Self {
            app,
            blockchains,
            config_path,
        })
    }
}

static RUNTIME_SETTINGS_CACHE: once_cell::sync::OnceCell<std::sync::Mutex<Option<Arc<RuntimeSettings>>>> =
    once_cell::sync::OnceCell::new();

fn cache_slot() -> &'static std::sync::Mutex<Option<Arc<RuntimeSettings>>> {
    RUNTIME_SETTINGS_CACHE.get_or_init(|| std::sync::Mutex::new(None))
}

/// A process-wide, memoized `RuntimeSettings`: the first call loads and
/// caches it, subsequent calls with the same `config_path` return the cached
/// value. Cleared by [`reset_runtime_settings_cache`] (used by reload).
pub fn get_runtime_settings(config_path: Option<&Path>) -> Result<Arc<RuntimeSettings>, ConfigError> {
    let mut slot = cache_slot().lock().unwrap();
    if let Some(existing) = slot.as_ref() {
        return Ok(existing.clone());
    }
    let loaded = Arc::new(RuntimeSettings::load(config_path)?);
    *slot = Some(loaded.clone());
    Ok(loaded)
}

pub fn reset_runtime_settings_cache() {
    let mut slot = cache_slot().lock().unwrap();
    *slot = None;
}
