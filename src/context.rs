//! The dependency-injection bundle threaded through the poller and HTTP
//! layers: metrics, runtime settings, and the RPC client factory.

use std::sync::{Arc, OnceLock};

use crate::config::BlockchainConfig;
use crate::metrics::MetricsState;
use crate::rpc::{ConnectionPoolManager, RpcClient};
use crate::runtime_settings::RuntimeSettings;

/// Builds an [`RpcClient`] for a blockchain, pulling a pooled HTTP client
/// handle from the shared connection pool. Boxed so tests can substitute a
/// factory that returns clients wired to a fake transport instead.
pub type RpcFactory = Arc<dyn Fn(&BlockchainConfig) -> RpcClient + Send + Sync>;

#[derive(Clone)]
pub struct ApplicationContext {
    pub metrics: Arc<MetricsState>,
    pub runtime: Arc<RuntimeSettings>,
    pub pool: Arc<ConnectionPoolManager>,
    rpc_factory: RpcFactory,
}

impl ApplicationContext {
    pub fn new(metrics: Arc<MetricsState>, runtime: Arc<RuntimeSettings>, pool: Arc<ConnectionPoolManager>) -> Self {
        let factory_pool = pool.clone();
        let factory_metrics = metrics.clone();
        let rpc_factory: RpcFactory = Arc::new(move |config: &BlockchainConfig| {
            let client = factory_pool.get_client(&config.rpc_url);
            RpcClient::from_config(client, config).with_metrics(factory_metrics.clone())
        });
        Self {
            metrics,
            runtime,
            pool,
            rpc_factory,
        }
    }

    pub fn with_rpc_factory(mut self, factory: RpcFactory) -> Self {
        self.rpc_factory = factory;
        self
    }

    pub fn create_rpc_client(&self, config: &BlockchainConfig) -> RpcClient {
        (self.rpc_factory)(config)
    }

    /// Return `rpc`'s pooled HTTP client handle to the connection pool, so
    /// the next poll iteration for this chain can reuse it instead of
    /// building a fresh `reqwest::Client`.
    pub fn release_rpc_client(&self, config: &BlockchainConfig, rpc: &RpcClient) {
        if let Some(client) = rpc.reqwest_client() {
            self.pool.return_client(&config.rpc_url, client);
        }
    }

    pub fn settings(&self) -> &crate::settings::AppSettings {
        &self.runtime.app
    }

    pub fn blockchains(&self) -> &[Arc<BlockchainConfig>] {
        &self.runtime.blockchains
    }
}

static APPLICATION_CONTEXT: OnceLock<std::sync::Mutex<Option<Arc<ApplicationContext>>>> = OnceLock::new();

fn slot() -> &'static std::sync::Mutex<Option<Arc<ApplicationContext>>> {
    APPLICATION_CONTEXT.get_or_init(|| std::sync::Mutex::new(None))
}

pub fn get_application_context() -> Option<Arc<ApplicationContext>> {
    slot().lock().unwrap().clone()
}

pub fn set_application_context(context: Arc<ApplicationContext>) {
    *slot().lock().unwrap() = Some(context);
}

pub fn reset_application_context() {
    *slot().lock().unwrap() = None;
}
