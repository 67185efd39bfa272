//! Blockchain telemetry exporter: polls EVM JSON-RPC endpoints and publishes
//! head/finalized block state, account balances, ERC-20 state, and
//! Transfer-event counts as Prometheus metrics.

pub mod collectors;
pub mod config;
pub mod context;
pub mod error;
pub mod health;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod poller;
pub mod reload;
pub mod rpc;
pub mod runtime_settings;
pub mod settings;
pub mod signals;

pub use context::ApplicationContext;
pub use error::{ConfigError, RpcError};
pub use metrics::MetricsState;
pub use runtime_settings::RuntimeSettings;
