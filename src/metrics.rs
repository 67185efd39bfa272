//! Prometheus registry, metric families, and per-chain label lifecycle.
//!
//! Mirrors the original's `metrics.py`: one process-wide registry, a cache of
//! which label tuples are currently "live" per chain, and helper functions
//! that keep stale series from lingering in `/metrics` after a chain's
//! resolved chain-id changes or a chain is removed from config.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use prometheus::{CounterVec, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};

use crate::models::ChainIdentity;

const RPC_DURATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];
const POLL_DURATION_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];
const BACKOFF_DURATION_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 900.0];
const BLOCKS_PER_CHUNK_BUCKETS: &[f64] = &[10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0];
const CHUNK_DURATION_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

type AccountBalanceLabel = (String, String, String, String, String);
type ContractBalanceLabel = (String, String, String, String);
type ContractTransferLabel = (String, String, String, String, String);
type AccountTokenLabel = (String, String, String, String, String, String, String, String);

/// All label series currently recorded for one resolved chain-id, so they
/// can be precisely removed when that chain-id is retired.
#[derive(Debug, Default, Clone)]
pub struct ChainMetricLabelState {
    pub chain_id_label: String,
    pub account_balance_labels: HashSet<AccountBalanceLabel>,
    pub contract_balance_labels: HashSet<ContractBalanceLabel>,
    pub contract_transfer_labels: HashSet<ContractTransferLabel>,
    pub account_token_labels: HashSet<AccountTokenLabel>,
}

impl ChainMetricLabelState {
    fn new(chain_id_label: impl Into<String>) -> Self {
        Self {
            chain_id_label: chain_id_label.into(),
            ..Default::default()
        }
    }
}

/// Bundle of all metric families (gauges, counters, and histograms),
/// grouped the way the original groups its dataclasses.
pub struct MetricsBundle {
    pub up: Gauge,
    pub configured_blockchains: Gauge,

    pub account_balance_eth: GaugeVec,
    pub account_balance_wei: GaugeVec,
    pub account_token_balance: GaugeVec,
    pub account_token_balance_raw: GaugeVec,

    pub contract_balance_eth: GaugeVec,
    pub contract_balance_wei: GaugeVec,
    pub contract_token_total_supply: GaugeVec,
    pub contract_transfer_count_window: GaugeVec,

    pub chain_head_block_number: GaugeVec,
    pub chain_finalized_block_number: GaugeVec,
    pub chain_head_block_timestamp_seconds: GaugeVec,
    pub chain_time_since_last_block_seconds: GaugeVec,
    pub poll_success: GaugeVec,
    pub poll_timestamp_seconds: GaugeVec,
    pub chain_configured_accounts_count: GaugeVec,
    pub chain_configured_contracts_count: GaugeVec,

    pub poller_thread_count: Gauge,
    pub poll_duration_seconds: HistogramVec,
    pub poll_consecutive_failures: GaugeVec,
    pub poll_backoff_duration_seconds: HistogramVec,
    pub rpc_call_duration_seconds: HistogramVec,
    pub rpc_error_total: CounterVec,
    pub log_chunks_created_total: CounterVec,
    pub log_blocks_queried_per_chunk: HistogramVec,
    pub log_chunk_duration_seconds: HistogramVec,
}

fn gauge_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> GaugeVec {
    let gauge = GaugeVec::new(Opts::new(name, help), labels).expect("metric definition is valid");
    registry
        .register(Box::new(gauge.clone()))
        .expect("metric name is unique within the registry");
    gauge
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Gauge {
    let gauge = Gauge::new(name, help).expect("metric definition is valid");
    registry
        .register(Box::new(gauge.clone()))
        .expect("metric name is unique within the registry");
    gauge
}

fn counter_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let counter = CounterVec::new(Opts::new(name, help), labels).expect("metric definition is valid");
    registry
        .register(Box::new(counter.clone()))
        .expect("metric name is unique within the registry");
    counter
}

fn histogram_vec(registry: &Registry, name: &str, help: &str, labels: &[&str], buckets: &[f64]) -> HistogramVec {
    let opts = HistogramOpts::new(name, help).buckets(buckets.to_vec());
    let histogram = HistogramVec::new(opts, labels).expect("metric definition is valid");
    registry
        .register(Box::new(histogram.clone()))
        .expect("metric name is unique within the registry");
    histogram
}

impl MetricsBundle {
    fn new(registry: &Registry) -> Self {
        let account_labels = ["blockchain", "chain_id", "account_name", "account_address", "is_contract"];
        let account_token_labels = [
            "blockchain",
            "chain_id",
            "token_name",
            "token_address",
            "token_decimals",
            "account_name",
            "account_address",
            "is_contract",
        ];
        let contract_labels = ["blockchain", "chain_id", "contract_name", "contract_address"];
        let contract_transfer_labels = [
            "blockchain",
            "chain_id",
            "contract_name",
            "contract_address",
            "window_blocks",
        ];
        let chain_labels = ["blockchain", "chain_id"];

        Self {
            up: gauge(registry, "blockchain_exporter_up", "Whether the exporter process is up"),
            configured_blockchains: gauge(
                registry,
                "blockchain_exporter_configured_blockchains",
                "Number of blockchains currently configured",
            ),
            account_balance_eth: gauge_vec(
                registry,
                "blockchain_account_balance_eth",
                "Native token account balance in ETH units",
                &account_labels,
            ),
            account_balance_wei: gauge_vec(
                registry,
                "blockchain_account_balance_wei",
                "Native token account balance in wei",
                &account_labels,
            ),
            account_token_balance: gauge_vec(
                registry,
                "blockchain_account_token_balance",
                "ERC-20 token balance in token units",
                &account_token_labels,
            ),
            account_token_balance_raw: gauge_vec(
                registry,
                "blockchain_account_token_balance_raw",
                "ERC-20 token balance in raw integer units",
                &account_token_labels,
            ),
            contract_balance_eth: gauge_vec(
                registry,
                "blockchain_contract_balance_eth",
                "Native token contract balance in ETH units",
                &contract_labels,
            ),
            contract_balance_wei: gauge_vec(
                registry,
                "blockchain_contract_balance_wei",
                "Native token contract balance in wei",
                &contract_labels,
            ),
            contract_token_total_supply: gauge_vec(
                registry,
                "blockchain_contract_token_total_supply",
                "ERC-20 total supply",
                &contract_labels,
            ),
            contract_transfer_count_window: gauge_vec(
                registry,
                "blockchain_contract_transfer_count_window",
                "Transfer event count observed in the trailing block window",
                &contract_transfer_labels,
            ),
            chain_head_block_number: gauge_vec(
                registry,
                "blockchain_chain_head_block_number",
                "Latest observed head block number",
                &chain_labels,
            ),
            chain_finalized_block_number: gauge_vec(
                registry,
                "blockchain_chain_finalized_block_number",
                "Latest observed finalized block number",
                &chain_labels,
            ),
            chain_head_block_timestamp_seconds: gauge_vec(
                registry,
                "blockchain_chain_head_block_timestamp_seconds",
                "Timestamp of the head block",
                &chain_labels,
            ),
            chain_time_since_last_block_seconds: gauge_vec(
                registry,
                "blockchain_chain_time_since_last_block_seconds",
                "Seconds elapsed since the head block's timestamp",
                &chain_labels,
            ),
            poll_success: gauge_vec(
                registry,
                "blockchain_poll_success",
                "Whether the most recent poll iteration succeeded",
                &chain_labels,
            ),
            poll_timestamp_seconds: gauge_vec(
                registry,
                "blockchain_poll_timestamp_seconds",
                "Timestamp of the most recent poll iteration",
                &chain_labels,
            ),
            chain_configured_accounts_count: gauge_vec(
                registry,
                "blockchain_chain_configured_accounts_count",
                "Number of accounts configured for this chain",
                &chain_labels,
            ),
            chain_configured_contracts_count: gauge_vec(
                registry,
                "blockchain_chain_configured_contracts_count",
                "Number of contracts configured for this chain",
                &chain_labels,
            ),
            poller_thread_count: gauge(
                registry,
                "blockchain_exporter_poller_thread_count",
                "Number of currently active per-chain poller tasks",
            ),
            poll_duration_seconds: histogram_vec(
                registry,
                "blockchain_poll_duration_seconds",
                "Wall-clock duration of one poll iteration",
                &chain_labels,
                POLL_DURATION_BUCKETS,
            ),
            poll_consecutive_failures: gauge_vec(
                registry,
                "blockchain_poll_consecutive_failures",
                "Number of consecutive failed poll iterations for this chain",
                &chain_labels,
            ),
            poll_backoff_duration_seconds: histogram_vec(
                registry,
                "blockchain_poll_backoff_duration_seconds",
                "Backoff duration applied after a failed poll iteration",
                &chain_labels,
                BACKOFF_DURATION_BUCKETS,
            ),
            rpc_call_duration_seconds: histogram_vec(
                registry,
                "blockchain_rpc_call_duration_seconds",
                "Duration of one RPC call, including retries",
                &["blockchain", "chain_id", "operation"],
                RPC_DURATION_BUCKETS,
            ),
            rpc_error_total: counter_vec(
                registry,
                "blockchain_rpc_error_total",
                "Count of RPC calls that ultimately failed, by error type",
                &["blockchain", "chain_id", "operation", "error_type"],
            ),
            log_chunks_created_total: counter_vec(
                registry,
                "blockchain_log_chunks_created_total",
                "Count of eth_getLogs chunk fetch attempts",
                &contract_labels,
            ),
            log_blocks_queried_per_chunk: histogram_vec(
                registry,
                "blockchain_log_blocks_queried_per_chunk",
                "Number of blocks covered by one eth_getLogs chunk",
                &contract_labels,
                BLOCKS_PER_CHUNK_BUCKETS,
            ),
            log_chunk_duration_seconds: histogram_vec(
                registry,
                "blockchain_log_chunk_duration_seconds",
                "Wall-clock duration of one eth_getLogs chunk fetch",
                &contract_labels,
                CHUNK_DURATION_BUCKETS,
            ),
        }
    }
}

fn now_unix_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

fn safe_remove(gauge: &GaugeVec, labels: &[&str]) {
    if let Err(err) = gauge.remove_label_values(labels) {
        tracing::debug!(error = %err, "metric series was already absent");
    }
}

/// All process-wide mutable metrics state: the registry, the bundle of
/// metric families, and the per-chain label cache plus health bookkeeping
/// maps, all behind one mutex so lock ordering can never invert.
pub struct MetricsState {
    pub registry: Registry,
    pub bundle: MetricsBundle,
    inner: Mutex<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    label_cache: HashMap<ChainIdentity, ChainMetricLabelState>,
    resolved_chain_ids: HashMap<ChainIdentity, String>,
    chain_health: HashMap<ChainIdentity, bool>,
    chain_last_success: HashMap<ChainIdentity, f64>,
}

impl MetricsState {
    pub fn new() -> Self {
        let registry = Registry::new();
        let bundle = MetricsBundle::new(&registry);
        Self {
            registry,
            bundle,
            inner: Mutex::new(MetricsInner::default()),
        }
    }

    pub fn set_up(&self, up: bool) {
        self.bundle.up.set(if up { 1.0 } else { 0.0 });
    }

    pub fn set_configured_blockchains(&self, count: usize) {
        self.bundle.configured_blockchains.set(count as f64);
    }

    /// Remove every series recorded for `identity`'s cached label state, and
    /// drop the cache entry. Returns true if anything was actually cached
    /// (and therefore removed).
    pub fn clear_cached_metrics(&self, identity: &ChainIdentity) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(state) = inner.label_cache.remove(identity) else {
            return false;
        };
        self.remove_chain_metrics_for_label_locked(&mut inner, &identity.0, &state);
        true
    }

    /// Remove the chain-level (head/finalized/poll/...) series plus every
    /// account/contract series recorded in `state`, without requiring a
    /// cache entry to exist. Used both by `clear_cached_metrics` and as a
    /// fallback when nothing was cached but a chain-id label still needs
    /// tearing down.
    pub fn remove_chain_metrics_for_label(&self, blockchain: &str, state: &ChainMetricLabelState) {
        let mut inner = self.inner.lock().unwrap();
        self.remove_chain_metrics_for_label_locked(&mut inner, blockchain, state);
    }

    fn remove_chain_metrics_for_label_locked(
        &self,
        inner: &mut MetricsInner,
        blockchain: &str,
        state: &ChainMetricLabelState,
    ) {
        let chain_id = state.chain_id_label.as_str();
        let chain_labels = [blockchain, chain_id];
        safe_remove(&self.bundle.chain_head_block_number, &chain_labels);
        safe_remove(&self.bundle.chain_finalized_block_number, &chain_labels);
        safe_remove(&self.bundle.chain_head_block_timestamp_seconds, &chain_labels);
        safe_remove(&self.bundle.chain_time_since_last_block_seconds, &chain_labels);
        safe_remove(&self.bundle.poll_success, &chain_labels);
        safe_remove(&self.bundle.poll_timestamp_seconds, &chain_labels);
        safe_remove(&self.bundle.chain_configured_accounts_count, &chain_labels);
        safe_remove(&self.bundle.chain_configured_contracts_count, &chain_labels);

        for labels in &state.account_balance_labels {
            let l: [&str; 5] = [&labels.0, &labels.1, &labels.2, &labels.3, &labels.4];
            safe_remove(&self.bundle.account_balance_eth, &l);
            safe_remove(&self.bundle.account_balance_wei, &l);
        }
        for labels in &state.account_token_labels {
            let l: [&str; 8] = [
                &labels.0, &labels.1, &labels.2, &labels.3, &labels.4, &labels.5, &labels.6, &labels.7,
            ];
            safe_remove(&self.bundle.account_token_balance, &l);
            safe_remove(&self.bundle.account_token_balance_raw, &l);
        }
        for labels in &state.contract_balance_labels {
            let l: [&str; 4] = [&labels.0, &labels.1, &labels.2, &labels.3];
            safe_remove(&self.bundle.contract_balance_eth, &l);
            safe_remove(&self.bundle.contract_balance_wei, &l);
            safe_remove(&self.bundle.contract_token_total_supply, &l);
        }
        for labels in &state.contract_transfer_labels {
            let l: [&str; 5] = [&labels.0, &labels.1, &labels.2, &labels.3, &labels.4];
            safe_remove(&self.bundle.contract_transfer_count_window, &l);
        }

        let identity = inner
            .resolved_chain_ids
            .iter()
            .find(|(k, v)| k.0 == blockchain && v.as_str() == chain_id)
            .map(|(k, _)| k.clone());
        if let Some(identity) = identity {
            inner.chain_health.remove(&identity);
            inner.chain_last_success.remove(&identity);
        }
    }

    /// Zero out the chain-level gauges for `identity`/`chain_id_label`
    /// (used on poll failure, which keeps the series present but signals
    /// "no current data" rather than deleting it outright).
    pub fn reset_chain_metrics(&self, blockchain: &str, chain_id_label: &str) {
        let chain_labels = [blockchain, chain_id_label];
        self.bundle.chain_head_block_number.with_label_values(&chain_labels).set(0.0);
        self.bundle
            .chain_finalized_block_number
            .with_label_values(&chain_labels)
            .set(0.0);
        self.bundle
            .chain_head_block_timestamp_seconds
            .with_label_values(&chain_labels)
            .set(0.0);
        self.bundle
            .chain_time_since_last_block_seconds
            .with_label_values(&chain_labels)
            .set(0.0);
    }

    pub fn record_poll_success(&self, identity: &ChainIdentity, chain_id_label: &str) {
        let chain_labels = [identity.0.as_str(), chain_id_label];
        self.bundle.poll_success.with_label_values(&chain_labels).set(1.0);
        let now = now_unix_seconds();
        self.bundle.poll_timestamp_seconds.with_label_values(&chain_labels).set(now);

        let mut inner = self.inner.lock().unwrap();
        inner.chain_health.insert(identity.clone(), true);
        inner.chain_last_success.insert(identity.clone(), now);
    }

    pub fn record_poll_failure(&self, identity: &ChainIdentity, chain_id_label: &str) {
        let chain_labels = [identity.0.as_str(), chain_id_label];
        self.bundle.poll_success.with_label_values(&chain_labels).set(0.0);
        self.bundle.poll_timestamp_seconds.with_label_values(&chain_labels).set(0.0);
        self.reset_chain_metrics(&identity.0, chain_id_label);
        self.clear_cached_metrics(identity);

        let mut inner = self.inner.lock().unwrap();
        inner.chain_health.insert(identity.clone(), false);
    }

    /// No-op if the resolved chain-id label for `identity` hasn't changed
    /// since the last call. Otherwise tears down whatever was cached under
    /// the old label (falling back to a direct sweep if nothing was
    /// cached) and records the new label.
    pub fn handle_chain_id_update(&self, identity: &ChainIdentity, new_chain_id_label: &str) {
        let previous = {
            let inner = self.inner.lock().unwrap();
            inner.resolved_chain_ids.get(identity).cloned()
        };

        if previous.as_deref() == Some(new_chain_id_label) {
            return;
        }

        if let Some(old_label) = previous {
            let cleared = self.clear_cached_metrics(identity);
            if !cleared {
                let fallback_state = ChainMetricLabelState::new(old_label);
                self.remove_chain_metrics_for_label(&identity.0, &fallback_state);
            }
        }

        let mut inner = self.inner.lock().unwrap();
        inner
            .resolved_chain_ids
            .insert(identity.clone(), new_chain_id_label.to_string());
    }

    pub fn resolved_chain_id(&self, identity: &ChainIdentity) -> Option<String> {
        self.inner.lock().unwrap().resolved_chain_ids.get(identity).cloned()
    }

    pub fn is_healthy(&self, identity: &ChainIdentity) -> Option<bool> {
        self.inner.lock().unwrap().chain_health.get(identity).copied()
    }

    pub fn last_success(&self, identity: &ChainIdentity) -> Option<f64> {
        self.inner.lock().unwrap().chain_last_success.get(identity).copied()
    }

    pub fn all_chain_health(&self) -> Vec<(ChainIdentity, bool)> {
        let inner = self.inner.lock().unwrap();
        inner.chain_health.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    /// Record that `labels` is now a live series for `identity`, creating
    /// the chain's label-cache entry on first use.
    pub fn track_account_balance_label(&self, identity: &ChainIdentity, chain_id_label: &str, label: AccountBalanceLabel) {
        let mut inner = self.inner.lock().unwrap();
        let state = inner
            .label_cache
            .entry(identity.clone())
            .or_insert_with(|| ChainMetricLabelState::new(chain_id_label));
        state.account_balance_labels.insert(label);
    }

    pub fn track_account_token_label(&self, identity: &ChainIdentity, chain_id_label: &str, label: AccountTokenLabel) {
        let mut inner = self.inner.lock().unwrap();
        let state = inner
            .label_cache
            .entry(identity.clone())
            .or_insert_with(|| ChainMetricLabelState::new(chain_id_label));
        state.account_token_labels.insert(label);
    }

    pub fn track_contract_balance_label(&self, identity: &ChainIdentity, chain_id_label: &str, label: ContractBalanceLabel) {
        let mut inner = self.inner.lock().unwrap();
        let state = inner
            .label_cache
            .entry(identity.clone())
            .or_insert_with(|| ChainMetricLabelState::new(chain_id_label));
        state.contract_balance_labels.insert(label);
    }

    /// Remove this account's balance and token-balance series and stop
    /// tracking them in the label cache, e.g. when a probe that previously
    /// succeeded for this account starts failing.
    pub fn clear_account_labels(&self, identity: &ChainIdentity, account_name: &str, account_address: &str) {
        let mut inner = self.inner.lock().unwrap();
        let Some(state) = inner.label_cache.get_mut(identity) else {
            return;
        };

        let balance_labels: Vec<AccountBalanceLabel> = state
            .account_balance_labels
            .iter()
            .filter(|l| l.2 == account_name && l.3 == account_address)
            .cloned()
            .collect();
        for labels in &balance_labels {
            state.account_balance_labels.remove(labels);
            let l: [&str; 5] = [&labels.0, &labels.1, &labels.2, &labels.3, &labels.4];
            safe_remove(&self.bundle.account_balance_eth, &l);
            safe_remove(&self.bundle.account_balance_wei, &l);
        }

        let token_labels: Vec<AccountTokenLabel> = state
            .account_token_labels
            .iter()
            .filter(|l| l.5 == account_name && l.6 == account_address)
            .cloned()
            .collect();
        for labels in &token_labels {
            state.account_token_labels.remove(labels);
            let l: [&str; 8] = [
                &labels.0, &labels.1, &labels.2, &labels.3, &labels.4, &labels.5, &labels.6, &labels.7,
            ];
            safe_remove(&self.bundle.account_token_balance, &l);
            safe_remove(&self.bundle.account_token_balance_raw, &l);
        }
    }

    pub fn track_contract_transfer_label(&self, identity: &ChainIdentity, chain_id_label: &str, label: ContractTransferLabel) {
        let mut inner = self.inner.lock().unwrap();
        let state = inner
            .label_cache
            .entry(identity.clone())
            .or_insert_with(|| ChainMetricLabelState::new(chain_id_label));
        state.contract_transfer_labels.insert(label);
    }

    pub fn set_poller_thread_count(&self, count: usize) {
        self.bundle.poller_thread_count.set(count as f64);
    }

    pub fn record_poll_duration(&self, blockchain: &str, chain_id_label: &str, seconds: f64) {
        self.bundle
            .poll_duration_seconds
            .with_label_values(&[blockchain, chain_id_label])
            .observe(seconds);
    }

    pub fn set_poll_consecutive_failures(&self, blockchain: &str, chain_id_label: &str, count: u32) {
        self.bundle
            .poll_consecutive_failures
            .with_label_values(&[blockchain, chain_id_label])
            .set(count as f64);
    }

    pub fn record_poll_backoff_duration(&self, blockchain: &str, chain_id_label: &str, seconds: f64) {
        self.bundle
            .poll_backoff_duration_seconds
            .with_label_values(&[blockchain, chain_id_label])
            .observe(seconds);
    }

    pub fn record_rpc_call_duration(&self, blockchain: &str, chain_id_label: &str, operation: &str, seconds: f64) {
        self.bundle
            .rpc_call_duration_seconds
            .with_label_values(&[blockchain, chain_id_label, operation])
            .observe(seconds);
    }

    pub fn record_rpc_error(&self, blockchain: &str, chain_id_label: &str, operation: &str, error_type: &str) {
        self.bundle
            .rpc_error_total
            .with_label_values(&[blockchain, chain_id_label, operation, error_type])
            .inc();
    }

    pub fn record_log_chunk_created(&self, blockchain: &str, chain_id_label: &str, contract_address: &str) {
        self.bundle
            .log_chunks_created_total
            .with_label_values(&[blockchain, chain_id_label, contract_address])
            .inc();
    }

    pub fn record_log_chunk_blocks(&self, blockchain: &str, chain_id_label: &str, contract_address: &str, blocks: u64) {
        self.bundle
            .log_blocks_queried_per_chunk
            .with_label_values(&[blockchain, chain_id_label, contract_address])
            .observe(blocks as f64);
    }

    pub fn record_log_chunk_duration(&self, blockchain: &str, chain_id_label: &str, contract_address: &str, seconds: f64) {
        self.bundle
            .log_chunk_duration_seconds
            .with_label_values(&[blockchain, chain_id_label, contract_address])
            .observe(seconds);
    }
}

impl Default for MetricsState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str) -> ChainIdentity {
        (name.to_string(), format!("http://{name}"))
    }

    #[test]
    fn record_poll_success_then_failure_toggles_health() {
        let metrics = MetricsState::new();
        let id = identity("eth");
        metrics.record_poll_success(&id, "1");
        assert_eq!(metrics.is_healthy(&id), Some(true));
        metrics.record_poll_failure(&id, "1");
        assert_eq!(metrics.is_healthy(&id), Some(false));
    }

    #[test]
    fn handle_chain_id_update_is_noop_for_same_label() {
        let metrics = MetricsState::new();
        let id = identity("eth");
        metrics.handle_chain_id_update(&id, "1");
        metrics.track_account_balance_label(&id, "1", ("eth".into(), "1".into(), "a".into(), "0xabc".into(), "false".into()));
        metrics.handle_chain_id_update(&id, "1");
        let cleared = metrics.clear_cached_metrics(&id);
        assert!(cleared, "label state should have survived the no-op update");
    }

    #[test]
    fn handle_chain_id_update_clears_old_label_state() {
        let metrics = MetricsState::new();
        let id = identity("eth");
        metrics.handle_chain_id_update(&id, "1");
        metrics.track_contract_balance_label(&id, "1", ("eth".into(), "1".into(), "token".into(), "0xdef".into()));
        metrics.handle_chain_id_update(&id, "2");
        assert_eq!(metrics.resolved_chain_id(&id), Some("2".to_string()));
        assert!(!metrics.clear_cached_metrics(&id), "old label's cache entry should already be gone");
    }

    #[test]
    fn clear_cached_metrics_returns_false_when_nothing_cached() {
        let metrics = MetricsState::new();
        let id = identity("eth");
        assert!(!metrics.clear_cached_metrics(&id));
    }

    #[test]
    fn poller_thread_count_reflects_last_set_value() {
        let metrics = MetricsState::new();
        metrics.set_poller_thread_count(3);
        assert_eq!(metrics.bundle.poller_thread_count.get(), 3.0);
        metrics.set_poller_thread_count(0);
        assert_eq!(metrics.bundle.poller_thread_count.get(), 0.0);
    }

    #[test]
    fn rpc_error_total_increments_per_error_type() {
        let metrics = MetricsState::new();
        metrics.record_rpc_error("eth", "1", "get_logs", "timeout");
        metrics.record_rpc_error("eth", "1", "get_logs", "timeout");
        metrics.record_rpc_error("eth", "1", "get_logs", "connection");
        let timeout_count = metrics
            .bundle
            .rpc_error_total
            .with_label_values(&["eth", "1", "get_logs", "timeout"])
            .get();
        assert_eq!(timeout_count, 2.0);
    }

    #[test]
    fn clear_account_labels_removes_only_the_matching_account() {
        let metrics = MetricsState::new();
        let id = identity("eth");
        metrics.track_account_balance_label(&id, "1", ("eth".into(), "1".into(), "a".into(), "0xabc".into(), "false".into()));
        metrics.track_account_balance_label(&id, "1", ("eth".into(), "1".into(), "b".into(), "0xdef".into(), "false".into()));

        metrics.clear_account_labels(&id, "a", "0xabc");

        let state = {
            let inner = metrics.inner.lock().unwrap();
            inner.label_cache.get(&id).cloned()
        };
        let remaining = state.unwrap().account_balance_labels;
        assert_eq!(remaining.len(), 1);
        assert!(remaining.iter().any(|l| l.2 == "b"));
    }

    #[test]
    fn log_chunk_counters_and_histograms_record_observations() {
        let metrics = MetricsState::new();
        metrics.record_log_chunk_created("eth", "1", "0xabc");
        metrics.record_log_chunk_blocks("eth", "1", "0xabc", 250);
        metrics.record_log_chunk_duration("eth", "1", "0xabc", 0.2);

        let created = metrics
            .bundle
            .log_chunks_created_total
            .with_label_values(&["eth", "1", "0xabc"])
            .get();
        assert_eq!(created, 1.0);

        let blocks_sample_count = metrics
            .bundle
            .log_blocks_queried_per_chunk
            .with_label_values(&["eth", "1", "0xabc"])
            .get_sample_count();
        assert_eq!(blocks_sample_count, 1);
    }
}
