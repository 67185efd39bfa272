//! Label tuples, snapshots, and per-chain runtime context shared across
//! the collector and metrics layers.

use std::sync::Arc;

use crate::config::BlockchainConfig;
use crate::context::ApplicationContext;
use crate::metrics::MetricsState;
use crate::rpc::RpcClient;

/// Labels identifying a single account series. `is_contract` is folded in
/// separately by [`AccountLabels::with_contract_flag`] since it is only known
/// once the account's on-chain code has been probed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountLabels {
    pub blockchain: String,
    pub chain_id: String,
    pub account_name: String,
    pub account_address: String,
}

impl AccountLabels {
    pub fn new(
        blockchain: impl Into<String>,
        chain_id: impl Into<String>,
        account_name: impl Into<String>,
        account_address: impl Into<String>,
    ) -> Self {
        Self {
            blockchain: blockchain.into(),
            chain_id: chain_id.into(),
            account_name: account_name.into(),
            account_address: account_address.into(),
        }
    }

    pub fn as_tuple(&self) -> (String, String, String, String) {
        (
            self.blockchain.clone(),
            self.chain_id.clone(),
            self.account_name.clone(),
            self.account_address.clone(),
        )
    }

    pub fn with_contract_flag(&self, is_contract: bool) -> (String, String, String, String, String) {
        (
            self.blockchain.clone(),
            self.chain_id.clone(),
            self.account_name.clone(),
            self.account_address.clone(),
            is_contract.to_string(),
        )
    }
}

/// Labels identifying a single contract series.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContractLabels {
    pub blockchain: String,
    pub chain_id: String,
    pub contract_name: String,
    pub contract_address: String,
}

impl ContractLabels {
    pub fn new(
        blockchain: impl Into<String>,
        chain_id: impl Into<String>,
        contract_name: impl Into<String>,
        contract_address: impl Into<String>,
    ) -> Self {
        Self {
            blockchain: blockchain.into(),
            chain_id: chain_id.into(),
            contract_name: contract_name.into(),
            contract_address: contract_address.into(),
        }
    }

    pub fn as_tuple(&self) -> (String, String, String, String) {
        (
            self.blockchain.clone(),
            self.chain_id.clone(),
            self.contract_name.clone(),
            self.contract_address.clone(),
        )
    }

    pub fn with_window(&self, window_blocks: u64) -> (String, String, String, String, String) {
        (
            self.blockchain.clone(),
            self.chain_id.clone(),
            self.contract_name.clone(),
            self.contract_address.clone(),
            window_blocks.to_string(),
        )
    }
}

/// An inclusive `[start_block, end_block]` span together with its size,
/// as handed to the transfer-count collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferWindow {
    pub start_block: u64,
    pub end_block: u64,
    pub span: u64,
}

impl TransferWindow {
    pub fn new(start_block: u64, end_block: u64) -> Self {
        let span = end_block.saturating_sub(start_block) + 1;
        Self {
            start_block,
            end_block,
            span,
        }
    }
}

/// A single resolved account balance observation, ready to be written into
/// the metrics registry.
#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    pub labels: AccountLabels,
    pub balance_wei: u128,
    pub balance_eth: f64,
    pub is_contract: bool,
}

/// Everything a poll iteration needs for one chain: its static config, the
/// resolved chain-id label, the RPC client, a handle to the shared metrics
/// state, and a per-chain mutable poll state (failure counters, chunk size).
#[derive(Clone)]
pub struct ChainRuntimeContext {
    pub config: Arc<BlockchainConfig>,
    pub chain_id_label: String,
    pub rpc: Arc<RpcClient>,
    pub metrics: Arc<MetricsState>,
}

impl ChainRuntimeContext {
    pub fn new(
        config: Arc<BlockchainConfig>,
        chain_id_label: String,
        rpc: Arc<RpcClient>,
        metrics: Arc<MetricsState>,
    ) -> Self {
        Self {
            config,
            chain_id_label,
            rpc,
            metrics,
        }
    }

    pub fn account_labels(&self, account_name: &str, account_address: &str) -> AccountLabels {
        AccountLabels::new(
            self.config.name.clone(),
            self.chain_id_label.clone(),
            account_name,
            account_address,
        )
    }

    pub fn contract_labels(&self, contract_name: &str, contract_address: &str) -> ContractLabels {
        ContractLabels::new(
            self.config.name.clone(),
            self.chain_id_label.clone(),
            contract_name,
            contract_address,
        )
    }

    pub fn from_context(
        ctx: &ApplicationContext,
        config: Arc<BlockchainConfig>,
        chain_id_label: String,
        rpc: Arc<RpcClient>,
    ) -> Self {
        Self::new(config, chain_id_label, rpc, ctx.metrics.clone())
    }
}

/// Identity key used throughout the label cache and poller manager:
/// `(name, rpc_url)`, case-sensitive, exactly as configured.
pub type ChainIdentity = (String, String);

pub fn chain_identity(config: &BlockchainConfig) -> ChainIdentity {
    (config.name.clone(), config.rpc_url.clone())
}
