//! One poll iteration's worth of metric collection for a single chain.

use std::collections::HashSet;

use crate::collectors;
use crate::config::{AccountConfig, BlockchainConfig, ContractAccountConfig, ContractConfig};
use crate::logging::LogContext;
use crate::models::{chain_identity, ChainRuntimeContext};
use crate::rpc::RpcClient;

/// Resolve (or re-resolve) the chain-id label for this chain, updating the
/// label cache if it has changed since the last iteration.
async fn resolve_chain_id_label(ctx: &ChainRuntimeContext, rpc: &RpcClient) -> String {
    let identity = chain_identity(&ctx.config);
    let previous = ctx.metrics.resolved_chain_id(&identity);
    let label = collectors::resolve_chain_id_label(rpc, ctx, previous.as_deref()).await;
    ctx.metrics.handle_chain_id_update(&identity, &label);
    label
}

/// Record head/finalized block state. Head-block failure is fatal for this
/// iteration (the chain-level series are zeroed and the caller treats the
/// whole iteration as failed). Finalized-block failure is silently zeroed
/// with a debug log, since not every chain exposes the `"finalized"` tag.
async fn record_chain_health_metrics(ctx: &ChainRuntimeContext, rpc: &RpcClient) -> Option<()> {
    let identity = chain_identity(&ctx.config);
    let chain_labels = [ctx.config.name.as_str(), ctx.chain_id_label.as_str()];

    let (head_number, head_timestamp) = match collectors::collect_head_block(rpc).await {
        Ok(values) => values,
        Err(err) => {
            tracing::warn!(blockchain = %ctx.config.name, error = %err, "failed to fetch head block");
            return None;
        }
    };

    ctx.metrics
        .bundle
        .chain_head_block_number
        .with_label_values(&chain_labels)
        .set(head_number as f64);
    ctx.metrics
        .bundle
        .chain_head_block_timestamp_seconds
        .with_label_values(&chain_labels)
        .set(head_timestamp as f64);

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    let time_since = (now - head_timestamp as f64).max(0.0);
    ctx.metrics
        .bundle
        .chain_time_since_last_block_seconds
        .with_label_values(&chain_labels)
        .set(time_since);

    match collectors::collect_finalized_block(rpc).await {
        Ok(finalized) => {
            ctx.metrics
                .bundle
                .chain_finalized_block_number
                .with_label_values(&chain_labels)
                .set(finalized as f64);
        }
        Err(err) => {
            tracing::debug!(blockchain = %ctx.config.name, error = %err, "chain does not expose a finalized block, zeroing");
            ctx.metrics
                .bundle
                .chain_finalized_block_number
                .with_label_values(&chain_labels)
                .set(0.0);
        }
    }

    Some(())
}

/// A probe for `account_name`/`account_address` just failed: remove any
/// previously-published balance/token series for this account and zero the
/// native-balance gauges under the `"0"` contract flag, mirroring the
/// original's `clear_token_metrics_for_account`/`clear_eth_metrics_for_account`.
async fn clear_account_token_metrics(ctx: &ChainRuntimeContext, account_name: &str, account_address: &str) {
    let identity = chain_identity(&ctx.config);
    ctx.metrics.clear_account_labels(&identity, account_name, account_address);

    let label = ctx.account_labels(account_name, account_address).with_contract_flag(false);
    let l: [&str; 5] = [&label.0, &label.1, &label.2, &label.3, &label.4];
    ctx.metrics.bundle.account_balance_wei.with_label_values(&l).set(0.0);
    ctx.metrics.bundle.account_balance_eth.with_label_values(&l).set(0.0);
}

async fn record_account_balance(ctx: &ChainRuntimeContext, rpc: &RpcClient, name: &str, address: &str) {
    let log_ctx = LogContext::new(&ctx.config.name)
        .with_chain_id_label(&ctx.chain_id_label)
        .with_account(name, address);
    let _guard = log_ctx.span().entered();

    let identity = chain_identity(&ctx.config);

    let is_contract = match collectors::is_contract_address(rpc, address).await {
        Ok(v) => v,
        Err(err) => {
            tracing::warn!(blockchain = %ctx.config.name, account = name, error = %err, "failed to fetch account code");
            clear_account_token_metrics(ctx, name, address).await;
            return;
        }
    };

    let (wei, eth) = match collectors::collect_native_balance(rpc, address).await {
        Ok(v) => v,
        Err(err) => {
            tracing::warn!(blockchain = %ctx.config.name, account = name, error = %err, "failed to fetch account balance");
            clear_account_token_metrics(ctx, name, address).await;
            return;
        }
    };

    let label = ctx.account_labels(name, address).with_contract_flag(is_contract);
    let l: [&str; 5] = [&label.0, &label.1, &label.2, &label.3, &label.4];
    ctx.metrics.bundle.account_balance_wei.with_label_values(&l).set(wei as f64);
    ctx.metrics.bundle.account_balance_eth.with_label_values(&l).set(eth);
    ctx.metrics
        .track_account_balance_label(&identity, &ctx.chain_id_label, label);
}

async fn record_account_token_balance(
    ctx: &ChainRuntimeContext,
    rpc: &RpcClient,
    account_name: &str,
    account_address: &str,
    is_contract: bool,
    contract: &ContractConfig,
) {
    let decimals = match contract.decimals {
        Some(d) => Some(d),
        None => collectors::collect_token_decimals(rpc, &contract.address).await,
    };

    let (raw, units) = match collectors::collect_token_balance(rpc, &contract.address, account_address, decimals).await {
        Ok(v) => v,
        Err(err) => {
            tracing::warn!(
                blockchain = %ctx.config.name,
                token = %contract.name,
                account = account_name,
                error = %err,
                "failed to fetch token balance"
            );
            return;
        }
    };

    let decimals_label = decimals.unwrap_or(collectors::DEFAULT_TOKEN_DECIMALS).to_string();
    let label = (
        ctx.config.name.clone(),
        ctx.chain_id_label.clone(),
        contract.name.clone(),
        contract.address.clone(),
        decimals_label,
        account_name.to_string(),
        account_address.to_string(),
        is_contract.to_string(),
    );
    let l: [&str; 8] = [
        &label.0, &label.1, &label.2, &label.3, &label.4, &label.5, &label.6, &label.7,
    ];
    ctx.metrics.bundle.account_token_balance_raw.with_label_values(&l).set(raw as f64);
    ctx.metrics.bundle.account_token_balance.with_label_values(&l).set(units);

    let identity = chain_identity(&ctx.config);
    ctx.metrics.track_account_token_label(&identity, &ctx.chain_id_label, label);
}

async fn record_contract_metrics(ctx: &ChainRuntimeContext, rpc: &RpcClient, contract: &ContractConfig, head_block: u64) {
    let log_ctx = LogContext::new(&ctx.config.name)
        .with_chain_id_label(&ctx.chain_id_label)
        .with_contract(&contract.name);
    let _guard = log_ctx.span().entered();

    let identity = chain_identity(&ctx.config);
    let labels = ctx.contract_labels(&contract.name, &contract.address);
    let tuple = labels.as_tuple();
    let l: [&str; 4] = [&tuple.0, &tuple.1, &tuple.2, &tuple.3];

    match collectors::collect_native_balance(rpc, &contract.address).await {
        Ok((wei, eth)) => {
            ctx.metrics.bundle.contract_balance_wei.with_label_values(&l).set(wei as f64);
            ctx.metrics.bundle.contract_balance_eth.with_label_values(&l).set(eth);
        }
        Err(err) => {
            tracing::warn!(blockchain = %ctx.config.name, contract = %contract.name, error = %err, "failed to fetch contract balance");
            ctx.metrics.bundle.contract_balance_wei.with_label_values(&l).set(0.0);
            ctx.metrics.bundle.contract_balance_eth.with_label_values(&l).set(0.0);
        }
    }

    let decimals = match contract.decimals {
        Some(d) => Some(d),
        None => collectors::collect_token_decimals(rpc, &contract.address).await,
    };
    match collectors::collect_total_supply(rpc, &contract.address, decimals).await {
        Some((_, supply_units)) => {
            ctx.metrics
                .bundle
                .contract_token_total_supply
                .with_label_values(&l)
                .set(supply_units);
        }
        None => {
            ctx.metrics.bundle.contract_token_total_supply.with_label_values(&l).set(0.0);
        }
    }

    ctx.metrics.track_contract_balance_label(&identity, &ctx.chain_id_label, tuple);

    let lookback = collectors::effective_transfer_lookback(contract);
    let start_block = head_block.saturating_sub(lookback.saturating_sub(1));
    if let Some(count) = collectors::collect_contract_transfer_count(
        rpc,
        &contract.address,
        start_block,
        head_block,
        &ctx.metrics,
        &ctx.config.name,
        &ctx.chain_id_label,
    )
    .await
    {
        let window_tuple = labels.with_window(lookback);
        let wl: [&str; 5] = [&window_tuple.0, &window_tuple.1, &window_tuple.2, &window_tuple.3, &window_tuple.4];
        ctx.metrics
            .bundle
            .contract_transfer_count_window
            .with_label_values(&wl)
            .set(count as f64);
        ctx.metrics
            .track_contract_transfer_label(&identity, &ctx.chain_id_label, window_tuple);
    } else {
        tracing::debug!(blockchain = %ctx.config.name, contract = %contract.name, "transfer count unavailable for this iteration");
        let window_tuple = labels.with_window(lookback);
        let wl: [&str; 5] = [&window_tuple.0, &window_tuple.1, &window_tuple.2, &window_tuple.3, &window_tuple.4];
        ctx.metrics.bundle.contract_transfer_count_window.with_label_values(&wl).set(0.0);
    }

    for account in &contract.accounts {
        let is_contract = collectors::is_contract_address(rpc, &account.address).await.unwrap_or(false);
        record_account_token_balance(ctx, rpc, &account.name, &account.address, is_contract, contract).await;
    }
}

fn seen_addresses(accounts: &[AccountConfig]) -> HashSet<String> {
    accounts.iter().map(|a| a.address.to_lowercase()).collect()
}

fn contract_account_not_seen<'a>(
    contract_accounts: &'a [ContractAccountConfig],
    seen: &HashSet<String>,
) -> impl Iterator<Item = &'a ContractAccountConfig> {
    contract_accounts
        .iter()
        .filter(move |a| !seen.contains(&a.address.to_lowercase()))
}

/// Record native-balance metrics for contract-embedded accounts that were
/// not already covered by the chain's top-level account list, so an account
/// referenced only as a token holder still gets its native balance tracked.
async fn record_additional_contract_accounts(ctx: &ChainRuntimeContext, rpc: &RpcClient, config: &BlockchainConfig) {
    let seen = seen_addresses(&config.accounts);
    let mut already_recorded: HashSet<String> = HashSet::new();

    for contract in &config.contracts {
        for account in contract_account_not_seen(&contract.accounts, &seen) {
            let key = account.address.to_lowercase();
            if !already_recorded.insert(key) {
                continue;
            }
            record_account_balance(ctx, rpc, &account.name, &account.address).await;
        }
    }
}

/// Run one full collection pass for a single chain: resolve chain id,
/// record head/finalized block health, then contract and account metrics.
/// Returns `None` if the iteration should be treated as a poll failure
/// (head-block fetch failed).
pub async fn collect_chain_metrics(ctx: &mut ChainRuntimeContext, rpc: &RpcClient) -> Option<()> {
    let label = resolve_chain_id_label(ctx, rpc).await;
    rpc.set_chain_id_label(label.clone());
    ctx.chain_id_label = label;

    record_chain_health_metrics(ctx, rpc).await?;

    let head_number = {
        let chain_labels = [ctx.config.name.as_str(), ctx.chain_id_label.as_str()];
        ctx.metrics
            .bundle
            .chain_head_block_number
            .with_label_values(&chain_labels)
            .get() as u64
    };

    let chain_labels = [ctx.config.name.as_str(), ctx.chain_id_label.as_str()];
    ctx.metrics
        .bundle
        .chain_configured_accounts_count
        .with_label_values(&chain_labels)
        .set(ctx.config.accounts.len() as f64);
    ctx.metrics
        .bundle
        .chain_configured_contracts_count
        .with_label_values(&chain_labels)
        .set(ctx.config.contracts.len() as f64);

    for contract in &ctx.config.contracts.clone() {
        record_contract_metrics(ctx, rpc, contract, head_number).await;
    }

    for account in &ctx.config.accounts.clone() {
        record_account_balance(ctx, rpc, &account.name, &account.address).await;
    }

    record_additional_contract_accounts(ctx, rpc, &ctx.config).await;

    let identity = chain_identity(&ctx.config);
    ctx.metrics.record_poll_success(&identity, &ctx.chain_id_label);

    Some(())
}
