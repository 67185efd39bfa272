//! Per-chain metric collection: head/finalized block state, native and
//! ERC-20 balances, and adaptive-chunked Transfer-event counting.

use std::sync::Arc;

use once_cell::sync::Lazy;
use serde_json::Value;
use sha3::{Digest, Keccak256};

use crate::config::{BlockchainConfig, ContractConfig};
use crate::error::{RpcError, RpcErrorContext};
use crate::models::ChainRuntimeContext;
use crate::rpc::RpcClient;

pub const LOG_MAX_CHUNK_SIZE: u64 = 2000;
pub const LOG_MIN_CHUNK_SIZE: u64 = 100;
pub const LOG_TARGET_RESPONSE_SIZE: usize = 5000;
pub const LOG_CHUNK_REDUCTION_FACTOR: f64 = 0.75;
pub const LOG_CHUNK_GROWTH_FACTOR: f64 = 1.25;
pub const LOG_SPLIT_MIN_BLOCK_SPAN: u64 = 1;
pub const DEFAULT_TRANSFER_LOOKBACK_BLOCKS: u64 = 5000;
pub const DEFAULT_TOKEN_DECIMALS: u32 = 0;

const WEI_PER_ETH: f64 = 1_000_000_000_000_000_000.0;

/// `keccak256("Transfer(address,address,uint256)")`, computed once.
pub static TRANSFER_EVENT_TOPIC: Lazy<String> = Lazy::new(|| {
    let mut hasher = Keccak256::new();
    hasher.update(b"Transfer(address,address,uint256)");
    format!("0x{}", hex::encode(hasher.finalize()))
});

/// Parse a `"0x..."` hex quantity into `u128`. Returns `None` on anything
/// that isn't a well-formed hex string, including a missing `0x` prefix.
pub fn parse_hex_quantity(value: &Value) -> Option<u128> {
    let s = value.as_str()?;
    let trimmed = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
    if trimmed.is_empty() {
        return Some(0);
    }
    u128::from_str_radix(trimmed, 16).ok()
}

pub fn parse_hex_u64(value: &Value) -> Option<u64> {
    parse_hex_quantity(value).map(|v| v as u64)
}

fn wei_to_eth(wei: u128) -> f64 {
    (wei as f64) / WEI_PER_ETH
}

fn token_units(raw: u128, decimals: u32) -> f64 {
    (raw as f64) / 10f64.powi(decimals as i32)
}

fn encode_address_param(address: &str) -> String {
    let trimmed = address.trim_start_matches("0x").trim_start_matches("0X");
    format!("{:0>64}", trimmed.to_lowercase())
}

/// `balanceOf(address)` selector `0x70a08231` + 32-byte padded address.
fn balance_of_call_data(address: &str) -> String {
    format!("0x70a08231{}", encode_address_param(address))
}

const DECIMALS_SELECTOR: &str = "0x313ce567";
const TOTAL_SUPPLY_SELECTOR: &str = "0x18160ddd";

/// A LIFO-stack adaptive chunker over `[start_block, end_block]` used to
/// count Transfer logs without tripping provider-side response-size limits.
/// Pure and synchronous: callers drive RPC calls and feed results back in.
pub struct LogChunker {
    current_chunk_size: u64,
    stack: Vec<(u64, u64)>,
}

/// What the caller should do after popping a range off the chunker's stack.
pub enum NextStep {
    /// No more ranges; collection is complete.
    Done,
    /// Issue `eth_getLogs` for `[start, end]` and call
    /// `on_success`/`on_too_big`/`on_other_error` with the outcome.
    Fetch { start: u64, end: u64 },
}

impl LogChunker {
    pub fn new(start_block: u64, end_block: u64) -> Self {
        let mut stack = Vec::new();
        if end_block >= start_block {
            stack.push((start_block, end_block));
        }
        Self {
            current_chunk_size: LOG_MAX_CHUNK_SIZE,
            stack,
        }
    }

    /// Pop the next range to fetch, splitting it first if it exceeds the
    /// current chunk size. Splitting pushes the upper half then the lower
    /// half, so the lower half is fetched first (stable left-to-right order).
    pub fn next(&mut self) -> NextStep {
        let Some((start, end)) = self.stack.pop() else {
            return NextStep::Done;
        };
        let span = end - start + 1;
        if span > self.current_chunk_size {
            let chunk_end = start + self.current_chunk_size - 1;
            self.stack.push((chunk_end + 1, end));
            self.stack.push((start, chunk_end));
            return self.next();
        }
        NextStep::Fetch { start, end }
    }

    /// Record a successful fetch of `[start, end]` returning `response_size`
    /// logs, growing or shrinking the chunk size toward the target.
    pub fn on_success(&mut self, _start: u64, _end: u64, response_size: usize) {
        if response_size > LOG_TARGET_RESPONSE_SIZE {
            self.current_chunk_size = ((self.current_chunk_size as f64) * LOG_CHUNK_REDUCTION_FACTOR)
                .max(LOG_MIN_CHUNK_SIZE as f64) as u64;
        } else if response_size < LOG_TARGET_RESPONSE_SIZE / 4 {
            self.current_chunk_size = ((self.current_chunk_size as f64) * LOG_CHUNK_GROWTH_FACTOR)
                .min(LOG_MAX_CHUNK_SIZE as f64) as u64;
        }
    }

    /// Record a "response too big" protocol error for `[start, end]`:
    /// shrink the chunk size and re-push the (unsplit) range so it is
    /// retried at the smaller size; it does not count toward the total.
    /// A single-block range that is still too big aborts collection for
    /// this window entirely (no further recursion is possible).
    pub fn on_too_big(&mut self, start: u64, end: u64) -> bool {
        self.current_chunk_size =
            ((self.current_chunk_size as f64) * LOG_CHUNK_REDUCTION_FACTOR).max(LOG_MIN_CHUNK_SIZE as f64) as u64;
        if end - start + 1 <= LOG_SPLIT_MIN_BLOCK_SPAN {
            return false;
        }
        self.stack.push((start, end));
        true
    }
}

/// Count Transfer events emitted by `contract_address` across
/// `[start_block, end_block]` using the adaptive chunker. Any RPC error
/// other than "response too big" aborts the whole window, returning `None`
/// (the caller treats this the same as an unknown transfer count).
///
/// Every fetch attempt, regardless of outcome, records a chunk-created
/// counter increment, a block-span histogram observation, and a
/// chunk-duration observation against `metrics`.
pub async fn collect_contract_transfer_count(
    rpc: &RpcClient,
    contract_address: &str,
    start_block: u64,
    end_block: u64,
    metrics: &crate::metrics::MetricsState,
    blockchain: &str,
    chain_id_label: &str,
) -> Option<u64> {
    let mut chunker = LogChunker::new(start_block, end_block);
    let mut total: u64 = 0;

    loop {
        match chunker.next() {
            NextStep::Done => return Some(total),
            NextStep::Fetch { start, end } => {
                metrics.record_log_chunk_created(blockchain, chain_id_label, contract_address);
                metrics.record_log_chunk_blocks(blockchain, chain_id_label, contract_address, end - start + 1);

                let fetch_started = std::time::Instant::now();
                let outcome = rpc.get_logs(start, end, contract_address, &TRANSFER_EVENT_TOPIC).await;
                metrics.record_log_chunk_duration(
                    blockchain,
                    chain_id_label,
                    contract_address,
                    fetch_started.elapsed().as_secs_f64(),
                );

                match outcome {
                    Ok(Value::Array(logs)) => {
                        chunker.on_success(start, end, logs.len());
                        total += logs.len() as u64;
                    }
                    Ok(_) => {
                        chunker.on_success(start, end, 0);
                    }
                    Err(err) if err.is_response_too_big() => {
                        if !chunker.on_too_big(start, end) {
                            tracing::warn!(
                                contract_address,
                                start,
                                end,
                                "single-block eth_getLogs window still too big, aborting transfer count"
                            );
                            return None;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(
                            contract_address,
                            start,
                            end,
                            error = %err,
                            "eth_getLogs failed, aborting transfer count for this window"
                        );
                        return None;
                    }
                }
            }
        }
    }
}

/// Native-token balance of `address`, in (wei, eth) units.
pub async fn collect_native_balance(rpc: &RpcClient, address: &str) -> Result<(u128, f64), RpcError> {
    let raw = rpc.get_balance(address).await?;
    let wei = parse_hex_quantity(&raw).ok_or_else(|| {
        RpcError::validation(
            format!("eth_getBalance returned a non-hex value: {raw:?}"),
            RpcErrorContext::new().with_operation("eth_getBalance"),
        )
    })?;
    Ok((wei, wei_to_eth(wei)))
}

/// True if `address` has deployed bytecode (`eth_getCode` != "0x").
pub async fn is_contract_address(rpc: &RpcClient, address: &str) -> Result<bool, RpcError> {
    let code = rpc.get_code(address).await?;
    Ok(matches!(code.as_str(), Some(s) if s != "0x" && !s.is_empty()))
}

/// `balanceOf(address)` against an ERC-20-shaped contract, returned as
/// (raw, token-unit) using `decimals` (falling back to
/// [`DEFAULT_TOKEN_DECIMALS`] when unset).
pub async fn collect_token_balance(
    rpc: &RpcClient,
    token_address: &str,
    holder_address: &str,
    decimals: Option<u32>,
) -> Result<(u128, f64), RpcError> {
    let data = balance_of_call_data(holder_address);
    let raw_value = rpc.eth_call(token_address, &data).await?;
    let raw = parse_hex_quantity(&raw_value).ok_or_else(|| {
        RpcError::validation(
            format!("balanceOf returned a non-hex value: {raw_value:?}"),
            RpcErrorContext::new().with_operation("eth_call:balanceOf"),
        )
    })?;
    let decimals = decimals.unwrap_or(DEFAULT_TOKEN_DECIMALS);
    Ok((raw, token_units(raw, decimals)))
}

/// Best-effort `decimals()` probe; a single attempt, `None` on any failure.
pub async fn collect_token_decimals(rpc: &RpcClient, token_address: &str) -> Option<u32> {
    let result = rpc.eth_call_best_effort(token_address, DECIMALS_SELECTOR).await.ok()?;
    parse_hex_quantity(&result).map(|v| v as u32)
}

/// Best-effort `totalSupply()` probe, returned as (raw, token-unit).
pub async fn collect_total_supply(rpc: &RpcClient, token_address: &str, decimals: Option<u32>) -> Option<(u128, f64)> {
    let result = rpc
        .eth_call_best_effort(token_address, TOTAL_SUPPLY_SELECTOR)
        .await
        .ok()?;
    let raw = parse_hex_quantity(&result)?;
    let decimals = decimals.unwrap_or(DEFAULT_TOKEN_DECIMALS);
    Some((raw, token_units(raw, decimals)))
}

/// Head block number and timestamp from `eth_getBlockByNumber("latest", false)`.
pub async fn collect_head_block(rpc: &RpcClient) -> Result<(u64, u64), RpcError> {
    let block = rpc.get_block_by_number("latest").await?;
    let number = block
        .get("number")
        .and_then(parse_hex_u64)
        .ok_or_else(|| RpcError::validation("block response missing number", RpcErrorContext::new()))?;
    let timestamp = block
        .get("timestamp")
        .and_then(parse_hex_u64)
        .ok_or_else(|| RpcError::validation("block response missing timestamp", RpcErrorContext::new()))?;
    Ok((number, timestamp))
}

/// Finalized block number from `eth_getBlockByNumber("finalized", false)`.
/// Not every chain supports the `"finalized"` tag; failures here are
/// non-fatal and handled by the caller (zeroed with a debug log).
pub async fn collect_finalized_block(rpc: &RpcClient) -> Result<u64, RpcError> {
    let block = rpc.get_block_by_number("finalized").await?;
    block
        .get("number")
        .and_then(parse_hex_u64)
        .ok_or_else(|| RpcError::validation("finalized block response missing number", RpcErrorContext::new()))
}

pub fn effective_transfer_lookback(contract: &ContractConfig) -> u64 {
    contract.transfer_lookback_blocks.unwrap_or(DEFAULT_TRANSFER_LOOKBACK_BLOCKS)
}

/// Build an RPC client for `config`, sharing a `reqwest::Client` handle
/// obtained from the connection pool.
pub fn build_rpc_client(config: Arc<BlockchainConfig>, pool: &crate::rpc::ConnectionPoolManager) -> RpcClient {
    let client = pool.get_client(&config.rpc_url);
    RpcClient::from_config(client, &config)
}

/// Resolve the label used for the `chain_id` metric dimension: a live
/// `eth_chainId` lookup, falling back to the chain's last resolved value, or
/// `"unknown"` if nothing has ever resolved.
pub async fn resolve_chain_id_label(rpc: &RpcClient, ctx: &ChainRuntimeContext, previous: Option<&str>) -> String {
    match rpc.chain_id().await {
        Ok(value) => match parse_hex_u64(&value) {
            Some(id) => id.to_string(),
            None => {
                tracing::warn!(blockchain = %ctx.config.name, "eth_chainId returned a non-hex value");
                previous.unwrap_or("unknown").to_string()
            }
        },
        Err(err) => {
            tracing::debug!(blockchain = %ctx.config.name, error = %err, "eth_chainId lookup failed");
            previous.unwrap_or("unknown").to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_topic_matches_known_keccak_digest() {
        assert_eq!(
            TRANSFER_EVENT_TOPIC.as_str(),
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn chunker_splits_ranges_larger_than_chunk_size() {
        let mut chunker = LogChunker::new(1, 5000);
        chunker.current_chunk_size = 2000;
        let mut fetched = Vec::new();
        loop {
            match chunker.next() {
                NextStep::Done => break,
                NextStep::Fetch { start, end } => {
                    fetched.push((start, end));
                    chunker.on_success(start, end, 10);
                }
            }
        }
        assert_eq!(fetched, vec![(1, 2000), (2001, 4000), (4001, 5000)]);
    }

    #[test]
    fn chunker_shrinks_on_large_response() {
        let mut chunker = LogChunker::new(1, 2000);
        chunker.current_chunk_size = 2000;
        if let NextStep::Fetch { start, end } = chunker.next() {
            chunker.on_success(start, end, 6000);
        }
        assert!(chunker.current_chunk_size < 2000);
    }

    #[test]
    fn chunker_too_big_shrinks_and_retries_within_same_window() {
        let mut chunker = LogChunker::new(1, 200);
        chunker.current_chunk_size = 200;
        if let NextStep::Fetch { start, end } = chunker.next() {
            assert_eq!((start, end), (1, 200));
            assert!(chunker.on_too_big(start, end));
        }
        // The chunk size shrank below 200, so the re-pushed range now
        // splits into a smaller first fetch rather than repeating whole.
        match chunker.next() {
            NextStep::Fetch { start, end } => {
                assert!(end - start + 1 < 200);
                assert_eq!(start, 1);
            }
            NextStep::Done => panic!("expected a retry range"),
        }
    }

    #[test]
    fn chunker_single_block_too_big_aborts() {
        let mut chunker = LogChunker::new(10, 10);
        if let NextStep::Fetch { start, end } = chunker.next() {
            assert!(!chunker.on_too_big(start, end));
        }
    }

    #[test]
    fn parse_hex_quantity_handles_zero_and_large_values() {
        assert_eq!(parse_hex_quantity(&Value::String("0x0".into())), Some(0));
        assert_eq!(parse_hex_quantity(&Value::String("0xff".into())), Some(255));
        assert_eq!(parse_hex_quantity(&Value::String("not hex".into())), None);
    }

    #[test]
    fn balance_of_call_data_pads_address_to_32_bytes() {
        let data = balance_of_call_data("0x1234567890123456789012345678901234567890");
        assert_eq!(data.len(), 2 + 8 + 64);
        assert!(data.starts_with("0x70a08231"));
    }

    #[tokio::test]
    async fn transfer_count_records_chunk_metrics_per_fetch_attempt() {
        use crate::rpc::test_support::FakeTransport;

        let transport = FakeTransport::new(vec![Ok(Value::Array(vec![Value::Null, Value::Null]))]);
        let rpc = RpcClient::new(Box::new(transport), "eth");
        let metrics = crate::metrics::MetricsState::new();

        let count = collect_contract_transfer_count(&rpc, "0xabc", 100, 150, &metrics, "eth", "1").await;
        assert_eq!(count, Some(2));

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

        let duration_sample_count = metrics
            .bundle
            .log_chunk_duration_seconds
            .with_label_values(&["eth", "1", "0xabc"])
            .get_sample_count();
        assert_eq!(duration_sample_count, 1);
    }
}
