//! TOML configuration model, loading, and validation.

use std::collections::HashSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::error::ConfigError;

static HEX_ADDRESS_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("pattern is valid"));

#[derive(Debug, Clone, Deserialize)]
struct RawRoot {
    #[serde(default)]
    blockchains: Vec<RawBlockchain>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawBlockchain {
    name: Option<String>,
    rpc_url: Option<String>,
    poll_interval: Option<String>,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default)]
    contracts: Vec<RawContract>,
    #[serde(default)]
    accounts: Vec<RawAccount>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawAccount {
    name: Option<String>,
    address: Option<String>,
    #[serde(default = "default_true")]
    enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct RawContract {
    name: Option<String>,
    address: Option<String>,
    decimals: Option<i64>,
    transfer_lookback_blocks: Option<i64>,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default)]
    accounts: Vec<RawContractAccount>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawContractAccount {
    name: Option<String>,
    address: Option<String>,
    #[serde(default = "default_true")]
    enabled: bool,
}

fn default_true() -> bool {
    true
}

/// A plain account tracked on a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountConfig {
    pub name: String,
    pub address: String,
}

/// An account nested under a contract (e.g. a holder to watch for that
/// token's balance), distinct from top-level [`AccountConfig`] so the
/// collector knows whether it still owes a top-level account-balance series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractAccountConfig {
    pub name: String,
    pub address: String,
}

/// An ERC-20-shaped contract tracked on a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractConfig {
    pub name: String,
    pub address: String,
    pub decimals: Option<u32>,
    pub accounts: Vec<ContractAccountConfig>,
    pub transfer_lookback_blocks: Option<u64>,
}

/// One configured blockchain: identity, poll cadence, and the contracts and
/// accounts to observe on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockchainConfig {
    pub name: String,
    pub rpc_url: String,
    pub poll_interval: Option<String>,
    pub contracts: Vec<ContractConfig>,
    pub accounts: Vec<AccountConfig>,
}

fn require_non_empty_string(path: &str, value: &Option<String>) -> Result<String, ConfigError> {
    match value {
        Some(s) if !s.trim().is_empty() => Ok(s.clone()),
        Some(_) => Err(ConfigError::validation(path, "must not be empty")),
        None => Err(ConfigError::validation(path, "is required")),
    }
}

/// Require a 42-char `0x`-prefixed hex address and normalise it to
/// lowercase, so every downstream label/dedup comparison sees one canonical
/// form for a given address.
fn require_address(path: &str, value: &Option<String>) -> Result<String, ConfigError> {
    let raw = require_non_empty_string(path, value)?;
    if !HEX_ADDRESS_PATTERN.is_match(&raw) {
        return Err(ConfigError::validation(
            path,
            format!("must be a 42-char 0x-prefixed hex address, got '{raw}'"),
        ));
    }
    Ok(raw.to_lowercase())
}

fn coerce_optional_u32(path: &str, value: Option<i64>) -> Result<Option<u32>, ConfigError> {
    match value {
        None => Ok(None),
        Some(v) if v >= 0 => Ok(Some(v as u32)),
        Some(v) => Err(ConfigError::validation(
            path,
            format!("must be a non-negative integer, got {v}"),
        )),
    }
}

fn coerce_optional_u64(path: &str, value: Option<i64>) -> Result<Option<u64>, ConfigError> {
    match value {
        None => Ok(None),
        Some(v) if v >= 0 => Ok(Some(v as u64)),
        Some(v) => Err(ConfigError::validation(
            path,
            format!("must be a non-negative integer, got {v}"),
        )),
    }
}

/// Expand `${VAR}`/`$VAR`-style references in raw TOML text against the
/// process environment, the same way the original implementation ran
/// `os.path.expandvars` over the raw file text before parsing.
fn expand_env_vars(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.char_indices().peekable();
    let bytes = raw.as_bytes();
    while let Some((i, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        if i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            if let Some(end) = raw[i + 2..].find('}') {
                let name = &raw[i + 2..i + 2 + end];
                out.push_str(&std::env::var(name).unwrap_or_default());
                for _ in 0..(end + 2) {
                    chars.next();
                }
                continue;
            }
        }
        let start = i + 1;
        let mut end = start;
        for (j, cj) in raw[start..].char_indices() {
            if cj.is_alphanumeric() || cj == '_' {
                end = start + j + cj.len_utf8();
            } else {
                break;
            }
        }
        if end > start {
            let name = &raw[start..end];
            out.push_str(&std::env::var(name).unwrap_or_default());
            for _ in 0..(end - start) {
                chars.next();
            }
        } else {
            out.push('$');
        }
    }
    out
}

fn read_toml(path: &Path) -> Result<String, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.display().to_string(),
        });
    }
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(expand_env_vars(&raw))
}

fn check_no_duplicates<'a, I>(path_prefix: &str, field: &str, items: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: HashSet<String> = HashSet::new();
    for value in items {
        let lowered = value.to_lowercase();
        if !seen.insert(lowered) {
            return Err(ConfigError::validation(
                path_prefix,
                format!("duplicate {field} '{value}' (case-insensitive)"),
            ));
        }
    }
    Ok(())
}

/// Parse and validate a blockchain exporter config file, dropping `enabled =
/// false` entries (and all descendants of a disabled parent) before
/// returning. Duplicate names/addresses within a chain (case-insensitive)
/// are rejected.
pub fn load_blockchain_configs(path: &Path) -> Result<Vec<BlockchainConfig>, ConfigError> {
    let text = read_toml(path)?;
    let raw: RawRoot = toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;

    let mut out = Vec::with_capacity(raw.blockchains.len());

    for (bi, rb) in raw.blockchains.into_iter().enumerate() {
        if !rb.enabled {
            continue;
        }
        let prefix = format!("blockchains[{bi}]");
        let name = require_non_empty_string(&format!("{prefix}.name"), &rb.name)?;
        let rpc_url = require_non_empty_string(&format!("{prefix}.rpc_url"), &rb.rpc_url)?;

        let mut accounts = Vec::new();
        for (ai, ra) in rb.accounts.into_iter().enumerate() {
            if !ra.enabled {
                continue;
            }
            let aprefix = format!("{prefix}.accounts[{ai}]");
            let aname = require_non_empty_string(&format!("{aprefix}.name"), &ra.name)?;
            let aaddress = require_address(&format!("{aprefix}.address"), &ra.address)?;
            accounts.push(AccountConfig {
                name: aname,
                address: aaddress,
            });
        }
        check_no_duplicates(
            &format!("{prefix}.accounts"),
            "account name",
            accounts.iter().map(|a| a.name.as_str()),
        )?;
        check_no_duplicates(
            &format!("{prefix}.accounts"),
            "account address",
            accounts.iter().map(|a| a.address.as_str()),
        )?;

        let mut contracts = Vec::new();
        for (ci, rc) in rb.contracts.into_iter().enumerate() {
            if !rc.enabled {
                continue;
            }
            let cprefix = format!("{prefix}.contracts[{ci}]");
            let cname = require_non_empty_string(&format!("{cprefix}.name"), &rc.name)?;
            let caddress = require_address(&format!("{cprefix}.address"), &rc.address)?;
            let decimals = coerce_optional_u32(&format!("{cprefix}.decimals"), rc.decimals)?;
            let transfer_lookback_blocks = coerce_optional_u64(
                &format!("{cprefix}.transfer_lookback_blocks"),
                rc.transfer_lookback_blocks,
            )?;

            let mut caccounts = Vec::new();
            for (cai, rca) in rc.accounts.into_iter().enumerate() {
                if !rca.enabled {
                    continue;
                }
                let caprefix = format!("{cprefix}.accounts[{cai}]");
                let caname = require_non_empty_string(&format!("{caprefix}.name"), &rca.name)?;
                let caaddress = require_address(&format!("{caprefix}.address"), &rca.address)?;
                caccounts.push(ContractAccountConfig {
                    name: caname,
                    address: caaddress,
                });
            }
            check_no_duplicates(
                &format!("{cprefix}.accounts"),
                "contract account name",
                caccounts.iter().map(|a| a.name.as_str()),
            )?;
            check_no_duplicates(
                &format!("{cprefix}.accounts"),
                "contract account address",
                caccounts.iter().map(|a| a.address.as_str()),
            )?;

            contracts.push(ContractConfig {
                name: cname,
                address: caddress,
                decimals,
                accounts: caccounts,
                transfer_lookback_blocks,
            });
        }
        check_no_duplicates(
            &format!("{prefix}.contracts"),
            "contract name",
            contracts.iter().map(|c| c.name.as_str()),
        )?;
        check_no_duplicates(
            &format!("{prefix}.contracts"),
            "contract address",
            contracts.iter().map(|c| c.address.as_str()),
        )?;

        out.push(BlockchainConfig {
            name,
            rpc_url,
            poll_interval: rb.poll_interval,
            contracts,
            accounts,
        });
    }

    check_no_duplicates(
        "blockchains",
        "blockchain name",
        out.iter().map(|b| b.name.as_str()),
    )?;

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = load_blockchain_configs(Path::new("/nonexistent/config.toml")).unwrap_err();
        matches!(err, ConfigError::NotFound { .. });
    }

    #[test]
    fn disabled_entries_are_dropped() {
        let toml = r#"
[[blockchains]]
name = "eth"
rpc_url = "http://localhost:8545"

[[blockchains]]
name = "disabled-chain"
rpc_url = "http://localhost:9999"
enabled = false
"#;
        let f = write_temp(toml);
        let parsed = load_blockchain_configs(f.path()).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "eth");
    }

    #[test]
    fn duplicate_account_addresses_are_rejected_case_insensitively() {
        let toml = r#"
[[blockchains]]
name = "eth"
rpc_url = "http://localhost:8545"

[[blockchains.accounts]]
name = "a"
address = "0xAb000000000000000000000000000000000000CD"

[[blockchains.accounts]]
name = "b"
address = "0xab000000000000000000000000000000000000cd"
"#;
        let f = write_temp(toml);
        let err = load_blockchain_configs(f.path()).unwrap_err();
        matches!(err, ConfigError::Validation { .. });
    }

    #[test]
    fn account_address_is_normalised_to_lowercase() {
        let toml = r#"
[[blockchains]]
name = "eth"
rpc_url = "http://localhost:8545"

[[blockchains.accounts]]
name = "a"
address = "0xAb000000000000000000000000000000000000CD"
"#;
        let f = write_temp(toml);
        let parsed = load_blockchain_configs(f.path()).unwrap();
        assert_eq!(parsed[0].accounts[0].address, "0xab000000000000000000000000000000000000cd");
    }

    #[test]
    fn malformed_account_address_is_rejected() {
        let toml = r#"
[[blockchains]]
name = "eth"
rpc_url = "http://localhost:8545"

[[blockchains.accounts]]
name = "a"
address = "not-an-address"
"#;
        let f = write_temp(toml);
        let err = load_blockchain_configs(f.path()).unwrap_err();
        matches!(err, ConfigError::Validation { .. });
    }

    #[test]
    fn env_var_expansion_applies_before_parsing() {
        std::env::set_var("TEST_RPC_HOST", "http://example.com:8545");
        let toml = r#"
[[blockchains]]
name = "eth"
rpc_url = "${TEST_RPC_HOST}"
"#;
        let f = write_temp(toml);
        let parsed = load_blockchain_configs(f.path()).unwrap();
        assert_eq!(parsed[0].rpc_url, "http://example.com:8545");
        std::env::remove_var("TEST_RPC_HOST");
    }
}
