//! Free-list of logical `reqwest::Client` handles keyed by RPC URL.
//!
//! `reqwest::Client` already manages its own connection reuse internally;
//! this pool instead bounds how many distinct client *handles* the process
//! keeps around per URL, mirroring the original's pooling of `Web3`/
//! `requests.Session` objects one level up the stack.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

pub const DEFAULT_POOL_SIZE: usize = 10;
pub const DEFAULT_MAX_POOL_SIZE: usize = 50;

struct PoolEntry {
    free: Vec<reqwest::Client>,
    active_count: usize,
}

impl PoolEntry {
    fn new() -> Self {
        Self {
            free: Vec::new(),
            active_count: 0,
        }
    }
}

/// Process-wide pool of HTTP clients, one free-list per RPC URL.
pub struct ConnectionPoolManager {
    pools: Mutex<HashMap<String, PoolEntry>>,
    pool_size: usize,
    max_pool_size: usize,
    request_timeout: Duration,
}

impl ConnectionPoolManager {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
            pool_size: DEFAULT_POOL_SIZE,
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            request_timeout,
        }
    }

    fn build_client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .expect("reqwest client configuration is valid")
    }

    /// Borrow a client handle for `url`, reusing a freed one if available,
    /// else constructing a new one (bounded by `max_pool_size` active
    /// handles per URL).
    pub fn get_client(&self, url: &str) -> reqwest::Client {
        let mut pools = self.pools.lock().unwrap();
        let entry = pools.entry(url.to_string()).or_insert_with(PoolEntry::new);

        if let Some(client) = entry.free.pop() {
            entry.active_count += 1;
            return client;
        }

        if entry.active_count >= self.max_pool_size {
            tracing::warn!(url, active = entry.active_count, "connection pool at max size, building client anyway");
        }
        entry.active_count += 1;
        self.build_client()
    }

    /// Return a client handle to the free-list, capped at `pool_size`
    /// retained idle handles; beyond that, the handle is simply dropped.
    pub fn return_client(&self, url: &str, client: reqwest::Client) {
        let mut pools = self.pools.lock().unwrap();
        if let Some(entry) = pools.get_mut(url) {
            entry.active_count = entry.active_count.saturating_sub(1);
            if entry.free.len() < self.pool_size {
                entry.free.push(client);
            }
        }
    }

    pub fn clear_pool(&self) {
        let mut pools = self.pools.lock().unwrap();
        pools.clear();
    }

    pub fn get_pool_stats(&self) -> HashMap<String, (usize, usize)> {
        let pools = self.pools.lock().unwrap();
        pools
            .iter()
            .map(|(url, entry)| (url.clone(), (entry.free.len(), entry.active_count)))
            .collect()
    }
}

impl Default for ConnectionPoolManager {
    fn default() -> Self {
        Self::new(Duration::from_secs_f64(10.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returned_clients_are_reused() {
        let pool = ConnectionPoolManager::new(Duration::from_secs(1));
        let client = pool.get_client("http://a");
        pool.return_client("http://a", client);
        let stats = pool.get_pool_stats();
        assert_eq!(stats.get("http://a"), Some(&(1, 0)));
    }

    #[test]
    fn clear_pool_empties_all_entries() {
        let pool = ConnectionPoolManager::new(Duration::from_secs(1));
        let _client = pool.get_client("http://a");
        pool.clear_pool();
        assert!(pool.get_pool_stats().is_empty());
    }
}
