//! Owns the set of spawned per-chain polling tasks and coordinates their
//! lifecycle across startup, reload, and shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::BlockchainConfig;
use crate::context::ApplicationContext;
use crate::models::{chain_identity, ChainIdentity, ChainRuntimeContext};
use crate::poller::control::poll_blockchain;

struct TaskHandle {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// A shared, `Clone`-able handle to a single process-wide poller manager,
/// analogous to the original's module-level singleton accessed through
/// `get_poller_manager()`.
#[derive(Clone)]
pub struct PollerManager {
    inner: Arc<Mutex<ManagerState>>,
}

#[derive(Default)]
struct ManagerState {
    tasks_created: bool,
    tasks: HashMap<ChainIdentity, TaskHandle>,
    owner: Option<usize>,
}

impl PollerManager {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManagerState::default())),
        }
    }

    /// Spawn one task per blockchain in `app_ctx`. Idempotent: a second call
    /// while tasks are already running is a no-op. `owner_id` identifies the
    /// calling HTTP listener so `should_cleanup` can recognise the one
    /// responsible for shutdown.
    pub async fn create_tasks(&self, app_ctx: Arc<ApplicationContext>, owner_id: usize) {
        let mut state = self.inner.lock().await;
        if state.tasks_created {
            return;
        }

        for config in app_ctx.blockchains() {
            self.spawn_task_locked(&mut state, config.clone(), app_ctx.clone());
        }

        state.tasks_created = true;
        state.owner = Some(owner_id);
        app_ctx.metrics.set_poller_thread_count(state.tasks.len());
    }

    fn spawn_task_locked(&self, state: &mut ManagerState, config: Arc<BlockchainConfig>, app_ctx: Arc<ApplicationContext>) {
        let identity = chain_identity(&config);
        let cancel = CancellationToken::new();
        let rpc = app_ctx.create_rpc_client(&config);
        let ctx = ChainRuntimeContext::new(config, "unknown".to_string(), Arc::new(rpc), app_ctx.metrics.clone());

        let task_cancel = cancel.clone();
        let handle = tokio::spawn(poll_blockchain(ctx, app_ctx, task_cancel));

        state.tasks.insert(identity, TaskHandle { handle, cancel });
    }

    pub async fn should_cleanup(&self, owner_id: usize) -> bool {
        let state = self.inner.lock().await;
        state.tasks_created && state.owner == Some(owner_id)
    }

    /// Cancel every running task and wait up to `timeout` for them to exit.
    pub async fn shutdown_tasks(&self, timeout: Duration, metrics: &crate::metrics::MetricsState) {
        let mut state = self.inner.lock().await;
        let entries: Vec<(ChainIdentity, TaskHandle)> = state.tasks.drain().collect();
        drop(state);

        for (_, task) in &entries {
            task.cancel.cancel();
        }

        let handles: Vec<JoinHandle<()>> = entries.into_iter().map(|(_, t)| t.handle).collect();
        let joined = tokio::time::timeout(timeout, futures_join_all(handles)).await;
        if joined.is_err() {
            tracing::warn!("timed out waiting for polling tasks to shut down");
        }
        metrics.set_poller_thread_count(0);
    }

    /// Diff `old` against `new` by chain identity: cancel and remove tasks
    /// for identities no longer present, spawn tasks for newly-added
    /// identities, and leave unchanged identities running untouched so their
    /// failure/backoff state survives the reload.
    pub async fn reload_tasks(
        &self,
        old: &[Arc<BlockchainConfig>],
        new: &[Arc<BlockchainConfig>],
        app_ctx: Arc<ApplicationContext>,
    ) {
        let old_identities: std::collections::HashSet<ChainIdentity> = old.iter().map(|c| chain_identity(c)).collect();
        let new_identities: std::collections::HashSet<ChainIdentity> = new.iter().map(|c| chain_identity(c)).collect();

        let removed: Vec<ChainIdentity> = old_identities.difference(&new_identities).cloned().collect();
        let added: Vec<Arc<BlockchainConfig>> = new
            .iter()
            .filter(|c| !old_identities.contains(&chain_identity(c)))
            .cloned()
            .collect();

        let mut state = self.inner.lock().await;

        for identity in removed {
            if let Some(task) = state.tasks.remove(&identity) {
                task.cancel.cancel();
                let _ = tokio::time::timeout(Duration::from_secs(5), task.handle).await;
            }
        }

        for config in added {
            self.spawn_task_locked(&mut state, config, app_ctx.clone());
        }

        app_ctx.metrics.set_poller_thread_count(state.tasks.len());
    }

    pub async fn get_active_task_count(&self) -> usize {
        self.inner.lock().await.tasks.len()
    }

    pub async fn reset(&self) {
        let mut state = self.inner.lock().await;
        *state = ManagerState::default();
    }
}

impl Default for PollerManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn futures_join_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        let _ = handle.await;
    }
}

static GLOBAL_MANAGER: once_cell::sync::OnceCell<std::sync::Mutex<Option<PollerManager>>> = once_cell::sync::OnceCell::new();

fn global_slot() -> &'static std::sync::Mutex<Option<PollerManager>> {
    GLOBAL_MANAGER.get_or_init(|| std::sync::Mutex::new(None))
}

pub fn get_poller_manager() -> PollerManager {
    let mut slot = global_slot().lock().unwrap();
    if let Some(existing) = slot.as_ref() {
        return existing.clone();
    }
    let manager = PollerManager::new();
    *slot = Some(manager.clone());
    manager
}

pub fn reset_poller_manager() {
    let mut slot = global_slot().lock().unwrap();
    *slot = None;
}
