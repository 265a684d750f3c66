//! App instance: one simulated host device (own storage, own network switch) talking to a
//! remote store shared with other instances.
//!
//! - **new(id, remote, user)**: fresh storage, signed in as `user`, network offline, core started.
//! - **go_online() / go_offline()**: push a network state the way the platform callback would.
//!   An up-edge blocks until the sync pass it triggered has completed.
//! - **restart()**: drop the core and build a new one over the same storage directory.

use std::cell::{Ref, RefCell};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use toast_client_core::{
    ConnectivityMonitor, EventId, LocalStore, MemoryRemote, NetworkState, SessionAuth,
    SharedNetwork, ToastCore,
};

use super::assert_runner;
use super::command_runner::CommandRunner;
use super::test_helpers::{wait_until, WAIT};

pub struct AppInstance {
    pub id: String,
    pub user_id: String,
    pub storage_path: PathBuf,
    pub remote: MemoryRemote,
    network: Arc<SharedNetwork>,
    auth: RefCell<Arc<SessionAuth>>,
    core: RefCell<ToastCore>,
    runner: RefCell<CommandRunner>,
    _temp_dir: tempfile::TempDir,
}

fn build_core(
    storage: &Path,
    remote: &MemoryRemote,
    network: &Arc<SharedNetwork>,
    user_id: &str,
) -> (ToastCore, Arc<SessionAuth>) {
    let store = Arc::new(LocalStore::open(storage).expect("open store"));
    let auth = Arc::new(SessionAuth::new(store.clone()));
    auth.sign_in(user_id, "itest-token", None).expect("sign in");
    let connectivity = Arc::new(ConnectivityMonitor::shared(network.clone()));
    let core = ToastCore::new(store, Arc::new(remote.clone()), auth.clone(), connectivity);
    core.start().expect("start");
    (core, auth)
}

impl AppInstance {
    pub fn new(id: impl Into<String>, remote: &MemoryRemote, user_id: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage_path = dir.path().to_path_buf();
        let network = Arc::new(SharedNetwork::new(NetworkState::OFFLINE));
        let (core, auth) = build_core(&storage_path, remote, &network, user_id);
        Self {
            id: id.into(),
            user_id: user_id.to_string(),
            storage_path,
            remote: remote.clone(),
            network,
            auth: RefCell::new(auth),
            core: RefCell::new(core),
            runner: RefCell::new(CommandRunner::new()),
            _temp_dir: dir,
        }
    }

    pub fn core(&self) -> Ref<'_, ToastCore> {
        self.core.borrow()
    }

    pub fn auth(&self) -> Arc<SessionAuth> {
        self.auth.borrow().clone()
    }

    /// On an up-edge, waits for the background pass it triggers to finish.
    pub fn go_online(&self) -> bool {
        let before = self.core().last_sync_at().ok().flatten();
        let edge = self.core().report_network(NetworkState::ONLINE);
        if edge {
            wait_until(WAIT, || self.core().last_sync_at().ok().flatten() != before);
        }
        edge
    }

    pub fn go_offline(&self) {
        self.core().report_network(NetworkState::OFFLINE);
    }

    /// Simulate a process restart: the store on disk survives, in-memory state does not.
    /// The network state the platform reports is kept.
    pub fn restart(&self) {
        let (core, auth) = build_core(&self.storage_path, &self.remote, &self.network, &self.user_id);
        *self.core.borrow_mut() = core;
        *self.auth.borrow_mut() = auth;
    }

    /// Id of an event created under `label` by `run_commands`.
    pub fn event_id(&self, label: &str) -> EventId {
        self.runner
            .borrow()
            .event_ids
            .get(label)
            .cloned()
            .unwrap_or_else(|| panic!("[{}] unknown event label {}", self.id, label))
    }

    pub fn run_commands(&self, commands: &[&str]) -> Result<(), String> {
        self.runner
            .borrow_mut()
            .execute_commands(self, commands)
            .map_err(|e| format!("[{}] {}", self.id, e))
    }

    pub fn assert_commands(&self, commands: &[&str]) -> Result<(), String> {
        let runner = self.runner.borrow();
        assert_runner::assert_commands(self, &runner.event_ids, commands)
            .map_err(|e| format!("[{}] {}", self.id, e))
    }
}
