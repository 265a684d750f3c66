//! Connectivity monitor: point-in-time "online now" probe plus an edge-triggered
//! "became online" signal.
//!
//! Online means the platform reports a network *and* that network is validated as usable.
//! Callbacks fire once per down->up transition; registration is keyed, so registering the
//! same key twice keeps one delivery.

use crate::rust_log;
use crate::RUNTIME;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NetworkState {
    pub has_network: bool,
    /// Internet capability validated (captive portals and dead Wi-Fi report false).
    pub validated: bool,
}

impl NetworkState {
    pub const ONLINE: NetworkState = NetworkState {
        has_network: true,
        validated: true,
    };
    pub const OFFLINE: NetworkState = NetworkState {
        has_network: false,
        validated: false,
    };

    pub fn is_online(&self) -> bool {
        self.has_network && self.validated
    }
}

/// Platform seam answering "what does the network look like right now".
pub trait NetworkProbe: Send + Sync {
    fn current(&self) -> NetworkState;
}

/// Probe fed by the host shell (platform network callbacks push into it).
#[derive(Default)]
pub struct SharedNetwork {
    has_network: AtomicBool,
    validated: AtomicBool,
}

impl SharedNetwork {
    pub fn new(initial: NetworkState) -> Self {
        let s = Self::default();
        s.set(initial);
        s
    }

    pub fn set(&self, state: NetworkState) {
        self.has_network.store(state.has_network, Ordering::SeqCst);
        self.validated.store(state.validated, Ordering::SeqCst);
    }
}

impl NetworkProbe for SharedNetwork {
    fn current(&self) -> NetworkState {
        NetworkState {
            has_network: self.has_network.load(Ordering::SeqCst),
            validated: self.validated.load(Ordering::SeqCst),
        }
    }
}

pub type OnlineCallback = Arc<dyn Fn() + Send + Sync>;

struct MonitorState {
    online: bool,
    subscribers: BTreeMap<String, OnlineCallback>,
}

pub struct ConnectivityMonitor {
    probe: Arc<dyn NetworkProbe>,
    pushed: Option<Arc<SharedNetwork>>,
    state: Mutex<MonitorState>,
}

impl ConnectivityMonitor {
    pub fn new(probe: Arc<dyn NetworkProbe>) -> Self {
        Self::build(probe, None)
    }

    /// Monitor over a probe the host pushes into with `report`.
    pub fn shared(network: Arc<SharedNetwork>) -> Self {
        Self::build(network.clone(), Some(network))
    }

    fn build(probe: Arc<dyn NetworkProbe>, pushed: Option<Arc<SharedNetwork>>) -> Self {
        let online = probe.current().is_online();
        Self {
            probe,
            pushed,
            state: Mutex::new(MonitorState {
                online,
                subscribers: BTreeMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn is_online(&self) -> bool {
        self.probe.current().is_online()
    }

    /// Returns false if `key` was already registered (the existing callback is replaced).
    pub fn subscribe(&self, key: &str, callback: OnlineCallback) -> bool {
        self.lock()
            .subscribers
            .insert(key.to_string(), callback)
            .is_none()
    }

    pub fn unsubscribe(&self, key: &str) -> bool {
        self.lock().subscribers.remove(key).is_some()
    }

    /// Re-probe. Fires subscribers and returns true only on a down->up edge.
    pub fn refresh(&self) -> bool {
        let to_fire: Vec<OnlineCallback> = {
            // Probe under the lock so a stale read cannot overwrite a newer edge.
            let mut state = self.lock();
            let now_online = self.is_online();
            let was_online = state.online;
            state.online = now_online;
            if was_online || !now_online {
                if was_online && !now_online {
                    rust_log!("[toast_rs] connectivity: offline");
                }
                return false;
            }
            state.subscribers.values().cloned().collect()
        };
        rust_log!("[toast_rs] connectivity: online edge, notifying {} subscriber(s)", to_fire.len());
        for cb in to_fire {
            cb();
        }
        true
    }

    /// Record a state pushed by the platform, then refresh.
    pub fn report(&self, state: NetworkState) -> bool {
        match &self.pushed {
            Some(network) => network.set(state),
            None => rust_log!(
                debug,
                "[toast_rs] connectivity: report ignored, probe is not host-fed"
            ),
        }
        self.refresh()
    }

    /// Poll the probe on the background runtime until the returned handle is dropped.
    pub fn spawn_watch(self: &Arc<Self>, interval: Duration) -> WatchHandle {
        let weak = Arc::downgrade(self);
        let task = RUNTIME.spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match weak.upgrade() {
                    Some(monitor) => {
                        monitor.refresh();
                    }
                    None => break,
                }
            }
        });
        WatchHandle { task }
    }
}

pub struct WatchHandle {
    task: tokio::task::JoinHandle<()>,
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
