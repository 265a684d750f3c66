//! Offline-first client core for event hosting: local durable store, sync of pending events,
//! reconciliation of local and remote copies, and live guest counts.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

mod aggregation;
mod auth;
mod backoff;
mod config;
mod connectivity;
mod error;
mod ids;
mod log_bridge;
mod models;
mod reconcile;
mod remote;
mod storage;
mod sync;
mod view;

pub use aggregation::{tally, GuestSink, GuestUpdate, LiveAggregation, SubscriptionHandle};
pub use auth::{AccessToken, AuthProvider, SessionAuth};
pub use config::CoreConfig;
pub use connectivity::{
    ConnectivityMonitor, NetworkProbe, NetworkState, OnlineCallback, SharedNetwork, WatchHandle,
};
pub use error::{CoreError, Result};
pub use ids::{DisplayId, EventId, UserId, LOCAL_MARKER};
pub use log_bridge::drain_rust_logs;
pub use models::{CanonicalEventView, EventRecord, GuestEntry, NewEvent, Origin, RsvpStatus};
pub use reconcile::reconcile;
pub use remote::{
    rsvps_collection, Document, FeedEvent, FeedRegistration, FeedSink, Fields, HttpRemoteStore,
    MemoryRemote, RemoteStore, EVENTS,
};
pub use storage::LocalStore;
pub use sync::{SyncEngine, SyncReport};
pub use view::{EventListView, Snapshot};

pub(crate) static RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .thread_name("toast-rt")
        .enable_all()
        .build()
        .expect("tokio runtime")
});

const SYNC_ON_ONLINE: &str = "sync";

pub struct ToastCore {
    store: Arc<LocalStore>,
    remote: Arc<dyn RemoteStore>,
    auth: Arc<dyn AuthProvider>,
    session: Option<Arc<SessionAuth>>,
    connectivity: Arc<ConnectivityMonitor>,
    sync: Arc<SyncEngine>,
    aggregation: LiveAggregation,
    connectivity_poll: Option<Duration>,
    started: AtomicBool,
    watch: Mutex<Option<WatchHandle>>,
}

impl ToastCore {
    pub fn new(
        store: Arc<LocalStore>,
        remote: Arc<dyn RemoteStore>,
        auth: Arc<dyn AuthProvider>,
        connectivity: Arc<ConnectivityMonitor>,
    ) -> Self {
        let sync = Arc::new(SyncEngine::new(store.clone(), remote.clone(), auth.clone()));
        Self {
            aggregation: LiveAggregation::new(remote.clone()),
            store,
            remote,
            auth,
            session: None,
            connectivity,
            sync,
            connectivity_poll: None,
            started: AtomicBool::new(false),
            watch: Mutex::new(None),
        }
    }

    /// Production wiring: SQLite under `storage_path`, a config-table session, the HTTP remote
    /// when `remote_url` is set, and a host-fed network probe that starts offline.
    pub fn from_config(config: &CoreConfig) -> Result<Self> {
        let store = Arc::new(LocalStore::open(&config.storage_path)?);
        let session = Arc::new(SessionAuth::new(store.clone()));
        let remote: Arc<dyn RemoteStore> = match &config.remote_url {
            Some(url) => Arc::new(HttpRemoteStore::new(
                url,
                session.clone(),
                config.http_timeout,
                config.feed_poll,
            )?),
            None => {
                rust_log!(warn, "[toast_rs] no remote url configured, using in-process store");
                Arc::new(MemoryRemote::new())
            }
        };
        let network = Arc::new(SharedNetwork::new(NetworkState::OFFLINE));
        let connectivity = Arc::new(ConnectivityMonitor::shared(network));
        let mut core = Self::new(store, remote, session.clone(), connectivity);
        core.session = Some(session);
        core.connectivity_poll = Some(config.connectivity_poll);
        Ok(core)
    }

    /// Register the up-edge sync trigger and run a start-up pass when online. Idempotent.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let sync = self.sync.clone();
        self.connectivity.subscribe(
            SYNC_ON_ONLINE,
            Arc::new(move || {
                sync.reset_backoff();
                let sync = sync.clone();
                // The edge may be observed on a runtime worker; the pass blocks on remote calls.
                RUNTIME.spawn_blocking(move || {
                    if let Err(e) = sync.run_pass("online_edge") {
                        rust_log!(warn, "[toast_rs] sync on online edge failed: {}", e);
                    }
                });
            }),
        );
        if let Some(interval) = self.connectivity_poll {
            let handle = self.connectivity.spawn_watch(interval);
            *self.watch.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
        }
        rust_log!("[toast_rs] core started (online={})", self.connectivity.is_online());
        if self.connectivity.is_online() {
            if let Err(e) = self.sync.run_pass("startup") {
                rust_log!(warn, "[toast_rs] startup sync failed: {}", e);
            }
        }
        Ok(())
    }

    // --- Session and network (host-fed) ---

    pub fn sign_in(&self, user_id: &str, token: &str, expires_at: Option<DateTime<Utc>>) -> Result<()> {
        UserId::parse(user_id)?;
        self.session()?.sign_in(user_id, token, expires_at)
    }

    pub fn sign_out(&self) -> Result<()> {
        self.session()?.sign_out()
    }

    pub fn set_profile(&self, display_name: Option<&str>, email: Option<&str>) -> Result<()> {
        self.session()?.set_profile(display_name, email)
    }

    fn session(&self) -> Result<&Arc<SessionAuth>> {
        self.session
            .as_ref()
            .ok_or_else(|| CoreError::Config("session is managed by the host auth provider".to_string()))
    }

    /// Push the platform's network state. Returns true on an up-edge.
    pub fn report_network(&self, state: NetworkState) -> bool {
        self.connectivity.report(state)
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    // --- Events ---

    /// Persist a new pending event owned by the signed-in user. Uploaded opportunistically when online.
    pub fn create_event(&self, input: NewEvent) -> Result<EventRecord> {
        let owner = self.current_user()?;
        let mut record = EventRecord::from_new(input, owner.as_str(), Utc::now().timestamp_millis());
        record.owner_email = self.auth.email().unwrap_or_default();
        self.store.insert(&record)?;
        rust_log!("[toast_rs] create_event id={} owner={} (pending)", record.id, owner);
        if self.connectivity.is_online() {
            self.sync_quietly("create_event");
        }
        Ok(self.store.get(&record.id)?.unwrap_or(record))
    }

    /// Local snapshot plus the remote owner query, merged into one list.
    pub fn load_canonical_events(&self, owner_id: &str) -> Result<Vec<CanonicalEventView>> {
        let online = self.connectivity.is_online();
        if online {
            self.sync_quietly("load_canonical_events");
        }
        let local: Vec<EventRecord> = self
            .store
            .list_all()?
            .into_iter()
            .filter(|r| r.owner_id == owner_id)
            .collect();
        let remote: Vec<EventRecord> = if online {
            match self.remote.query_eq(EVENTS, "hostUserId", owner_id) {
                Ok(docs) => docs
                    .iter()
                    .filter_map(|d| EventRecord::from_remote(&d.id, &d.fields))
                    .collect(),
                Err(e) => {
                    rust_log!(warn, "[toast_rs] remote events query failed, showing local only: {}", e);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        Ok(reconcile(&local, &remote))
    }

    /// A single event by id, for detail screens and deep links. The remote copy when it can be
    /// fetched, otherwise whatever the local store holds.
    pub fn get_event(&self, id: &DisplayId) -> Result<Option<EventRecord>> {
        let raw = id.raw();
        if self.connectivity.is_online() {
            match self.remote.get(EVENTS, raw.as_str()) {
                Ok(Some(doc)) => {
                    if let Some(record) = EventRecord::from_remote(&doc.id, &doc.fields) {
                        return Ok(Some(record));
                    }
                }
                Ok(None) => {}
                Err(e) => rust_log!(warn, "[toast_rs] get_event id={} remote failed, using local: {}", raw, e),
            }
        }
        self.store.get(raw)
    }

    /// Best-effort upload of pending events. `None` while offline or when the sync gate
    /// skipped the pass; pass errors are logged, not returned.
    pub fn opportunistic_sync(&self) -> Option<SyncReport> {
        if !self.connectivity.is_online() {
            return None;
        }
        self.sync_quietly("host")
    }

    fn sync_quietly(&self, source: &str) -> Option<SyncReport> {
        match self.sync.try_sync(source)? {
            Ok(report) => Some(report),
            Err(e) => {
                rust_log!(warn, "[toast_rs] opportunistic sync failed (source={}): {}", source, e);
                None
            }
        }
    }

    // --- Guests ---

    pub fn subscribe_guests(&self, display_id: &DisplayId, sink: GuestSink) -> Result<SubscriptionHandle> {
        self.aggregation.subscribe(display_id, sink)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.aggregation.unsubscribe(handle)
    }

    pub fn close_subscriptions(&self) {
        self.aggregation.close_all();
    }

    pub fn open_view(&self) -> EventListView {
        EventListView::open(self.remote.clone())
    }

    /// Write the signed-in user's answer for an event.
    pub fn respond(
        &self,
        event: &DisplayId,
        status: RsvpStatus,
        dietary_choice: Option<&str>,
        music_choice: Option<&str>,
    ) -> Result<GuestEntry> {
        let user = self.current_user()?;
        self.auth.fresh_token()?;
        if !self.connectivity.is_online() {
            return Err(CoreError::RemoteTransient("offline, response not sent".to_string()));
        }
        let entry = GuestEntry {
            guest_id: user.as_str().to_string(),
            user_name: self.auth.display_name().unwrap_or_else(|| "Anonymous".to_string()),
            status,
            dietary_choice: dietary_choice.unwrap_or("Not specified").to_string(),
            music_choice: music_choice.unwrap_or("Not specified").to_string(),
        };
        self.remote
            .set(&rsvps_collection(event.raw()), user.as_str(), entry.to_remote_fields())?;
        rust_log!("[toast_rs] respond event={} status={}", event.raw(), entry.status);
        Ok(entry)
    }

    fn current_user(&self) -> Result<UserId> {
        let raw = self
            .auth
            .current_user_id()
            .ok_or_else(|| CoreError::Auth("Not signed in".to_string()))?;
        UserId::parse(raw)
    }

    // --- Sync bookkeeping ---

    /// Explicit trigger: waits for a running pass, never throttled.
    pub fn sync_now(&self) -> Result<usize> {
        self.sync.sync_all()
    }

    pub fn pending_count(&self) -> Result<i64> {
        self.sync.pending_count()
    }

    pub fn last_sync_at(&self) -> Result<Option<DateTime<Utc>>> {
        self.sync.last_sync_at()
    }

    pub fn drain_logs(&self) -> Vec<String> {
        log_bridge::drain_rust_logs()
    }
}

impl Drop for ToastCore {
    fn drop(&mut self) {
        self.connectivity.unsubscribe(SYNC_ON_ONLINE);
        self.aggregation.close_all();
    }
}
