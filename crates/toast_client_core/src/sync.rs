//! Sync: push unsynced local events to the remote store, mark accepted ones as synced.
//!
//! Passes are serialized by a single in-flight guard. `sync_all` waits for a running pass and
//! then runs its own (which finds nothing left); `try_sync` is the opportunistic variant and
//! returns immediately when a pass is in flight or the failure backoff is active.

use crate::auth::AuthProvider;
use crate::backoff::{PassOutcome, SyncBackoff};
use crate::error::Result;
use crate::ids::EventId;
use crate::remote::{RemoteStore, EVENTS};
use crate::rust_log;
use crate::storage::LocalStore;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Instant;

const KEY_LAST_SYNC: &str = "last_sync_at";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub attempted: usize,
    pub synced: usize,
    pub failed: Vec<EventId>,
}

pub struct SyncEngine {
    store: Arc<LocalStore>,
    remote: Arc<dyn RemoteStore>,
    auth: Arc<dyn AuthProvider>,
    in_flight: Mutex<()>,
    backoff: Mutex<SyncBackoff>,
    last_skip_log: Mutex<Option<Instant>>,
}

fn relock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

impl SyncEngine {
    pub fn new(store: Arc<LocalStore>, remote: Arc<dyn RemoteStore>, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            store,
            remote,
            auth,
            in_flight: Mutex::new(()),
            backoff: Mutex::new(SyncBackoff::standard()),
            last_skip_log: Mutex::new(None),
        }
    }

    /// Upload every pending record. Returns how many were marked synced.
    pub fn sync_all(&self) -> Result<usize> {
        self.run_pass("manual").map(|r| r.synced)
    }

    /// Full pass; waits for any pass already in flight.
    pub fn run_pass(&self, source: &str) -> Result<SyncReport> {
        let _guard = relock(&self.in_flight);
        self.pass(source)
    }

    /// Opportunistic pass. `None` when skipped (pass in flight or backoff active).
    pub fn try_sync(&self, source: &str) -> Option<Result<SyncReport>> {
        if let Err(wait) = relock(&self.backoff).check() {
            if self.should_log_skip(1000) {
                rust_log!(
                    "[toast_rs] try_sync skipped (backoff active, remaining={}ms, source={})",
                    wait.as_millis(),
                    source
                );
            }
            return None;
        }
        let _guard = match self.in_flight.try_lock() {
            Ok(g) => g,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => {
                if self.should_log_skip(1000) {
                    rust_log!("[toast_rs] try_sync skipped (in-flight, source={})", source);
                }
                return None;
            }
        };
        Some(self.pass(source))
    }

    /// Called on an online edge: the network changed, so earlier failures say nothing now.
    pub fn reset_backoff(&self) {
        relock(&self.backoff).clear();
    }

    pub fn pending_count(&self) -> Result<i64> {
        self.store.count_unsynced()
    }

    pub fn last_sync_at(&self) -> Result<Option<DateTime<Utc>>> {
        let raw = self.store.config_get(KEY_LAST_SYNC)?;
        Ok(raw
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }

    fn should_log_skip(&self, min_interval_ms: u128) -> bool {
        let mut last = relock(&self.last_skip_log);
        let now = Instant::now();
        match *last {
            Some(t) if now.duration_since(t).as_millis() < min_interval_ms => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    fn pass(&self, source: &str) -> Result<SyncReport> {
        // Fail closed: without a valid credential nothing is uploaded or marked.
        if let Err(e) = self.auth.fresh_token() {
            let delay = relock(&self.backoff).record(PassOutcome::NoCredential);
            rust_log!(
                warn,
                "[toast_rs] sync_all aborted, no credential (source={}, backoff={}ms): {}",
                source,
                delay.unwrap_or_default().as_millis(),
                e
            );
            return Err(e);
        }

        let unsynced = self.store.list_unsynced()?;
        let mut report = SyncReport::default();
        if !unsynced.is_empty() {
            rust_log!(
                "[toast_rs] sync_all start pending={} (source={})",
                unsynced.len(),
                source
            );
        }

        for record in &unsynced {
            report.attempted += 1;
            if let Err(e) = self
                .remote
                .set(EVENTS, record.id.as_str(), record.to_remote_fields())
            {
                rust_log!(warn, "[toast_rs] sync_all upload failed id={}: {}", record.id, e);
                report.failed.push(record.id.clone());
                continue;
            }
            // Accepted remotely. If marking fails the next pass re-uploads under the same key.
            match self.store.mark_synced(&record.id) {
                Ok(_) => report.synced += 1,
                Err(e) => {
                    rust_log!(warn, "[toast_rs] sync_all mark_synced failed id={}: {}", record.id, e);
                    report.failed.push(record.id.clone());
                }
            }
        }

        let outcome = if report.attempted > 0 && report.synced == 0 {
            PassOutcome::Stalled
        } else {
            PassOutcome::Progress
        };
        if let Some(delay) = relock(&self.backoff).record(outcome) {
            rust_log!(
                warn,
                "[toast_rs] sync_all made no progress, backoff set={}ms (source={})",
                delay.as_millis(),
                source
            );
        }

        if let Err(e) = self.store.config_set(KEY_LAST_SYNC, &Utc::now().to_rfc3339()) {
            rust_log!(warn, "[toast_rs] sync_all could not record last_sync_at: {}", e);
        }
        if report.attempted > 0 {
            rust_log!(
                "[toast_rs] sync_all done attempted={} synced={} failed={} (source={})",
                report.attempted,
                report.synced,
                report.failed.len(),
                source
            );
        }
        Ok(report)
    }
}
