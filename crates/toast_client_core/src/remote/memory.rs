//! In-process remote store with synchronous change feeds.
//! Used by tests and by hosts that want to run the core without a backend. Supports failure
//! injection: a global offline switch, per-id upload failures and injected feed errors.

use super::{Document, FeedEvent, FeedRegistration, FeedSink, Fields, RemoteStore};
use crate::error::{CoreError, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

#[derive(Default)]
struct Inner {
    docs: HashMap<String, BTreeMap<String, Fields>>,
    listeners: HashMap<String, Vec<(u64, FeedSink)>>,
    next_listener: u64,
    offline: bool,
    failing_ids: HashSet<String>,
    set_attempts: HashMap<(String, String), usize>,
}

impl Inner {
    fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.docs
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn sinks(&self, collection: &str) -> Vec<FeedSink> {
        self.listeners
            .get(collection)
            .map(|l| l.iter().map(|(_, s)| s.clone()).collect())
            .unwrap_or_default()
    }
}

#[derive(Default, Clone)]
pub struct MemoryRemote {
    inner: Arc<Mutex<Inner>>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|p| p.into_inner())
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call except `listen` fails with a transient error.
    pub fn set_offline(&self, offline: bool) {
        lock(&self.inner).offline = offline;
    }

    /// Uploads of this id fail until `clear_failures`.
    pub fn fail_uploads_for(&self, id: &str) {
        lock(&self.inner).failing_ids.insert(id.to_string());
    }

    pub fn clear_failures(&self) {
        lock(&self.inner).failing_ids.clear();
    }

    /// How many times `set` was attempted for `collection/id`.
    pub fn set_attempts(&self, collection: &str, id: &str) -> usize {
        lock(&self.inner)
            .set_attempts
            .get(&(collection.to_string(), id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.inner).listeners.values().map(Vec::len).sum()
    }

    pub fn document_count(&self, collection: &str) -> usize {
        lock(&self.inner).docs.get(collection).map(BTreeMap::len).unwrap_or(0)
    }

    /// Deliver an error to every listener of `collection`.
    pub fn emit_feed_error(&self, collection: &str, message: &str) {
        let sinks = lock(&self.inner).sinks(collection);
        for sink in sinks {
            sink(FeedEvent::Error(message.to_string()));
        }
    }

    fn check_online(inner: &Inner) -> Result<()> {
        if inner.offline {
            return Err(CoreError::RemoteTransient("network offline".to_string()));
        }
        Ok(())
    }

    fn notify(&self, collection: &str) {
        let (sinks, docs) = {
            let inner = lock(&self.inner);
            (inner.sinks(collection), inner.snapshot(collection))
        };
        for sink in sinks {
            sink(FeedEvent::Snapshot(docs.clone()));
        }
    }
}

impl RemoteStore for MemoryRemote {
    fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        {
            let mut inner = lock(&self.inner);
            *inner
                .set_attempts
                .entry((collection.to_string(), id.to_string()))
                .or_default() += 1;
            Self::check_online(&inner)?;
            if inner.failing_ids.contains(id) {
                return Err(CoreError::RemoteTransient(format!("upload rejected for {}", id)));
            }
            inner
                .docs
                .entry(collection.to_string())
                .or_default()
                .insert(id.to_string(), fields);
        }
        self.notify(collection);
        Ok(())
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let inner = lock(&self.inner);
        Self::check_online(&inner)?;
        Ok(inner
            .docs
            .get(collection)
            .and_then(|d| d.get(id))
            .map(|fields| Document {
                id: id.to_string(),
                fields: fields.clone(),
            }))
    }

    fn query_eq(&self, collection: &str, field: &str, value: &str) -> Result<Vec<Document>> {
        let inner = lock(&self.inner);
        Self::check_online(&inner)?;
        Ok(inner
            .snapshot(collection)
            .into_iter()
            .filter(|d| d.fields.get(field).and_then(|v| v.as_str()) == Some(value))
            .collect())
    }

    fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let removed = {
            let mut inner = lock(&self.inner);
            Self::check_online(&inner)?;
            inner
                .docs
                .get_mut(collection)
                .and_then(|d| d.remove(id))
                .is_some()
        };
        if removed {
            self.notify(collection);
        }
        Ok(())
    }

    fn listen(&self, collection: &str, sink: FeedSink) -> Result<FeedRegistration> {
        let (key, docs) = {
            let mut inner = lock(&self.inner);
            inner.next_listener += 1;
            let key = inner.next_listener;
            inner
                .listeners
                .entry(collection.to_string())
                .or_default()
                .push((key, sink.clone()));
            (key, inner.snapshot(collection))
        };
        sink(FeedEvent::Snapshot(docs));

        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        let collection = collection.to_string();
        Ok(FeedRegistration::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut inner = lock(&inner);
                if let Some(list) = inner.listeners.get_mut(&collection) {
                    list.retain(|(k, _)| *k != key);
                    if list.is_empty() {
                        inner.listeners.remove(&collection);
                    }
                }
            }
        }))
    }
}
