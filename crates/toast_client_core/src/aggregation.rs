//! Live guest aggregation.
//!
//! One live feed per logical event over `events/{id}/rsvps`. Every delivery is treated as the
//! whole document set: the roster and going count are recomputed from scratch, never patched.
//! Updates go to the bare id and, when the pending alias of the same event is on screen, to
//! that alias too.
//!
//! The registry owns every feed registration. Replacing or removing an entry drops its
//! registration, which cancels the feed; `close_all` is the single teardown entry point.

use crate::error::Result;
use crate::ids::{DisplayId, EventId};
use crate::models::GuestEntry;
use crate::remote::{rsvps_collection, Document, FeedEvent, FeedRegistration, FeedSink, RemoteStore};
use crate::rust_log;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuestUpdate {
    pub display_id: DisplayId,
    pub going_count: usize,
    pub guests: Vec<GuestEntry>,
    /// Guests absent from the previous delivery. Empty on the first delivery.
    pub new_responses: Vec<GuestEntry>,
}

pub type GuestSink = Arc<dyn Fn(GuestUpdate) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

/// Roster (sorted by guest id) and how many of them are going.
pub fn tally(docs: &[Document]) -> (usize, Vec<GuestEntry>) {
    let mut by_id: HashMap<&str, GuestEntry> = HashMap::new();
    for doc in docs {
        by_id.insert(doc.id.as_str(), GuestEntry::from_remote(&doc.id, &doc.fields));
    }
    let mut guests: Vec<GuestEntry> = by_id.into_values().collect();
    guests.sort_by(|a, b| a.guest_id.cmp(&b.guest_id));
    let going = guests.iter().filter(|g| g.is_going()).count();
    (going, guests)
}

struct LiveSub {
    handle: SubscriptionHandle,
    active: Arc<AtomicBool>,
    _feed: FeedRegistration,
}

impl Drop for LiveSub {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Registry {
    next_handle: u64,
    subs: HashMap<EventId, LiveSub>,
    displayed: HashSet<DisplayId>,
}

impl Registry {
    /// Drop the feed for `raw` along with its pending alias.
    fn remove(&mut self, raw: &EventId) -> Option<LiveSub> {
        self.displayed.remove(&DisplayId::Local(raw.clone()));
        self.subs.remove(raw)
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|p| p.into_inner())
}

pub struct LiveAggregation {
    remote: Arc<dyn RemoteStore>,
    registry: Arc<Mutex<Registry>>,
}

impl LiveAggregation {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            remote,
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Start (or restart) the guest feed for the logical event behind `display_id`.
    pub fn subscribe(&self, display_id: &DisplayId, sink: GuestSink) -> Result<SubscriptionHandle> {
        let raw = display_id.raw().clone();
        let handle = {
            let mut reg = lock(&self.registry);
            reg.next_handle += 1;
            if display_id.is_local() {
                reg.displayed.insert(display_id.clone());
            }
            SubscriptionHandle(reg.next_handle)
        };
        let active = Arc::new(AtomicBool::new(true));
        let feed_sink = feed_sink(raw.clone(), Arc::downgrade(&self.registry), sink, active.clone());

        // The feed may deliver synchronously, so the registry lock is not held here.
        let feed = self.remote.listen(&rsvps_collection(&raw), feed_sink)?;
        let replaced = lock(&self.registry).subs.insert(
            raw.clone(),
            LiveSub {
                handle,
                active,
                _feed: feed,
            },
        );
        if replaced.is_some() {
            rust_log!(debug, "[toast_rs] feed replaced event={}", raw);
        }
        drop(replaced);
        Ok(handle)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let removed = {
            let mut reg = lock(&self.registry);
            let key = reg
                .subs
                .iter()
                .find(|(_, s)| s.handle == handle)
                .map(|(k, _)| k.clone());
            key.and_then(|k| reg.remove(&k))
        };
        removed.is_some()
    }

    /// Record which ids are on screen; used to route updates to pending aliases.
    pub fn set_displayed(&self, ids: impl IntoIterator<Item = DisplayId>) {
        lock(&self.registry).displayed = ids.into_iter().collect();
    }

    /// Tear down every feed whose event is not in `visible`. Returns how many were removed.
    pub fn retain(&self, visible: &[DisplayId]) -> usize {
        let keep: HashSet<&EventId> = visible.iter().map(DisplayId::raw).collect();
        let removed: Vec<LiveSub> = {
            let mut reg = lock(&self.registry);
            let stale: Vec<EventId> = reg
                .subs
                .keys()
                .filter(|k| !keep.contains(k))
                .cloned()
                .collect();
            stale.iter().filter_map(|k| reg.remove(k)).collect()
        };
        removed.len()
    }

    pub fn is_subscribed(&self, display_id: &DisplayId) -> bool {
        lock(&self.registry).subs.contains_key(display_id.raw())
    }

    pub fn active_count(&self) -> usize {
        lock(&self.registry).subs.len()
    }

    /// Cancel every feed.
    pub fn close_all(&self) {
        let removed: Vec<LiveSub> = {
            let mut reg = lock(&self.registry);
            reg.displayed.clear();
            reg.subs.drain().map(|(_, s)| s).collect()
        };
        if !removed.is_empty() {
            rust_log!("[toast_rs] feed close_all closed={}", removed.len());
        }
    }
}

impl Drop for LiveAggregation {
    fn drop(&mut self) {
        self.close_all();
    }
}

fn feed_sink(
    raw: EventId,
    registry: Weak<Mutex<Registry>>,
    sink: GuestSink,
    active: Arc<AtomicBool>,
) -> FeedSink {
    let previous: Mutex<Option<HashSet<String>>> = Mutex::new(None);
    Arc::new(move |event: FeedEvent| {
        if !active.load(Ordering::SeqCst) {
            return;
        }
        let docs = match event {
            FeedEvent::Snapshot(docs) => docs,
            FeedEvent::Error(e) => {
                // The feed may recover on its own; keep the subscription and the last good count.
                rust_log!(warn, "[toast_rs] feed error event={} (ignored): {}", raw, e);
                return;
            }
        };
        let (going_count, guests) = tally(&docs);
        let new_responses = {
            let mut prev = previous.lock().unwrap_or_else(|p| p.into_inner());
            let fresh: Vec<GuestEntry> = match prev.as_ref() {
                Some(seen) => guests
                    .iter()
                    .filter(|g| !seen.contains(&g.guest_id))
                    .cloned()
                    .collect(),
                None => Vec::new(),
            };
            *prev = Some(guests.iter().map(|g| g.guest_id.clone()).collect());
            fresh
        };
        let mut targets = vec![DisplayId::Remote(raw.clone())];
        if let Some(registry) = registry.upgrade() {
            let alias = DisplayId::Local(raw.clone());
            if lock(&registry).displayed.contains(&alias) {
                targets.push(alias);
            }
        }
        for display_id in targets {
            sink(GuestUpdate {
                display_id,
                going_count,
                guests: guests.clone(),
                new_responses: new_responses.clone(),
            });
        }
    })
}
