//! Remote document store seam: keyed upsert/get/delete, an equality query and live
//! change feeds over a (sub-)collection.

mod http;
mod memory;

pub use http::HttpRemoteStore;
pub use memory::MemoryRemote;

use crate::error::Result;
use crate::ids::EventId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

pub type Fields = Map<String, Value>;

pub const EVENTS: &str = "events";

/// Guest responses live under the event document.
pub fn rsvps_collection(event: &EventId) -> String {
    format!("{}/{}/rsvps", EVENTS, event)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub fields: Fields,
}

/// One delivery of a live feed: the whole current document set, or an error.
#[derive(Clone, Debug, PartialEq)]
pub enum FeedEvent {
    Snapshot(Vec<Document>),
    Error(String),
}

pub type FeedSink = Arc<dyn Fn(FeedEvent) + Send + Sync>;

/// Live feed handle. Cancels the feed when removed or dropped.
pub struct FeedRegistration {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl FeedRegistration {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn remove(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for FeedRegistration {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for FeedRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedRegistration")
            .field("live", &self.cancel.is_some())
            .finish()
    }
}

pub trait RemoteStore: Send + Sync {
    /// Create or overwrite `collection/id`. Repeating the call with the same id is idempotent.
    fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<()>;

    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Documents whose `field` equals `value`.
    fn query_eq(&self, collection: &str, field: &str, value: &str) -> Result<Vec<Document>>;

    fn delete(&self, collection: &str, id: &str) -> Result<()>;

    /// Deliver the current document set of `collection` now and after every change.
    fn listen(&self, collection: &str, sink: FeedSink) -> Result<FeedRegistration>;
}
