//! Merge the local snapshot with the remote owner query into one canonical list.
//!
//! Pure: no I/O, no clock. Pending local records are shown under `DisplayId::Local`, everything
//! else under the bare id. One view per logical event; a bare copy always beats a pending one,
//! and a remote copy beats a synced local copy.

use crate::ids::DisplayId;
use crate::models::{CanonicalEventView, EventRecord, Origin};
use std::collections::HashMap;

fn display_id(record: &EventRecord) -> DisplayId {
    if record.synced || record.origin == Origin::Remote {
        DisplayId::Remote(record.id.clone())
    } else {
        DisplayId::Local(record.id.clone())
    }
}

/// Lower wins: remote, then synced local, then pending local.
fn rank(record: &EventRecord) -> u8 {
    match (record.origin, record.synced) {
        (Origin::Remote, _) => 0,
        (Origin::Local, true) => 1,
        (Origin::Local, false) => 2,
    }
}

pub fn reconcile(local: &[EventRecord], remote: &[EventRecord]) -> Vec<CanonicalEventView> {
    let mut best: HashMap<&str, &EventRecord> = HashMap::new();
    for candidate in remote.iter().chain(local.iter()) {
        best.entry(candidate.id.as_str())
            .and_modify(|current| {
                if rank(candidate) < rank(current) {
                    *current = candidate;
                }
            })
            .or_insert(candidate);
    }

    let mut views: Vec<CanonicalEventView> = best
        .into_values()
        .map(|r| CanonicalEventView::new(display_id(r), r.clone()))
        .collect();
    views.sort_by(|a, b| {
        b.record
            .created_at
            .cmp(&a.record.created_at)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    views
}
