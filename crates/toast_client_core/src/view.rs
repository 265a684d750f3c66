//! Event list view: a worker task on the background runtime owns the canonical list.
//! Reloads and guest updates arrive as messages, so feed callbacks never touch the list
//! directly. Readers get immutable snapshots through a watch channel.

use crate::aggregation::{GuestUpdate, LiveAggregation};
use crate::ids::{DisplayId, EventId};
use crate::models::{CanonicalEventView, GuestEntry};
use crate::remote::RemoteStore;
use crate::rust_log;
use crate::RUNTIME;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

pub type Snapshot = Arc<Vec<CanonicalEventView>>;

enum ViewCommand {
    Show(Vec<CanonicalEventView>),
    Guests(GuestUpdate),
}

struct ViewWorker {
    list: Vec<CanonicalEventView>,
    known: HashMap<EventId, (usize, Vec<GuestEntry>)>,
    aggregation: Arc<LiveAggregation>,
    commands: mpsc::UnboundedSender<ViewCommand>,
    snapshots: watch::Sender<Snapshot>,
}

impl ViewWorker {
    fn show(&mut self, mut list: Vec<CanonicalEventView>) {
        for view in &mut list {
            if let Some((going, guests)) = self.known.get(&view.record.id) {
                view.apply_guests(*going, guests);
            }
        }
        let displayed: Vec<DisplayId> = list.iter().map(|v| v.display_id.clone()).collect();
        let visible: HashSet<&EventId> = displayed.iter().map(DisplayId::raw).collect();
        self.known.retain(|id, _| visible.contains(id));

        self.aggregation.set_displayed(displayed.iter().cloned());
        let dropped = self.aggregation.retain(&displayed);
        if dropped > 0 {
            rust_log!(debug, "[toast_rs] view: dropped {} feed(s) no longer visible", dropped);
        }
        for id in &displayed {
            if self.aggregation.is_subscribed(id) {
                continue;
            }
            let tx = self.commands.clone();
            let sink = Arc::new(move |update: GuestUpdate| {
                let _ = tx.send(ViewCommand::Guests(update));
            });
            if let Err(e) = self.aggregation.subscribe(id, sink) {
                rust_log!(warn, "[toast_rs] view: feed subscribe failed event={}: {}", id, e);
            }
        }

        self.list = list;
        self.publish();
    }

    fn guests(&mut self, update: GuestUpdate) {
        let raw = update.display_id.raw().clone();
        let mut touched = false;
        for view in self.list.iter_mut().filter(|v| v.display_id == update.display_id) {
            view.apply_guests(update.going_count, &update.guests);
            touched = true;
        }
        if self.list.iter().any(|v| v.record.id == raw) {
            self.known.insert(raw, (update.going_count, update.guests));
        }
        if touched {
            self.publish();
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(Arc::new(self.list.clone()));
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ViewCommand>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                ViewCommand::Show(list) => self.show(list),
                ViewCommand::Guests(update) => self.guests(update),
            }
        }
    }
}

pub struct EventListView {
    commands: mpsc::UnboundedSender<ViewCommand>,
    snapshots: watch::Receiver<Snapshot>,
    aggregation: Arc<LiveAggregation>,
    task: Option<JoinHandle<()>>,
}

impl EventListView {
    pub fn open(remote: Arc<dyn RemoteStore>) -> Self {
        let aggregation = Arc::new(LiveAggregation::new(remote));
        let (tx, rx) = mpsc::unbounded_channel();
        let (snap_tx, snap_rx) = watch::channel(Arc::new(Vec::new()));
        let worker = ViewWorker {
            list: Vec::new(),
            known: HashMap::new(),
            aggregation: aggregation.clone(),
            commands: tx.clone(),
            snapshots: snap_tx,
        };
        let task = RUNTIME.spawn(worker.run(rx));
        Self {
            commands: tx,
            snapshots: snap_rx,
            aggregation,
            task: Some(task),
        }
    }

    /// Replace the displayed list (normally the output of `load_canonical_events`).
    pub fn show(&self, list: Vec<CanonicalEventView>) {
        if self.commands.send(ViewCommand::Show(list)).is_err() {
            rust_log!(debug, "[toast_rs] view: show after close ignored");
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver for UI layers that want to await changes.
    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Block until a snapshot satisfies `pred` or `timeout` elapses.
    /// Must not be called from a task on the background runtime.
    pub fn wait_for<F>(&self, timeout: Duration, pred: F) -> Option<Snapshot>
    where
        F: Fn(&[CanonicalEventView]) -> bool,
    {
        let mut rx = self.snapshots.clone();
        RUNTIME.block_on(async move {
            let found = tokio::time::timeout(timeout, rx.wait_for(|s| pred(s.as_slice()))).await;
            match found {
                Ok(Ok(snap)) => Some(snap.clone()),
                _ => None,
            }
        })
    }

    pub fn subscription_count(&self) -> usize {
        self.aggregation.active_count()
    }

    pub fn is_open(&self) -> bool {
        self.task.is_some()
    }

    /// Cancel every feed this view owns and stop the worker. Idempotent.
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.aggregation.close_all();
            rust_log!(debug, "[toast_rs] view: closed");
        }
    }
}

impl Drop for EventListView {
    fn drop(&mut self) {
        self.close();
    }
}
