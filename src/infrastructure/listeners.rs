use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::document::Document;
use crate::domain::store::{Query, Snapshot, StoreError, Subscription};

struct Listener {
    query: Query,
    tx: mpsc::UnboundedSender<Result<Snapshot, StoreError>>,
    last: Snapshot,
}

/// Registered live queries of one store. Backends call [`ListenerHub::publish`]
/// after every committed write, while still holding their write lock, so each
/// listener sees snapshots in commit order.
#[derive(Default)]
pub struct ListenerHub {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<u64, Listener>>,
}

impl ListenerHub {
    /// `documents` is the whole collection in store order.
    pub fn register(self: &Arc<Self>, query: Query, documents: Vec<Document>) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let snapshot = query.apply(documents);
        let _ = tx.send(Ok(snapshot.clone()));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(listener = id, collection = %query.collection, "listener registered");
        self.lock().insert(id, Listener { query, tx, last: snapshot });
        let hub = Arc::downgrade(self);
        Subscription::new(rx, move || {
            if let Some(hub) = hub.upgrade() { hub.remove(id); }
        })
    }

    pub fn watches(&self, collection: &str) -> bool {
        self.lock().values().any(|l| l.query.collection == collection)
    }

    /// Pushes the new result set to every listener on `collection` whose
    /// result actually changed. Listeners whose receiver is gone are dropped.
    pub fn publish(&self, collection: &str, documents: &[Document]) {
        self.lock().retain(|_, listener| {
            if listener.query.collection != collection { return true; }
            let snapshot = listener.query.apply(documents.iter().cloned());
            if snapshot == listener.last { return true; }
            listener.last = snapshot.clone();
            listener.tx.send(Ok(snapshot)).is_ok()
        });
    }

    /// Terminates listeners with `error`. `None` fails every collection.
    pub fn fail(&self, collection: Option<&str>, error: StoreError) {
        self.lock().retain(|id, listener| {
            if collection.is_some_and(|c| c != listener.query.collection) { return true; }
            debug!(listener = *id, error = %error, "failing listener");
            let _ = listener.tx.send(Err(error.clone()));
            false
        });
    }

    pub fn active(&self) -> usize { self.lock().len() }

    fn remove(&self, id: u64) {
        if self.lock().remove(&id).is_some() {
            debug!(listener = id, "listener removed");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Listener>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
