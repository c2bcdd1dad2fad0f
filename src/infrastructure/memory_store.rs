use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use super::listeners::ListenerHub;
use crate::domain::document::{Document, Fields};
use crate::domain::store::{DocumentStore, Query, StoreError, Subscription};

/// Process-local document store. Collections keep insertion order, which is
/// the tie order for queries.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    collections: Mutex<HashMap<String, Vec<Document>>>,
    hub: Arc<ListenerHub>,
    outage: Mutex<Option<String>>,
    preset_ids: Mutex<VecDeque<String>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self { Self::default() }

    /// The next `add` calls take these ids, in order, before falling back to random ones.
    pub fn with_ids<I: IntoIterator<Item = S>, S: Into<String>>(self, ids: I) -> Self {
        lock(&self.inner.preset_ids).extend(ids.into_iter().map(Into::into));
        self
    }

    /// While set, every operation fails with [`StoreError::Unavailable`].
    pub fn set_outage(&self, reason: Option<&str>) {
        *lock(&self.inner.outage) = reason.map(str::to_string);
    }

    /// Terminates every open listener with `error`, as a dropped connection would.
    pub fn fail_listeners(&self, error: StoreError) { self.inner.hub.fail(None, error); }

    pub fn active_listeners(&self) -> usize { self.inner.hub.active() }

    /// Inserts or replaces a document under its own id, bypassing id assignment.
    pub fn put(&self, collection: &str, document: Document) {
        let mut collections = lock(&self.inner.collections);
        let docs = collections.entry(collection.to_string()).or_default();
        match docs.iter_mut().find(|d| d.id == document.id) {
            Some(existing) => *existing = document,
            None => docs.push(document),
        }
        self.inner.hub.publish(collection, docs);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        match lock(&self.inner.outage).as_ref() {
            Some(reason) => Err(StoreError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }

    fn next_id(&self) -> String {
        lock(&self.inner.preset_ids).pop_front().unwrap_or_else(|| Uuid::new_v4().simple().to_string())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn not_found(collection: &str, id: &str) -> StoreError {
    StoreError::NotFound { collection: collection.to_string(), id: id.to_string() }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn add(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        self.check_available()?;
        let id = self.next_id();
        let mut collections = lock(&self.inner.collections);
        let docs = collections.entry(collection.to_string()).or_default();
        docs.push(Document::new(id.clone(), fields));
        self.inner.hub.publish(collection, docs);
        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.check_available()?;
        let collections = lock(&self.inner.collections);
        Ok(collections.get(collection).and_then(|docs| docs.iter().find(|d| d.id == id)).cloned())
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        self.check_available()?;
        let mut collections = lock(&self.inner.collections);
        let docs = collections.get_mut(collection).ok_or_else(|| not_found(collection, id))?;
        let doc = docs.iter_mut().find(|d| d.id == id).ok_or_else(|| not_found(collection, id))?;
        doc.fields.extend(fields);
        self.inner.hub.publish(collection, docs);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut collections = lock(&self.inner.collections);
        let Some(docs) = collections.get_mut(collection) else { return Ok(false) };
        let before = docs.len();
        docs.retain(|d| d.id != id);
        let removed = docs.len() != before;
        if removed { self.inner.hub.publish(collection, docs); }
        Ok(removed)
    }

    async fn listen(&self, query: Query) -> Result<Subscription, StoreError> {
        self.check_available()?;
        let collections = lock(&self.inner.collections);
        let docs = collections.get(&query.collection).cloned().unwrap_or_default();
        Ok(self.inner.hub.register(query, docs))
    }
}
