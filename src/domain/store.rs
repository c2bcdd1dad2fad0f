//! The document-store seam: keyed collections with live queries.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use super::document::{Document, FieldValue, Fields};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("listener closed by the store")]
    Closed,
    #[error("store backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction { Ascending, Descending }

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filter: Option<(String, FieldValue)>,
    pub order_by: Option<(String, Direction)>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self { collection: name.into(), filter: None, order_by: None }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.filter = Some((field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn matches(&self, document: &Document) -> bool {
        match &self.filter {
            Some((field, expected)) => document.get(field) == Some(expected),
            None => true,
        }
    }

    /// Filters and orders `documents`, which must be in store order.
    ///
    /// The sort is stable, so documents with equal keys keep store order. A
    /// missing order field sorts as null.
    pub fn apply(&self, documents: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut out: Vec<Document> = documents.into_iter().filter(|d| self.matches(d)).collect();
        if let Some((field, direction)) = &self.order_by {
            out.sort_by(|a, b| {
                let a = a.get(field).unwrap_or(&FieldValue::Null);
                let b = b.get(field).unwrap_or(&FieldValue::Null);
                match direction {
                    Direction::Ascending => a.total_cmp(b),
                    Direction::Descending => b.total_cmp(a),
                }
            });
        }
        out
    }
}

pub type Snapshot = Vec<Document>;

type Release = Box<dyn FnOnce() + Send>;

/// A live query. Yields one snapshot per change, in delivery order.
///
/// After an `Err` the store drops its side and `next` returns `None`.
/// Dropping the subscription unregisters the listener.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Result<Snapshot, StoreError>>,
    release: Option<Release>,
}

impl Subscription {
    pub fn new(
        rx: mpsc::UnboundedReceiver<Result<Snapshot, StoreError>>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self { rx, release: Some(Box::new(release)) }
    }

    pub async fn next(&mut self) -> Option<Result<Snapshot, StoreError>> { self.rx.recv().await }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() { release(); }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Appends a document and returns the id the store assigned to it.
    async fn add(&self, collection: &str, fields: Fields) -> Result<String, StoreError>;
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;
    /// Merges `fields` into an existing document. Fails with `NotFound` if it does not exist.
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError>;
    /// Returns whether a document was removed.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError>;
    /// Opens a live query. The current result set is delivered first.
    async fn listen(&self, query: Query) -> Result<Subscription, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, priority: i64, done: bool) -> Document {
        Document::new(
            id,
            Fields::from([
                ("priority".to_string(), FieldValue::from(priority)),
                ("isCompleted".to_string(), FieldValue::from(done)),
            ]),
        )
    }

    fn ids(docs: &[Document]) -> Vec<&str> { docs.iter().map(|d| d.id.as_str()).collect() }

    #[test]
    fn descending_order_is_stable_for_ties() {
        let query = Query::collection("tasks").order_by("priority", Direction::Descending);
        let out = query.apply(vec![doc("a", 1, false), doc("b", 3, false), doc("c", 1, false), doc("d", 3, true)]);
        assert_eq!(ids(&out), vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn equality_filter_excludes_missing_field() {
        let query = Query::collection("tasks").where_eq("isCompleted", false);
        let bare = Document::new("e", Fields::new());
        let out = query.apply(vec![doc("a", 1, false), doc("b", 2, true), bare]);
        assert_eq!(ids(&out), vec!["a"]);
    }

    #[tokio::test]
    async fn dropping_subscription_runs_release() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let sub = Subscription::new(rx, move || { let _ = done_tx.send(()); });
        drop(sub);
        assert!(done_rx.try_recv().is_ok());
        assert!(tx.is_closed());
    }
}
