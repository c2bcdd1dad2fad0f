use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use super::codec;
use super::store::{StoreError, Subscription};
use super::todo::Todo;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("todo has no id; it was never persisted")]
    MissingId,
    #[error("round trip check failed: {0}")]
    RoundTrip(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What `delete` does when the document is already gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletePolicy {
    /// Succeed silently, like a hosted document store.
    #[default]
    Permissive,
    /// Fail with [`StoreError::NotFound`].
    Strict,
}

/// Live list of todos decoded from a store subscription.
pub struct TodoStream {
    label: &'static str,
    subscription: Subscription,
}

impl TodoStream {
    pub fn new(label: &'static str, subscription: Subscription) -> Self { Self { label, subscription } }

    /// Next decoded snapshot. Undecodable documents are logged and skipped.
    /// A store error ends the stream.
    pub async fn next(&mut self) -> Option<Result<Vec<Todo>, StoreError>> {
        let snapshot = match self.subscription.next().await? {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(stream = self.label, error = %e, "listener failed");
                return Some(Err(e));
            }
        };
        let todos: Vec<Todo> = snapshot
            .iter()
            .filter_map(|doc| match codec::try_decode(doc) {
                Ok(todo) => Some(todo),
                Err(e) => {
                    warn!(stream = self.label, id = %doc.id, error = %e, "skipping undecodable document");
                    None
                }
            })
            .collect();
        debug!(stream = self.label, count = todos.len(), "received tasks");
        Some(Ok(todos))
    }
}

impl Drop for TodoStream {
    fn drop(&mut self) {
        debug!(stream = self.label, "closing listener");
    }
}

#[async_trait]
pub trait TodoRepository: Send + Sync + 'static {
    /// Every task, priority descending.
    async fn observe_all(&self) -> anyhow::Result<TodoStream>;
    /// Tasks with `is_completed == false`, priority descending.
    async fn observe_pending(&self) -> anyhow::Result<TodoStream>;
    async fn create(&self, todo: &Todo) -> anyhow::Result<String>;
    async fn update(&self, todo: &Todo) -> anyhow::Result<()>;
    async fn delete(&self, todo: &Todo) -> anyhow::Result<()>;
    /// Create, read back, complete, read back, delete a probe task.
    async fn verify_round_trip(&self) -> anyhow::Result<()>;
}
