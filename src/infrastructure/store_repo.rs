use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::domain::{
    codec,
    document::FieldValue,
    repository::{DeletePolicy, RepositoryError, TodoRepository, TodoStream},
    store::{Direction, DocumentStore, Query, StoreError},
    todo::Todo,
};

pub const TASKS_COLLECTION: &str = "tasks";

/// [`TodoRepository`] over a document collection.
#[derive(Clone)]
pub struct StoreTodoRepository<S: DocumentStore> {
    store: S,
    collection: String,
    delete_policy: DeletePolicy,
}

impl<S: DocumentStore> StoreTodoRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store, collection: TASKS_COLLECTION.to_string(), delete_policy: DeletePolicy::default() }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn with_delete_policy(mut self, policy: DeletePolicy) -> Self {
        self.delete_policy = policy;
        self
    }

    pub fn store(&self) -> &S { &self.store }

    fn all_query(&self) -> Query {
        Query::collection(&self.collection).order_by(codec::PRIORITY, Direction::Descending)
    }

    fn pending_query(&self) -> Query {
        self.all_query().where_eq(codec::IS_COMPLETED, false)
    }

    async fn check_probe(&self, id: &str, probe: &Todo) -> Result<()> {
        let created = self
            .store
            .get(&self.collection, id)
            .await?
            .ok_or_else(|| RepositoryError::RoundTrip(format!("probe {id} missing after create")))?;
        let title = created.get_string(codec::TITLE).ok().flatten().unwrap_or_default();
        debug!(id, title, "probe created");
        if title != probe.title {
            return Err(RepositoryError::RoundTrip(format!("probe title read back as {title:?}")).into());
        }

        self.update(&Todo { id: id.to_string(), ..probe.with_completed(true) }).await?;
        let updated = self.store.get(&self.collection, id).await?;
        match updated.as_ref().map(|d| d.get(codec::IS_COMPLETED)) {
            Some(Some(FieldValue::Bool(true))) => {
                info!(id, "probe update confirmed");
                Ok(())
            }
            other => {
                let seen = other.flatten().cloned();
                Err(RepositoryError::RoundTrip(format!("probe isCompleted read back as {seen:?}")).into())
            }
        }
    }
}

fn require_id(todo: &Todo) -> Result<&str, RepositoryError> {
    if todo.is_persisted() { Ok(&todo.id) } else { Err(RepositoryError::MissingId) }
}

#[async_trait]
impl<S: DocumentStore> TodoRepository for StoreTodoRepository<S> {
    async fn observe_all(&self) -> Result<TodoStream> {
        debug!(collection = %self.collection, "opening all-tasks listener");
        let subscription = self.store.listen(self.all_query()).await?;
        Ok(TodoStream::new("all", subscription))
    }

    async fn observe_pending(&self) -> Result<TodoStream> {
        debug!(collection = %self.collection, "opening pending-tasks listener");
        let subscription = self.store.listen(self.pending_query()).await?;
        Ok(TodoStream::new("pending", subscription))
    }

    async fn create(&self, todo: &Todo) -> Result<String> {
        debug!(title = %todo.title, "adding task");
        let id = self.store.add(&self.collection, codec::encode(todo)).await.inspect_err(|e| {
            error!(title = %todo.title, error = %e, "failed to add task");
        })?;
        info!(id = %id, "task added");
        Ok(id)
    }

    async fn update(&self, todo: &Todo) -> Result<()> {
        let id = require_id(todo)?;
        debug!(id, completed = todo.is_completed, "updating task");
        self.store.update(&self.collection, id, codec::encode(todo)).await.inspect_err(|e| {
            error!(id, error = %e, "failed to update task");
        })?;
        Ok(())
    }

    async fn delete(&self, todo: &Todo) -> Result<()> {
        let id = require_id(todo)?;
        debug!(id, "deleting task");
        let removed = self.store.delete(&self.collection, id).await.inspect_err(|e| {
            error!(id, error = %e, "failed to delete task");
        })?;
        if !removed {
            match self.delete_policy {
                DeletePolicy::Permissive => debug!(id, "task already absent"),
                DeletePolicy::Strict => {
                    return Err(StoreError::NotFound { collection: self.collection.clone(), id: id.to_string() }.into());
                }
            }
        }
        Ok(())
    }

    async fn verify_round_trip(&self) -> Result<()> {
        info!(collection = %self.collection, "starting store round trip check");
        let probe = Todo::new("Test task", "This is a test task");
        let id = self.create(&probe).await?;
        let outcome = self.check_probe(&id, &probe).await;
        // The probe is removed whatever the checks found.
        let removed = self.store.delete(&self.collection, &id).await;
        match &outcome {
            Ok(()) => info!(id = %id, "round trip check passed"),
            Err(e) => error!(id = %id, error = %e, "round trip check failed"),
        }
        outcome?;
        removed?;
        Ok(())
    }
}
