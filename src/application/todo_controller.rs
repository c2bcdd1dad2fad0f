use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::notifier::Notifier;
use super::shared_list::{ListKind, ListSubscription, SharedList};
use super::ui_state::{StatusBoard, StatusReceiver, UiState};
use crate::domain::repository::{RepositoryError, TodoRepository};
use crate::domain::store::StoreError;
use crate::domain::todo::Todo;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// How long a shared list keeps its listener after the last subscriber leaves.
    pub share_stop_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self { Self { share_stop_timeout: Duration::from_secs(5) } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind { NotFound, InvalidInput, Unavailable, Other }

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct OperationError {
    pub kind: FailureKind,
    pub message: String,
}

impl OperationError {
    fn from_anyhow(e: &anyhow::Error) -> Self {
        let store = e.downcast_ref::<StoreError>().or_else(|| match e.downcast_ref::<RepositoryError>() {
            Some(RepositoryError::Store(inner)) => Some(inner),
            _ => None,
        });
        let kind = match (store, e.downcast_ref::<RepositoryError>()) {
            (Some(StoreError::NotFound { .. }), _) => FailureKind::NotFound,
            (Some(StoreError::Unavailable(_) | StoreError::Closed), _) => FailureKind::Unavailable,
            (_, Some(RepositoryError::MissingId)) => FailureKind::InvalidInput,
            _ => FailureKind::Other,
        };
        Self { kind, message: e.to_string() }
    }
}

/// Result handle of one dispatched write. The write runs to completion
/// whether or not this is awaited or dropped.
pub struct Operation<T> {
    handle: JoinHandle<Result<T, OperationError>>,
}

impl<T> Future for Operation<T> {
    type Output = Result<T, OperationError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Poll::Ready(match ready!(Pin::new(&mut self.handle).poll(cx)) {
            Ok(outcome) => outcome,
            Err(e) => Err(OperationError { kind: FailureKind::Other, message: format!("operation task failed: {e}") }),
        })
    }
}

/// UI-facing state for the task list: shared live lists, the latest status and
/// the mutation surface. Cloning shares everything.
pub struct TodoController<R: TodoRepository> {
    repo: Arc<R>,
    notifier: Arc<dyn Notifier>,
    status: StatusBoard,
    all: SharedList<R>,
    pending: SharedList<R>,
}

impl<R: TodoRepository> Clone for TodoController<R> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            notifier: self.notifier.clone(),
            status: self.status.clone(),
            all: self.all.clone(),
            pending: self.pending.clone(),
        }
    }
}

impl<R: TodoRepository> TodoController<R> {
    pub fn new(repo: R, notifier: Arc<dyn Notifier>, config: ControllerConfig) -> Self {
        let repo = Arc::new(repo);
        let status = StatusBoard::new();
        let timeout = config.share_stop_timeout;
        let all = SharedList::new(repo.clone(), ListKind::All, status.clone(), Some(notifier.clone()), timeout);
        let pending = SharedList::new(repo.clone(), ListKind::Pending, status.clone(), None, timeout);
        Self { repo, notifier, status, all, pending }
    }

    /// Every task, priority descending. Starts empty until the first snapshot arrives.
    pub fn todo_list(&self) -> ListSubscription { self.all.subscribe() }

    pub fn pending_todos(&self) -> ListSubscription { self.pending.subscribe() }

    pub fn ui_state(&self) -> StatusReceiver { self.status.subscribe() }

    pub fn current_state(&self) -> UiState { self.status.current() }

    /// Returns `None`, doing nothing at all, when `title` is blank.
    pub fn add_todo(
        &self,
        title: &str,
        description: &str,
        priority: i64,
        due_date: Option<DateTime<Utc>>,
    ) -> Option<Operation<String>> {
        if title.trim().is_empty() {
            debug!("ignoring task with blank title");
            return None;
        }
        let todo = Todo { priority, due_date, created_at: Utc::now(), ..Todo::new(title, description) };
        let repo = self.repo.clone();
        let title = todo.title.clone();
        Some(self.launch(
            "add",
            async move { repo.create(&todo).await },
            move |_| format!("Task added: {title}"),
            "Error adding task",
        ))
    }

    pub fn update_todo_status(&self, todo: &Todo, is_completed: bool) -> Operation<()> {
        let updated = todo.with_completed(is_completed);
        let repo = self.repo.clone();
        let label = if is_completed { "completed" } else { "pending" };
        self.launch(
            "update_status",
            async move { repo.update(&updated).await },
            move |_| format!("Task marked as {label}"),
            "Error updating status",
        )
    }

    pub fn update_todo(&self, todo: &Todo) -> Operation<()> {
        let todo = todo.clone();
        let repo = self.repo.clone();
        let title = todo.title.clone();
        self.launch(
            "update",
            async move { repo.update(&todo).await },
            move |_| format!("Task updated: {title}"),
            "Error updating task",
        )
    }

    pub fn delete_todo(&self, todo: &Todo) -> Operation<()> {
        let todo = todo.clone();
        let repo = self.repo.clone();
        let title = todo.title.clone();
        self.launch(
            "delete",
            async move { repo.delete(&todo).await },
            move |_| format!("Task deleted: {title}"),
            "Error deleting task",
        )
    }

    pub fn test_store_connection(&self) -> Operation<()> {
        let repo = self.repo.clone();
        self.launch(
            "connection_test",
            async move { repo.verify_round_trip().await },
            |_| "Connection test completed".to_string(),
            "Connection test failed",
        )
    }

    // Loading is published before the write is spawned; the outcome is
    // published only if no later operation has started.
    fn launch<T, F>(
        &self,
        action: &'static str,
        work: F,
        success: impl FnOnce(&T) -> String + Send + 'static,
        failure: &'static str,
    ) -> Operation<T>
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let ticket = self.status.begin();
        let status = self.status.clone();
        let notifier = self.notifier.clone();
        debug!(action, "operation started");
        let handle = tokio::spawn(async move {
            match work.await {
                Ok(value) => {
                    status.finish(ticket, UiState::Success);
                    notifier.notify(&success(&value));
                    Ok(value)
                }
                Err(e) => {
                    let err = OperationError::from_anyhow(&e);
                    error!(action, error = %err.message, "operation failed");
                    status.finish(ticket, UiState::Error(err.message.clone()));
                    notifier.notify(&format!("{failure}: {}", err.message));
                    Err(err)
                }
            }
        });
        Operation { handle }
    }
}
