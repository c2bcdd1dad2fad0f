//! Share-on-subscribe projection of a repository stream.
//!
//! The first subscriber opens the upstream listener. When the last one leaves,
//! the listener is kept for `stop_timeout` so a quick re-subscribe reuses it,
//! then it is torn down. The latest good list survives upstream failures, and
//! an ended upstream is restarted by the next subscribe or refresh.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::notifier::Notifier;
use super::ui_state::{StatusBoard, UiState};
use crate::domain::repository::{TodoRepository, TodoStream};
use crate::domain::todo::Todo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListKind { All, Pending }

impl ListKind {
    fn label(self) -> &'static str {
        match self { Self::All => "all", Self::Pending => "pending" }
    }

    async fn open<R: TodoRepository>(self, repo: &R) -> anyhow::Result<TodoStream> {
        match self {
            Self::All => repo.observe_all().await,
            Self::Pending => repo.observe_pending().await,
        }
    }
}

pub(crate) struct SharedList<R: TodoRepository> {
    inner: Arc<Shared<R>>,
}

impl<R: TodoRepository> Clone for SharedList<R> {
    fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

struct Shared<R> {
    repo: Arc<R>,
    kind: ListKind,
    status: StatusBoard,
    // Only the all-tasks list tells the user about listener failures.
    notifier: Option<Arc<dyn Notifier>>,
    stop_timeout: Duration,
    latest: watch::Sender<Vec<Todo>>,
    state: Mutex<ShareState>,
}

#[derive(Default)]
struct ShareState {
    subscribers: usize,
    upstream: Option<JoinHandle<()>>,
    teardown: Option<JoinHandle<()>>,
    // Bumped on every subscribe and last release; a teardown only runs for its own.
    generation: u64,
    // Error message from the previous upstream run, cleared on its first good emission.
    failed: Option<String>,
}

impl<R: TodoRepository> SharedList<R> {
    pub(crate) fn new(
        repo: Arc<R>,
        kind: ListKind,
        status: StatusBoard,
        notifier: Option<Arc<dyn Notifier>>,
        stop_timeout: Duration,
    ) -> Self {
        let (latest, _) = watch::channel(Vec::new());
        let inner = Shared { repo, kind, status, notifier, stop_timeout, latest, state: Mutex::default() };
        Self { inner: Arc::new(inner) }
    }

    /// Must be called from within a tokio runtime.
    pub(crate) fn subscribe(&self) -> ListSubscription {
        let mut state = self.inner.lock();
        state.subscribers += 1;
        state.generation += 1;
        if let Some(teardown) = state.teardown.take() {
            teardown.abort();
        }
        self.inner.start_if_stopped(&mut state);
        let rx = self.inner.latest.subscribe();
        drop(state);

        let upstream: Arc<dyn Upstream> = self.inner.clone();
        ListSubscription { rx, upstream: Some(upstream) }
    }
}

/// The list side a [`ListSubscription`] talks back to.
trait Upstream: Send + Sync {
    fn release(self: Arc<Self>);
    /// Returns whether a stopped upstream was started again.
    fn resume(self: Arc<Self>) -> bool;
}

impl<R: TodoRepository> Upstream for Shared<R> {
    fn release(self: Arc<Self>) {
        let mut state = self.lock();
        state.subscribers = state.subscribers.saturating_sub(1);
        if state.subscribers > 0 { return; }
        state.generation += 1;
        let generation = state.generation;
        match Handle::try_current() {
            Ok(handle) => {
                let shared = self.clone();
                state.teardown = Some(handle.spawn(async move {
                    tokio::time::sleep(shared.stop_timeout).await;
                    shared.stop_if_idle(generation);
                }));
            }
            Err(_) => {
                if let Some(upstream) = state.upstream.take() { upstream.abort(); }
            }
        }
    }

    fn resume(self: Arc<Self>) -> bool {
        let mut state = self.lock();
        self.start_if_stopped(&mut state)
    }
}

impl<R: TodoRepository> Shared<R> {
    fn lock(&self) -> MutexGuard<'_, ShareState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_if_stopped(self: &Arc<Self>, state: &mut ShareState) -> bool {
        if state.upstream.as_ref().is_some_and(|h| !h.is_finished()) { return false; }
        debug!(list = self.kind.label(), "starting upstream");
        state.upstream = Some(tokio::spawn(run_upstream(self.clone())));
        true
    }

    fn stop_if_idle(&self, generation: u64) {
        let mut state = self.lock();
        if state.subscribers > 0 || state.generation != generation {
            debug!(list = self.kind.label(), "teardown superseded");
            return;
        }
        state.teardown = None;
        if let Some(upstream) = state.upstream.take() {
            debug!(list = self.kind.label(), "no subscribers left; stopping upstream");
            upstream.abort();
        }
    }

    fn fail(&self, message: String) {
        warn!(list = self.kind.label(), error = %message, "task list failed");
        self.status.report(UiState::Error(message.clone()));
        if let Some(notifier) = &self.notifier {
            notifier.notify(&format!("Error loading tasks: {message}"));
        }
        self.lock().failed = Some(message);
    }
}

async fn run_upstream<R: TodoRepository>(shared: Arc<Shared<R>>) {
    let mut stream = match shared.kind.open(&*shared.repo).await {
        Ok(stream) => stream,
        Err(e) => return shared.fail(e.to_string()),
    };
    let mut recovering = shared.lock().failed.take();
    while let Some(item) = stream.next().await {
        match item {
            Ok(todos) => {
                if let Some(message) = recovering.take() {
                    shared.status.clear_error(&message);
                }
                shared.latest.send_replace(todos);
            }
            Err(e) => return shared.fail(e.to_string()),
        }
    }
    debug!(list = shared.kind.label(), "upstream ended");
}

/// A live view of a shared list. Dropping it releases the subscription.
pub struct ListSubscription {
    rx: watch::Receiver<Vec<Todo>>,
    upstream: Option<Arc<dyn Upstream>>,
}

impl ListSubscription {
    pub fn current(&self) -> Vec<Todo> { self.rx.borrow().clone() }

    /// Restarts the upstream if it has ended, e.g. after a listener failure,
    /// and waits up to `wait` for its first list. Returns the latest list.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn refresh(&self, wait: Duration) -> Vec<Todo> {
        let mut rx = self.rx.clone();
        let _ = rx.borrow_and_update();
        if self.upstream.clone().is_some_and(|upstream| upstream.resume()) {
            let _ = tokio::time::timeout(wait, rx.changed()).await;
        }
        self.current()
    }

    /// Waits for the next published list. Returns `None` if the list is gone.
    pub async fn changed(&mut self) -> Option<Vec<Todo>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

impl Drop for ListSubscription {
    fn drop(&mut self) {
        if let Some(upstream) = self.upstream.take() { upstream.release(); }
    }
}
