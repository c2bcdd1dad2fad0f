use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum UiState {
    #[default]
    Loading,
    Success,
    Error(String),
}

/// Ticket handed out when an operation starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

#[derive(Debug, Default)]
struct Board {
    state: UiState,
    issued: u64,
}

/// Shared "latest status" for passive display.
///
/// An operation's outcome is published only if no newer operation has started
/// since; stale outcomes still reach their own caller through the operation
/// handle. Listener failures are published unconditionally and count as the
/// newest event, so an operation already in flight cannot overwrite them.
#[derive(Clone)]
pub struct StatusBoard {
    tx: Arc<watch::Sender<Board>>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        let (tx, _) = watch::channel(Board::default());
        Self { tx: Arc::new(tx) }
    }
}

impl StatusBoard {
    pub fn new() -> Self { Self::default() }

    pub fn current(&self) -> UiState { self.tx.borrow().state.clone() }

    pub fn subscribe(&self) -> StatusReceiver { StatusReceiver { rx: self.tx.subscribe() } }

    pub fn begin(&self) -> Ticket {
        let mut ticket = Ticket(0);
        self.tx.send_modify(|board| {
            board.issued += 1;
            board.state = UiState::Loading;
            ticket = Ticket(board.issued);
        });
        ticket
    }

    /// Returns whether the outcome was published.
    pub fn finish(&self, ticket: Ticket, outcome: UiState) -> bool {
        self.tx.send_if_modified(|board| {
            if board.issued != ticket.0 {
                debug!(ticket = ticket.0, latest = board.issued, "discarding stale outcome");
                return false;
            }
            board.state = outcome;
            true
        })
    }

    pub fn report(&self, state: UiState) {
        self.tx.send_modify(|board| {
            board.issued += 1;
            board.state = state;
        });
    }

    /// Clears an error previously reported with exactly `message`.
    pub fn clear_error(&self, message: &str) {
        self.tx.send_if_modified(|board| match &board.state {
            UiState::Error(current) if current == message => {
                board.state = UiState::Success;
                true
            }
            _ => false,
        });
    }
}

/// Read side of a [`StatusBoard`].
#[derive(Clone)]
pub struct StatusReceiver {
    rx: watch::Receiver<Board>,
}

impl StatusReceiver {
    pub fn current(&self) -> UiState { self.rx.borrow().state.clone() }

    /// Waits for the next change. Returns `None` once the board is gone.
    pub async fn changed(&mut self) -> Option<UiState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().state.clone())
    }
}
