use std::sync::{Mutex, PoisonError};

use tracing::info;

/// Short-lived user-facing message sink (a toast on a device).
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, message: &str);
}

/// Emits notifications as log events on the `notify` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str) {
        info!(target: "notify", "{message}");
    }
}

/// Keeps every message; for inspection by callers and tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner).push(message.to_string());
    }
}
