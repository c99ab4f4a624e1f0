//! Per-call context handed to tool handlers

use super::headers::HeaderSet;
use serde_json::Value;
use tokio::sync::watch;

/// Sender half of a cancellation pair, held by the tool host
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signal cancellation to every clone of the paired signal
    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }
}

/// Receiver half of a cancellation pair
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    receiver: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        Self { receiver: None }
    }

    /// Create a linked handle and signal
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (sender, receiver) = watch::channel(false);
        (
            CancelHandle { sender },
            CancelSignal {
                receiver: Some(receiver),
            },
        )
    }

    /// Whether cancellation has already been requested
    pub fn is_cancelled(&self) -> bool {
        self.receiver.as_ref().map(|r| *r.borrow()).unwrap_or(false)
    }

    /// Resolve once cancellation is requested. Pends forever when the handle
    /// is dropped without cancelling.
    pub async fn cancelled(&self) {
        let Some(mut receiver) = self.receiver.clone() else {
            return std::future::pending().await;
        };
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }
}

/// Input of a single tool invocation
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Caller-supplied structured arguments
    pub arguments: Value,
    /// Per-call header overrides merged over the configured headers
    pub headers: HeaderSet,
    /// Fires when the caller abandons the call
    pub cancel: CancelSignal,
}

impl CallContext {
    /// Context with arguments only
    pub fn new(arguments: Value) -> Self {
        Self {
            arguments,
            headers: HeaderSet::new(),
            cancel: CancelSignal::never(),
        }
    }

    /// Attach per-call header overrides
    pub fn with_headers(mut self, headers: HeaderSet) -> Self {
        self.headers = headers;
        self
    }

    /// Attach a cancellation signal
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }
}
