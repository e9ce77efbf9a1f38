//! Cancellation for borrowers blocked on the handoff queue.

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;

/// A handle that aborts a blocked [`borrow_cancellable`](crate::ConcurrentPool::borrow_cancellable).
///
/// Cloned handles share the same cancellation state. Cancelling is permanent:
/// every current and future wait observing the handle returns
/// [`PoolError::Interrupted`](crate::PoolError::Interrupted).
#[derive(Debug, Clone)]
pub struct CancelHandle {
    /// Dropping the sender disconnects `signal`, which wakes every waiter
    trigger: Arc<Mutex<Option<Sender<()>>>>,

    /// Never receives a value; only ever becomes disconnected
    signal: Receiver<()>,
}

impl CancelHandle {
    /// Create a handle that has not been cancelled.
    pub fn new() -> Self {
        let (sender, signal) = bounded(0);
        Self {
            trigger: Arc::new(Mutex::new(Some(sender))),
            signal,
        }
    }

    /// Cancel every wait observing this handle.
    ///
    /// Returns true if this call performed the cancellation.
    pub fn cancel(&self) -> bool {
        self.trigger.lock().take().is_some()
    }

    /// Check whether the handle has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.trigger.lock().is_none()
    }

    pub(crate) fn signal(&self) -> &Receiver<()> {
        &self.signal
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}
