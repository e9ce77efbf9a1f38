//! Zero-capacity rendezvous queue for direct handoff to blocked borrowers.
//!
//! An [`offer`](HandoffQueue::offer) only succeeds while some thread is
//! blocked in [`poll`](HandoffQueue::poll); nothing is ever buffered. Blocked
//! pollers are served in the order they started waiting.

use crossbeam_channel::{bounded, never, select, Receiver, Sender, TrySendError};
use std::fmt;
use std::time::Duration;

use super::cancel::CancelHandle;
use crate::error::{PoolError, Result};

/// A rendezvous channel with no internal buffering.
pub struct HandoffQueue<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
}

impl<T> HandoffQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        let (sender, receiver) = bounded(0);
        Self { sender, receiver }
    }

    /// Hand `item` to a thread currently blocked in [`poll`](Self::poll).
    ///
    /// Never blocks. Gives the item back if no poller is waiting.
    pub fn offer(&self, item: T) -> std::result::Result<(), T> {
        match self.sender.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(item)) | Err(TrySendError::Disconnected(item)) => Err(item),
        }
    }

    /// Wait up to `timeout` for an offered item.
    ///
    /// Returns `Ok(None)` when the timeout elapses and
    /// [`PoolError::Interrupted`] when `cancel` fires first.
    pub fn poll(&self, timeout: Duration, cancel: Option<&CancelHandle>) -> Result<Option<T>> {
        let uncancellable = never::<()>();
        let signal = cancel.map(CancelHandle::signal).unwrap_or(&uncancellable);

        select! {
            recv(self.receiver) -> item => Ok(item.ok()),
            recv(signal) -> _ => Err(PoolError::Interrupted),
            default(timeout) => Ok(None),
        }
    }
}

impl<T> Default for HandoffQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for HandoffQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandoffQueue").finish_non_exhaustive()
    }
}
