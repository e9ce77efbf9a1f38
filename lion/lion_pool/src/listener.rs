//! Capacity signal raised while borrowers are waiting.

/// Receives requests for more pool entries.
///
/// The pool calls [`on_waiting`](CapacityListener::on_waiting) on the
/// borrowing thread, so implementations must hand the work to another thread
/// (see [`BackgroundFiller`](crate::filler::BackgroundFiller)) rather than
/// create entries inline. Calling [`add`](crate::ConcurrentPool::add) from
/// inside `on_waiting` never returns: the borrower that raised the signal is
/// itself counted as waiting but is not yet polling for a handoff.
pub trait CapacityListener: Send + Sync {
    /// Roughly `waiting` more entries would satisfy the current backlog.
    fn on_waiting(&self, waiting: usize);
}

impl<F> CapacityListener for F
where
    F: Fn(usize) + Send + Sync,
{
    fn on_waiting(&self, waiting: usize) {
        self(waiting)
    }
}

/// A listener that ignores every signal, for pools with fixed capacity.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl CapacityListener for NoopListener {
    fn on_waiting(&self, _waiting: usize) {}
}
