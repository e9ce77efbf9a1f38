//! Entry state machine shared by every pooled item.
//!
//! An entry moves between four states. Every transition on the borrow and
//! return paths is a compare-and-set on the entry's own state, so two threads
//! racing on the same entry can never both win:
//!
//! ```text
//! NOT_IN_USE --borrow--> IN_USE --requite--> NOT_IN_USE
//! NOT_IN_USE --reserve--> RESERVED --unreserve--> NOT_IN_USE
//! IN_USE | RESERVED --remove--> REMOVED
//! ```

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// The state of a pooled entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntryState {
    /// Idle and available for borrowing
    NotInUse = 0,

    /// Held exclusively by one borrower
    InUse = 1,

    /// Removed from the pool; never reused
    Removed = 2,

    /// Pulled out of rotation without being destroyed
    Reserved = 3,
}

impl EntryState {
    /// All states, in discriminant order.
    pub const ALL: [EntryState; 4] = [
        EntryState::NotInUse,
        EntryState::InUse,
        EntryState::Removed,
        EntryState::Reserved,
    ];

    /// Get the name of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotInUse => "NOT_IN_USE",
            Self::InUse => "IN_USE",
            Self::Removed => "REMOVED",
            Self::Reserved => "RESERVED",
        }
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::NotInUse,
            1 => Self::InUse,
            3 => Self::Reserved,
            _ => Self::Removed,
        }
    }
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability every item stored in a [`ConcurrentPool`](crate::ConcurrentPool) exposes.
///
/// Implementors usually embed an [`EntryCell`] and delegate to it, or wrap
/// their value in [`Pooled`].
pub trait PoolEntry: Send + Sync + 'static {
    /// Atomically move to `new` iff the current state equals `expected`.
    ///
    /// Returns whether the transition happened.
    fn compare_and_set(&self, expected: EntryState, new: EntryState) -> bool;

    /// Unconditionally overwrite the state.
    ///
    /// Reserved for administrative resets and for returning a borrowed entry.
    fn set_state(&self, state: EntryState);

    /// Read the current state.
    fn state(&self) -> EntryState;

    /// Record the index the entry was given when it was added to the pool.
    fn set_position(&self, position: usize);

    /// The index recorded by [`set_position`](PoolEntry::set_position).
    fn position(&self) -> usize;

    /// Clear resource specific state so the entry can be reused.
    ///
    /// The pool never calls this; the owner of the resource does.
    fn reset(&self) {}
}

/// Atomic state and position storage for a pool entry.
pub struct EntryCell {
    state: AtomicU8,
    position: AtomicUsize,
}

impl EntryCell {
    /// Create a cell in the `NotInUse` state at position 0.
    pub fn new() -> Self {
        Self::with_state(EntryState::NotInUse)
    }

    /// Create a cell starting in `state`.
    pub fn with_state(state: EntryState) -> Self {
        Self {
            state: AtomicU8::new(state as u8),
            position: AtomicUsize::new(0),
        }
    }

    /// See [`PoolEntry::compare_and_set`].
    #[inline]
    pub fn compare_and_set(&self, expected: EntryState, new: EntryState) -> bool {
        // AcqRel so that whatever the previous holder wrote to the resource is
        // visible to the thread that wins the transition.
        self.state
            .compare_exchange(expected as u8, new as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// See [`PoolEntry::set_state`].
    #[inline]
    pub fn set_state(&self, state: EntryState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// See [`PoolEntry::state`].
    #[inline]
    pub fn state(&self) -> EntryState {
        EntryState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// See [`PoolEntry::set_position`].
    pub fn set_position(&self, position: usize) {
        self.position.store(position, Ordering::Relaxed);
    }

    /// See [`PoolEntry::position`].
    pub fn position(&self) -> usize {
        self.position.load(Ordering::Relaxed)
    }
}

impl Default for EntryCell {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EntryCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryCell")
            .field("state", &self.state())
            .field("position", &self.position())
            .finish()
    }
}

impl PoolEntry for EntryCell {
    fn compare_and_set(&self, expected: EntryState, new: EntryState) -> bool {
        EntryCell::compare_and_set(self, expected, new)
    }

    fn set_state(&self, state: EntryState) {
        EntryCell::set_state(self, state)
    }

    fn state(&self) -> EntryState {
        EntryCell::state(self)
    }

    fn set_position(&self, position: usize) {
        EntryCell::set_position(self, position)
    }

    fn position(&self) -> usize {
        EntryCell::position(self)
    }
}

/// Wraps any value so it can live in a pool without implementing
/// [`PoolEntry`] itself.
pub struct Pooled<T> {
    value: T,
    cell: EntryCell,
}

impl<T> Pooled<T> {
    /// Wrap a value in the `NotInUse` state.
    pub fn new(value: T) -> Self {
        Self {
            value,
            cell: EntryCell::new(),
        }
    }

    /// Get a reference to the wrapped value
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Unwrap the value, discarding its pool metadata
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("value", &self.value)
            .field("state", &self.cell.state())
            .field("position", &self.cell.position())
            .finish()
    }
}

impl<T: Send + Sync + 'static> PoolEntry for Pooled<T> {
    fn compare_and_set(&self, expected: EntryState, new: EntryState) -> bool {
        self.cell.compare_and_set(expected, new)
    }

    fn set_state(&self, state: EntryState) {
        self.cell.set_state(state)
    }

    fn state(&self) -> EntryState {
        self.cell.state()
    }

    fn set_position(&self, position: usize) {
        self.cell.set_position(position)
    }

    fn position(&self) -> usize {
        self.cell.position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_cell_starts_idle() {
        let cell = EntryCell::new();
        assert_eq!(cell.state(), EntryState::NotInUse);
        assert_eq!(cell.position(), 0);
    }

    #[test]
    fn test_compare_and_set() {
        let cell = EntryCell::new();

        assert!(cell.compare_and_set(EntryState::NotInUse, EntryState::InUse));
        assert_eq!(cell.state(), EntryState::InUse);

        // Wrong expectation leaves the state alone
        assert!(!cell.compare_and_set(EntryState::NotInUse, EntryState::Reserved));
        assert_eq!(cell.state(), EntryState::InUse);

        cell.set_state(EntryState::NotInUse);
        assert!(cell.compare_and_set(EntryState::NotInUse, EntryState::Reserved));
        assert_eq!(cell.state(), EntryState::Reserved);
    }

    #[test]
    fn test_state_names() {
        for state in EntryState::ALL {
            assert_eq!(EntryState::from_raw(state as u8), state);
        }
        assert_eq!(EntryState::InUse.to_string(), "IN_USE");
        assert_eq!(EntryState::Reserved.as_str(), "RESERVED");
    }

    #[test]
    fn test_only_one_thread_wins() {
        let entry = Arc::new(Pooled::new("conn"));
        let wins = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let entry = Arc::clone(&entry);
                let wins = Arc::clone(&wins);
                thread::spawn(move || {
                    if entry.compare_and_set(EntryState::NotInUse, EntryState::InUse) {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(wins.load(Ordering::SeqCst), 1);
        assert_eq!(entry.state(), EntryState::InUse);
    }

    #[test]
    fn test_pooled_wraps_value() {
        let pooled = Pooled::new(vec![1u8, 2, 3]);
        pooled.set_position(7);

        assert_eq!(pooled.len(), 3);
        assert_eq!(pooled.position(), 7);
        assert_eq!(pooled.into_inner(), vec![1, 2, 3]);
    }
}
