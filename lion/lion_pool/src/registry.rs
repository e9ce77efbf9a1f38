//! Shared registry of every live entry in a pool.
//!
//! Readers take a snapshot of the entry list without locking and iterate it
//! freely; structural changes copy the list, modify the copy and publish it.
//! A reader therefore never blocks on an add or remove, and may or may not
//! observe one that is in flight.

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use crate::entry::{EntryState, PoolEntry};

/// Copy-on-write list of pool entries.
pub struct SharedRegistry<E> {
    /// Current published list, in insertion order
    entries: ArcSwap<Vec<Arc<E>>>,

    /// Serializes add and remove
    write_lock: Mutex<()>,
}

impl<E: PoolEntry> SharedRegistry<E> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: ArcSwap::from_pointee(Vec::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Append entries, numbering their positions from the current size.
    pub fn append(&self, new_entries: &[Arc<E>]) {
        let _write = self.write_lock.lock();
        let current = self.entries.load_full();

        let mut next = Vec::with_capacity(current.len() + new_entries.len());
        next.extend(current.iter().cloned());
        for (offset, entry) in new_entries.iter().enumerate() {
            entry.set_position(current.len() + offset);
            next.push(Arc::clone(entry));
        }

        self.entries.store(Arc::new(next));
    }

    /// Excise `entry` from the registry.
    ///
    /// Returns false if the entry was not registered.
    pub fn remove(&self, entry: &Arc<E>) -> bool {
        let _write = self.write_lock.lock();
        let current = self.entries.load_full();

        let Some(index) = current.iter().position(|e| Arc::ptr_eq(e, entry)) else {
            return false;
        };

        let mut next = Vec::with_capacity(current.len() - 1);
        next.extend(current[..index].iter().cloned());
        next.extend(current[index + 1..].iter().cloned());
        self.entries.store(Arc::new(next));
        true
    }

    /// Claim the first idle entry by moving it from `NotInUse` to `InUse`.
    pub fn claim_idle(&self) -> Option<Arc<E>> {
        self.entries
            .load()
            .iter()
            .find(|entry| entry.compare_and_set(EntryState::NotInUse, EntryState::InUse))
            .cloned()
    }

    /// A lock-free snapshot of the current entry list.
    pub fn snapshot(&self) -> Arc<Vec<Arc<E>>> {
        self.entries.load_full()
    }

    /// Entries currently in `state`, most recently added first.
    pub fn values(&self, state: EntryState) -> Vec<Arc<E>> {
        self.entries
            .load()
            .iter()
            .rev()
            .filter(|entry| entry.state() == state)
            .cloned()
            .collect()
    }

    /// A copy of every entry regardless of state, in insertion order.
    pub fn values_all(&self) -> Vec<Arc<E>> {
        self.entries.load().iter().cloned().collect()
    }

    /// Number of entries currently in `state`.
    pub fn count(&self, state: EntryState) -> usize {
        self.entries
            .load()
            .iter()
            .filter(|entry| entry.state() == state)
            .count()
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    /// Check whether the registry holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: PoolEntry> Default for SharedRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for SharedRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedRegistry")
            .field("len", &self.entries.load().len())
            .finish()
    }
}
