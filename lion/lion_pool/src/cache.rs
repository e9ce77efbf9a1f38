//! Per-thread cache of recently returned entries.
//!
//! Each pool owns one list per thread. A thread pushes entries it returns and
//! pops them again on its next borrow, most recent first, so a thread that
//! repeatedly borrows and returns never touches the shared registry. Lists
//! are only ever touched by their owning thread.

use std::cell::RefCell;
use std::env::{self, VarError};
use std::fmt;
use std::sync::{Arc, Weak};
use thread_local::ThreadLocal;

use crate::entry::{EntryState, PoolEntry};

/// Environment variable that selects weak thread cache references.
pub const WEAK_REFERENCES_ENV: &str = "LION_POOL_WEAK_REFERENCES";

/// How a thread cache refers to the entries it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// The cache shares ownership of its entries
    Strong,

    /// The cache only observes its entries; an entry dropped by the pool is
    /// skipped instead of being kept alive by the cache
    Weak,
}

impl CacheMode {
    /// Select the cache mode for a new pool.
    ///
    /// An explicit override wins. Otherwise [`WEAK_REFERENCES_ENV`] is
    /// consulted: `true` (any case) selects weak references, any other value
    /// or an unset variable selects strong ones, and a variable that is set
    /// but unreadable selects weak references.
    pub fn resolve(override_weak: Option<bool>) -> Self {
        Self::resolve_with(override_weak, env::var(WEAK_REFERENCES_ENV))
    }

    fn resolve_with(override_weak: Option<bool>, env_value: Result<String, VarError>) -> Self {
        if let Some(weak) = override_weak {
            return Self::from_weak(weak);
        }

        match env_value {
            Ok(value) => Self::from_weak(value.trim().eq_ignore_ascii_case("true")),
            Err(VarError::NotPresent) => CacheMode::Strong,
            Err(VarError::NotUnicode(_)) => CacheMode::Weak,
        }
    }

    fn from_weak(weak: bool) -> Self {
        if weak {
            CacheMode::Weak
        } else {
            CacheMode::Strong
        }
    }
}

enum CachedEntry<E> {
    Strong(Arc<E>),
    Weak(Weak<E>),
}

impl<E> CachedEntry<E> {
    fn upgrade(self) -> Option<Arc<E>> {
        match self {
            CachedEntry::Strong(entry) => Some(entry),
            CachedEntry::Weak(entry) => entry.upgrade(),
        }
    }
}

/// Per-thread LIFO lists of entries, one per pool.
///
/// A thread's list outlives the thread and is only freed with the cache. In
/// strong mode such a list keeps its entries alive, including ones that have
/// since been removed from the pool; weak mode does not.
pub struct ThreadCache<E: Send + Sync> {
    mode: CacheMode,
    capacity: usize,
    lists: ThreadLocal<RefCell<Vec<CachedEntry<E>>>>,
}

impl<E: PoolEntry> ThreadCache<E> {
    /// Create a cache holding at most `capacity` entries per thread.
    pub fn new(mode: CacheMode, capacity: usize) -> Self {
        Self {
            mode,
            capacity,
            lists: ThreadLocal::new(),
        }
    }

    /// Pop the calling thread's entries until one moves from `NotInUse` to
    /// `InUse`.
    ///
    /// Entries that fail the transition, or whose weak reference has been
    /// cleared, are dropped from the list.
    pub fn claim(&self) -> Option<Arc<E>> {
        let list = self.lists.get()?;
        let mut list = list.borrow_mut();

        while let Some(cached) = list.pop() {
            if let Some(entry) = cached.upgrade() {
                if entry.compare_and_set(EntryState::NotInUse, EntryState::InUse) {
                    return Some(entry);
                }
            }
        }

        None
    }

    /// Remember `entry` on the calling thread.
    ///
    /// Returns false when the thread's list is already full.
    pub fn push(&self, entry: &Arc<E>) -> bool {
        let list = self.lists.get_or(|| RefCell::new(Vec::new()));
        let mut list = list.borrow_mut();

        if list.len() >= self.capacity {
            return false;
        }

        list.push(match self.mode {
            CacheMode::Strong => CachedEntry::Strong(Arc::clone(entry)),
            CacheMode::Weak => CachedEntry::Weak(Arc::downgrade(entry)),
        });
        true
    }

    /// Number of references held for the calling thread.
    pub fn len(&self) -> usize {
        self.lists.get().map_or(0, |list| list.borrow().len())
    }

    /// Check whether the calling thread holds no references.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every reference held for the calling thread.
    ///
    /// Only the calling thread's list is touched; lists left by exited
    /// threads stay until the cache is dropped.
    pub fn clear(&self) {
        if let Some(list) = self.lists.get() {
            list.borrow_mut().clear();
        }
    }

    /// The reference mode chosen at construction.
    pub fn mode(&self) -> CacheMode {
        self.mode
    }
}

impl<E: Send + Sync> fmt::Debug for ThreadCache<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadCache")
            .field("mode", &self.mode)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
