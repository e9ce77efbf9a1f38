//! RAII handle for a borrowed entry.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use super::concurrent::ConcurrentPool;
use crate::entry::PoolEntry;

/// A borrowed entry that is returned to its pool when dropped.
pub struct PooledGuard<'a, E: PoolEntry> {
    /// The pool the entry was borrowed from
    pool: &'a ConcurrentPool<E>,

    /// The borrowed entry
    entry: Arc<E>,

    /// Whether dropping the guard requites the entry
    armed: bool,
}

impl<'a, E: PoolEntry> PooledGuard<'a, E> {
    pub(crate) fn new(pool: &'a ConcurrentPool<E>, entry: Arc<E>) -> Self {
        Self {
            pool,
            entry,
            armed: true,
        }
    }

    /// Get the borrowed entry
    pub fn entry(&self) -> &Arc<E> {
        &self.entry
    }

    /// Remove the entry from the pool instead of returning it.
    pub fn remove(mut self) -> bool {
        self.armed = false;
        self.pool.remove(&self.entry)
    }

    /// Detach the entry from the guard without returning it.
    ///
    /// The caller becomes responsible for requiting or removing it.
    pub fn into_inner(mut self) -> Arc<E> {
        self.armed = false;
        Arc::clone(&self.entry)
    }
}

impl<E: PoolEntry> Deref for PooledGuard<'_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.entry
    }
}

impl<E: PoolEntry + fmt::Debug> fmt::Debug for PooledGuard<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PooledGuard({:?})", self.entry)
    }
}

impl<E: PoolEntry> Drop for PooledGuard<'_, E> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.requite(Arc::clone(&self.entry));
        }
    }
}
