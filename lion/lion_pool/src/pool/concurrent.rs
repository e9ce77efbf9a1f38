//! The pool controller: borrow, requite, add, remove, reserve and statistics.
//!
//! A borrow tries three tiers in order:
//!
//! 1. the calling thread's own cache of entries it returned earlier
//! 2. a scan of the shared registry for any idle entry
//! 3. a blocking poll on the handoff queue, fed by threads that return,
//!    add or unreserve entries while borrowers are waiting
//!
//! Every tier claims an entry with the same `NotInUse -> InUse`
//! compare-and-set, so an entry is never handed to two borrowers.

use log::{debug, info, trace, warn};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::cache::{CacheMode, ThreadCache};
use crate::config::ConcurrentPoolConfig;
use crate::entry::{EntryState, PoolEntry};
use crate::error::{PoolError, Result};
use crate::listener::CapacityListener;
use crate::registry::SharedRegistry;
use crate::sync::{AtomicCounter, AtomicFlag, CancelHandle, HandoffQueue};

use super::guard::PooledGuard;

/// Point-in-time counts of a pool's entries.
///
/// Fields are gathered in one pass but not atomically with respect to each
/// other; use them for monitoring, not for control decisions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Entries available for borrowing
    pub not_in_use: usize,

    /// Entries currently borrowed
    pub in_use: usize,

    /// Entries removed but not yet excised
    pub removed: usize,

    /// Entries pulled out of rotation
    pub reserved: usize,

    /// All registered entries
    pub total: usize,

    /// Borrowers currently waiting
    pub waiting: usize,
}

/// A concurrent pool of reusable entries.
pub struct ConcurrentPool<E: PoolEntry> {
    /// Every live entry
    registry: SharedRegistry<E>,

    /// Entries each thread returned most recently
    cache: ThreadCache<E>,

    /// Borrowers past the fast path that have not returned yet
    waiters: AtomicCounter,

    /// Direct handoff to blocked borrowers
    handoff: HandoffQueue<Arc<E>>,

    /// Told how many entries are missing while borrowers wait
    listener: Box<dyn CapacityListener>,

    /// Set by `close`; rejects further `add`
    closed: AtomicFlag,

    /// Configuration for this pool
    config: ConcurrentPoolConfig,
}

impl<E: PoolEntry> ConcurrentPool<E> {
    /// Create a pool with the default configuration
    pub fn new(listener: impl CapacityListener + 'static) -> Self {
        Self::with_config(listener, ConcurrentPoolConfig::default())
    }

    /// Create a pool with the specified configuration
    pub fn with_config(
        listener: impl CapacityListener + 'static,
        config: ConcurrentPoolConfig,
    ) -> Self {
        let mode = CacheMode::resolve(config.weak_thread_cache);

        info!(
            "Creating concurrent pool ({:?} thread cache of {} entries)",
            mode, config.thread_cache_capacity
        );

        Self {
            registry: SharedRegistry::new(),
            cache: ThreadCache::new(mode, config.thread_cache_capacity),
            waiters: AtomicCounter::new(),
            handoff: HandoffQueue::new(),
            listener: Box::new(listener),
            closed: AtomicFlag::new(),
            config,
        }
    }

    /// Borrow an entry, waiting up to the configured borrow timeout.
    pub fn borrow(&self) -> Option<Arc<E>> {
        self.borrow_timeout(self.config.borrow_timeout)
    }

    /// Borrow an entry, waiting up to `timeout`.
    ///
    /// Returns `None` if nothing became available in time.
    pub fn borrow_timeout(&self, timeout: Duration) -> Option<Arc<E>> {
        self.borrow_inner(timeout, None).ok().flatten()
    }

    /// Borrow an entry, waiting up to `timeout` unless `cancel` fires first.
    ///
    /// Returns [`PoolError::Interrupted`] if the wait was cancelled.
    pub fn borrow_cancellable(
        &self,
        timeout: Duration,
        cancel: &CancelHandle,
    ) -> Result<Option<Arc<E>>> {
        self.borrow_inner(timeout, Some(cancel))
    }

    /// Borrow an entry only if one is idle right now.
    ///
    /// Never blocks and never raises the capacity signal.
    pub fn try_borrow(&self) -> Option<Arc<E>> {
        self.cache.claim().or_else(|| self.registry.claim_idle())
    }

    /// Borrow an entry wrapped in a guard that requites it on drop.
    pub fn acquire(&self, timeout: Duration) -> Option<PooledGuard<'_, E>> {
        self.borrow_timeout(timeout)
            .map(|entry| PooledGuard::new(self, entry))
    }

    fn borrow_inner(
        &self,
        timeout: Duration,
        cancel: Option<&CancelHandle>,
    ) -> Result<Option<Arc<E>>> {
        if let Some(entry) = self.cache.claim() {
            trace!("Borrowed entry {} from thread cache", entry.position());
            return Ok(Some(entry));
        }

        // Dropping the guard on any exit, including cancellation, keeps the
        // waiter count exact.
        let waiting = self.waiters.enter();

        if let Some(entry) = self.registry.claim_idle() {
            if waiting.value() > 1 {
                self.listener.on_waiting(waiting.value() - 1);
            }
            trace!("Borrowed entry {} from shared registry", entry.position());
            return Ok(Some(entry));
        }

        self.listener.on_waiting(waiting.value());

        let mut remaining = timeout;
        loop {
            let start = Instant::now();

            match self.handoff.poll(remaining, cancel)? {
                None => {
                    trace!("Borrow timed out after {:?}", timeout);
                    return Ok(None);
                }
                Some(entry) => {
                    if entry.compare_and_set(EntryState::NotInUse, EntryState::InUse) {
                        trace!("Borrowed entry {} through handoff", entry.position());
                        return Ok(Some(entry));
                    }
                }
            }

            remaining = remaining.saturating_sub(start.elapsed());
            if remaining <= self.config.poll_floor {
                trace!("Borrow timed out after {:?}", timeout);
                return Ok(None);
            }
        }
    }

    /// Return a borrowed entry to the pool.
    ///
    /// The entry goes straight to a waiting borrower if there is one,
    /// otherwise into the calling thread's cache.
    pub fn requite(&self, entry: Arc<E>) {
        entry.set_state(EntryState::NotInUse);

        if !self.hand_off(&entry) {
            self.cache.push(&entry);
        }
    }

    /// Offer an idle entry to waiting borrowers.
    ///
    /// Returns true once a waiter took it or it stopped being idle, false
    /// when nobody is waiting.
    fn hand_off(&self, entry: &Arc<E>) -> bool {
        let spin_batch = self.config.handoff_spin_batch.max(1);
        let mut offered = Arc::clone(entry);
        let mut attempts = 0usize;

        while self.waiters.get() > 0 {
            if entry.state() != EntryState::NotInUse {
                return true;
            }

            match self.handoff.offer(offered) {
                Ok(()) => return true,
                Err(back) => offered = back,
            }

            attempts += 1;
            if attempts % spin_batch == 0 {
                thread::sleep(self.config.handoff_backoff);
            } else {
                std::hint::spin_loop();
            }
        }

        false
    }

    /// Register new entries with the pool.
    ///
    /// Idle entries are offered to waiting borrowers before anyone else can
    /// find them in the registry. An empty list is ignored.
    pub fn add(&self, entries: Vec<Arc<E>>) -> Result<()> {
        if self.closed.is_set() {
            info!("Pool has been closed, ignoring add()");
            return Err(PoolError::Closed);
        }

        if entries.is_empty() {
            info!("No entries given, ignoring add()");
            return Ok(());
        }

        self.registry.append(&entries);
        debug!(
            "Added {} entries, pool now holds {}",
            entries.len(),
            self.registry.len()
        );

        for entry in &entries {
            if entry.state() == EntryState::NotInUse {
                self.hand_off(entry);
            }
        }

        Ok(())
    }

    /// Remove a borrowed or reserved entry from the pool for good.
    ///
    /// Returns false, logging a warning, if the entry was idle or was not
    /// registered. After [`close`](Self::close) any entry may be removed and
    /// no warnings are logged.
    pub fn remove(&self, entry: &Arc<E>) -> bool {
        let closed = self.closed.is_set();

        if !entry.compare_and_set(EntryState::InUse, EntryState::Removed)
            && !entry.compare_and_set(EntryState::Reserved, EntryState::Removed)
        {
            if !closed {
                warn!(
                    "Attempt to remove an entry that was not borrowed or reserved: position {} ({})",
                    entry.position(),
                    entry.state()
                );
                return false;
            }
            entry.set_state(EntryState::Removed);
        }

        let removed = self.registry.remove(entry);
        if !removed && !closed {
            warn!(
                "Attempt to remove an entry that is not in the pool: position {}",
                entry.position()
            );
        }

        removed
    }

    /// Pull an idle entry out of rotation.
    pub fn reserve(&self, entry: &Arc<E>) -> bool {
        entry.compare_and_set(EntryState::NotInUse, EntryState::Reserved)
    }

    /// Put a reserved entry back into rotation.
    ///
    /// Returns false, logging a warning, if the entry was not reserved.
    pub fn unreserve(&self, entry: &Arc<E>) -> bool {
        if !entry.compare_and_set(EntryState::Reserved, EntryState::NotInUse) {
            warn!(
                "Attempt to unreserve an entry that was not reserved: position {} ({})",
                entry.position(),
                entry.state()
            );
            return false;
        }

        self.hand_off(entry);
        true
    }

    /// Stop accepting new entries.
    ///
    /// Existing entries stay usable and blocked borrowers are not woken.
    pub fn close(&self) {
        if self.closed.try_set() {
            info!("Closing pool with {} entries", self.registry.len());
        }
    }

    /// Check whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closed.is_set()
    }

    /// Entries currently in `state`, most recently added first.
    pub fn values(&self, state: EntryState) -> Vec<Arc<E>> {
        self.registry.values(state)
    }

    /// Every registered entry, in insertion order.
    pub fn values_all(&self) -> Vec<Arc<E>> {
        self.registry.values_all()
    }

    /// Number of entries currently in `state`.
    pub fn count(&self, state: EntryState) -> usize {
        self.registry.count(state)
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Check whether the pool holds no entries.
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Number of borrowers currently waiting.
    pub fn waiting_count(&self) -> usize {
        self.waiters.get()
    }

    /// Counts per state, total and waiting borrowers.
    pub fn state_counts(&self) -> PoolStats {
        let snapshot = self.registry.snapshot();
        let mut stats = PoolStats {
            total: snapshot.len(),
            waiting: self.waiters.get(),
            ..PoolStats::default()
        };

        for entry in snapshot.iter() {
            match entry.state() {
                EntryState::NotInUse => stats.not_in_use += 1,
                EntryState::InUse => stats.in_use += 1,
                EntryState::Removed => stats.removed += 1,
                EntryState::Reserved => stats.reserved += 1,
            }
        }

        stats
    }

    /// How thread caches refer to entries.
    pub fn cache_mode(&self) -> CacheMode {
        self.cache.mode()
    }

    /// Drop the calling thread's cached references.
    ///
    /// Call this before a thread exits when the pool uses strong thread
    /// caches: a list left behind by an exited thread is freed only with the
    /// pool, and until then it keeps its entries alive, including removed
    /// ones.
    pub fn clear_thread_cache(&self) {
        self.cache.clear();
    }

    /// Get the configuration of this pool
    pub fn config(&self) -> &ConcurrentPoolConfig {
        &self.config
    }
}

impl<E: PoolEntry> fmt::Debug for ConcurrentPool<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentPool")
            .field("stats", &self.state_counts())
            .field("cache_mode", &self.cache.mode())
            .field("closed", &self.is_closed())
            .finish()
    }
}
