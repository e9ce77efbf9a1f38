//! Integration tests for the concurrent pool.
//!
//! These tests drive the pool the way a connection manager would: several
//! threads borrowing and returning entries, a capacity manager adding entries
//! on demand, and administrative removal and reservation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use lion_pool::{
    BackgroundFiller, ConcurrentPool, ConcurrentPoolConfig, EntryCell, EntryState, FillerConfig,
    NoopListener, PoolEntry, PoolError, Pooled,
};

/// A resource type that embeds its own pool metadata and counts concurrent holders.
#[derive(Debug, Default)]
struct Connection {
    id: usize,
    holders: AtomicUsize,
    resets: AtomicUsize,
    cell: EntryCell,
}

impl Connection {
    fn new(id: usize) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}

impl PoolEntry for Connection {
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

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

fn connections(count: usize) -> Vec<Arc<Connection>> {
    (0..count).map(|id| Arc::new(Connection::new(id))).collect()
}

#[test]
fn test_borrow_until_exhausted() {
    let pool = ConcurrentPool::new(NoopListener);
    let entries = connections(2);
    pool.add(entries.clone()).unwrap();

    let first = pool.borrow().unwrap();
    assert_eq!(first.state(), EntryState::InUse);

    let second = pool.borrow().unwrap();
    assert_eq!(second.state(), EntryState::InUse);
    assert_ne!(first.id, second.id);

    let start = Instant::now();
    assert!(pool.borrow_timeout(Duration::from_millis(100)).is_none());
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(90));
    assert!(elapsed < Duration::from_millis(350));
}

#[test]
fn test_same_thread_reuses_cached_entry() {
    let pool = ConcurrentPool::new(NoopListener);
    let entries = connections(2);
    pool.add(entries.clone()).unwrap();

    let a = pool.borrow().unwrap();
    let b = pool.borrow().unwrap();
    pool.requite(Arc::clone(&a));
    pool.requite(Arc::clone(&b));

    // The registry would hand out the oldest idle entry; the thread cache
    // hands out the one returned last
    let again = pool.borrow().unwrap();
    assert!(Arc::ptr_eq(&again, &b));
}

#[test]
fn test_requite_hands_off_to_blocked_borrower() {
    let pool = Arc::new(ConcurrentPool::new(NoopListener));
    pool.add(connections(1)).unwrap();

    let held = pool.borrow().unwrap();

    let waiter = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            let start = Instant::now();
            let entry = pool.borrow_timeout(Duration::from_secs(10));
            (entry, start.elapsed())
        })
    };

    while pool.waiting_count() == 0 {
        thread::yield_now();
    }
    pool.requite(Arc::clone(&held));

    let (entry, elapsed) = waiter.join().unwrap();
    let entry = entry.unwrap();
    assert!(Arc::ptr_eq(&entry, &held));
    assert_eq!(entry.state(), EntryState::InUse);
    assert!(elapsed < Duration::from_secs(5));
    assert_eq!(pool.waiting_count(), 0);
}

#[test]
fn test_reserved_entry_is_invisible() {
    let pool = ConcurrentPool::new(NoopListener);
    let entries = connections(1);
    pool.add(entries.clone()).unwrap();

    assert!(pool.reserve(&entries[0]));
    assert!(pool.borrow_timeout(Duration::from_millis(20)).is_none());
    assert_eq!(pool.count(EntryState::Reserved), 1);

    assert!(pool.unreserve(&entries[0]));
    let entry = pool.borrow_timeout(Duration::from_millis(20)).unwrap();
    assert!(Arc::ptr_eq(&entry, &entries[0]));
}

#[test]
fn test_unreserve_hands_off_to_blocked_borrower() {
    let pool = Arc::new(ConcurrentPool::new(NoopListener));
    let entries = connections(1);
    pool.add(entries.clone()).unwrap();
    assert!(pool.reserve(&entries[0]));

    let waiter = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || pool.borrow_timeout(Duration::from_secs(10)))
    };

    while pool.waiting_count() == 0 {
        thread::yield_now();
    }
    assert!(pool.unreserve(&entries[0]));

    let entry = waiter.join().unwrap().unwrap();
    assert!(Arc::ptr_eq(&entry, &entries[0]));
}

#[test]
fn test_removed_entry_is_gone() {
    let pool = ConcurrentPool::new(NoopListener);
    pool.add(connections(3)).unwrap();

    let entry = pool.borrow().unwrap();
    let before = pool.len();

    assert!(pool.remove(&entry));
    assert_eq!(pool.len(), before - 1);
    assert!(!pool
        .values(EntryState::NotInUse)
        .iter()
        .any(|e| Arc::ptr_eq(e, &entry)));
    assert!(!pool.values_all().iter().any(|e| Arc::ptr_eq(e, &entry)));

    // A removed entry is never handed out again
    for _ in 0..4 {
        if let Some(other) = pool.try_borrow() {
            assert!(!Arc::ptr_eq(&other, &entry));
        }
    }
}

#[test]
fn test_closed_pool_rejects_growth() {
    let pool = ConcurrentPool::new(NoopListener);
    pool.add(connections(1)).unwrap();
    pool.close();
    assert!(pool.is_closed());

    assert_eq!(pool.add(connections(1)), Err(PoolError::Closed));
    assert_eq!(pool.len(), 1);

    let entry = pool.borrow().unwrap();
    pool.requite(entry);
    assert!(pool.borrow().is_some());
}

#[test]
fn test_pool_never_calls_reset() {
    let pool = ConcurrentPool::new(NoopListener);
    let entries = connections(1);
    pool.add(entries.clone()).unwrap();

    for _ in 0..10 {
        let entry = pool.borrow().unwrap();
        pool.requite(entry);
    }

    assert_eq!(entries[0].resets.load(Ordering::SeqCst), 0);
}

#[test]
fn test_exclusive_ownership_under_contention() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 500;

    let pool = Arc::new(ConcurrentPool::new(NoopListener));
    pool.add(connections(3)).unwrap();

    let violations = Arc::new(AtomicUsize::new(0));
    let borrows = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let violations = Arc::clone(&violations);
            let borrows = Arc::clone(&borrows);
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    let Some(entry) = pool.borrow_timeout(Duration::from_secs(10)) else {
                        continue;
                    };

                    if entry.holders.fetch_add(1, Ordering::SeqCst) != 0 {
                        violations.fetch_add(1, Ordering::SeqCst);
                    }
                    borrows.fetch_add(1, Ordering::SeqCst);
                    thread::yield_now();
                    entry.holders.fetch_sub(1, Ordering::SeqCst);

                    pool.requite(entry);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(violations.load(Ordering::SeqCst), 0);
    assert_eq!(borrows.load(Ordering::SeqCst), THREADS * ROUNDS);
    assert_eq!(pool.count(EntryState::NotInUse), 3);
    assert_eq!(pool.waiting_count(), 0);
}

#[test]
fn test_capacity_signal_reaches_listener() {
    let signals = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&signals);

    let pool: ConcurrentPool<Pooled<u32>> =
        ConcurrentPool::new(move |waiting: usize| recorded.lock().unwrap().push(waiting));

    assert!(pool.borrow_timeout(Duration::from_millis(5)).is_none());
    assert!(pool.try_borrow().is_none());

    // try_borrow never signals
    assert_eq!(*signals.lock().unwrap(), vec![1]);
}

#[test]
fn test_filler_grows_pool_for_concurrent_borrowers() {
    const BORROWERS: usize = 4;

    let filler_config = FillerConfig {
        max_entries: BORROWERS,
        ..Default::default()
    };
    let (signal, filler) = BackgroundFiller::new(filler_config);
    let pool = Arc::new(ConcurrentPool::with_config(
        signal,
        ConcurrentPoolConfig {
            borrow_timeout: Duration::from_secs(10),
            ..Default::default()
        },
    ));

    let next_id = Arc::new(AtomicUsize::new(0));
    let handle = {
        let next_id = Arc::clone(&next_id);
        filler
            .start(&pool, move || {
                Ok(Connection::new(next_id.fetch_add(1, Ordering::SeqCst)))
            })
            .unwrap()
    };

    let barrier = Arc::new(std::sync::Barrier::new(BORROWERS));
    let borrowers: Vec<_> = (0..BORROWERS)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                // Every retry raises the capacity signal again
                let entry = (0..10).find_map(|_| pool.borrow_timeout(Duration::from_secs(1)));
                // Hold every entry until all borrowers have one
                barrier.wait();
                entry.map(|e| e.id)
            })
        })
        .collect();

    let mut ids: Vec<_> = borrowers
        .into_iter()
        .map(|b| b.join().unwrap().unwrap())
        .collect();
    ids.sort_unstable();
    ids.dedup();

    assert_eq!(ids.len(), BORROWERS);
    assert!(pool.len() <= BORROWERS);

    handle.shutdown_and_join();
}

#[test]
fn test_filler_stops_after_close() {
    let (signal, filler) = BackgroundFiller::new(FillerConfig::default());
    let pool: Arc<ConcurrentPool<Connection>> = Arc::new(ConcurrentPool::new(signal));
    let handle = filler.start(&pool, || Ok(Connection::new(0))).unwrap();

    pool.close();
    assert!(pool.borrow_timeout(Duration::from_millis(50)).is_none());

    let deadline = Instant::now() + Duration::from_secs(5);
    while handle.is_running() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }

    assert!(!handle.is_running());
    assert!(pool.is_empty());
}
