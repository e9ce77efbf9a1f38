#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

//! # Lion Pool
//!
//! A generic, high-throughput pool of reusable entries for the Lion
//! microkernel.
//!
//! Borrowing tries three sources in order:
//!
//! - The calling thread's cache of entries it returned recently
//! - A lock-free scan of the shared entry registry
//! - A blocking wait on a handoff queue that returning threads feed directly
//!
//! Every item in a pool carries an atomic [`EntryState`]; a compare-and-set on
//! that state is the only way to take ownership of an entry, so at most one
//! borrower holds an entry at a time. A [`CapacityListener`] is told how many
//! borrowers are waiting whenever the pool runs dry, and a
//! [`BackgroundFiller`] turns that signal into new entries.
//!
//! ```
//! use lion_pool::{ConcurrentPool, NoopListener, Pooled};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let pool = ConcurrentPool::new(NoopListener);
//! pool.add(vec![Arc::new(Pooled::new("conn-1"))]).unwrap();
//!
//! let entry = pool.borrow_timeout(Duration::from_millis(10)).unwrap();
//! assert_eq!(**entry, "conn-1");
//! pool.requite(entry);
//! ```

/// Per-thread caches of recently returned entries
pub mod cache;

/// Tuning knobs for a pool
pub mod config;

/// Entry state machine and the capability every pooled item exposes
pub mod entry;

/// Error types
pub mod error;

/// Background growth of a pool in response to waiting borrowers
pub mod filler;

/// Capacity signalling
pub mod listener;

/// The pool controller
pub mod pool;

/// Copy-on-write registry of every live entry
pub mod registry;

/// Synchronization primitives used by the pool
pub mod sync;

// Re-export key types for easier access
pub use cache::CacheMode;
pub use config::ConcurrentPoolConfig;
pub use entry::{EntryCell, EntryState, PoolEntry, Pooled};
pub use error::{PoolError, Result};
pub use filler::{BackgroundFiller, FillSignal, FillerConfig, FillerHandle};
pub use listener::{CapacityListener, NoopListener};
pub use pool::{ConcurrentPool, PoolStats, PooledGuard};
pub use sync::CancelHandle;
