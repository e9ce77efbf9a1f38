//! The concurrent pool controller and its borrow guard.

pub mod concurrent;
pub mod guard;

pub use concurrent::{ConcurrentPool, PoolStats};
pub use guard::PooledGuard;
