//! Synchronization primitives backing the pool controller.
//!
//! - Atomic counters and flags for the waiter count and the closed state
//! - A zero-capacity handoff queue that passes entries straight to waiters
//! - Cancellation handles for borrowers blocked on that queue

pub mod atomic;
pub mod cancel;
pub mod handoff;

pub use atomic::{AtomicCounter, AtomicFlag, CounterGuard};
pub use cancel::CancelHandle;
pub use handoff::HandoffQueue;
