//! Atomic counters and flags used by the pool controller.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// A counter of threads currently blocked in a pool operation.
#[derive(Debug, Default)]
pub struct AtomicCounter {
    /// The current value of the counter
    value: AtomicUsize,
}

impl AtomicCounter {
    /// Create a new counter starting at zero.
    pub fn new() -> Self {
        Self {
            value: AtomicUsize::new(0),
        }
    }

    /// Increment the counter and return the new value.
    pub fn increment(&self) -> usize {
        self.value.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Decrement the counter and return the new value.
    pub fn decrement(&self) -> usize {
        self.value.fetch_sub(1, Ordering::SeqCst) - 1
    }

    /// Get the current value of the counter.
    pub fn get(&self) -> usize {
        self.value.load(Ordering::SeqCst)
    }

    /// Increment now and decrement when the returned guard drops.
    ///
    /// The guard's [`value`](CounterGuard::value) is the count observed
    /// right after the increment.
    pub fn enter(&self) -> CounterGuard<'_> {
        let value = self.increment();
        CounterGuard {
            counter: self,
            value,
        }
    }
}

/// Keeps an [`AtomicCounter`] incremented for its lifetime.
#[derive(Debug)]
pub struct CounterGuard<'a> {
    counter: &'a AtomicCounter,
    value: usize,
}

impl CounterGuard<'_> {
    /// The counter value observed when the guard was created.
    pub fn value(&self) -> usize {
        self.value
    }
}

impl Drop for CounterGuard<'_> {
    fn drop(&mut self) {
        self.counter.decrement();
    }
}

/// A flag that is set once and never cleared.
#[derive(Debug, Default)]
pub struct AtomicFlag {
    /// The flag value
    flag: AtomicBool,
}

impl AtomicFlag {
    /// Create a new unset flag.
    pub fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
        }
    }

    /// Set the flag.
    ///
    /// Returns true if the flag was set by this call, false if it was already set.
    pub fn try_set(&self) -> bool {
        !self.flag.swap(true, Ordering::SeqCst)
    }

    /// Get the current state of the flag.
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
