//! Configuration for a concurrent pool.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`ConcurrentPool`](crate::ConcurrentPool)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrentPoolConfig {
    /// Maximum number of entries remembered per thread
    #[serde(default = "default_thread_cache_capacity")]
    pub thread_cache_capacity: usize,

    /// Force weak (`Some(true)`) or strong (`Some(false)`) thread cache references.
    ///
    /// `None` resolves the mode from the environment, see
    /// [`CacheMode::resolve`](crate::cache::CacheMode::resolve).
    #[serde(default)]
    pub weak_thread_cache: Option<bool>,

    /// Timeout used by [`ConcurrentPool::borrow`](crate::ConcurrentPool::borrow)
    #[serde(default = "default_borrow_timeout")]
    pub borrow_timeout: Duration,

    /// Failed handoff offers between two backoff sleeps
    #[serde(default = "default_handoff_spin_batch")]
    pub handoff_spin_batch: usize,

    /// How long a returning thread sleeps after a batch of failed offers
    #[serde(default = "default_handoff_backoff")]
    pub handoff_backoff: Duration,

    /// A blocked borrow gives up once its remaining budget drops to this
    #[serde(default = "default_poll_floor")]
    pub poll_floor: Duration,
}

fn default_thread_cache_capacity() -> usize {
    50
}

fn default_borrow_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_handoff_spin_batch() -> usize {
    256
}

fn default_handoff_backoff() -> Duration {
    Duration::from_micros(10)
}

fn default_poll_floor() -> Duration {
    Duration::from_micros(10)
}

impl Default for ConcurrentPoolConfig {
    fn default() -> Self {
        Self {
            thread_cache_capacity: default_thread_cache_capacity(),
            weak_thread_cache: None,
            borrow_timeout: default_borrow_timeout(),
            handoff_spin_batch: default_handoff_spin_batch(),
            handoff_backoff: default_handoff_backoff(),
            poll_floor: default_poll_floor(),
        }
    }
}
