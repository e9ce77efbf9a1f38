//! Background capacity manager that grows a pool while borrowers wait.
//!
//! The pool raises its capacity signal on the borrowing thread. A
//! [`FillSignal`] forwards each signal over a bounded channel without
//! blocking, and a dedicated worker thread turns it into new entries built by
//! a user factory.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::entry::{EntryState, PoolEntry};
use crate::error::{PoolError, Result};
use crate::listener::CapacityListener;
use crate::pool::ConcurrentPool;

/// Configuration for a background filler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillerConfig {
    /// Maximum number of pending signals
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    /// The filler never grows the pool beyond this many entries
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Name of the worker thread
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

fn default_queue_size() -> usize {
    64
}

fn default_max_entries() -> usize {
    20
}

fn default_thread_name() -> String {
    "lion-pool-filler".to_string()
}

impl Default for FillerConfig {
    fn default() -> Self {
        Self {
            queue_size: default_queue_size(),
            max_entries: default_max_entries(),
            thread_name: default_thread_name(),
        }
    }
}

/// The capacity listener half of a filler; give it to the pool.
#[derive(Debug, Clone)]
pub struct FillSignal {
    sender: Sender<usize>,
}

impl CapacityListener for FillSignal {
    fn on_waiting(&self, waiting: usize) {
        match self.sender.try_send(waiting) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                trace!("Filler queue full, dropping signal for {} waiters", waiting);
            }
            Err(TrySendError::Disconnected(_)) => {
                trace!("Filler stopped, dropping signal for {} waiters", waiting);
            }
        }
    }
}

/// The worker half of a filler, not yet attached to a pool.
#[derive(Debug)]
pub struct BackgroundFiller {
    requests: Receiver<usize>,
    config: FillerConfig,
}

impl BackgroundFiller {
    /// Create a filler and the signal its pool should be built with.
    pub fn new(config: FillerConfig) -> (FillSignal, BackgroundFiller) {
        let (sender, requests) = bounded(config.queue_size.max(1));
        (FillSignal { sender }, BackgroundFiller { requests, config })
    }

    /// Start the worker thread for `pool`.
    ///
    /// The worker holds the pool weakly and exits once the pool is dropped,
    /// closed, or the handle is shut down.
    pub fn start<E, F>(self, pool: &Arc<ConcurrentPool<E>>, factory: F) -> Result<FillerHandle>
    where
        E: PoolEntry,
        F: Fn() -> std::result::Result<E, String> + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let entries_created = Arc::new(AtomicUsize::new(0));

        let ctx = FillerContext {
            requests: self.requests,
            pool: Arc::downgrade(pool),
            factory,
            max_entries: self.config.max_entries,
            shutdown: Arc::clone(&shutdown),
            entries_created: Arc::clone(&entries_created),
        };

        info!(
            "Starting pool filler {} (max {} entries)",
            self.config.thread_name, self.config.max_entries
        );

        let worker = thread::Builder::new()
            .name(self.config.thread_name)
            .spawn(move || ctx.run())
            .map_err(|e| PoolError::Filler(e.to_string()))?;

        Ok(FillerHandle {
            shutdown,
            entries_created,
            worker: Some(worker),
        })
    }
}

/// State owned by the filler worker thread
struct FillerContext<E: PoolEntry, F> {
    requests: Receiver<usize>,
    pool: Weak<ConcurrentPool<E>>,
    factory: F,
    max_entries: usize,
    shutdown: Arc<AtomicBool>,
    entries_created: Arc<AtomicUsize>,
}

impl<E, F> FillerContext<E, F>
where
    E: PoolEntry,
    F: Fn() -> std::result::Result<E, String>,
{
    fn run(self) {
        debug!("Pool filler: Starting");

        while !self.shutdown.load(Ordering::Relaxed) {
            // Wait for a signal or check the shutdown flag every 100ms
            let waiting = match self.requests.recv_timeout(Duration::from_millis(100)) {
                // Every pending signal describes the same backlog; keep the largest
                Ok(waiting) => self.requests.try_iter().fold(waiting, usize::max),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            let Some(pool) = self.pool.upgrade() else {
                debug!("Pool filler: pool dropped");
                break;
            };

            match self.fill(&pool, waiting) {
                Ok(()) => {}
                Err(PoolError::Closed) => {
                    debug!("Pool filler: pool closed");
                    break;
                }
                Err(e) => error!("Pool filler: {}", e),
            }
        }

        debug!("Pool filler: Shutting down");
    }

    fn fill(&self, pool: &ConcurrentPool<E>, waiting: usize) -> Result<()> {
        let idle = pool.count(EntryState::NotInUse);
        let room = self.max_entries.saturating_sub(pool.len());
        let wanted = waiting.saturating_sub(idle).min(room);

        if wanted == 0 {
            trace!(
                "Pool filler: nothing to do ({} waiting, {} idle, room for {})",
                waiting,
                idle,
                room
            );
            return Ok(());
        }

        let mut entries = Vec::with_capacity(wanted);
        for _ in 0..wanted {
            let created = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                (self.factory)()
            }));

            match created {
                Ok(Ok(entry)) => entries.push(Arc::new(entry)),
                Ok(Err(e)) => warn!("Pool filler: failed to create entry: {}", e),
                Err(panic) => error!(
                    "Pool filler: entry factory panicked: {:?}",
                    panic.downcast_ref::<&str>().unwrap_or(&"<unknown panic>")
                ),
            }
        }

        let created = entries.len();
        pool.add(entries)?;
        self.entries_created.fetch_add(created, Ordering::Relaxed);

        debug!(
            "Pool filler: created {} of {} requested entries",
            created, wanted
        );
        Ok(())
    }
}

/// Controls a running filler worker.
#[derive(Debug)]
pub struct FillerHandle {
    shutdown: Arc<AtomicBool>,
    entries_created: Arc<AtomicUsize>,
    worker: Option<JoinHandle<()>>,
}

impl FillerHandle {
    /// Number of entries the worker has added so far.
    pub fn entries_created(&self) -> usize {
        self.entries_created.load(Ordering::Relaxed)
    }

    /// Ask the worker to stop after its current request.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Check whether the worker thread is still running.
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    /// Stop the worker and wait for it to exit.
    pub fn shutdown_and_join(mut self) {
        self.shutdown();

        if let Some(worker) = self.worker.take() {
            worker.join().unwrap_or_else(|e| {
                error!("Pool filler panicked during shutdown: {:?}", e);
            });
        }
    }
}

impl Drop for FillerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
