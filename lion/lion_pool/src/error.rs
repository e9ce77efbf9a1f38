//! Error types for the concurrent pool.

use thiserror::Error;

/// Errors surfaced to the immediate caller of a pool operation.
///
/// Contract violations (removing an entry that was never borrowed, unreserving
/// an entry that was never reserved) are not represented here: they are logged
/// and reported through boolean results instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The pool has been closed and no longer accepts new entries
    #[error("pool has been closed, ignoring add()")]
    Closed,

    /// A blocked borrow was cancelled before an entry became available
    #[error("borrow interrupted while waiting for an entry")]
    Interrupted,

    /// The background filler could not accept or process a request
    #[error("pool filler unavailable: {0}")]
    Filler(String),
}

/// Result type for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
