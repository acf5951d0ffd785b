//! Typed status codes for the pool and store APIs.
//!
//! The pool never retries internally: on `Exhausted` the caller may run
//! `Pool::maintain()` and retry. The store re-syncs a flagged cursor once
//! on the next call; a second failure surfaces as `FailedStore`.
//!
//! Misuse (operations on an out-of-range or destroyed handle) is a panic,
//! not an error value.

use thiserror::Error;

/// Block pool failures.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum PoolError {
    /// Free list empty and a maintenance pass did not replenish it.
    #[error("pool exhausted")]
    Exhausted,

    /// Bad tag, bad magic, or a link that does not address a valid block.
    #[error("invalid block")]
    InvalidBlock,

    /// Sub-queue depth limit reached; the push was dropped and counted.
    #[error("sub-queue depth limit reached")]
    QueueFull,

    /// Arena too small or a payload exceeds the slot capacity.
    #[error("allocation failed")]
    FailedMem,
}

/// Persistent file store failures.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum StoreError {
    /// Blocking call expired before data or a cache slot became available.
    #[error("timed out")]
    Timeout,

    /// I/O error, short read/write, or a release without a cached entry.
    #[error("store operation failed")]
    FailedStore,

    /// Lock creation/usage failure.
    #[error("os resource failure")]
    FailedOs,

    /// Cache or payload buffer allocation failure.
    #[error("memory allocation failure")]
    FailedMem,

    /// No free slot in the process-wide handle table.
    #[error("no free store handle")]
    InvalidHandle,
}
