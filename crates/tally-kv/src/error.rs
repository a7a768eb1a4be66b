//! Error types for store operations.

use snafu::Snafu;

/// Errors returned by [`crate::Transaction`] and [`crate::Database`] implementations.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// A key read by the transaction was written by a transaction that
    /// committed after this one started.
    #[snafu(display("transaction conflict: a key read by this transaction was modified concurrently"))]
    Conflict,

    /// The transaction's read version fell out of the retained version window.
    #[snafu(display("transaction too old: read version {read_version}, oldest readable version {oldest_version}"))]
    TransactionTooOld { read_version: u64, oldest_version: u64 },

    /// The transaction was used after it committed.
    #[snafu(display("transaction already committed"))]
    AlreadyCommitted,

    /// Key exceeds the store's size limit.
    #[snafu(display("key too large: {size} bytes (max {max})"))]
    KeyTooLarge { size: usize, max: usize },

    /// Value exceeds the store's size limit.
    #[snafu(display("value too large: {size} bytes (max {max})"))]
    ValueTooLarge { size: usize, max: usize },

    /// Range read limit outside `1..=max`.
    #[snafu(display("invalid range limit {limit} (must be between 1 and {max})"))]
    InvalidRangeLimit { limit: u32, max: u32 },

    /// The retry loop gave up after `attempts` retryable failures.
    #[snafu(display("transaction retries exhausted after {attempts} attempts"))]
    RetriesExhausted { attempts: u32 },

    /// Any other store failure.
    #[snafu(display("store operation failed: {reason}"))]
    Failed { reason: String },
}

impl StoreError {
    /// Whether running the transaction again from scratch may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict | StoreError::TransactionTooOld { .. })
    }
}
