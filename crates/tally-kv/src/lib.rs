//! Ordered transactional key-value store interface.
//!
//! Layers in this workspace are written against [`Database`] and
//! [`Transaction`]: an ordered byte-string key space with snapshot-isolated
//! optimistic transactions, read-conflict ranges, atomic adds and bounded
//! range reads. [`MemoryDatabase`] is a complete in-memory implementation.
//!
//! # Modules
//!
//! - [`traits`]: the store seam
//! - [`memory`]: in-memory MVCC store
//! - [`retry`]: bounded retry loop with exponential backoff and jitter
//! - [`scan`]: paged range iteration
//! - [`constants`]: resource bounds

pub mod constants;
pub mod error;
pub mod memory;
pub mod retry;
pub mod scan;
pub mod traits;
pub mod types;

pub use error::StoreError;
pub use memory::MemoryDatabase;
pub use memory::MemoryStats;
pub use memory::MemoryTransaction;
pub use retry::BackoffResult;
pub use retry::RetryPolicy;
pub use retry::RetryPolicyError;
pub use retry::RetryableError;
pub use retry::compute_backoff_with_jitter;
pub use retry::transact;
pub use scan::RangeScanner;
pub use traits::Database;
pub use traits::Transaction;
pub use types::KeyValue;
pub use types::RangeOptions;
pub use types::RangeResult;
pub use types::key_after;
pub use types::strinc;

#[cfg(test)]
mod proptest;
