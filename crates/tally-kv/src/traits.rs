//! The transactional store seam.
//!
//! Layers are written against these traits only. A transaction sees a
//! consistent snapshot taken when it began, observes its own writes, and
//! commits only if nothing it read (outside snapshot reads) was written by a
//! transaction that committed in the meantime.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::RangeOptions;
use crate::types::RangeResult;
use crate::types::key_after;

/// One optimistic transaction against an ordered key-value store.
///
/// Writes are buffered until [`Transaction::commit`]; they never fail
/// immediately. Size violations and misuse surface from `commit`.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Read a key, recording it in the read-conflict set.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Read a key without recording a read conflict.
    async fn snapshot_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Read keys in `[begin, end)`.
    ///
    /// Unless `options.snapshot` is set, the portion of the range actually
    /// observed is added to the read-conflict set.
    async fn get_range(&self, begin: &[u8], end: &[u8], options: RangeOptions) -> Result<RangeResult, StoreError>;

    fn set(&self, key: &[u8], value: &[u8]);

    fn clear(&self, key: &[u8]);

    /// Clear every key in `[begin, end)`.
    fn clear_range(&self, begin: &[u8], end: &[u8]);

    /// Add `delta` to the little-endian `i64` stored at `key` (absent counts as 0).
    ///
    /// Does not read the key, so concurrent adds never conflict with each other.
    fn atomic_add(&self, key: &[u8], delta: i64);

    fn add_read_conflict_range(&self, begin: &[u8], end: &[u8]);

    fn add_read_conflict_key(&self, key: &[u8]) {
        self.add_read_conflict_range(key, &key_after(key));
    }

    /// Commit buffered writes, failing with [`StoreError::Conflict`] when a
    /// concurrent commit invalidated something this transaction read.
    async fn commit(&self) -> Result<(), StoreError>;
}

/// A store that hands out transactions.
pub trait Database: Send + Sync {
    /// Transaction handle. Clones refer to the same transaction.
    type Transaction: Transaction + Clone + 'static;

    fn begin_transaction(&self) -> Result<Self::Transaction, StoreError>;
}

impl<D: Database + ?Sized> Database for Arc<D> {
    type Transaction = D::Transaction;

    fn begin_transaction(&self) -> Result<Self::Transaction, StoreError> {
        (**self).begin_transaction()
    }
}
