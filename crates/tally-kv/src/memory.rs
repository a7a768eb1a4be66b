//! In-memory MVCC implementation of [`Database`].
//!
//! Every commit produces a new version. Each key keeps a short history of
//! versions so a transaction reads a consistent snapshot as of its read
//! version. On commit, the write ranges of every transaction that committed
//! after the reader began are checked against the reader's conflict ranges.
//!
//! Suitable for tests, simulations and the CLI; nothing is persisted.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;

use crate::constants::MAX_KEY_SIZE;
use crate::constants::MAX_RANGE_LIMIT;
use crate::constants::MAX_VALUE_SIZE;
use crate::constants::MAX_VERSION_LAG;
use crate::error::StoreError;
use crate::traits::Database;
use crate::traits::Transaction;
use crate::types::KeyValue;
use crate::types::RangeOptions;
use crate::types::RangeResult;
use crate::types::key_after;

#[derive(Debug, Clone)]
struct Version {
    version: u64,
    value: Option<Vec<u8>>,
}

/// Half-open key range `[begin, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct KeyRange {
    begin: Vec<u8>,
    end: Vec<u8>,
}

impl KeyRange {
    fn new(begin: &[u8], end: &[u8]) -> Self {
        Self {
            begin: begin.to_vec(),
            end: end.to_vec(),
        }
    }

    fn point(key: &[u8]) -> Self {
        Self {
            begin: key.to_vec(),
            end: key_after(key),
        }
    }

    fn contains(&self, key: &[u8]) -> bool {
        self.begin.as_slice() <= key && key < self.end.as_slice()
    }

    fn intersects(&self, other: &KeyRange) -> bool {
        self.begin < other.end && other.begin < self.end
    }
}

#[derive(Debug)]
struct CommitRecord {
    version: u64,
    writes: Vec<KeyRange>,
}

#[derive(Debug, Default)]
struct Storage {
    data: BTreeMap<Vec<u8>, Vec<Version>>,
    version: u64,
    log: VecDeque<CommitRecord>,
}

impl Storage {
    fn oldest_readable(&self, max_version_lag: u64) -> u64 {
        self.version.saturating_sub(max_version_lag)
    }

    fn check_readable(&self, read_version: u64, max_version_lag: u64) -> Result<(), StoreError> {
        let oldest_version = self.oldest_readable(max_version_lag);
        if read_version < oldest_version {
            return Err(StoreError::TransactionTooOld {
                read_version,
                oldest_version,
            });
        }
        Ok(())
    }

    fn latest(&self, key: &[u8]) -> Option<&[u8]> {
        self.data.get(key).and_then(|history| history.last()).and_then(|v| v.value.as_deref())
    }

    fn push_version(&mut self, key: &[u8], version: u64, value: Option<Vec<u8>>) {
        self.data.entry(key.to_vec()).or_default().push(Version { version, value });
    }

    /// Drop history no reader inside the lag window can observe.
    fn prune_key(&mut self, key: &[u8], max_version_lag: u64) {
        let horizon = self.oldest_readable(max_version_lag);
        let remove = match self.data.get_mut(key) {
            Some(history) => {
                let keep_from = history.iter().rposition(|v| v.version <= horizon).unwrap_or(0);
                history.drain(..keep_from);
                history.len() == 1 && history[0].value.is_none() && history[0].version <= horizon
            }
            None => false,
        };
        if remove {
            self.data.remove(key);
        }
    }

    fn prune_log(&mut self, max_version_lag: u64) {
        let oldest = self.oldest_readable(max_version_lag);
        while self.log.front().is_some_and(|record| record.version <= oldest) {
            self.log.pop_front();
        }
    }
}

fn visible_at(history: &[Version], read_version: u64) -> Option<&[u8]> {
    history.iter().rev().find(|v| v.version <= read_version).and_then(|v| v.value.as_deref())
}

/// Little-endian add with zero padding for short or missing operands.
fn apply_add(existing: Option<&[u8]>, delta: i64) -> Vec<u8> {
    let mut word = [0u8; 8];
    if let Some(bytes) = existing {
        let n = bytes.len().min(8);
        word[..n].copy_from_slice(&bytes[..n]);
    }
    i64::from_le_bytes(word).wrapping_add(delta).to_le_bytes().to_vec()
}

fn ordered<'a, I>(iter: I, reverse: bool) -> Box<dyn Iterator<Item = I::Item> + 'a>
where I: DoubleEndedIterator + 'a {
    if reverse { Box::new(iter.rev()) } else { Box::new(iter) }
}

#[derive(Debug, Clone)]
enum WriteOp {
    Set(Vec<u8>),
    Clear,
    Add(i64),
}

#[derive(Debug)]
struct TxState {
    read_version: u64,
    ops: BTreeMap<Vec<u8>, WriteOp>,
    cleared: Vec<KeyRange>,
    read_conflicts: Vec<KeyRange>,
    deferred_error: Option<StoreError>,
    committed: bool,
}

impl TxState {
    fn new(read_version: u64) -> Self {
        Self {
            read_version,
            ops: BTreeMap::new(),
            cleared: Vec::new(),
            read_conflicts: Vec::new(),
            deferred_error: None,
            committed: false,
        }
    }

    fn is_cleared(&self, key: &[u8]) -> bool {
        self.cleared.iter().any(|range| range.contains(key))
    }

    /// Value of `key` as seen by this transaction.
    fn resolve(&self, key: &[u8], base: Option<&[u8]>, op: Option<&WriteOp>) -> Option<Vec<u8>> {
        let base = if self.is_cleared(key) { None } else { base };
        match op {
            Some(WriteOp::Set(value)) => Some(value.clone()),
            Some(WriteOp::Clear) => None,
            Some(WriteOp::Add(delta)) => Some(apply_add(base, *delta)),
            None => base.map(<[u8]>::to_vec),
        }
    }

    fn defer(&mut self, err: StoreError) {
        if self.deferred_error.is_none() {
            self.deferred_error = Some(err);
        }
    }

    /// Validate a buffered write, deferring any error to commit.
    fn admit_write(&mut self, key: &[u8], value: Option<&[u8]>) -> bool {
        if self.committed {
            self.defer(StoreError::AlreadyCommitted);
            return false;
        }
        if key.len() > MAX_KEY_SIZE {
            self.defer(StoreError::KeyTooLarge {
                size: key.len(),
                max: MAX_KEY_SIZE,
            });
            return false;
        }
        let value_len = value.map_or(0, <[u8]>::len);
        if value_len > MAX_VALUE_SIZE {
            self.defer(StoreError::ValueTooLarge {
                size: value_len,
                max: MAX_VALUE_SIZE,
            });
            return false;
        }
        true
    }

    fn has_writes(&self) -> bool {
        !self.ops.is_empty() || !self.cleared.is_empty()
    }
}

#[derive(Debug)]
struct Shared {
    storage: Mutex<Storage>,
    max_version_lag: u64,
    commits: AtomicU64,
    conflicts: AtomicU64,
}

/// Counters describing the store's commit history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Successful commits that wrote at least one key.
    pub commits: u64,
    /// Commits rejected with [`StoreError::Conflict`].
    pub conflicts: u64,
    pub committed_version: u64,
}

/// In-memory MVCC store.
///
/// ```ignore
/// let db = MemoryDatabase::new();
/// let tr = db.begin_transaction()?;
/// tr.set(b"key", b"value");
/// tr.commit().await?;
/// ```
#[derive(Debug)]
pub struct MemoryDatabase {
    shared: Arc<Shared>,
}

impl MemoryDatabase {
    pub fn new() -> Arc<Self> {
        Self::with_max_version_lag(MAX_VERSION_LAG)
    }

    /// Create a store whose transactions expire after `max_version_lag`
    /// newer commits.
    pub fn with_max_version_lag(max_version_lag: u64) -> Arc<Self> {
        Arc::new(Self {
            shared: Arc::new(Shared {
                storage: Mutex::new(Storage::default()),
                max_version_lag: max_version_lag.max(1),
                commits: AtomicU64::new(0),
                conflicts: AtomicU64::new(0),
            }),
        })
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            commits: self.shared.commits.load(Ordering::Relaxed),
            conflicts: self.shared.conflicts.load(Ordering::Relaxed),
            committed_version: self.shared.storage.lock().version,
        }
    }

    /// Latest committed contents in key order.
    pub fn entries(&self) -> Vec<KeyValue> {
        let storage = self.shared.storage.lock();
        storage
            .data
            .iter()
            .filter_map(|(key, history)| {
                history.last().and_then(|v| v.value.clone()).map(|value| KeyValue {
                    key: key.clone(),
                    value,
                })
            })
            .collect()
    }
}

impl Database for MemoryDatabase {
    type Transaction = MemoryTransaction;

    fn begin_transaction(&self) -> Result<MemoryTransaction, StoreError> {
        let read_version = self.shared.storage.lock().version;
        Ok(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            state: Arc::new(Mutex::new(TxState::new(read_version))),
        })
    }
}

/// Transaction handle for [`MemoryDatabase`]. Clones share one transaction.
#[derive(Debug, Clone)]
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    state: Arc<Mutex<TxState>>,
}

impl MemoryTransaction {
    pub fn read_version(&self) -> u64 {
        self.state.lock().read_version
    }

    fn read_point(&self, key: &[u8], snapshot: bool) -> Result<Option<Vec<u8>>, StoreError> {
        let mut state = self.state.lock();
        if state.committed {
            return Err(StoreError::AlreadyCommitted);
        }

        let value = {
            let storage = self.shared.storage.lock();
            storage.check_readable(state.read_version, self.shared.max_version_lag)?;
            let base = storage.data.get(key).and_then(|history| visible_at(history, state.read_version));
            state.resolve(key, base, state.ops.get(key))
        };

        if !snapshot {
            state.read_conflicts.push(KeyRange::point(key));
        }
        Ok(value)
    }

    fn collect_range(storage: &Storage, state: &TxState, begin: &[u8], end: &[u8], options: RangeOptions) -> RangeResult {
        let bounds = (Bound::Included(begin), Bound::Excluded(end));
        let mut base = ordered(storage.data.range::<[u8], _>(bounds), options.reverse).peekable();
        let mut ops = ordered(state.ops.range::<[u8], _>(bounds), options.reverse).peekable();
        let limit = options.limit as usize;
        let mut result = RangeResult::default();

        loop {
            let next_base = base.peek().map(|(key, _)| *key);
            let next_op = ops.peek().map(|(key, _)| *key);
            let key = match (next_base, next_op) {
                (None, None) => break,
                (Some(b), None) => b,
                (None, Some(o)) => o,
                (Some(b), Some(o)) => {
                    if (b < o) != options.reverse {
                        b
                    } else {
                        o
                    }
                }
            };

            let base_value = if next_base == Some(key) {
                base.next().and_then(|(_, history)| visible_at(history, state.read_version))
            } else {
                None
            };
            let op = if next_op == Some(key) {
                ops.next().map(|(_, op)| op)
            } else {
                None
            };

            if let Some(value) = state.resolve(key, base_value, op) {
                if result.entries.len() >= limit {
                    result.more = true;
                    break;
                }
                result.entries.push(KeyValue {
                    key: key.clone(),
                    value,
                });
            }
        }
        result
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.read_point(key, false)
    }

    async fn snapshot_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.read_point(key, true)
    }

    async fn get_range(&self, begin: &[u8], end: &[u8], options: RangeOptions) -> Result<RangeResult, StoreError> {
        if options.limit == 0 || options.limit > MAX_RANGE_LIMIT {
            return Err(StoreError::InvalidRangeLimit {
                limit: options.limit,
                max: MAX_RANGE_LIMIT,
            });
        }

        let mut state = self.state.lock();
        if state.committed {
            return Err(StoreError::AlreadyCommitted);
        }
        if begin >= end {
            return Ok(RangeResult::default());
        }

        let result = {
            let storage = self.shared.storage.lock();
            storage.check_readable(state.read_version, self.shared.max_version_lag)?;
            Self::collect_range(&storage, &state, begin, end, options)
        };

        if !options.snapshot {
            // A truncated read only observed the keys up to the last entry returned.
            let observed = match result.entries.last() {
                Some(last) if result.more && options.reverse => KeyRange::new(&last.key, end),
                Some(last) if result.more => KeyRange {
                    begin: begin.to_vec(),
                    end: key_after(&last.key),
                },
                _ => KeyRange::new(begin, end),
            };
            state.read_conflicts.push(observed);
        }

        trace!(
            entries = result.entries.len(),
            more = result.more,
            reverse = options.reverse,
            snapshot = options.snapshot,
            "range read"
        );
        Ok(result)
    }

    fn set(&self, key: &[u8], value: &[u8]) {
        let mut state = self.state.lock();
        if state.admit_write(key, Some(value)) {
            state.ops.insert(key.to_vec(), WriteOp::Set(value.to_vec()));
        }
    }

    fn clear(&self, key: &[u8]) {
        let mut state = self.state.lock();
        if state.admit_write(key, None) {
            state.ops.insert(key.to_vec(), WriteOp::Clear);
        }
    }

    fn clear_range(&self, begin: &[u8], end: &[u8]) {
        let mut state = self.state.lock();
        if state.committed {
            state.defer(StoreError::AlreadyCommitted);
            return;
        }
        if begin >= end {
            return;
        }
        let range = KeyRange::new(begin, end);
        state.ops.retain(|key, _| !range.contains(key));
        state.cleared.push(range);
    }

    fn atomic_add(&self, key: &[u8], delta: i64) {
        let mut state = self.state.lock();
        if !state.admit_write(key, None) {
            return;
        }
        let op = match state.ops.get(key) {
            Some(WriteOp::Set(value)) => WriteOp::Set(apply_add(Some(value), delta)),
            Some(WriteOp::Clear) => WriteOp::Set(apply_add(None, delta)),
            Some(WriteOp::Add(existing)) => WriteOp::Add(existing.wrapping_add(delta)),
            None if state.is_cleared(key) => WriteOp::Set(apply_add(None, delta)),
            None => WriteOp::Add(delta),
        };
        state.ops.insert(key.to_vec(), op);
    }

    fn add_read_conflict_range(&self, begin: &[u8], end: &[u8]) {
        if begin < end {
            self.state.lock().read_conflicts.push(KeyRange::new(begin, end));
        }
    }

    async fn commit(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if let Some(err) = state.deferred_error.take() {
            return Err(err);
        }
        if state.committed {
            return Err(StoreError::AlreadyCommitted);
        }
        state.committed = true;

        if !state.has_writes() {
            return Ok(());
        }

        let lag = self.shared.max_version_lag;
        let mut storage = self.shared.storage.lock();
        storage.check_readable(state.read_version, lag)?;

        let conflicted = storage.log.iter().filter(|record| record.version > state.read_version).any(|record| {
            record.writes.iter().any(|write| state.read_conflicts.iter().any(|read| read.intersects(write)))
        });
        if conflicted {
            self.shared.conflicts.fetch_add(1, Ordering::Relaxed);
            debug!(read_version = state.read_version, committed_version = storage.version, "commit conflict");
            return Err(StoreError::Conflict);
        }

        let version = storage.version + 1;
        let mut writes = Vec::with_capacity(state.cleared.len() + state.ops.len());
        let mut touched: Vec<Vec<u8>> = Vec::new();

        for range in &state.cleared {
            let live: Vec<Vec<u8>> = storage
                .data
                .range::<[u8], _>((Bound::Included(range.begin.as_slice()), Bound::Excluded(range.end.as_slice())))
                .filter(|(_, history)| history.last().is_some_and(|v| v.value.is_some()))
                .map(|(key, _)| key.clone())
                .collect();
            for key in live {
                storage.push_version(&key, version, None);
                touched.push(key);
            }
            writes.push(range.clone());
        }

        for (key, op) in &state.ops {
            let value = match op {
                WriteOp::Set(value) => Some(value.clone()),
                WriteOp::Clear => None,
                WriteOp::Add(delta) => Some(apply_add(storage.latest(key), *delta)),
            };
            storage.push_version(key, version, value);
            writes.push(KeyRange::point(key));
            touched.push(key.clone());
        }

        storage.version = version;
        storage.log.push_back(CommitRecord { version, writes });
        for key in &touched {
            storage.prune_key(key, lag);
        }
        storage.prune_log(lag);
        self.shared.commits.fetch_add(1, Ordering::Relaxed);

        trace!(version, keys = touched.len(), "committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write(db: &MemoryDatabase, key: &[u8], value: &[u8]) {
        let tr = db.begin_transaction().unwrap();
        tr.set(key, value);
        tr.commit().await.unwrap();
    }

    async fn read(db: &MemoryDatabase, key: &[u8]) -> Option<Vec<u8>> {
        db.begin_transaction().unwrap().get(key).await.unwrap()
    }

    fn keys(result: &RangeResult) -> Vec<Vec<u8>> {
        result.entries.iter().map(|kv| kv.key.clone()).collect()
    }

    // ========================================================================
    // Reads and writes
    // ========================================================================

    #[tokio::test]
    async fn test_set_then_get_after_commit() {
        let db = MemoryDatabase::new();
        write(&db, b"k", b"v").await;
        assert_eq!(read(&db, b"k").await, Some(b"v".to_vec()));
        assert_eq!(read(&db, b"missing").await, None);
    }

    #[tokio::test]
    async fn test_read_your_writes() {
        let db = MemoryDatabase::new();
        write(&db, b"a", b"1").await;

        let tr = db.begin_transaction().unwrap();
        tr.set(b"b", b"2");
        tr.clear(b"a");
        assert_eq!(tr.get(b"a").await.unwrap(), None);
        assert_eq!(tr.get(b"b").await.unwrap(), Some(b"2".to_vec()));

        let range = tr.get_range(b"a", b"z", RangeOptions::default()).await.unwrap();
        assert_eq!(keys(&range), vec![b"b".to_vec()]);
    }

    #[tokio::test]
    async fn test_snapshot_isolation() {
        let db = MemoryDatabase::new();
        write(&db, b"k", b"old").await;

        let reader = db.begin_transaction().unwrap();
        write(&db, b"k", b"new").await;

        assert_eq!(reader.get(b"k").await.unwrap(), Some(b"old".to_vec()));
        assert_eq!(read(&db, b"k").await, Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn test_atomic_add() {
        let db = MemoryDatabase::new();
        let tr = db.begin_transaction().unwrap();
        tr.atomic_add(b"n", 5);
        tr.atomic_add(b"n", -2);
        assert_eq!(tr.get(b"n").await.unwrap(), Some(3i64.to_le_bytes().to_vec()));
        tr.commit().await.unwrap();

        let tr = db.begin_transaction().unwrap();
        tr.atomic_add(b"n", 10);
        tr.commit().await.unwrap();
        assert_eq!(read(&db, b"n").await, Some(13i64.to_le_bytes().to_vec()));
    }

    #[tokio::test]
    async fn test_atomic_add_after_clear_starts_from_zero() {
        let db = MemoryDatabase::new();
        write(&db, b"n", &7i64.to_le_bytes()).await;

        let tr = db.begin_transaction().unwrap();
        tr.clear(b"n");
        tr.atomic_add(b"n", 1);
        tr.commit().await.unwrap();
        assert_eq!(read(&db, b"n").await, Some(1i64.to_le_bytes().to_vec()));
    }

    #[tokio::test]
    async fn test_clear_range() {
        let db = MemoryDatabase::new();
        for key in [b"a", b"b", b"c", b"d"] {
            write(&db, key, b"x").await;
        }

        let tr = db.begin_transaction().unwrap();
        tr.set(b"bb", b"y");
        tr.clear_range(b"b", b"d");
        tr.set(b"c", b"z");
        let range = tr.get_range(b"a", b"z", RangeOptions::default()).await.unwrap();
        assert_eq!(keys(&range), vec![b"a".to_vec(), b"c".to_vec(), b"d".to_vec()]);
        tr.commit().await.unwrap();

        let entries: Vec<Vec<u8>> = db.entries().into_iter().map(|kv| kv.key).collect();
        assert_eq!(entries, vec![b"a".to_vec(), b"c".to_vec(), b"d".to_vec()]);
    }

    #[tokio::test]
    async fn test_range_limit_reverse_and_more() {
        let db = MemoryDatabase::new();
        for key in [b"a", b"b", b"c", b"d", b"e"] {
            write(&db, key, b"x").await;
        }
        let tr = db.begin_transaction().unwrap();

        let page = tr.get_range(b"a", b"z", RangeOptions::default().with_limit(2)).await.unwrap();
        assert_eq!(keys(&page), vec![b"a".to_vec(), b"b".to_vec()]);
        assert!(page.more);

        let page = tr.get_range(b"a", b"z", RangeOptions::default().with_limit(2).reversed(true)).await.unwrap();
        assert_eq!(keys(&page), vec![b"e".to_vec(), b"d".to_vec()]);
        assert!(page.more);

        let page = tr.get_range(b"b", b"d", RangeOptions::default().with_limit(2)).await.unwrap();
        assert_eq!(keys(&page), vec![b"b".to_vec(), b"c".to_vec()]);
        assert!(!page.more);
    }

    #[tokio::test]
    async fn test_invalid_range_limit() {
        let db = MemoryDatabase::new();
        let tr = db.begin_transaction().unwrap();
        let err = tr.get_range(b"a", b"b", RangeOptions::default().with_limit(0)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidRangeLimit { limit: 0, .. }));
        let err = tr.get_range(b"a", b"b", RangeOptions::default().with_limit(MAX_RANGE_LIMIT + 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidRangeLimit { .. }));
    }

    #[tokio::test]
    async fn test_oversized_key_fails_at_commit() {
        let db = MemoryDatabase::new();
        let tr = db.begin_transaction().unwrap();
        tr.set(&vec![0u8; MAX_KEY_SIZE + 1], b"v");
        let err = tr.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::KeyTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_use_after_commit() {
        let db = MemoryDatabase::new();
        let tr = db.begin_transaction().unwrap();
        tr.set(b"k", b"v");
        tr.commit().await.unwrap();
        assert_eq!(tr.get(b"k").await.unwrap_err(), StoreError::AlreadyCommitted);
        assert_eq!(tr.commit().await.unwrap_err(), StoreError::AlreadyCommitted);
    }

    // ========================================================================
    // Conflict detection
    // ========================================================================

    #[tokio::test]
    async fn test_read_write_conflict() {
        let db = MemoryDatabase::new();
        let t1 = db.begin_transaction().unwrap();
        let t2 = db.begin_transaction().unwrap();

        t1.get(b"k").await.unwrap();
        t1.set(b"other", b"1");

        t2.set(b"k", b"v");
        t2.commit().await.unwrap();

        assert_eq!(t1.commit().await, Err(StoreError::Conflict));
        assert_eq!(db.stats().conflicts, 1);
    }

    #[tokio::test]
    async fn test_snapshot_read_does_not_conflict() {
        let db = MemoryDatabase::new();
        let t1 = db.begin_transaction().unwrap();
        let t2 = db.begin_transaction().unwrap();

        t1.snapshot_get(b"k").await.unwrap();
        t1.get_range(b"a", b"z", RangeOptions::default().snapshot()).await.unwrap();
        t1.set(b"other", b"1");

        t2.set(b"k", b"v");
        t2.commit().await.unwrap();

        t1.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_atomic_adds_do_not_conflict() {
        let db = MemoryDatabase::new();
        let t1 = db.begin_transaction().unwrap();
        let t2 = db.begin_transaction().unwrap();
        t1.atomic_add(b"n", 1);
        t2.atomic_add(b"n", 1);
        t1.commit().await.unwrap();
        t2.commit().await.unwrap();
        assert_eq!(read(&db, b"n").await, Some(2i64.to_le_bytes().to_vec()));
    }

    #[tokio::test]
    async fn test_explicit_conflict_range() {
        let db = MemoryDatabase::new();
        let t1 = db.begin_transaction().unwrap();
        let t2 = db.begin_transaction().unwrap();

        t1.add_read_conflict_range(b"m", b"n");
        t1.set(b"x", b"1");

        t2.set(b"m5", b"v");
        t2.commit().await.unwrap();

        assert_eq!(t1.commit().await, Err(StoreError::Conflict));
    }

    #[tokio::test]
    async fn test_truncated_range_only_conflicts_on_observed_keys() {
        let db = MemoryDatabase::new();
        write(&db, b"a", b"x").await;
        write(&db, b"c", b"x").await;

        let t1 = db.begin_transaction().unwrap();
        let page = t1.get_range(b"a", b"z", RangeOptions::default().with_limit(1)).await.unwrap();
        assert!(page.more);
        t1.set(b"y", b"1");

        write(&db, b"m", b"x").await;
        t1.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_only_commit_never_conflicts() {
        let db = MemoryDatabase::new();
        let t1 = db.begin_transaction().unwrap();
        t1.get(b"k").await.unwrap();
        write(&db, b"k", b"v").await;
        t1.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_transaction_too_old() {
        let db = MemoryDatabase::with_max_version_lag(2);
        let stale = db.begin_transaction().unwrap();
        for i in 0..3u8 {
            write(&db, &[i], b"x").await;
        }
        let err = stale.get(b"k").await.unwrap_err();
        assert!(matches!(err, StoreError::TransactionTooOld { read_version: 0, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_history_is_pruned_but_snapshots_inside_window_survive() {
        let db = MemoryDatabase::with_max_version_lag(3);
        write(&db, b"k", b"v1").await;
        let reader = db.begin_transaction().unwrap();
        write(&db, b"k", b"v2").await;
        write(&db, b"k", b"v3").await;
        assert_eq!(reader.get(b"k").await.unwrap(), Some(b"v1".to_vec()));
        assert_eq!(read(&db, b"k").await, Some(b"v3".to_vec()));
    }

    #[tokio::test]
    async fn test_stats() {
        let db = MemoryDatabase::new();
        write(&db, b"a", b"1").await;
        write(&db, b"b", b"2").await;
        let stats = db.stats();
        assert_eq!(stats.commits, 2);
        assert_eq!(stats.committed_version, 2);
        assert_eq!(stats.conflicts, 0);
    }
}
