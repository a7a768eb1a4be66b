//! Scored set: elements ordered by an `i64` score, ties broken by key.
//!
//! Built from a [`RankedSet`] whose elements are `encode_scored(key, score)`
//! plus a key-to-score record per element:
//!
//! ```text
//! subspace/"rank"/...          ranked set over score ++ key
//! subspace/"score"/escape(key) -> score
//! ```
//!
//! Changing an element's score removes the old scored element and inserts the
//! new one inside the caller's transaction, so readers never observe an
//! element twice or not at all.

use tally_kv::constants::DEFAULT_RANGE_LIMIT;
use tally_kv::RangeOptions;
use tally_kv::Transaction;
use tally_kv::key_after;
use tracing::instrument;

use crate::codec::decode_score;
use crate::codec::decode_scored;
use crate::codec::encode_key;
use crate::codec::encode_score;
use crate::codec::encode_scored;
use crate::config::RankedSetConfig;
use crate::constants::MAX_BULK_REMOVE;
use crate::constants::MAX_RANGE_RESULTS;
use crate::error::LayerError;
use crate::ranked_set::RankedSet;
use crate::subspace::Subspace;

/// An element with its score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredEntry {
    pub key: Vec<u8>,
    pub score: i64,
}

impl ScoredEntry {
    pub fn new(key: impl Into<Vec<u8>>, score: i64) -> Self {
        Self { key: key.into(), score }
    }
}

/// Inclusive score bounds for a paged scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreRange {
    pub low: i64,
    pub high: i64,
    /// Highest score first.
    pub reverse: bool,
    /// Page size, clamped to `1..=MAX_RANGE_RESULTS`.
    pub limit: u32,
}

impl ScoreRange {
    pub fn new(low: i64, high: i64) -> Self {
        Self {
            low,
            high,
            reverse: false,
            limit: DEFAULT_RANGE_LIMIT,
        }
    }

    /// Every score.
    pub fn all() -> Self {
        Self::new(i64::MIN, i64::MAX)
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn reversed(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }
}

/// Position after the last entry of a page.
///
/// Holds the store key of that entry, so it stays valid across transactions
/// and concurrent modification: a resumed scan continues strictly after it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScoreCursor(Vec<u8>);

impl ScoreCursor {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// One page of a score scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScorePage {
    pub entries: Vec<ScoredEntry>,
    /// Present when more entries remain in the range.
    pub next: Option<ScoreCursor>,
}

#[derive(Debug, Clone)]
pub struct ScoredSet {
    ranked: RankedSet,
    scores: Subspace,
}

impl ScoredSet {
    /// Describe a scored set under `subspace`; run [`ScoredSet::initialize`]
    /// once before the first mutation.
    pub fn new(subspace: Subspace, config: RankedSetConfig) -> Result<Self, LayerError> {
        Ok(Self {
            ranked: RankedSet::new(subspace.child(b"rank"), config)?,
            scores: subspace.child(b"score"),
        })
    }

    /// The underlying ranked set over `score ++ key` elements.
    pub fn ranked(&self) -> &RankedSet {
        &self.ranked
    }

    pub async fn initialize<T>(&self, tr: &T) -> Result<(), LayerError>
    where T: Transaction + ?Sized {
        self.ranked.initialize(tr).await
    }

    fn score_key(&self, key: &[u8]) -> Vec<u8> {
        self.scores.pack(&encode_key(key))
    }

    fn decode_entry(&self, member: &[u8]) -> Result<ScoredEntry, LayerError> {
        let element = self.ranked.decode_member(member)?;
        let (key, score) = decode_scored(&element)?;
        Ok(ScoredEntry { key, score })
    }

    fn decode_element(element: &[u8]) -> Result<ScoredEntry, LayerError> {
        let (key, score) = decode_scored(element)?;
        Ok(ScoredEntry { key, score })
    }

    // =========================================================================
    // Point operations
    // =========================================================================

    pub async fn score<T>(&self, tr: &T, key: &[u8]) -> Result<Option<i64>, LayerError>
    where T: Transaction + ?Sized {
        match tr.get(&self.score_key(key)).await? {
            Some(bytes) => Ok(Some(decode_score(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn require_score<T>(&self, tr: &T, key: &[u8]) -> Result<i64, LayerError>
    where T: Transaction + ?Sized {
        self.score(tr, key).await?.ok_or_else(|| LayerError::NotFound { key: key.to_vec() })
    }

    pub async fn contains<T>(&self, tr: &T, key: &[u8]) -> Result<bool, LayerError>
    where T: Transaction + ?Sized {
        Ok(self.score(tr, key).await?.is_some())
    }

    pub async fn size<T>(&self, tr: &T) -> Result<u64, LayerError>
    where T: Transaction + ?Sized {
        self.ranked.size(tr).await
    }

    /// Set the score of `key`, adding it if absent. Returns the previous score.
    #[instrument(skip(self, tr, key), fields(key_len = key.len()))]
    pub async fn insert<T>(&self, tr: &T, key: &[u8], score: i64) -> Result<Option<i64>, LayerError>
    where T: Transaction + ?Sized {
        let previous = self.score(tr, key).await?;
        if previous == Some(score) {
            return Ok(previous);
        }
        if let Some(old) = previous {
            self.ranked.remove(tr, &encode_scored(key, old)).await?;
        }
        self.ranked.insert(tr, &encode_scored(key, score)).await?;
        tr.set(&self.score_key(key), &encode_score(score));
        Ok(previous)
    }

    /// Add `delta` to the score of an existing element and return the new score.
    pub async fn increment<T>(&self, tr: &T, key: &[u8], delta: i64) -> Result<i64, LayerError>
    where T: Transaction + ?Sized {
        let score = self.require_score(tr, key).await?;
        let updated = score.checked_add(delta).ok_or_else(|| LayerError::ScoreOverflow {
            key: key.to_vec(),
            score,
            delta,
        })?;
        self.insert(tr, key, updated).await?;
        Ok(updated)
    }

    /// Remove `key` and return its score.
    #[instrument(skip(self, tr, key), fields(key_len = key.len()))]
    pub async fn remove<T>(&self, tr: &T, key: &[u8]) -> Result<i64, LayerError>
    where T: Transaction + ?Sized {
        let score = self.require_score(tr, key).await?;
        self.remove_entry(tr, key, score).await?;
        Ok(score)
    }

    async fn remove_entry<T>(&self, tr: &T, key: &[u8], score: i64) -> Result<(), LayerError>
    where T: Transaction + ?Sized {
        self.ranked.remove(tr, &encode_scored(key, score)).await?;
        tr.clear(&self.score_key(key));
        Ok(())
    }

    // =========================================================================
    // Rank queries
    // =========================================================================

    /// Position of `key` ordered by (score, key).
    pub async fn rank<T>(&self, tr: &T, key: &[u8]) -> Result<u64, LayerError>
    where T: Transaction + ?Sized {
        let score = self.require_score(tr, key).await?;
        self.ranked.rank(tr, &encode_scored(key, score)).await
    }

    /// Number of elements with a score strictly below `score`.
    pub async fn rank_by_score<T>(&self, tr: &T, score: i64) -> Result<u64, LayerError>
    where T: Transaction + ?Sized {
        self.ranked.count_less_than(tr, &encode_score(score)).await
    }

    pub async fn item_at_rank<T>(&self, tr: &T, index: i64) -> Result<ScoredEntry, LayerError>
    where T: Transaction + ?Sized {
        let element = self.ranked.key_at_rank(tr, index).await?;
        Self::decode_element(&element)
    }

    /// Elements with rank in `[start, stop)`, at most `MAX_RANGE_RESULTS`.
    pub async fn range_by_rank<T>(&self, tr: &T, start: u64, stop: u64) -> Result<Vec<ScoredEntry>, LayerError>
    where T: Transaction + ?Sized {
        if start >= stop {
            return Ok(Vec::new());
        }
        let first = match self.ranked.key_at_rank(tr, i64::try_from(start).unwrap_or(i64::MAX)).await {
            Ok(element) => element,
            Err(LayerError::IndexOutOfRange { .. }) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let limit = u32::try_from(stop - start).unwrap_or(u32::MAX).min(MAX_RANGE_RESULTS);
        let elements = self.ranked.range(tr, &first, None, limit).await?;
        elements.iter().map(|element| Self::decode_element(element)).collect()
    }

    /// Number of elements with `low <= score <= high`, computed from ranks.
    pub async fn count_by_score<T>(&self, tr: &T, low: i64, high: i64) -> Result<u64, LayerError>
    where T: Transaction + ?Sized {
        if low > high {
            return Ok(0);
        }
        let below_low = self.rank_by_score(tr, low).await?;
        let through_high = match high.checked_add(1) {
            Some(next) => self.rank_by_score(tr, next).await?,
            None => self.size(tr).await?,
        };
        Ok(through_high.saturating_sub(below_low))
    }

    // =========================================================================
    // Score ranges
    // =========================================================================

    /// One page of elements with `range.low <= score <= range.high`, resuming
    /// after `cursor` when given.
    pub async fn scan_by_score<T>(
        &self,
        tr: &T,
        range: &ScoreRange,
        cursor: Option<&ScoreCursor>,
    ) -> Result<ScorePage, LayerError>
    where
        T: Transaction + ?Sized,
    {
        if range.low > range.high {
            return Ok(ScorePage::default());
        }
        let limit = range.limit.clamp(1, MAX_RANGE_RESULTS);
        let (mut begin, mut end) = self.ranked.member_prefix_range(&encode_score(range.low), &encode_score(range.high));

        if let Some(cursor) = cursor {
            let position = cursor.as_bytes();
            if position < begin.as_slice() || position >= end.as_slice() {
                return Err(LayerError::InvalidCursor);
            }
            if range.reverse {
                end = position.to_vec();
            } else {
                begin = key_after(position);
            }
        }

        let options = RangeOptions::default().with_limit(limit).reversed(range.reverse);
        let result = tr.get_range(&begin, &end, options).await?;
        let entries = result
            .entries
            .iter()
            .map(|entry| self.decode_entry(&entry.key))
            .collect::<Result<Vec<_>, _>>()?;
        let next = match result.entries.last() {
            Some(last) if result.more => Some(ScoreCursor(last.key.clone())),
            _ => None,
        };
        Ok(ScorePage { entries, next })
    }

    /// Every element with `low <= score <= high` in ascending (score, key)
    /// order, read page by page within `tr`. Use [`ScoredSet::scan_by_score`]
    /// to spread a large range over several transactions.
    pub async fn range_by_score<T>(&self, tr: &T, low: i64, high: i64) -> Result<Vec<ScoredEntry>, LayerError>
    where T: Transaction + ?Sized {
        let range = ScoreRange::new(low, high).with_limit(MAX_RANGE_RESULTS);
        let mut entries = Vec::new();
        let mut cursor: Option<ScoreCursor> = None;
        loop {
            let page = self.scan_by_score(tr, &range, cursor.as_ref()).await?;
            entries.extend(page.entries);
            match page.next {
                Some(next) => cursor = Some(next),
                None => return Ok(entries),
            }
        }
    }

    /// Remove up to `limit` elements with `low <= score <= high`, lowest
    /// first, and return them. Call again until it returns an empty list to
    /// clear a large range.
    pub async fn remove_range_by_score<T>(
        &self,
        tr: &T,
        low: i64,
        high: i64,
        limit: u32,
    ) -> Result<Vec<ScoredEntry>, LayerError>
    where
        T: Transaction + ?Sized,
    {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let range = ScoreRange::new(low, high).with_limit(limit.min(MAX_BULK_REMOVE));
        let page = self.scan_by_score(tr, &range, None).await?;
        for entry in &page.entries {
            self.remove_entry(tr, &entry.key, entry.score).await?;
        }
        Ok(page.entries)
    }

    /// Remove elements with rank in `[start, stop)`, at most `MAX_BULK_REMOVE`.
    pub async fn remove_range_by_rank<T>(&self, tr: &T, start: u64, stop: u64) -> Result<Vec<ScoredEntry>, LayerError>
    where T: Transaction + ?Sized {
        let stop = stop.min(start.saturating_add(u64::from(MAX_BULK_REMOVE)));
        let entries = self.range_by_rank(tr, start, stop).await?;
        for entry in &entries {
            self.remove_entry(tr, &entry.key, entry.score).await?;
        }
        Ok(entries)
    }

    // =========================================================================
    // Neighbors
    // =========================================================================

    /// Next element after `key` in (score, key) order.
    pub async fn successor<T>(&self, tr: &T, key: &[u8]) -> Result<Option<ScoredEntry>, LayerError>
    where T: Transaction + ?Sized {
        let score = self.require_score(tr, key).await?;
        let after = key_after(&encode_scored(key, score));
        let next = self.ranked.range(tr, &after, None, 1).await?;
        next.first().map(|element| Self::decode_element(element)).transpose()
    }

    /// Previous element before `key` in (score, key) order.
    pub async fn predecessor<T>(&self, tr: &T, key: &[u8]) -> Result<Option<ScoredEntry>, LayerError>
    where T: Transaction + ?Sized {
        let score = self.require_score(tr, key).await?;
        let (level_begin, _) = self.ranked.index().level_range(0);
        let member = self.ranked.member_key(&encode_scored(key, score));
        let options = RangeOptions::default().with_limit(1).reversed(true);
        let result = tr.get_range(&level_begin, &member, options).await?;
        result.entries.first().map(|entry| self.decode_entry(&entry.key)).transpose()
    }

    /// Lowest-scored element, or `None` when empty.
    pub async fn min<T>(&self, tr: &T) -> Result<Option<ScoredEntry>, LayerError>
    where T: Transaction + ?Sized {
        match self.ranked.min(tr).await {
            Ok(element) => Self::decode_element(&element).map(Some),
            Err(LayerError::IndexOutOfRange { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Highest-scored element, or `None` when empty.
    pub async fn max<T>(&self, tr: &T) -> Result<Option<ScoredEntry>, LayerError>
    where T: Transaction + ?Sized {
        match self.ranked.max(tr).await {
            Ok(element) => Self::decode_element(&element).map(Some),
            Err(LayerError::IndexOutOfRange { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Remove every element.
    pub async fn clear_all<T>(&self, tr: &T) -> Result<(), LayerError>
    where T: Transaction + ?Sized {
        let (begin, end) = self.scores.range();
        tr.clear_range(&begin, &end);
        self.ranked.clear_all(tr).await
    }
}
