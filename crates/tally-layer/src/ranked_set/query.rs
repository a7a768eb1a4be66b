//! Rank and order queries.

use tally_kv::RangeOptions;
use tally_kv::Transaction;

use super::RankedSet;
use super::to_rank;
use crate::codec::NodeKey;
use crate::constants::MAX_RANGE_RESULTS;
use crate::error::LayerError;
use crate::level_index::SelectStep;
use crate::level_index::add_count;

impl RankedSet {
    /// Zero-based position of `key`, failing with [`LayerError::NotFound`]
    /// if it is not in the set.
    pub async fn rank<T>(&self, tr: &T, key: &[u8]) -> Result<u64, LayerError>
    where T: Transaction + ?Sized {
        if !self.contains(tr, key).await? {
            return Err(LayerError::NotFound { key: key.to_vec() });
        }
        self.count_less_than(tr, key).await
    }

    /// Number of elements strictly less than `key`, whether or not `key` is present.
    pub async fn count_less_than<T>(&self, tr: &T, key: &[u8]) -> Result<u64, LayerError>
    where T: Transaction + ?Sized {
        let index = self.index();
        let mut offset: i64 = 0;
        let mut from = NodeKey::Head;

        for level in (0..index.levels()).rev() {
            let position = index.count_before(tr, level, &from, Some(key)).await?;
            offset = add_count(level, offset, position.preceding)?;
            match position.containing {
                // `key` is a node here, so everything before it is counted.
                Some(node) if node.is_element(key) => return to_rank(offset),
                Some(node) => from = node,
                None if level == 0 => return to_rank(offset),
                None => {
                    return Err(LayerError::Corrupted {
                        reason: format!("level {level} has no bucket for a key"),
                    });
                }
            }
        }
        to_rank(offset)
    }

    /// Element at zero-based position `index`.
    ///
    /// Fails with [`LayerError::IndexOutOfRange`] unless `0 <= index < size`.
    pub async fn key_at_rank<T>(&self, tr: &T, index: i64) -> Result<Vec<u8>, LayerError>
    where T: Transaction + ?Sized {
        if index < 0 {
            return Err(LayerError::IndexOutOfRange { index });
        }

        let level_index = self.index();
        let mut remaining = index;
        let mut from = NodeKey::Head;
        for level in (0..level_index.levels()).rev() {
            match level_index.select(tr, level, &from, remaining).await? {
                SelectStep::Found(key) => return Ok(key),
                SelectStep::Descend { node, remaining: rest } => {
                    from = node;
                    remaining = rest;
                }
                SelectStep::Exhausted => break,
            }
        }
        Err(LayerError::IndexOutOfRange { index })
    }

    /// Smallest element; [`LayerError::IndexOutOfRange`] when empty.
    pub async fn min<T>(&self, tr: &T) -> Result<Vec<u8>, LayerError>
    where T: Transaction + ?Sized {
        self.edge(tr, false).await?.ok_or(LayerError::IndexOutOfRange { index: 0 })
    }

    /// Largest element; [`LayerError::IndexOutOfRange`] when empty.
    pub async fn max<T>(&self, tr: &T) -> Result<Vec<u8>, LayerError>
    where T: Transaction + ?Sized {
        self.edge(tr, true).await?.ok_or(LayerError::IndexOutOfRange { index: -1 })
    }

    async fn edge<T>(&self, tr: &T, reverse: bool) -> Result<Option<Vec<u8>>, LayerError>
    where T: Transaction + ?Sized {
        let (begin, end) = self.index().level_range(0);
        let options = RangeOptions::default().with_limit(1).reversed(reverse);
        let result = tr.get_range(&begin, &end, options).await?;
        match result.entries.first() {
            Some(entry) => Ok(Some(self.decode_member(&entry.key)?)),
            None => Ok(None),
        }
    }

    /// Up to `limit` elements in `[begin, end)` in ascending order; `None`
    /// for `end` means unbounded.
    pub async fn range<T>(&self, tr: &T, begin: &[u8], end: Option<&[u8]>, limit: u32) -> Result<Vec<Vec<u8>>, LayerError>
    where T: Transaction + ?Sized {
        let limit = limit.min(MAX_RANGE_RESULTS);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let index = self.index();
        let begin = index.element_key(0, begin);
        let end = match end {
            Some(end) => index.element_key(0, end),
            None => index.level_range(0).1,
        };
        let result = tr.get_range(&begin, &end, RangeOptions::default().with_limit(limit)).await?;
        result.entries.iter().map(|entry| self.decode_member(&entry.key)).collect()
    }

    /// Store key of the membership record of `key`.
    pub fn member_key(&self, key: &[u8]) -> Vec<u8> {
        self.index().element_key(0, key)
    }

    /// Store-key bounds of the membership records of elements starting with a
    /// prefix between `low` and `high` inclusive.
    pub fn member_prefix_range(&self, low: &[u8], high: &[u8]) -> (Vec<u8>, Vec<u8>) {
        self.index().element_prefix_range(0, low, high)
    }

    /// Element of a membership record key.
    pub fn decode_member(&self, raw: &[u8]) -> Result<Vec<u8>, LayerError> {
        match self.index().decode_node(0, raw)? {
            NodeKey::Element(key) => Ok(key),
            NodeKey::Head => Err(LayerError::Corrupted {
                reason: "head node on membership level".to_string(),
            }),
        }
    }
}
