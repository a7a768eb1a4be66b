//! Multi-level count index.
//!
//! Level 0 holds one membership record per element. Each level `l >= 1` holds
//! a head sentinel plus one node per element promoted to `l`; a node's value
//! is the number of elements in its bucket, the half-open interval from the
//! node to the next node on the same level. Promotion is decided by hashing
//! the element, so nodes at level `l` are always a subset of nodes at
//! `l - 1` and every writer agrees on the structure without coordination.
//!
//! ```text
//! level 2:  H(4) ----------------------- e(2) -------
//! level 1:  H(1) -- b(3) -------------- e(2) -------
//! level 0:  a       b       c       d   e       f
//! ```
//!
//! Mutations touch one record per level. Above an element's level that is a
//! commutative atomic add, so concurrent inserts into the same bucket do not
//! conflict; only splits and merges at the element's own levels read and
//! rewrite a bucket boundary.

use tally_kv::RangeOptions;
use tally_kv::RangeScanner;
use tally_kv::Transaction;
use tally_kv::key_after;
use tally_kv::strinc;
use tracing::trace;

use crate::codec::NodeKey;
use crate::codec::decode_count;
use crate::codec::encode_count;
use crate::codec::encode_element_node_into;
use crate::codec::encode_key_prefix_into;
use crate::codec::ELEMENT_MARKER;
use crate::config::RankedSetConfig;
use crate::error::LayerError;
use crate::subspace::Subspace;

/// Where a key falls on one level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketPosition {
    /// Elements in buckets that end at or before the key.
    pub preceding: i64,
    /// The bucket holding the key, if the scan saw one.
    pub containing: Option<NodeKey>,
}

/// One step of a descent looking for the element at a given rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectStep {
    /// The element was found.
    Found(Vec<u8>),
    /// Continue one level down, starting at `node` with `remaining` elements to skip.
    Descend { node: NodeKey, remaining: i64 },
    /// The level ran out before `remaining` reached zero.
    Exhausted,
}

/// Count index for one ranked set.
#[derive(Debug, Clone)]
pub struct LevelIndex {
    subspace: Subspace,
    levels: u8,
    level_fan_pow: u8,
    scan_batch_size: u32,
}

impl LevelIndex {
    /// Create an index over `subspace`. The config must already be validated.
    pub fn new(subspace: Subspace, config: &RankedSetConfig) -> Self {
        Self {
            subspace,
            levels: config.levels,
            level_fan_pow: config.level_fan_pow,
            scan_batch_size: config.scan_batch_size,
        }
    }

    pub fn levels(&self) -> u8 {
        self.levels
    }

    pub fn top_level(&self) -> u8 {
        self.levels - 1
    }

    pub fn subspace(&self) -> &Subspace {
        &self.subspace
    }

    /// Highest level `key` is a node on.
    ///
    /// An element reaches level `l` when the low `l * level_fan_pow` bits of
    /// its hash are zero, capped at the top level.
    pub fn assign_level(&self, key: &[u8]) -> u8 {
        let digest = blake3::hash(key);
        let mut word = [0u8; 8];
        word.copy_from_slice(&digest.as_bytes()[..8]);
        let height = u64::from_le_bytes(word).trailing_zeros() / u32::from(self.level_fan_pow);
        height.min(u32::from(self.top_level())) as u8
    }

    // =========================================================================
    // Key layout
    // =========================================================================

    fn level_prefix(&self, level: u8) -> Vec<u8> {
        let mut key = self.subspace.raw_prefix().to_vec();
        key.push(level);
        key
    }

    /// Store key of `node` on `level`.
    pub fn node_key(&self, level: u8, node: &NodeKey) -> Vec<u8> {
        let mut key = self.level_prefix(level);
        node.encode_into(&mut key);
        key
    }

    /// Store key of element `key` on `level`.
    pub fn element_key(&self, level: u8, key: &[u8]) -> Vec<u8> {
        let mut out = self.level_prefix(level);
        encode_element_node_into(key, &mut out);
        out
    }

    /// `[begin, end)` covering every record of `level`.
    pub fn level_range(&self, level: u8) -> (Vec<u8>, Vec<u8>) {
        (self.level_prefix(level), self.level_prefix(level + 1))
    }

    /// Store-key bounds of the elements on `level` whose bytes start with a
    /// prefix between `low` and `high` inclusive.
    pub fn element_prefix_range(&self, level: u8, low: &[u8], high: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let mut begin = self.level_prefix(level);
        begin.push(ELEMENT_MARKER);
        encode_key_prefix_into(low, &mut begin);

        let mut high_prefix = self.level_prefix(level);
        high_prefix.push(ELEMENT_MARKER);
        encode_key_prefix_into(high, &mut high_prefix);
        let end = strinc(&high_prefix).unwrap_or_else(|| self.level_prefix(level + 1));
        (begin, end)
    }

    /// Decode a store key read from `level`.
    pub fn decode_node(&self, level: u8, raw: &[u8]) -> Result<NodeKey, LayerError> {
        let rest = self.subspace.strip(raw)?;
        match rest.split_first() {
            Some((&found, node)) if found == level => Ok(NodeKey::decode(node)?),
            _ => Err(LayerError::Corrupted {
                reason: format!("record {} is not on level {level}", raw.escape_ascii()),
            }),
        }
    }

    fn decode_entry(&self, level: u8, key: &[u8], value: &[u8]) -> Result<(NodeKey, i64), LayerError> {
        let node = self.decode_node(level, key)?;
        let count = if level == 0 { 1 } else { decode_count(value)? };
        Ok((node, count))
    }

    fn scanner(&self, begin: Vec<u8>, end: Vec<u8>) -> RangeScanner {
        RangeScanner::new(begin, end, RangeOptions::default().with_limit(self.scan_batch_size))
    }

    // =========================================================================
    // Setup
    // =========================================================================

    /// Create the head sentinel of every counted level that lacks one.
    pub async fn initialize<T>(&self, tr: &T) -> Result<(), LayerError>
    where T: Transaction + ?Sized {
        for level in 1..self.levels {
            let head = self.node_key(level, &NodeKey::Head);
            if tr.get(&head).await?.is_none() {
                tr.set(&head, &encode_count(0));
            }
        }
        Ok(())
    }

    /// Remove every record of the index, membership included.
    pub fn clear<T>(&self, tr: &T)
    where T: Transaction + ?Sized {
        let (begin, end) = self.subspace.range();
        tr.clear_range(&begin, &end);
    }

    // =========================================================================
    // Single records
    // =========================================================================

    /// Last node on `level` strictly before element `key`.
    ///
    /// The lookup itself is a snapshot read. Conflicts are registered on the
    /// gap between the found node and `key`, which catches a concurrent node
    /// landing in between, and on the found node's membership record, which
    /// catches a concurrent removal of it. The node's count is deliberately
    /// left out so concurrent increments of it stay conflict-free.
    pub async fn previous_node<T>(&self, tr: &T, level: u8, key: &[u8]) -> Result<NodeKey, LayerError>
    where T: Transaction + ?Sized {
        let (level_begin, _) = self.level_range(level);
        let target = self.element_key(level, key);
        let options = RangeOptions::default().with_limit(1).reversed(true).snapshot();
        let result = tr.get_range(&level_begin, &target, options).await?;

        let Some(found) = result.entries.first() else {
            return Err(LayerError::Corrupted {
                reason: format!("level {level} has no head node"),
            });
        };
        let node = self.decode_node(level, &found.key)?;

        tr.add_read_conflict_range(&key_after(&found.key), &target);
        if let NodeKey::Element(element) = &node {
            tr.add_read_conflict_key(&self.element_key(0, element));
        }
        Ok(node)
    }

    /// Count stored at `node`, or `None` when the node does not exist.
    pub async fn node_count<T>(&self, tr: &T, level: u8, node: &NodeKey) -> Result<Option<i64>, LayerError>
    where T: Transaction + ?Sized {
        match tr.get(&self.node_key(level, node)).await? {
            Some(value) => Ok(Some(decode_count(&value)?)),
            None => Ok(None),
        }
    }

    /// Add `delta` to the bucket starting at `node` without reading it.
    pub fn increment<T>(&self, tr: &T, level: u8, node: &NodeKey, delta: i64)
    where T: Transaction + ?Sized {
        tr.atomic_add(&self.node_key(level, node), delta);
    }

    pub fn set_count<T>(&self, tr: &T, level: u8, node: &NodeKey, count: i64)
    where T: Transaction + ?Sized {
        tr.set(&self.node_key(level, node), &encode_count(count));
    }

    pub fn remove_node<T>(&self, tr: &T, level: u8, node: &NodeKey)
    where T: Transaction + ?Sized {
        tr.clear(&self.node_key(level, node));
    }

    // =========================================================================
    // Scans
    // =========================================================================

    /// Sum of bucket counts on `level` for nodes in `[from, to)`.
    ///
    /// On level 0 this is the number of elements in the interval.
    pub async fn count_range<T>(&self, tr: &T, level: u8, from: &NodeKey, to: &[u8]) -> Result<i64, LayerError>
    where T: Transaction + ?Sized {
        let mut scanner = self.scanner(self.node_key(level, from), self.element_key(level, to));
        let mut total: i64 = 0;
        while let Some(page) = scanner.next_page(tr).await? {
            if level == 0 {
                total = add_count(level, total, page.len() as i64)?;
                continue;
            }
            for entry in &page {
                total = add_count(level, total, decode_count(&entry.value)?)?;
            }
        }
        trace!(level, total, "counted range");
        Ok(total)
    }

    /// Elements on `level`, starting at `from`, in buckets that end at or
    /// before `key` (`None` meaning past the last element).
    ///
    /// On levels above 0 the bucket holding `key` is reported as `containing`
    /// and excluded from the sum so the caller can descend into it. On level 0
    /// buckets are single elements: everything before `key` is counted and
    /// `containing` is `key` itself when present.
    pub async fn count_before<T>(
        &self,
        tr: &T,
        level: u8,
        from: &NodeKey,
        key: Option<&[u8]>,
    ) -> Result<BucketPosition, LayerError>
    where
        T: Transaction + ?Sized,
    {
        let begin = self.node_key(level, from);
        let end = match key {
            Some(key) => key_after(&self.element_key(level, key)),
            None => self.level_range(level).1,
        };

        let mut scanner = self.scanner(begin, end);
        let mut sum: i64 = 0;
        let mut last: Option<(NodeKey, i64)> = None;
        while let Some(page) = scanner.next_page(tr).await? {
            for entry in &page {
                let (node, count) = self.decode_entry(level, &entry.key, &entry.value)?;
                sum = add_count(level, sum, count)?;
                last = Some((node, count));
            }
        }

        let position = match (key, last) {
            (None, _) => BucketPosition {
                preceding: sum,
                containing: None,
            },
            (Some(key), Some((node, count))) if level > 0 || node.is_element(key) => BucketPosition {
                preceding: sub_count(level, sum, count)?,
                containing: Some(node),
            },
            (Some(_), _) => BucketPosition {
                preceding: sum,
                containing: None,
            },
        };
        Ok(position)
    }

    /// Walk `level` from `from`, skipping `remaining` elements.
    pub async fn select<T>(&self, tr: &T, level: u8, from: &NodeKey, remaining: i64) -> Result<SelectStep, LayerError>
    where T: Transaction + ?Sized {
        let begin = match from {
            // Level 0 has no head; its range starts at the first element.
            NodeKey::Head if level == 0 => self.level_range(0).0,
            node => self.node_key(level, node),
        };
        let mut scanner = self.scanner(begin, self.level_range(level).1);
        let mut remaining = remaining;

        while let Some(page) = scanner.next_page(tr).await? {
            for entry in &page {
                let (node, count) = self.decode_entry(level, &entry.key, &entry.value)?;
                if remaining == 0 {
                    if let NodeKey::Element(element) = &node {
                        return Ok(SelectStep::Found(element.clone()));
                    }
                }
                if count > remaining {
                    return Ok(SelectStep::Descend { node, remaining });
                }
                remaining = sub_count(level, remaining, count)?;
            }
        }
        Ok(SelectStep::Exhausted)
    }
}

/// Add stored counts, treating overflow as corruption.
pub(crate) fn add_count(level: u8, total: i64, count: i64) -> Result<i64, LayerError> {
    total.checked_add(count).ok_or_else(|| LayerError::Corrupted {
        reason: format!("bucket counts on level {level} overflow"),
    })
}

pub(crate) fn sub_count(level: u8, total: i64, count: i64) -> Result<i64, LayerError> {
    total.checked_sub(count).ok_or_else(|| LayerError::Corrupted {
        reason: format!("bucket counts on level {level} overflow"),
    })
}
