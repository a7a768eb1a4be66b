//! Ranked set: an ordered set of byte strings with rank queries.
//!
//! Membership is one record per element; ranks come from the
//! [`LevelIndex`]. Every operation takes the caller's transaction, so any
//! number of set operations (on any number of sets) commit atomically
//! together. Run them under [`tally_kv::transact`] or
//! [`crate::LayerClient::run`] to get conflict retries.
//!
//! ```ignore
//! let set = RankedSet::new(Subspace::named(b"leaderboard"), RankedSetConfig::default())?;
//! client.run(|tr| { let set = &set; async move {
//!     set.insert(&tr, b"alice").await?;
//!     set.rank(&tr, b"alice").await
//! }}).await?;
//! ```

mod query;
mod verify;

use snafu::ResultExt;
use tally_kv::Transaction;
use tracing::debug;
use tracing::instrument;

use crate::codec::NodeKey;
use crate::config::RankedSetConfig;
use crate::constants::MAX_ELEMENT_SIZE;
use crate::error::ConfigSnafu;
use crate::error::LayerError;
use crate::level_index::LevelIndex;
use crate::level_index::add_count;
use crate::level_index::sub_count;
use crate::subspace::Subspace;

#[derive(Debug, Clone)]
pub struct RankedSet {
    index: LevelIndex,
}

impl RankedSet {
    /// Describe a set stored under `subspace`. Does not touch the store; run
    /// [`RankedSet::initialize`] once before the first mutation.
    pub fn new(subspace: Subspace, config: RankedSetConfig) -> Result<Self, LayerError> {
        config.validate().context(ConfigSnafu)?;
        Ok(Self {
            index: LevelIndex::new(subspace, &config),
        })
    }

    pub fn index(&self) -> &LevelIndex {
        &self.index
    }

    pub fn subspace(&self) -> &Subspace {
        self.index.subspace()
    }

    /// Create the level heads if they do not exist yet. Idempotent.
    pub async fn initialize<T>(&self, tr: &T) -> Result<(), LayerError>
    where T: Transaction + ?Sized {
        self.index.initialize(tr).await
    }

    fn check_key(key: &[u8]) -> Result<(), LayerError> {
        if key.len() > MAX_ELEMENT_SIZE {
            return Err(LayerError::InvalidKey {
                reason: format!("{} bytes exceeds the {MAX_ELEMENT_SIZE} byte element limit", key.len()),
            });
        }
        Ok(())
    }

    pub async fn contains<T>(&self, tr: &T, key: &[u8]) -> Result<bool, LayerError>
    where T: Transaction + ?Sized {
        Ok(tr.get(&self.index.element_key(0, key)).await?.is_some())
    }

    /// Add `key`, failing with [`LayerError::AlreadyExists`] if present.
    #[instrument(skip(self, tr, key), fields(key_len = key.len()))]
    pub async fn insert<T>(&self, tr: &T, key: &[u8]) -> Result<(), LayerError>
    where T: Transaction + ?Sized {
        Self::check_key(key)?;
        let member = self.index.element_key(0, key);
        if tr.get(&member).await?.is_some() {
            return Err(LayerError::AlreadyExists { key: key.to_vec() });
        }
        tr.set(&member, b"");

        let height = self.index.assign_level(key);
        let node = NodeKey::element(key);
        for level in 1..self.index.levels() {
            let prev = self.index.previous_node(tr, level, key).await?;
            if level > height {
                self.index.increment(tr, level, &prev, 1);
                continue;
            }

            // Split the bucket holding `key`: the part before `key` stays with
            // `prev`, the rest (plus `key` itself) moves to the new node.
            let prev_count = self.index.node_count(tr, level, &prev).await?.ok_or_else(|| LayerError::Corrupted {
                reason: format!("level {level} node before inserted key has no count"),
            })?;
            let kept = self.index.count_range(tr, level - 1, &prev, key).await?;
            let moved = add_count(level, sub_count(level, prev_count, kept)?, 1)?;
            self.index.set_count(tr, level, &prev, kept);
            self.index.set_count(tr, level, &node, moved);
            debug!(level, kept, moved, "split bucket");
        }
        Ok(())
    }

    /// Remove `key`, failing with [`LayerError::NotFound`] if absent.
    #[instrument(skip(self, tr, key), fields(key_len = key.len()))]
    pub async fn remove<T>(&self, tr: &T, key: &[u8]) -> Result<(), LayerError>
    where T: Transaction + ?Sized {
        let member = self.index.element_key(0, key);
        if tr.get(&member).await?.is_none() {
            return Err(LayerError::NotFound { key: key.to_vec() });
        }
        tr.clear(&member);

        let height = self.index.assign_level(key);
        let node = NodeKey::element(key);
        for level in 1..self.index.levels() {
            let mut delta = -1;
            if level <= height {
                // Merge the key's bucket back into its predecessor.
                let count = self.index.node_count(tr, level, &node).await?.ok_or_else(|| LayerError::Corrupted {
                    reason: format!("level {level} node of removed key is missing"),
                })?;
                self.index.remove_node(tr, level, &node);
                delta = add_count(level, delta, count)?;
                debug!(level, merged = delta, "merged bucket");
            }
            let prev = self.index.previous_node(tr, level, key).await?;
            self.index.increment(tr, level, &prev, delta);
        }
        Ok(())
    }

    /// Number of elements: the sum of the top level's buckets.
    pub async fn size<T>(&self, tr: &T) -> Result<u64, LayerError>
    where T: Transaction + ?Sized {
        let position = self.index.count_before(tr, self.index.top_level(), &NodeKey::Head, None).await?;
        to_rank(position.preceding)
    }

    /// Remove every element and reset the index.
    #[instrument(skip(self, tr))]
    pub async fn clear_all<T>(&self, tr: &T) -> Result<(), LayerError>
    where T: Transaction + ?Sized {
        self.index.clear(tr);
        self.index.initialize(tr).await
    }
}

/// Convert an index count to a rank, treating negative values as corruption.
pub(crate) fn to_rank(count: i64) -> Result<u64, LayerError> {
    u64::try_from(count).map_err(|_| LayerError::Corrupted {
        reason: format!("negative element count {count}"),
    })
}
