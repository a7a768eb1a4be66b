//! Rank-indexed set layers over an ordered transactional key-value store.
//!
//! Two structures are provided, both stored entirely in the key space of a
//! [`tally_kv::Database`] and manipulated through the caller's transaction:
//!
//! - **[`RankedSet`]**: an ordered set of byte strings answering "what is the
//!   rank of x" and "which element has rank i" in a logarithmic number of
//!   reads, via a probabilistic [`LevelIndex`] of bucket counts
//! - **[`ScoredSet`]**: elements ordered by an `i64` score (ties by key),
//!   with score ranges, rank ranges and paged scans
//!
//! # Architecture
//!
//! ```text
//!      ScoredSet        score ++ key elements, key -> score records
//!          ↓
//!      RankedSet        membership, rank, select
//!          ↓
//!      LevelIndex       per-level bucket counts
//!          ↓
//!  Subspace + codec     order-preserving key layout
//!          ↓
//!  tally_kv::Transaction
//! ```
//!
//! Operations never retry on their own. Wrap them in [`LayerClient::run`]
//! (or [`tally_kv::transact`]) to retry conflicts with exponential backoff;
//! after the retry limit the call fails with [`LayerError::Aborted`].
//!
//! # Example
//!
//! ```ignore
//! let client = LayerClient::new(MemoryDatabase::new());
//! let board = client.open_scored_set(Subspace::named(b"board")).await?;
//! let board = &board;
//! client.run(move |tr| async move { board.insert(&tr, b"alice", 42).await }).await?;
//! let top = client.run(move |tr| async move { board.max(&tr).await }).await?;
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod level_index;
pub mod ranked_set;
pub mod scored_set;
pub mod subspace;

pub use client::LayerClient;
pub use codec::CodecError;
pub use codec::NodeKey;
pub use config::ConfigError;
pub use config::LayerConfig;
pub use config::RankedSetConfig;
pub use error::LayerError;
pub use level_index::LevelIndex;
pub use ranked_set::RankedSet;
pub use scored_set::ScoreCursor;
pub use scored_set::ScorePage;
pub use scored_set::ScoreRange;
pub use scored_set::ScoredEntry;
pub use scored_set::ScoredSet;
pub use subspace::Subspace;

#[cfg(test)]
mod proptest;
