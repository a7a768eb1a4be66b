//! Rank-indexed sets over an ordered transactional key-value store.
//!
//! This crate bundles the workspace crates under one name:
//!
//! - [`kv`]: the transaction interface, the in-memory MVCC store and the
//!   conflict retry loop
//! - [`layer`]: ranked and scored sets, their key codec and configuration
//!
//! Most programs only need the [`prelude`].

pub use tally_kv as kv;
pub use tally_layer as layer;

/// Common imports for working with sets.
pub mod prelude {
    pub use tally_kv::Database;
    pub use tally_kv::MemoryDatabase;
    pub use tally_kv::RetryPolicy;
    pub use tally_kv::Transaction;
    pub use tally_layer::LayerClient;
    pub use tally_layer::LayerConfig;
    pub use tally_layer::LayerError;
    pub use tally_layer::RankedSet;
    pub use tally_layer::RankedSetConfig;
    pub use tally_layer::ScoreCursor;
    pub use tally_layer::ScoreRange;
    pub use tally_layer::ScoredEntry;
    pub use tally_layer::ScoredSet;
    pub use tally_layer::Subspace;
}
