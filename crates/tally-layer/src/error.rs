//! Error types for ranked and scored sets.

use snafu::Snafu;
use tally_kv::RetryableError;
use tally_kv::StoreError;

use crate::codec::CodecError;
use crate::config::ConfigError;

/// Errors returned by set operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LayerError {
    /// The element is not in the set.
    #[snafu(display("key not found: {}", key.escape_ascii()))]
    NotFound { key: Vec<u8> },

    /// The element is already in the set.
    #[snafu(display("key already exists: {}", key.escape_ascii()))]
    AlreadyExists { key: Vec<u8> },

    /// Rank lookup outside `[0, size)`.
    #[snafu(display("index {index} out of range"))]
    IndexOutOfRange { index: i64 },

    /// Element rejected before touching the store.
    #[snafu(display("invalid key: {reason}"))]
    InvalidKey { reason: String },

    /// Score arithmetic left the `i64` range.
    #[snafu(display("score overflow for {}: {score} + {delta}", key.escape_ascii()))]
    ScoreOverflow { key: Vec<u8>, score: i64, delta: i64 },

    /// A continuation cursor that does not belong to the requested range.
    #[snafu(display("continuation cursor outside the requested range"))]
    InvalidCursor,

    /// Malformed bytes in the set's key space.
    #[snafu(display("codec error: {source}"))]
    Codec { source: CodecError },

    /// Index records disagree with each other.
    #[snafu(display("level index corrupted: {reason}"))]
    Corrupted { reason: String },

    /// The operation kept conflicting until the retry limit.
    #[snafu(display("operation aborted after {attempts} conflicting attempts"))]
    Aborted { attempts: u32 },

    #[snafu(display("store error: {source}"))]
    Store { source: StoreError },

    #[snafu(display("invalid configuration: {source}"))]
    Config { source: ConfigError },
}

impl From<StoreError> for LayerError {
    fn from(source: StoreError) -> Self {
        match source {
            StoreError::RetriesExhausted { attempts } => LayerError::Aborted { attempts },
            source => LayerError::Store { source },
        }
    }
}

impl From<CodecError> for LayerError {
    fn from(source: CodecError) -> Self {
        LayerError::Codec { source }
    }
}

impl RetryableError for LayerError {
    fn is_retryable(&self) -> bool {
        matches!(self, LayerError::Store { source } if source.is_retryable())
    }
}
