//! Key-space namespaces.

use tally_kv::strinc;

use crate::codec::CodecError;
use crate::codec::encode_key_into;

/// A byte prefix owning every key that starts with it.
///
/// Nested subspaces append an escaped, terminated name, so sibling subspaces
/// never share keys even when one name is a prefix of another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subspace {
    prefix: Vec<u8>,
}

impl Subspace {
    pub fn new(prefix: impl Into<Vec<u8>>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// Subspace named by a single escaped component.
    pub fn named(name: &[u8]) -> Self {
        Self::new(Vec::new()).child(name)
    }

    pub fn child(&self, name: &[u8]) -> Self {
        let mut prefix = self.prefix.clone();
        encode_key_into(name, &mut prefix);
        Self { prefix }
    }

    pub fn raw_prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Prefix followed by `suffix`.
    pub fn pack(&self, suffix: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.prefix.len() + suffix.len());
        key.extend_from_slice(&self.prefix);
        key.extend_from_slice(suffix);
        key
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        key.starts_with(&self.prefix)
    }

    /// The part of `key` after the prefix.
    pub fn strip<'a>(&self, key: &'a [u8]) -> Result<&'a [u8], CodecError> {
        key.strip_prefix(self.prefix.as_slice()).ok_or(CodecError::PrefixMismatch)
    }

    /// `[begin, end)` covering every key in the subspace.
    ///
    /// An empty or all-`0xFF` prefix ends at `[0xFF]`, leaving the `0xFF`
    /// keyspace to the store.
    pub fn range(&self) -> (Vec<u8>, Vec<u8>) {
        let end = strinc(&self.prefix).unwrap_or_else(|| vec![0xFF]);
        (self.prefix.clone(), end)
    }
}
