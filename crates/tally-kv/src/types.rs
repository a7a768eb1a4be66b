//! Value types shared by store implementations and the layers built on them.

use crate::constants::DEFAULT_RANGE_LIMIT;

/// A single key-value pair returned by a range read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Options controlling a range read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeOptions {
    /// Maximum number of entries to return (1..=`MAX_RANGE_LIMIT`).
    pub limit: u32,
    /// Return entries in descending key order.
    pub reverse: bool,
    /// Skip read-conflict tracking for this read.
    pub snapshot: bool,
}

impl Default for RangeOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_RANGE_LIMIT,
            reverse: false,
            snapshot: false,
        }
    }
}

impl RangeOptions {
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn reversed(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn snapshot(mut self) -> Self {
        self.snapshot = true;
        self
    }
}

/// Result of a range read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeResult {
    /// Entries in the requested order.
    pub entries: Vec<KeyValue>,
    /// True if the limit stopped the read before the end of the range.
    pub more: bool,
}

/// Smallest key strictly greater than `key`.
pub fn key_after(key: &[u8]) -> Vec<u8> {
    let mut next = Vec::with_capacity(key.len() + 1);
    next.extend_from_slice(key);
    next.push(0x00);
    next
}

/// Smallest key that does not start with `prefix`, or `None` when every key
/// greater than `prefix` starts with it (prefix is empty or all `0xFF`).
pub fn strinc(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut result = prefix.to_vec();
    while let Some(&last) = result.last() {
        if last == 0xFF {
            result.pop();
        } else {
            if let Some(byte) = result.last_mut() {
                *byte = last + 1;
            }
            return Some(result);
        }
    }
    None
}
