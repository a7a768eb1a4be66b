//! Bounds for ranked and scored sets.
//!
//! Tiger Style: Constants are fixed and immutable, enforced at compile time.
//! Each constant has explicit bounds to prevent unbounded resource allocation.

use tally_kv::constants::MAX_KEY_SIZE;
use tally_kv::constants::MAX_RANGE_LIMIT;

// ============================================================================
// Level Geometry
// ============================================================================

/// Default number of levels, counting the membership level 0.
pub const DEFAULT_LEVELS: u8 = 6;

/// Fewest levels a set may have (membership plus one counted level).
pub const MIN_LEVELS: u8 = 2;

/// Most levels a set may have.
///
/// Tiger Style: Every insert and remove touches one record per level.
pub const MAX_LEVELS: u8 = 16;

/// Default promotion exponent: an element reaches level `l` with probability
/// `2^-(l * DEFAULT_LEVEL_FAN_POW)`.
pub const DEFAULT_LEVEL_FAN_POW: u8 = 4;

/// Largest promotion exponent accepted.
pub const MAX_LEVEL_FAN_POW: u8 = 8;

/// Hash bits available to level assignment.
pub const LEVEL_HASH_BITS: u32 = 64;

// ============================================================================
// Scans
// ============================================================================

/// Default page size when walking one level of the index.
pub const DEFAULT_SCAN_BATCH_SIZE: u32 = 256;

/// Largest page size accepted for index scans.
pub const MAX_SCAN_BATCH_SIZE: u32 = MAX_RANGE_LIMIT;

/// Most elements returned by a single range operation on a set.
pub const MAX_RANGE_RESULTS: u32 = MAX_RANGE_LIMIT;

/// Most elements removed by a single bulk remove.
///
/// Tiger Style: Bulk removals touch every level per element, so they are
/// bounded well below the range read limit.
pub const MAX_BULK_REMOVE: u32 = 1_000;

// ============================================================================
// Keys
// ============================================================================

/// Largest element accepted by a ranked set, leaving room for the subspace
/// prefix, level byte, marker and escaping within the store key limit.
pub const MAX_ELEMENT_SIZE: usize = 4_096;

const _: () = assert!(MIN_LEVELS >= 2);
const _: () = assert!(DEFAULT_LEVELS >= MIN_LEVELS && DEFAULT_LEVELS <= MAX_LEVELS);
const _: () = assert!(DEFAULT_LEVEL_FAN_POW >= 1 && DEFAULT_LEVEL_FAN_POW <= MAX_LEVEL_FAN_POW);
const _: () = assert!((DEFAULT_LEVELS as u32 - 1) * DEFAULT_LEVEL_FAN_POW as u32 <= LEVEL_HASH_BITS);
const _: () = assert!(DEFAULT_SCAN_BATCH_SIZE <= MAX_SCAN_BATCH_SIZE);
// Worst case escaping doubles the element.
const _: () = assert!(MAX_ELEMENT_SIZE * 2 + 64 <= MAX_KEY_SIZE);
const _: () = assert!(MAX_BULK_REMOVE <= MAX_RANGE_RESULTS);
