//! Resource bounds for the store interface.
//!
//! Tiger Style: Constants are fixed and immutable, enforced at compile time.
//! Each constant has explicit bounds to prevent unbounded resource allocation.

// ============================================================================
// Key-Value Size Limits
// ============================================================================

/// Maximum size of a single key in bytes (10 KB).
///
/// Tiger Style: Writes with larger keys are rejected when the transaction commits.
pub const MAX_KEY_SIZE: usize = 10_000;

/// Maximum size of a single value in bytes (100 KB).
pub const MAX_VALUE_SIZE: usize = 100_000;

// ============================================================================
// Range Reads
// ============================================================================

/// Default number of entries returned by a single range read.
pub const DEFAULT_RANGE_LIMIT: u32 = 1_000;

/// Maximum number of entries a single range read may return.
///
/// Tiger Style: Callers page through larger ranges with [`crate::RangeScanner`].
pub const MAX_RANGE_LIMIT: u32 = 10_000;

// ============================================================================
// MVCC Window
// ============================================================================

/// Number of committed versions a transaction may lag behind before its reads
/// fail with `TransactionTooOld`.
///
/// Tiger Style: Bounds both the commit log used for conflict detection and the
/// per-key version history kept by the in-memory store.
pub const MAX_VERSION_LAG: u64 = 10_000;

// ============================================================================
// Retry Policy Defaults
// ============================================================================

/// Default number of retries after the first attempt of a transaction.
pub const DEFAULT_MAX_RETRIES: u32 = 100;

/// Default initial backoff between attempts in milliseconds.
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1;

/// Default cap on the backoff between attempts in milliseconds.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 128;

/// Upper bound accepted for `max_retries` in a retry policy.
pub const MAX_RETRIES_LIMIT: u32 = 10_000;

const _: () = assert!(DEFAULT_RANGE_LIMIT <= MAX_RANGE_LIMIT);
const _: () = assert!(DEFAULT_RANGE_LIMIT > 0);
const _: () = assert!(MAX_KEY_SIZE < MAX_VALUE_SIZE);
const _: () = assert!(DEFAULT_INITIAL_BACKOFF_MS <= DEFAULT_MAX_BACKOFF_MS);
const _: () = assert!(DEFAULT_MAX_RETRIES <= MAX_RETRIES_LIMIT);
const _: () = assert!(MAX_VERSION_LAG > 0);
