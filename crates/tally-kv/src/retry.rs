//! Bounded retry loop for optimistic transactions.
//!
//! [`transact`] runs an attempt function against a fresh transaction, commits
//! it, and retries the whole attempt when the failure is retryable. Between
//! attempts it sleeps with exponential backoff plus jitter so that contending
//! writers spread out instead of colliding again in lockstep.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use serde::Serialize;
use snafu::Snafu;
use tracing::debug;
use tracing::warn;

use crate::constants::DEFAULT_INITIAL_BACKOFF_MS;
use crate::constants::DEFAULT_MAX_BACKOFF_MS;
use crate::constants::DEFAULT_MAX_RETRIES;
use crate::constants::MAX_RETRIES_LIMIT;
use crate::error::StoreError;
use crate::traits::Database;
use crate::traits::Transaction;

mod defaults {
    use crate::constants::DEFAULT_INITIAL_BACKOFF_MS;
    use crate::constants::DEFAULT_MAX_BACKOFF_MS;
    use crate::constants::DEFAULT_MAX_RETRIES;

    pub fn max_retries() -> u32 {
        DEFAULT_MAX_RETRIES
    }

    pub fn initial_backoff_ms() -> u64 {
        DEFAULT_INITIAL_BACKOFF_MS
    }

    pub fn max_backoff_ms() -> u64 {
        DEFAULT_MAX_BACKOFF_MS
    }
}

/// A retry policy outside its accepted bounds.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum RetryPolicyError {
    #[snafu(display("max_retries {max_retries} exceeds limit {limit}"))]
    TooManyRetries { max_retries: u32, limit: u32 },

    #[snafu(display("initial_backoff_ms {initial_backoff_ms} exceeds max_backoff_ms {max_backoff_ms}"))]
    InvertedBackoff { initial_backoff_ms: u64, max_backoff_ms: u64 },

    /// A zero base never doubles, so a nonzero cap would never be reached.
    #[snafu(display("initial_backoff_ms is 0 but max_backoff_ms is {max_backoff_ms}"))]
    ZeroInitialBackoff { max_backoff_ms: u64 },
}

/// How many times, and how patiently, to retry a conflicting transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero means a single attempt.
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Backoff before the first retry in milliseconds.
    #[serde(default = "defaults::initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Cap on the backoff in milliseconds.
    #[serde(default = "defaults::max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    /// Policy that retries immediately, for tests and simulations.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Check the policy's bounds, reporting the first violation.
    ///
    /// Backoff is either disabled (both values zero) or starts at one
    /// millisecond or more.
    pub fn validate(&self) -> Result<(), RetryPolicyError> {
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(RetryPolicyError::TooManyRetries {
                max_retries: self.max_retries,
                limit: MAX_RETRIES_LIMIT,
            });
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(RetryPolicyError::InvertedBackoff {
                initial_backoff_ms: self.initial_backoff_ms,
                max_backoff_ms: self.max_backoff_ms,
            });
        }
        if self.initial_backoff_ms == 0 && self.max_backoff_ms > 0 {
            return Err(RetryPolicyError::ZeroInitialBackoff {
                max_backoff_ms: self.max_backoff_ms,
            });
        }
        Ok(())
    }
}

/// Errors that can tell the retry loop whether another attempt may succeed.
pub trait RetryableError {
    fn is_retryable(&self) -> bool;
}

impl RetryableError for StoreError {
    fn is_retryable(&self) -> bool {
        StoreError::is_retryable(self)
    }
}

/// Result of a backoff computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffResult {
    /// Time to sleep before the next attempt.
    pub sleep_ms: u64,
    /// Backoff base to use after that attempt.
    pub next_backoff_ms: u64,
}

/// Compute the sleep for one retry and the next backoff base.
///
/// The jitter is drawn from `jitter_seed` and is at most half the current
/// backoff. The base doubles each attempt up to `max_backoff_ms`.
///
/// # Tiger Style
///
/// - Pure: the caller supplies the randomness
/// - Saturating arithmetic throughout
#[inline]
pub fn compute_backoff_with_jitter(current_backoff_ms: u64, max_backoff_ms: u64, jitter_seed: u64) -> BackoffResult {
    let jitter_range = (current_backoff_ms / 2).saturating_add(1);
    let jitter = jitter_seed % jitter_range;
    BackoffResult {
        sleep_ms: current_backoff_ms.saturating_add(jitter),
        next_backoff_ms: current_backoff_ms.saturating_mul(2).min(max_backoff_ms),
    }
}

/// Run `attempt` in a fresh transaction until it commits.
///
/// Each attempt receives its own transaction handle; when `attempt` returns
/// `Ok` the transaction is committed. Retryable failures from either the
/// attempt or the commit start over with fresh reads. After
/// `policy.max_retries` retries the loop gives up with
/// [`StoreError::RetriesExhausted`], converted into the caller's error type.
/// Non-retryable errors are returned unchanged on the first occurrence.
pub async fn transact<D, F, Fut, T, E>(db: &D, policy: &RetryPolicy, mut attempt: F) -> Result<T, E>
where
    D: Database + ?Sized,
    F: FnMut(D::Transaction) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<StoreError> + RetryableError + std::fmt::Display,
{
    let mut attempts: u32 = 0;
    let mut backoff_ms = policy.initial_backoff_ms;

    loop {
        attempts = attempts.saturating_add(1);
        let tr = db.begin_transaction().map_err(E::from)?;

        let failure = match attempt(tr.clone()).await {
            Ok(value) => match tr.commit().await {
                Ok(()) => {
                    if attempts > 1 {
                        debug!(attempts, "transaction committed after retries");
                    }
                    return Ok(value);
                }
                Err(err) => E::from(err),
            },
            Err(err) => err,
        };

        if !failure.is_retryable() {
            return Err(failure);
        }
        if attempts > policy.max_retries {
            warn!(attempts, error = %failure, "transaction retries exhausted");
            return Err(E::from(StoreError::RetriesExhausted { attempts }));
        }

        let jitter_seed: u64 = rand::rng().random();
        let backoff = compute_backoff_with_jitter(backoff_ms, policy.max_backoff_ms, jitter_seed);
        debug!(attempts, sleep_ms = backoff.sleep_ms, error = %failure, "transaction failed, retrying");
        if backoff.sleep_ms > 0 {
            tokio::time::sleep(Duration::from_millis(backoff.sleep_ms)).await;
        }
        backoff_ms = backoff.next_backoff_ms;
    }
}
