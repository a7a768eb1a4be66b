//! Retrying entry point for set operations.

use std::future::Future;
use std::sync::Arc;

use tally_kv::Database;
use tally_kv::RetryPolicy;
use snafu::ResultExt;
use tally_kv::transact;
use tracing::info;

use crate::config::LayerConfig;
use crate::config::RankedSetConfig;
use crate::error::ConfigSnafu;
use crate::error::LayerError;
use crate::ranked_set::RankedSet;
use crate::scored_set::ScoredSet;
use crate::subspace::Subspace;

/// A database handle plus the retry policy and set geometry used with it.
///
/// [`LayerClient::run`] executes a closure in a transaction and retries it on
/// conflicts. After `retry.max_retries` retries the call fails with
/// [`LayerError::Aborted`].
pub struct LayerClient<D: Database> {
    db: Arc<D>,
    retry: RetryPolicy,
    ranked_set: RankedSetConfig,
}

impl<D: Database> Clone for LayerClient<D> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            retry: self.retry.clone(),
            ranked_set: self.ranked_set.clone(),
        }
    }
}

impl<D: Database> LayerClient<D> {
    /// Client with default geometry and retry policy.
    pub fn new(db: Arc<D>) -> Self {
        Self {
            db,
            retry: RetryPolicy::default(),
            ranked_set: RankedSetConfig::default(),
        }
    }

    /// Client with `config`, which is validated first.
    pub fn with_config(db: Arc<D>, config: LayerConfig) -> Result<Self, LayerError> {
        config.validate().context(ConfigSnafu)?;
        Ok(Self {
            db,
            retry: config.retry,
            ranked_set: config.ranked_set,
        })
    }

    pub fn database(&self) -> &Arc<D> {
        &self.db
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run `f` in a transaction, committing on success and retrying conflicts.
    pub async fn run<F, Fut, T>(&self, f: F) -> Result<T, LayerError>
    where
        F: FnMut(D::Transaction) -> Fut,
        Fut: Future<Output = Result<T, LayerError>>,
    {
        transact(self.db.as_ref(), &self.retry, f).await
    }

    /// Describe the ranked set under `subspace` and create its heads.
    pub async fn open_ranked_set(&self, subspace: Subspace) -> Result<RankedSet, LayerError> {
        let set = RankedSet::new(subspace, self.ranked_set.clone())?;
        let set_ref = &set;
        self.run(move |tr| async move { set_ref.initialize(&tr).await }).await?;
        info!(prefix = %set.subspace().raw_prefix().escape_ascii(), "opened ranked set");
        Ok(set)
    }

    /// Describe the scored set under `subspace` and create its heads.
    pub async fn open_scored_set(&self, subspace: Subspace) -> Result<ScoredSet, LayerError> {
        let set = ScoredSet::new(subspace, self.ranked_set.clone())?;
        let set_ref = &set;
        self.run(move |tr| async move { set_ref.initialize(&tr).await }).await?;
        info!(prefix = %set.ranked().subspace().raw_prefix().escape_ascii(), "opened scored set");
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;

    use tally_kv::MemoryDatabase;
    use tally_kv::StoreError;
    use tally_kv::Transaction;

    use super::*;
    use crate::config::ConfigError;

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let client = LayerClient::new(MemoryDatabase::new());
        let set = client.open_ranked_set(Subspace::named(b"s")).await.unwrap();
        let set = &set;
        client.run(move |tr| async move { set.insert(&tr, b"a").await }).await.unwrap();

        let reopened = client.open_ranked_set(Subspace::named(b"s")).await.unwrap();
        let reopened = &reopened;
        let size = client.run(move |tr| async move { reopened.size(&tr).await }).await.unwrap();
        assert_eq!(size, 1);
    }

    #[tokio::test]
    async fn test_user_errors_are_not_retried() {
        let client = LayerClient::new(MemoryDatabase::new());
        let set = client.open_ranked_set(Subspace::named(b"s")).await.unwrap();
        let set = &set;
        let calls = &AtomicU32::new(0);
        let err = client
            .run(move |tr| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                set.remove(&tr, b"missing").await
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LayerError::NotFound { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_persistent_conflicts_abort() {
        let config = LayerConfig {
            retry: RetryPolicy::immediate(3),
            ..LayerConfig::default()
        };
        let db = MemoryDatabase::new();
        let client = LayerClient::with_config(Arc::clone(&db), config).unwrap();
        let db = &db;

        // Every attempt reads a key that a competing writer then changes.
        let err = client
            .run(move |tr| async move {
                tr.get(b"hot").await?;
                let other = db.begin_transaction()?;
                other.set(b"hot", b"theirs");
                other.commit().await?;
                tr.set(b"hot", b"mine");
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LayerError::Aborted { attempts: 4 }));
        assert_eq!(db.stats().conflicts, 4);
    }

    #[test]
    fn test_with_config_validates() {
        let config = LayerConfig {
            retry: RetryPolicy {
                max_retries: 5,
                initial_backoff_ms: 0,
                max_backoff_ms: 100,
            },
            ..LayerConfig::default()
        };
        let err = LayerClient::with_config(MemoryDatabase::new(), config).err().unwrap();
        assert!(matches!(err, LayerError::Config {
            source: ConfigError::InvalidRetry { .. }
        }));

        let config = LayerConfig {
            ranked_set: RankedSetConfig {
                levels: 0,
                ..RankedSetConfig::default()
            },
            ..LayerConfig::default()
        };
        let err = LayerClient::with_config(MemoryDatabase::new(), config).err().unwrap();
        assert!(matches!(err, LayerError::Config {
            source: ConfigError::InvalidValue { .. }
        }));
    }

    #[tokio::test]
    async fn test_store_errors_surface() {
        let client = LayerClient::new(MemoryDatabase::new());
        let err = client
            .run(|tr| async move {
                tr.set(&vec![0u8; tally_kv::constants::MAX_KEY_SIZE + 1], b"v");
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LayerError::Store { source: StoreError::KeyTooLarge { .. } }));
    }
}
