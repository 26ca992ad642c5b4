//! Injected dependencies of the content operations.

use crate::config::ContentConfig;
use crate::error::Result;
use crate::providers::ContentStore;
use futures::future::BoxFuture;
use std::sync::Arc;
use tastebud_core::environment::Clock;
use tastebud_core::lock::{LockBounds, LockKey, LockStore};
use tastebud_runtime::{LockCoordinator, ProtectedExecutor};

/// Everything an operation needs: storage, the protected executor, settings
/// and time.
///
/// # Type Parameters
///
/// - `S`: Content store (also the transaction manager of the executor)
/// - `L`: Coordination store client
pub struct ContentEnvironment<S: ContentStore, L: LockStore> {
    /// Content storage
    pub store: S,
    /// Runs bodies under named locks, each in a fresh transaction
    pub executor: Arc<ProtectedExecutor<L, S>>,
    /// Validation limits and connection settings
    pub config: ContentConfig,
    /// Time source for timestamps
    pub clock: Arc<dyn Clock>,
}

impl<S: ContentStore, L: LockStore> Clone for ContentEnvironment<S, L> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            executor: Arc::clone(&self.executor),
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: ContentStore, L: LockStore> ContentEnvironment<S, L> {
    /// Create a new environment.
    ///
    /// # Arguments
    ///
    /// * `store` - Content store; a clone opens the executor's transactions
    /// * `coordinator` - Lock coordinator over the shared coordination store
    /// * `bounds` - Wait and lease bounds of every protected operation
    /// * `config` - Content settings
    /// * `clock` - Time source
    #[must_use]
    pub fn new(
        store: S,
        coordinator: LockCoordinator<L>,
        bounds: LockBounds,
        config: ContentConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let executor = Arc::new(ProtectedExecutor::new(coordinator, store.clone(), bounds));
        Self {
            store,
            executor,
            config,
            clock,
        }
    }

    /// Run `work` under `key` in a fresh transaction.
    ///
    /// # Errors
    ///
    /// Lock failures map to the not-executed errors; anything `work` returns
    /// is passed through after rollback.
    pub async fn protected<T, F>(&self, key: LockKey, work: F) -> Result<T>
    where
        F: for<'t> FnOnce(&'t mut S::Tx) -> BoxFuture<'t, Result<T>> + Send,
        T: Send,
    {
        self.executor.execute_with_defaults(key, work).await
    }

    /// Run `work` under every key in `keys` in a fresh transaction.
    ///
    /// # Errors
    ///
    /// Same as [`ContentEnvironment::protected`].
    pub async fn protected_all<T, F>(&self, keys: Vec<LockKey>, work: F) -> Result<T>
    where
        F: for<'t> FnOnce(&'t mut S::Tx) -> BoxFuture<'t, Result<T>> + Send,
        T: Send,
    {
        self.executor
            .execute_all(keys, self.executor.bounds(), work)
            .await
    }

    /// Run an unprotected read in its own transaction, then discard it.
    ///
    /// Used to find which keys to lock. Anything read here must be read again
    /// under the lock before it is relied on.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ContentError::Database`] if the transaction cannot be
    /// opened, or whatever `read` returns.
    pub async fn lookup<T, F>(&self, read: F) -> Result<T>
    where
        F: for<'t> FnOnce(&'t mut S::Tx) -> BoxFuture<'t, Result<T>> + Send,
        T: Send,
    {
        let mut tx = self.store.begin().await?;
        let result = read(&mut tx).await;
        if let Err(err) = self.store.rollback(tx).await {
            tracing::debug!(error = %err, "Discarding lookup transaction failed");
        }
        result
    }
}
