//! Protected-operation executor.
//!
//! Nests a transactional scope inside a lock scope:
//!
//! ```text
//! acquire(key) ─┬─ begin ─ body ─┬─ commit ───┬─ release(key)
//!               │                └─ rollback ─┘
//!               └─ not acquired: body never runs, nothing is opened
//! ```
//!
//! The body receives its own transaction handle, opened fresh by the
//! executor and independent of any transaction the caller holds. Its writes
//! are committed (or discarded) before the lock is released, so the next
//! holder of the key always reads them.
//!
//! # Example
//!
//! ```ignore
//! let count = executor
//!     .execute(LockKey::new("reaction-review", review_id), bounds, move |tx| {
//!         Box::pin(async move {
//!             let review = store.find_review(tx, review_id).await?.ok_or(NotFound)?;
//!             store.update_review_counters(tx, review_id, next).await?;
//!             Ok(next)
//!         })
//!     })
//!     .await?;
//! ```

use crate::coordinator::LockCoordinator;
use crate::metrics::SectionMetrics;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tastebud_core::lock::{LockBounds, LockHandle, LockKey, LockStore};
use tastebud_core::{LockError, TransactionError, TransactionManager};
use std::time::Duration;
use tokio::time::Instant;

/// Lease time kept in reserve for the commit round trip.
pub const DEFAULT_COMMIT_MARGIN: Duration = Duration::from_millis(50);

/// Payload of a panic caught inside a protected section.
type PanicPayload = Box<dyn Any + Send + 'static>;

/// Runs units of work under a named lock, each in its own transaction.
pub struct ProtectedExecutor<L: LockStore, M: TransactionManager> {
    coordinator: LockCoordinator<L>,
    transactions: M,
    bounds: LockBounds,
    commit_margin: Duration,
}

impl<L: LockStore, M: TransactionManager> ProtectedExecutor<L, M> {
    /// Create an executor.
    ///
    /// # Arguments
    ///
    /// * `coordinator` - Lock coordinator over the shared store
    /// * `transactions` - Source of fresh transactions
    /// * `bounds` - Bounds used by [`ProtectedExecutor::execute_with_defaults`]
    #[must_use]
    pub const fn new(coordinator: LockCoordinator<L>, transactions: M, bounds: LockBounds) -> Self {
        Self {
            coordinator,
            transactions,
            bounds,
            commit_margin: DEFAULT_COMMIT_MARGIN,
        }
    }

    /// Set the lease time kept in reserve for the commit.
    ///
    /// A section whose lease would run out within `margin` is rolled back
    /// instead of committed.
    #[must_use]
    pub const fn with_commit_margin(mut self, margin: Duration) -> Self {
        self.commit_margin = margin;
        self
    }

    /// Default bounds of this executor.
    #[must_use]
    pub const fn bounds(&self) -> LockBounds {
        self.bounds
    }

    /// The lock coordinator.
    #[must_use]
    pub const fn coordinator(&self) -> &LockCoordinator<L> {
        &self.coordinator
    }

    /// Run `work` while holding `key`, inside a new transaction.
    ///
    /// # Errors
    ///
    /// - `E::from(LockError)` if the lock was not acquired; `work` did not
    ///   run and no transaction was opened
    /// - `E::from(LockError::LeaseExpired)` if the lease ran out, or would run
    ///   out within the commit margin, before commit; the writes were rolled
    ///   back
    /// - `E::from(TransactionError)` if the transaction could not be opened or
    ///   committed
    /// - any error returned by `work`, after rolling back
    ///
    /// # Panics
    ///
    /// A panic inside `work` is resumed after the transaction is discarded and
    /// the lock released.
    pub async fn execute<T, E, F>(&self, key: LockKey, bounds: LockBounds, work: F) -> Result<T, E>
    where
        F: for<'t> FnOnce(&'t mut M::Tx) -> BoxFuture<'t, Result<T, E>> + Send,
        T: Send,
        E: From<LockError> + From<TransactionError> + Send,
    {
        let guard = self.coordinator.acquire(key, bounds).await?;
        let outcome = self
            .run_in_transaction(std::slice::from_ref(guard.handle()), work)
            .await;
        guard.release().await;

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Run `work` while holding every key in `keys`, inside a new transaction.
    ///
    /// Keys are acquired in sorted order and share one wait bound.
    ///
    /// # Errors
    ///
    /// Same as [`ProtectedExecutor::execute`].
    ///
    /// # Panics
    ///
    /// Same as [`ProtectedExecutor::execute`].
    pub async fn execute_all<T, E, F>(
        &self,
        keys: Vec<LockKey>,
        bounds: LockBounds,
        work: F,
    ) -> Result<T, E>
    where
        F: for<'t> FnOnce(&'t mut M::Tx) -> BoxFuture<'t, Result<T, E>> + Send,
        T: Send,
        E: From<LockError> + From<TransactionError> + Send,
    {
        let locks = self.coordinator.acquire_all(keys, bounds).await?;
        let handles: Vec<LockHandle> = locks.handles().cloned().collect();
        let outcome = self.run_in_transaction(&handles, work).await;
        locks.release().await;

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// [`ProtectedExecutor::execute`] with this executor's default bounds.
    ///
    /// # Errors
    ///
    /// Same as [`ProtectedExecutor::execute`].
    ///
    /// # Panics
    ///
    /// Same as [`ProtectedExecutor::execute`].
    pub async fn execute_with_defaults<T, E, F>(&self, key: LockKey, work: F) -> Result<T, E>
    where
        F: for<'t> FnOnce(&'t mut M::Tx) -> BoxFuture<'t, Result<T, E>> + Send,
        T: Send,
        E: From<LockError> + From<TransactionError> + Send,
    {
        self.execute(key, self.bounds, work).await
    }

    /// Run `work` in a fresh transaction. Caller holds the locks in `handles`.
    async fn run_in_transaction<T, E, F>(
        &self,
        handles: &[LockHandle],
        work: F,
    ) -> Result<Result<T, E>, PanicPayload>
    where
        F: for<'t> FnOnce(&'t mut M::Tx) -> BoxFuture<'t, Result<T, E>> + Send,
        E: From<LockError> + From<TransactionError>,
    {
        let started = Instant::now();
        let keys = KeyList(handles);

        let mut tx = match self.transactions.begin().await {
            Ok(tx) => tx,
            Err(err) => {
                tracing::error!(keys = %keys, error = %err, "Failed to open protected transaction");
                return Ok(Err(err.into()));
            }
        };

        tracing::debug!(keys = %keys, "Entering protected section");
        let outcome = AssertUnwindSafe(work(&mut tx)).catch_unwind().await;

        let result = match outcome {
            Ok(Ok(value)) => match expiring_lease(handles, self.commit_margin) {
                Some(err) => {
                    tracing::warn!(keys = %keys, error = %err, "Lease too close to expiry for commit, rolling back");
                    self.discard(tx, &keys).await;
                    SectionMetrics::record_rollback(started.elapsed());
                    Err(err.into())
                }
                None => match self.transactions.commit(tx).await {
                    Ok(()) => {
                        SectionMetrics::record_commit(started.elapsed());
                        Ok(value)
                    }
                    Err(err) => {
                        tracing::error!(keys = %keys, error = %err, "Failed to commit protected section");
                        SectionMetrics::record_rollback(started.elapsed());
                        Err(err.into())
                    }
                },
            },
            Ok(Err(err)) => {
                self.discard(tx, &keys).await;
                SectionMetrics::record_rollback(started.elapsed());
                Err(err)
            }
            Err(panic) => {
                tracing::error!(keys = %keys, "Protected section panicked, discarding transaction");
                drop(tx);
                SectionMetrics::record_rollback(started.elapsed());
                return Err(panic);
            }
        };

        tracing::debug!(
            keys = %keys,
            committed = result.is_ok(),
            elapsed_ms = started.elapsed().as_millis(),
            "Leaving protected section"
        );

        Ok(result)
    }

    async fn discard(&self, tx: M::Tx, keys: &KeyList<'_>) {
        if let Err(err) = self.transactions.rollback(tx).await {
            tracing::error!(keys = %keys, error = %err, "Rollback reported a failure");
        }
    }
}

fn expiring_lease(handles: &[LockHandle], margin: Duration) -> Option<LockError> {
    handles
        .iter()
        .find(|h| h.lease_expires_within(margin))
        .map(|h| LockError::LeaseExpired {
            key: h.key.to_string(),
            held: h.held_for(),
        })
}

/// Displays the keys of a protected section as `a,b,c`.
struct KeyList<'a>(&'a [LockHandle]);

impl std::fmt::Display for KeyList<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, handle) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", handle.key)?;
        }
        Ok(())
    }
}
