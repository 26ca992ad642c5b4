//! Lock coordinator: scoped acquisition and release of named locks.
//!
//! The coordinator turns the single-attempt [`LockStore`] contract into
//! bounded waits, generates a fresh [`LockToken`] per attempt and hands back a
//! [`LockGuard`] that keeps releasing the key until the store answered once.
//!
//! # Release guarantee
//!
//! [`LockGuard::release`] is the normal exit. If a guard is dropped before a
//! release completed (the owning future was cancelled, even mid-release, or a
//! panic is unwinding) the drop spawns the release on the current Tokio
//! runtime. Release faults are logged and never reach the caller: by the
//! time a lock is released the protected transaction has already committed
//! or rolled back.
//!
//! # Interruption
//!
//! A coordinator built with [`LockCoordinator::with_shutdown`] abandons
//! waits once the shutdown flag flips to `true` and reports
//! [`LockError::Interrupted`], which is distinct from contention.

use crate::metrics::LockMetrics;
use chrono::Utc;
use std::sync::Arc;
use tastebud_core::lock::{
    Backoff, LockBounds, LockHandle, LockKey, LockStore, LockToken, ReleaseOutcome,
};
use tastebud_core::LockError;
use tokio::sync::watch;
use tokio::time::Instant;

/// Acquires and releases named locks through a [`LockStore`].
pub struct LockCoordinator<L: LockStore> {
    store: Arc<L>,
    backoff: Backoff,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<L: LockStore> Clone for LockCoordinator<L> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            backoff: self.backoff,
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<L: LockStore> LockCoordinator<L> {
    /// Create a coordinator over a shared store.
    #[must_use]
    pub fn new(store: Arc<L>) -> Self {
        Self {
            store,
            backoff: Backoff::default(),
            shutdown: None,
        }
    }

    /// Set the backoff used between acquisition attempts.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Abandon lock waits once `shutdown` holds `true`.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<L> {
        &self.store
    }

    /// Acquire `key`, queueing up to `bounds.wait`.
    ///
    /// # Errors
    ///
    /// - [`LockError::Unavailable`] if another holder kept the key for the
    ///   whole wait bound
    /// - [`LockError::Interrupted`] if shutdown was signalled while waiting
    /// - [`LockError::Store`] if the coordination store failed
    pub async fn acquire(&self, key: LockKey, bounds: LockBounds) -> Result<LockGuard<L>, LockError> {
        self.acquire_by(key, bounds, Instant::now() + bounds.wait).await
    }

    /// Acquire every key in `keys`, in sorted order, sharing one wait bound.
    ///
    /// Duplicates are collapsed. Sorting gives every caller the same
    /// acquisition order, so two overlapping key sets cannot deadlock. If any
    /// key fails, the keys already held are released before returning.
    ///
    /// # Errors
    ///
    /// Same as [`LockCoordinator::acquire`], for the first key that failed.
    pub async fn acquire_all(
        &self,
        mut keys: Vec<LockKey>,
        bounds: LockBounds,
    ) -> Result<LockSet<L>, LockError> {
        keys.sort();
        keys.dedup();

        let deadline = Instant::now() + bounds.wait;
        let mut guards = Vec::with_capacity(keys.len());

        for key in keys {
            match self.acquire_by(key, bounds, deadline).await {
                Ok(guard) => guards.push(guard),
                Err(err) => {
                    LockSet { guards }.release().await;
                    return Err(err);
                }
            }
        }

        Ok(LockSet { guards })
    }

    async fn acquire_by(
        &self,
        key: LockKey,
        bounds: LockBounds,
        deadline: Instant,
    ) -> Result<LockGuard<L>, LockError> {
        let token = LockToken::generate();
        let started = Instant::now();
        let wait = deadline.saturating_duration_since(started);

        let attempt = self
            .store
            .try_acquire_within(&key, &token, wait, bounds.lease, self.backoff);

        let result = match self.shutdown.clone() {
            Some(mut shutdown) => {
                if *shutdown.borrow_and_update() {
                    drop(attempt);
                    None
                } else {
                    tokio::select! {
                        result = attempt => Some(result),
                        () = shutdown_signalled(&mut shutdown) => None,
                    }
                }
            }
            None => Some(attempt.await),
        };

        let waited = started.elapsed();

        match result {
            Some(Ok(Some(lease_started))) => {
                LockMetrics::record_acquired(waited);
                tracing::debug!(
                    key = %key,
                    waited_ms = waited.as_millis(),
                    lease_ms = bounds.lease.as_millis(),
                    "Lock acquired"
                );
                Ok(LockGuard {
                    store: Arc::clone(&self.store),
                    handle: LockHandle {
                        key,
                        token,
                        bounds,
                        acquired_at: Utc::now(),
                        lease_started,
                    },
                    released: false,
                })
            }
            Some(Ok(None)) => {
                LockMetrics::record_unavailable(waited);
                tracing::warn!(
                    key = %key,
                    waited_ms = waited.as_millis(),
                    "Lock unavailable within wait bound"
                );
                Err(LockError::Unavailable {
                    key: key.to_string(),
                    waited,
                })
            }
            Some(Err(err)) => {
                LockMetrics::record_store_error();
                tracing::error!(
                    key = %key,
                    error = %err,
                    "Coordination store failed during acquisition"
                );
                // The store may have stored our token before failing to answer.
                self.spawn_cleanup(key, token);
                Err(err)
            }
            None => {
                LockMetrics::record_interrupted();
                tracing::warn!(
                    key = %key,
                    waited_ms = waited.as_millis(),
                    "Lock wait interrupted by shutdown"
                );
                // An attempt may have been in flight when the wait was dropped.
                self.spawn_cleanup(key.clone(), token);
                Err(LockError::Interrupted {
                    key: key.to_string(),
                })
            }
        }
    }

    fn spawn_cleanup(&self, key: LockKey, token: LockToken) {
        let store = Arc::clone(&self.store);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(err) = store.release(&key, &token).await {
                    tracing::debug!(key = %key, error = %err, "Cleanup release failed");
                }
            });
        }
    }
}

/// Resolves once the shutdown flag is `true`; never resolves if the sender is gone.
async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// A held lock, released on drop unless a release already completed.
#[must_use = "dropping a guard releases the lock in the background"]
pub struct LockGuard<L: LockStore> {
    store: Arc<L>,
    handle: LockHandle,
    released: bool,
}

impl<L: LockStore> std::fmt::Debug for LockGuard<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("handle", &self.handle)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl<L: LockStore> LockGuard<L> {
    /// The handle of the held lock.
    #[must_use]
    pub const fn handle(&self) -> &LockHandle {
        &self.handle
    }

    /// Release the lock.
    ///
    /// Never fails from the caller's point of view: an expired lease or a
    /// store fault is logged and reported in the outcome. If this future is
    /// dropped before the store answered, the guard's drop issues the release
    /// again in the background; compare-and-delete makes the repeat harmless.
    pub async fn release(mut self) -> ReleaseOutcome {
        let outcome = release_handle(self.store.as_ref(), &self.handle).await;
        self.released = true;
        outcome
    }
}

impl<L: LockStore> Drop for LockGuard<L> {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let store = Arc::clone(&self.store);
        let handle = self.handle.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::debug!(key = %handle.key, "Lock guard dropped, releasing in background");
                runtime.spawn(async move {
                    release_handle(store.as_ref(), &handle).await;
                });
            }
            Err(_) => {
                tracing::warn!(
                    key = %handle.key,
                    lease_ms = handle.bounds.lease.as_millis(),
                    "Lock guard dropped outside a runtime, lease will expire on its own"
                );
            }
        }
    }
}

async fn release_handle<L: LockStore>(store: &L, handle: &LockHandle) -> ReleaseOutcome {
    let held = handle.held_for();
    if held >= handle.bounds.lease {
        LockMetrics::record_lease_overrun();
        tracing::warn!(
            key = %handle.key,
            held_ms = held.as_millis(),
            lease_ms = handle.bounds.lease.as_millis(),
            "Lease elapsed before release"
        );
    }

    match store.release(&handle.key, &handle.token).await {
        Ok(ReleaseOutcome::Released) => {
            tracing::debug!(key = %handle.key, held_ms = held.as_millis(), "Lock released");
            ReleaseOutcome::Released
        }
        Ok(outcome) => {
            tracing::warn!(
                key = %handle.key,
                held_ms = held.as_millis(),
                "Lock already expired at release"
            );
            outcome
        }
        Err(err) => {
            LockMetrics::record_store_error();
            tracing::error!(
                key = %handle.key,
                error = %err,
                "Coordination store failed during release, lease will expire on its own"
            );
            ReleaseOutcome::Unconfirmed
        }
    }
}

/// Several held locks, released in reverse acquisition order.
#[must_use = "dropping a lock set releases its locks in the background"]
#[derive(Debug)]
pub struct LockSet<L: LockStore> {
    guards: Vec<LockGuard<L>>,
}

impl<L: LockStore> LockSet<L> {
    /// Handles of the held locks, in acquisition order.
    pub fn handles(&self) -> impl Iterator<Item = &LockHandle> {
        self.guards.iter().map(LockGuard::handle)
    }

    /// Number of held locks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    /// Whether the set holds no lock.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Release every lock, last acquired first.
    pub async fn release(mut self) -> Vec<ReleaseOutcome> {
        let mut outcomes = Vec::with_capacity(self.guards.len());
        while let Some(guard) = self.guards.pop() {
            outcomes.push(guard.release().await);
        }
        outcomes
    }
}
