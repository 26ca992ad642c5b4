//! In-memory, lease-based lock store.
//!
//! Behaves like the shared coordination store for every coordinator holding a
//! clone: leases expire on their own, release is compare-and-delete by token,
//! and waiters are woken as soon as a key is released instead of polling.
//! Request and reply delays simulate the network between a worker and a
//! remote store: an effect lands after the request delay, and the caller
//! learns of it only after the reply delay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tastebud_core::lock::{Backoff, LockKey, LockStore, LockToken, ReleaseOutcome, Result};
use tastebud_core::LockError;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    token: LockToken,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: Mutex<HashMap<LockKey, Entry>>,
    released: Notify,
    unreachable: AtomicBool,
    acquisitions: AtomicU64,
    request_delay_ms: AtomicU64,
    reply_delay_ms: AtomicU64,
}

/// In-memory lock store for tests.
///
/// Clones share the same entries, so several coordinators built over clones
/// behave like several processes sharing one coordination store.
///
/// # Example
///
/// ```
/// use tastebud_core::lock::{LockKey, LockStore, LockToken};
/// use tastebud_testing::InMemoryLockStore;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryLockStore::new();
/// let key = LockKey::new("reaction-review", 1);
///
/// let first = LockToken::generate();
/// assert!(store.try_acquire(&key, &first, Duration::from_secs(3)).await?);
///
/// let second = LockToken::generate();
/// assert!(!store.try_acquire(&key, &second, Duration::from_secs(3)).await?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryLockStore {
    inner: Arc<Inner>,
}

impl InMemoryLockStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<LockKey, Entry>>> {
        self.inner
            .entries
            .lock()
            .map_err(|_| LockError::Store("Mutex lock failed".into()))
    }

    fn check_reachable(&self) -> Result<()> {
        if self.inner.unreachable.load(Ordering::SeqCst) {
            Err(LockError::Store("coordination store unreachable".into()))
        } else {
            Ok(())
        }
    }

    /// Delay every call before it reaches the entries.
    pub fn set_request_delay(&self, delay: Duration) {
        self.inner.request_delay_ms.store(millis(delay), Ordering::SeqCst);
    }

    /// Delay every answer after the entries were changed.
    pub fn set_reply_delay(&self, delay: Duration) {
        self.inner.reply_delay_ms.store(millis(delay), Ordering::SeqCst);
    }

    async fn pause(delay_ms: &AtomicU64) {
        let delay = delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    /// Make every call fail with [`LockError::Store`] until reset.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Hold `key` for `lease` on behalf of a test harness.
    ///
    /// Overwrites any current holder. Returns the token that owns the key.
    #[must_use]
    pub fn hold(&self, key: &LockKey, lease: Duration) -> LockToken {
        let token = LockToken::generate();
        if let Ok(mut entries) = self.inner.entries.lock() {
            entries.insert(
                key.clone(),
                Entry {
                    token: token.clone(),
                    expires_at: Instant::now() + lease,
                },
            );
        }
        token
    }

    /// Expire `key` as if its lease had elapsed.
    pub fn expire(&self, key: &LockKey) {
        if let Ok(mut entries) = self.inner.entries.lock() {
            entries.remove(key);
        }
        self.inner.released.notify_waiters();
    }

    /// Whether `key` is currently held by a live lease.
    #[must_use]
    pub fn is_held(&self, key: &LockKey) -> bool {
        let now = Instant::now();
        self.inner
            .entries
            .lock()
            .map(|entries| entries.get(key).is_some_and(|e| e.is_live(now)))
            .unwrap_or(false)
    }

    /// Number of live leases.
    #[must_use]
    pub fn held_count(&self) -> usize {
        let now = Instant::now();
        self.inner
            .entries
            .lock()
            .map(|entries| entries.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    /// Number of successful acquisitions since creation.
    #[must_use]
    pub fn acquisitions(&self) -> u64 {
        self.inner.acquisitions.load(Ordering::SeqCst)
    }

    fn acquire_now(&self, key: &LockKey, token: &LockToken, lease: Duration) -> Result<bool> {
        self.check_reachable()?;
        let now = Instant::now();
        let mut entries = self.entries()?;

        if let Some(existing) = entries.get(key) {
            if existing.is_live(now) && existing.token != *token {
                return Ok(false);
            }
            if !existing.is_live(now) {
                tracing::debug!(key = %key, "Taking over expired lease");
            }
        }

        entries.insert(
            key.clone(),
            Entry {
                token: token.clone(),
                expires_at: now + lease,
            },
        );
        drop(entries);

        self.inner.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    fn release_now(&self, key: &LockKey, token: &LockToken) -> Result<ReleaseOutcome> {
        self.check_reachable()?;
        let now = Instant::now();
        let mut entries = self.entries()?;

        let outcome = match entries.get(key) {
            Some(entry) if entry.token == *token => {
                let live = entry.is_live(now);
                entries.remove(key);
                if live {
                    ReleaseOutcome::Released
                } else {
                    ReleaseOutcome::AlreadyExpired
                }
            }
            _ => ReleaseOutcome::AlreadyExpired,
        };
        drop(entries);

        self.inner.released.notify_waiters();
        Ok(outcome)
    }
}

impl LockStore for InMemoryLockStore {
    async fn try_acquire(&self, key: &LockKey, token: &LockToken, lease: Duration) -> Result<bool> {
        Self::pause(&self.inner.request_delay_ms).await;
        let acquired = self.acquire_now(key, token, lease);
        Self::pause(&self.inner.reply_delay_ms).await;
        acquired
    }

    async fn release(&self, key: &LockKey, token: &LockToken) -> Result<ReleaseOutcome> {
        Self::pause(&self.inner.request_delay_ms).await;
        let outcome = self.release_now(key, token);
        Self::pause(&self.inner.reply_delay_ms).await;
        outcome
    }

    async fn try_acquire_within(
        &self,
        key: &LockKey,
        token: &LockToken,
        wait: Duration,
        lease: Duration,
        backoff: Backoff,
    ) -> Result<Option<Instant>> {
        let deadline = Instant::now() + wait;
        let mut attempt = 0;

        loop {
            // Register before trying so a release between the attempt and the
            // wait is not missed.
            let notified = self.inner.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let sent_at = Instant::now();
            if self.try_acquire(key, token, lease).await? {
                return Ok(Some(sent_at));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            // Leases expire silently, so wake up periodically as well.
            let nap = backoff.delay_for_attempt(attempt).min(deadline - now);
            let _ = tokio::time::timeout(nap, notified.as_mut()).await;
            attempt = attempt.saturating_add(1);
        }
    }
}

fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn key() -> LockKey {
        LockKey::new("test", 1)
    }

    #[tokio::test]
    async fn test_mutual_exclusion_by_token() {
        let store = InMemoryLockStore::new();
        let a = LockToken::generate();
        let b = LockToken::generate();

        assert!(store.try_acquire(&key(), &a, Duration::from_secs(5)).await.unwrap());
        assert!(!store.try_acquire(&key(), &b, Duration::from_secs(5)).await.unwrap());
        assert!(store.is_held(&key()));
    }

    #[tokio::test]
    async fn test_release_requires_owner_token() {
        let store = InMemoryLockStore::new();
        let owner = LockToken::generate();
        let stranger = LockToken::generate();

        assert!(store.try_acquire(&key(), &owner, Duration::from_secs(5)).await.unwrap());
        assert_eq!(
            store.release(&key(), &stranger).await.unwrap(),
            ReleaseOutcome::AlreadyExpired
        );
        assert!(store.is_held(&key()));
        assert_eq!(
            store.release(&key(), &owner).await.unwrap(),
            ReleaseOutcome::Released
        );
        assert!(!store.is_held(&key()));
    }

    #[tokio::test]
    async fn test_lease_expires_on_its_own() {
        let store = InMemoryLockStore::new();
        let crashed = LockToken::generate();
        let next = LockToken::generate();

        assert!(store.try_acquire(&key(), &crashed, Duration::from_millis(20)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(store.try_acquire(&key(), &next, Duration::from_secs(5)).await.unwrap());
        // The crashed holder's late release must not free the new lease.
        assert_eq!(
            store.release(&key(), &crashed).await.unwrap(),
            ReleaseOutcome::AlreadyExpired
        );
        assert!(store.is_held(&key()));
    }

    #[tokio::test]
    async fn test_waiter_wakes_on_release() {
        let store = InMemoryLockStore::new();
        let holder = store.hold(&key(), Duration::from_secs(10));

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                let token = LockToken::generate();
                let started = Instant::now();
                let acquired = store
                    .try_acquire_within(
                        &key(),
                        &token,
                        Duration::from_secs(5),
                        Duration::from_secs(5),
                        Backoff {
                            initial_delay: Duration::from_secs(1),
                            max_delay: Duration::from_secs(1),
                            multiplier: 1.0,
                        },
                    )
                    .await
                    .unwrap();
                (acquired, started.elapsed())
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        store.release(&key(), &holder).await.unwrap();

        let (acquired, waited) = waiter.await.unwrap();
        assert!(acquired.is_some());
        assert!(waited < Duration::from_secs(1), "waiter should not sleep a full backoff");
    }

    #[tokio::test]
    async fn test_wait_bound_respected() {
        let store = InMemoryLockStore::new();
        let _holder = store.hold(&key(), Duration::from_secs(10));

        let started = Instant::now();
        let acquired = store
            .try_acquire_within(
                &key(),
                &LockToken::generate(),
                Duration::from_millis(100),
                Duration::from_secs(1),
                Backoff::default(),
            )
            .await
            .unwrap();

        assert!(acquired.is_none());
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_reply_delay_lands_effect_first() {
        let store = InMemoryLockStore::new();
        store.set_reply_delay(Duration::from_millis(100));

        let attempt = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .try_acquire(&key(), &LockToken::generate(), Duration::from_secs(5))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.is_held(&key()), "lease starts before the caller hears back");
        assert!(attempt.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_store_fails() {
        let store = InMemoryLockStore::new();
        store.set_unreachable(true);

        let result = store
            .try_acquire(&key(), &LockToken::generate(), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(LockError::Store(_))));
        assert_eq!(store.acquisitions(), 0);
    }
}
