//! Named, lease-based locks shared by every worker instance.
//!
//! A [`LockStore`] is the client of the external coordination store. It only
//! knows how to make a single acquisition attempt for a key and how to release
//! a key it owns; the waiting policy lives in
//! [`LockStore::try_acquire_within`], which back-ends may override when they
//! can wake waiters more promptly than polling.
//!
//! Ownership is tracked with a [`LockToken`]. A store must only release a key
//! whose stored token equals the caller's token, so a holder whose lease has
//! already elapsed can never release the lock of the next holder.

use crate::error::LockError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Result type for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;

/// Default time a caller queues for a lock.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

/// Default time a lock may be held before the store force-expires it.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(3);

/// Identifies the shared resource being protected.
///
/// Keys are built by typed key-builder functions, typically
/// `"<operation>-<target id>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LockKey(String);

impl LockKey {
    /// Create a key from an operation name and a target identity.
    ///
    /// # Examples
    ///
    /// ```
    /// use tastebud_core::lock::LockKey;
    ///
    /// let key = LockKey::new("reaction-review", 42);
    /// assert_eq!(key.as_str(), "reaction-review-42");
    /// ```
    #[must_use]
    pub fn new(operation: &str, target: impl fmt::Display) -> Self {
        Self(format!("{operation}-{target}"))
    }

    /// Borrow the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LockKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Owner identity of one acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockToken(String);

impl LockToken {
    /// Generate a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wait and lease bounds for one acquisition.
///
/// Callers must keep `lease` strictly greater than the worst-case duration of
/// the protected section. When a holder exceeds its lease the store expires
/// the lock and a second worker may enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockBounds {
    /// Maximum time to queue for the lock.
    pub wait: Duration,
    /// Maximum time the lock may be held.
    pub lease: Duration,
}

impl LockBounds {
    /// Create bounds from explicit durations.
    #[must_use]
    pub const fn new(wait: Duration, lease: Duration) -> Self {
        Self { wait, lease }
    }

    /// Set the wait bound.
    #[must_use]
    pub const fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Set the lease bound.
    #[must_use]
    pub const fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }
}

impl Default for LockBounds {
    fn default() -> Self {
        Self::new(DEFAULT_WAIT, DEFAULT_LEASE)
    }
}

/// One successfully acquired lock.
///
/// Created per invocation, never persisted and released exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    /// The protected key.
    pub key: LockKey,
    /// Owner token stored alongside the key.
    pub token: LockToken,
    /// Bounds the lock was acquired with.
    pub bounds: LockBounds,
    /// Wall-clock acquisition time, for logs.
    pub acquired_at: DateTime<Utc>,
    /// Monotonic time just before the winning attempt was sent.
    ///
    /// The store cannot have started the lease earlier, so lease accounting
    /// from this instant includes the attempt's round trip and never
    /// undercounts.
    pub lease_started: Instant,
}

impl LockHandle {
    /// Time elapsed since the lease may have started.
    #[must_use]
    pub fn held_for(&self) -> Duration {
        self.lease_started.elapsed()
    }

    /// Whether the lease has run out according to the local clock.
    #[must_use]
    pub fn lease_elapsed(&self) -> bool {
        self.lease_expires_within(Duration::ZERO)
    }

    /// Whether the lease runs out within `margin` from now.
    #[must_use]
    pub fn lease_expires_within(&self, margin: Duration) -> bool {
        self.held_for().saturating_add(margin) >= self.bounds.lease
    }
}

/// Result of releasing a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The caller's token was stored and the key was deleted.
    Released,
    /// The key was gone or owned by another token: the lease had elapsed.
    AlreadyExpired,
    /// The store could not be reached; the lease will expire on its own.
    Unconfirmed,
}

/// Capped exponential backoff between single acquisition attempts.
///
/// # Default Values
///
/// - `initial_delay`: 10ms
/// - `max_delay`: 200ms
/// - `multiplier`: 2.0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Cap for the exponential growth.
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(200),
            multiplier: 2.0,
        }
    }
}

impl Backoff {
    /// Delay before attempt `attempt + 1`.
    ///
    /// Uses `initial_delay * multiplier ^ attempt`, capped at `max_delay`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let exponent = attempt.min(32) as i32;
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);

        if !delay_ms.is_finite() || delay_ms >= self.max_delay.as_millis() as f64 {
            self.max_delay
        } else {
            Duration::from_millis(delay_ms as u64)
        }
    }
}

/// Client of the coordination store shared by all worker instances.
///
/// Implementations must guarantee that acquisition is mutually exclusive
/// across every process sharing the store, and that a lease expires on its
/// own when the holder never releases it.
pub trait LockStore: Send + Sync + 'static {
    /// Make a single, non-blocking attempt to own `key` for `lease`.
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: the key is now owned by `token`
    /// - `Ok(false)`: the key is held by another token
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`] if the store cannot be reached or gives
    /// an ambiguous answer. Callers treat this as acquisition failure.
    fn try_acquire(
        &self,
        key: &LockKey,
        token: &LockToken,
        lease: Duration,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Release `key` if and only if it is still owned by `token`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`] if the store cannot be reached.
    fn release(
        &self,
        key: &LockKey,
        token: &LockToken,
    ) -> impl Future<Output = Result<ReleaseOutcome>> + Send;

    /// Keep attempting to own `key` until `wait` elapses.
    ///
    /// The default implementation polls [`LockStore::try_acquire`] with the
    /// given backoff, never sleeping past the deadline. One attempt is always
    /// made, even with a zero wait bound.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(sent_at))`: the key is owned by `token`; `sent_at` is the
    ///   instant just before the winning attempt was sent
    /// - `Ok(None)`: the key stayed held by another token for the whole wait
    ///
    /// # Errors
    ///
    /// Propagates the first store fault; a fault is never read as success.
    fn try_acquire_within(
        &self,
        key: &LockKey,
        token: &LockToken,
        wait: Duration,
        lease: Duration,
        backoff: Backoff,
    ) -> impl Future<Output = Result<Option<Instant>>> + Send {
        async move {
            let deadline = Instant::now() + wait;
            let mut attempt = 0;

            loop {
                let sent_at = Instant::now();
                if self.try_acquire(key, token, lease).await? {
                    return Ok(Some(sent_at));
                }

                let now = Instant::now();
                if now >= deadline {
                    return Ok(None);
                }

                let delay = backoff.delay_for_attempt(attempt).min(deadline - now);
                tokio::time::sleep(delay).await;
                attempt = attempt.saturating_add(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        let key = LockKey::new("comment-post", "abc");
        assert_eq!(key.to_string(), "comment-post-abc");
    }

    #[test]
    fn test_keys_sort_by_string() {
        let mut keys = vec![LockKey::from("b-1"), LockKey::from("a-2")];
        keys.sort();
        assert_eq!(keys[0].as_str(), "a-2");
    }

    #[test]
    fn test_tokens_are_unique() {
        assert_ne!(LockToken::generate(), LockToken::generate());
    }

    #[test]
    fn test_default_bounds() {
        let bounds = LockBounds::default();
        assert_eq!(bounds.wait, Duration::from_secs(5));
        assert_eq!(bounds.lease, Duration::from_secs(3));
    }

    fn handle(lease: Duration, held: Duration) -> LockHandle {
        LockHandle {
            key: LockKey::from("k"),
            token: LockToken::generate(),
            bounds: LockBounds::new(Duration::ZERO, lease),
            acquired_at: Utc::now(),
            lease_started: Instant::now().checked_sub(held).unwrap_or_else(Instant::now),
        }
    }

    #[test]
    fn test_commit_margin_counts_against_lease() {
        let handle = handle(Duration::from_secs(3), Duration::from_millis(2_900));
        assert!(!handle.lease_elapsed());
        assert!(handle.lease_expires_within(Duration::from_millis(200)));
    }

    #[test]
    fn test_lease_elapsed_after_lease() {
        let handle = handle(Duration::from_millis(100), Duration::from_millis(150));
        assert!(handle.lease_elapsed());
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay_for_attempt(0), Duration::from_millis(10));
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_millis(20));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_millis(80));
        assert_eq!(backoff.delay_for_attempt(10), Duration::from_millis(200));
        assert_eq!(backoff.delay_for_attempt(u32::MAX), Duration::from_millis(200));
    }
}
