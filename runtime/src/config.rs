//! Lock configuration.
//!
//! Loads wait/lease bounds and acquisition backoff from environment variables
//! with sensible defaults. Callers should keep the lease comfortably above the
//! worst-case duration of a protected section and keep slow I/O (object
//! storage, external APIs) outside of it.

use crate::executor::DEFAULT_COMMIT_MARGIN;
use std::env;
use std::time::Duration;
use tastebud_core::lock::{Backoff, LockBounds, DEFAULT_LEASE, DEFAULT_WAIT};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A value that must be positive was zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    /// The commit margin leaves no lease for the protected section.
    #[error("commit margin {margin:?} must be below the lease {lease:?}")]
    MarginExceedsLease {
        /// Commit margin
        margin: Duration,
        /// Lease
        lease: Duration,
    },

    /// The backoff cap is below its starting delay.
    #[error("backoff max delay {max:?} is below initial delay {initial:?}")]
    BackoffInverted {
        /// Initial delay
        initial: Duration,
        /// Max delay
        max: Duration,
    },
}

/// Lock bounds and acquisition backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct LockConfig {
    /// Maximum time to queue for a lock.
    ///
    /// Default: 5 seconds (`LOCK_WAIT_MS`)
    pub wait: Duration,

    /// Maximum time a lock may be held before the store expires it.
    ///
    /// Default: 3 seconds (`LOCK_LEASE_MS`)
    pub lease: Duration,

    /// Backoff between single acquisition attempts.
    ///
    /// Default: 10ms doubling up to 200ms
    /// (`LOCK_BACKOFF_INITIAL_MS`, `LOCK_BACKOFF_MAX_MS`)
    pub backoff: Backoff,

    /// Lease time kept in reserve for the commit round trip.
    ///
    /// Default: 50ms (`LOCK_COMMIT_MARGIN_MS`)
    pub commit_margin: Duration,
}

impl LockConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            wait: env_millis("LOCK_WAIT_MS").unwrap_or(defaults.wait),
            lease: env_millis("LOCK_LEASE_MS").unwrap_or(defaults.lease),
            backoff: Backoff {
                initial_delay: env_millis("LOCK_BACKOFF_INITIAL_MS")
                    .unwrap_or(defaults.backoff.initial_delay),
                max_delay: env_millis("LOCK_BACKOFF_MAX_MS").unwrap_or(defaults.backoff.max_delay),
                multiplier: defaults.backoff.multiplier,
            },
            commit_margin: env_millis("LOCK_COMMIT_MARGIN_MS").unwrap_or(defaults.commit_margin),
        }
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

    /// Set the acquisition backoff.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the commit margin.
    #[must_use]
    pub const fn with_commit_margin(mut self, margin: Duration) -> Self {
        self.commit_margin = margin;
        self
    }

    /// The configured bounds.
    #[must_use]
    pub const fn bounds(&self) -> LockBounds {
        LockBounds::new(self.wait, self.lease)
    }

    /// Check the configuration for values the coordinator cannot honour.
    ///
    /// A zero wait is allowed: it means a single attempt.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the lease, commit margin or backoff is
    /// unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lease.is_zero() {
            return Err(ConfigError::Zero("lock lease"));
        }
        if self.commit_margin >= self.lease {
            return Err(ConfigError::MarginExceedsLease {
                margin: self.commit_margin,
                lease: self.lease,
            });
        }
        if self.backoff.initial_delay.is_zero() {
            return Err(ConfigError::Zero("backoff initial delay"));
        }
        if self.backoff.max_delay < self.backoff.initial_delay {
            return Err(ConfigError::BackoffInverted {
                initial: self.backoff.initial_delay,
                max: self.backoff.max_delay,
            });
        }
        Ok(())
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            wait: DEFAULT_WAIT,
            lease: DEFAULT_LEASE,
            backoff: Backoff::default(),
            commit_margin: DEFAULT_COMMIT_MARGIN,
        }
    }
}

fn env_millis(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = LockConfig::default();
        assert_eq!(config.bounds(), LockBounds::default());
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_zero_lease_rejected() {
        let config = LockConfig::default().with_lease(Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::Zero("lock lease")));
    }

    #[test]
    fn test_margin_must_leave_lease() {
        let config = LockConfig::default()
            .with_lease(Duration::from_millis(40))
            .with_commit_margin(Duration::from_millis(50));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MarginExceedsLease { .. })
        ));
    }

    #[test]
    fn test_zero_wait_allowed() {
        let config = LockConfig::default().with_wait(Duration::ZERO);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_inverted_backoff_rejected() {
        let config = LockConfig::default().with_backoff(Backoff {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(10),
            multiplier: 2.0,
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BackoffInverted { .. })
        ));
    }
}
