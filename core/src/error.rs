//! Error types for lock coordination and transactions.

use std::time::Duration;
use thiserror::Error;

/// Failures to obtain or talk to a named lock.
///
/// None of these mean the protected section ran.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The lock could not be acquired within the wait bound.
    #[error("Lock {key} unavailable after waiting {waited:?}")]
    Unavailable {
        /// Contended key
        key: String,
        /// How long the caller queued
        waited: Duration,
    },

    /// The wait was abandoned because the process is shutting down.
    #[error("Wait for lock {key} was interrupted")]
    Interrupted {
        /// Key that was being waited for
        key: String,
    },

    /// The lease ran out, or was about to, before the protected section could
    /// commit; its writes were rolled back.
    #[error("Lease on {key} held for {held:?} left no time to commit, changes rolled back")]
    LeaseExpired {
        /// Key whose lease ran out
        key: String,
        /// How long the lock had been held
        held: Duration,
    },

    /// The coordination store failed or answered ambiguously.
    #[error("Coordination store error: {0}")]
    Store(String),
}

impl LockError {
    /// Returns `true` if the lock was held by someone else for the whole wait.
    ///
    /// # Examples
    ///
    /// ```
    /// # use tastebud_core::LockError;
    /// # use std::time::Duration;
    /// let err = LockError::Unavailable { key: "k".into(), waited: Duration::ZERO };
    /// assert!(err.is_contention());
    /// assert!(!LockError::Store("down".into()).is_contention());
    /// ```
    #[must_use]
    pub const fn is_contention(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Failures of the transactional scope around a protected section.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// A transaction could not be opened.
    #[error("Failed to begin transaction: {0}")]
    Begin(String),

    /// A transaction could not be committed; none of its writes are visible.
    #[error("Failed to commit transaction: {0}")]
    Commit(String),

    /// A rollback reported a failure.
    #[error("Failed to roll back transaction: {0}")]
    Rollback(String),

    /// A statement inside the transaction failed.
    #[error("Query failed: {0}")]
    Query(String),
}
