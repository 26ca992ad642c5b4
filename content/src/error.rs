//! Error types for aggregate mutation operations.

use crate::state::{MemberId, RestaurantId};
use std::time::Duration;
use tastebud_core::{LockError, TransactionError};
use thiserror::Error;

/// Result type alias for content operations.
pub type Result<T> = std::result::Result<T, ContentError>;

/// How a transport layer should treat a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The request broke a business rule; nothing was written.
    DomainError,
    /// The operation did not happen and left no trace; the caller may retry.
    NotExecuted,
    /// Infrastructure failure.
    Internal,
}

/// Every failure mode of the content operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContentError {
    // ═══════════════════════════════════════════════════════════
    // Coordination Errors (operation not executed)
    // ═══════════════════════════════════════════════════════════

    /// Another request held the target for the whole wait bound.
    #[error("Resource {key} is busy, gave up after {waited:?}")]
    ResourceBusy {
        /// Contended lock key
        key: String,
        /// How long the request queued
        waited: Duration,
    },

    /// The request was abandoned while queueing because of shutdown.
    #[error("Request for {key} was interrupted")]
    Interrupted {
        /// Lock key that was being waited for
        key: String,
    },

    /// The coordination store failed; the operation was not attempted.
    #[error("Coordination failure: {0}")]
    CoordinationFailure(String),

    /// The operation ran past its lease; its writes were rolled back.
    #[error("Lease on {key} expired before commit")]
    LeaseExpired {
        /// Lock key whose lease elapsed
        key: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Domain Errors
    // ═══════════════════════════════════════════════════════════

    /// The member already reviewed this restaurant.
    #[error("Member {member_id} already reviewed restaurant {restaurant_id}")]
    AlreadyReviewed {
        /// Author
        member_id: MemberId,
        /// Reviewed restaurant
        restaurant_id: RestaurantId,
    },

    /// The member does not own the resource.
    #[error("Member does not own this {resource}")]
    NotOwner {
        /// Kind of resource
        resource: &'static str,
    },

    /// The resource does not exist.
    #[error("{resource} {id} not found")]
    NotFound {
        /// Kind of resource
        resource: &'static str,
        /// Requested identifier
        id: String,
    },

    /// A counter would have gone negative.
    #[error("Counter {counter} would go below zero")]
    CounterUnderflow {
        /// Counter name
        counter: &'static str,
    },

    /// Rating outside 1..=5.
    #[error("Rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),

    /// Blank or oversized text.
    #[error("Invalid content: {0}")]
    InvalidContent(String),

    // ═══════════════════════════════════════════════════════════
    // Infrastructure Errors
    // ═══════════════════════════════════════════════════════════

    /// The persistence back-end failed.
    #[error("Database error: {0}")]
    Database(String),
}

impl ContentError {
    /// Not-found error for `resource` with identifier `id`.
    pub fn not_found(resource: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Whether the operation left no trace and was never applied.
    ///
    /// # Examples
    ///
    /// ```
    /// use tastebud_content::ContentError;
    /// use std::time::Duration;
    ///
    /// let busy = ContentError::ResourceBusy { key: "k".into(), waited: Duration::ZERO };
    /// assert!(busy.is_not_executed());
    /// assert!(!ContentError::NotOwner { resource: "comment" }.is_not_executed());
    /// ```
    #[must_use]
    pub const fn is_not_executed(&self) -> bool {
        matches!(
            self,
            Self::ResourceBusy { .. }
                | Self::Interrupted { .. }
                | Self::CoordinationFailure(_)
                | Self::LeaseExpired { .. }
        )
    }

    /// Whether the request broke a business rule.
    #[must_use]
    pub const fn is_domain_error(&self) -> bool {
        matches!(
            self,
            Self::AlreadyReviewed { .. }
                | Self::NotOwner { .. }
                | Self::NotFound { .. }
                | Self::CounterUnderflow { .. }
                | Self::InvalidRating(_)
                | Self::InvalidContent(_)
        )
    }

    /// Outcome class for transport mapping.
    #[must_use]
    pub const fn outcome(&self) -> Outcome {
        if self.is_domain_error() {
            Outcome::DomainError
        } else if self.is_not_executed() {
            Outcome::NotExecuted
        } else {
            Outcome::Internal
        }
    }
}

impl From<LockError> for ContentError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Unavailable { key, waited } => Self::ResourceBusy { key, waited },
            LockError::Interrupted { key } => Self::Interrupted { key },
            LockError::LeaseExpired { key, .. } => Self::LeaseExpired { key },
            LockError::Store(message) => Self::CoordinationFailure(message),
        }
    }
}

impl From<TransactionError> for ContentError {
    fn from(err: TransactionError) -> Self {
        Self::Database(err.to_string())
    }
}
