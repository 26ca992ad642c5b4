//! Explicit transaction handles.
//!
//! A protected section never inherits an ambient transaction. It receives a
//! handle opened by [`TransactionManager::begin`] and the handle is committed
//! or rolled back before the lock guarding it is released.

use crate::error::TransactionError;
use std::future::Future;

/// Result type for transaction operations.
pub type Result<T> = std::result::Result<T, TransactionError>;

/// Opens, commits and rolls back independent transactions.
///
/// Dropping a handle without committing must discard its writes.
///
/// # Example
///
/// ```ignore
/// let mut tx = store.begin().await?;
/// store.insert_review(&mut tx, &review).await?;
/// store.commit(tx).await?;
/// ```
pub trait TransactionManager: Send + Sync + 'static {
    /// Transaction handle passed to the unit of work.
    type Tx: Send + 'static;

    /// Open a new transaction, independent of any other open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::Begin`] if the back-end refuses.
    fn begin(&self) -> impl Future<Output = Result<Self::Tx>> + Send;

    /// Make every write of `tx` durable and visible to later transactions.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::Commit`] if the writes could not be made
    /// durable; none of them are visible in that case.
    fn commit(&self, tx: Self::Tx) -> impl Future<Output = Result<()>> + Send;

    /// Discard every write of `tx`.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::Rollback`] if the back-end reports a
    /// failure; the writes are discarded regardless.
    fn rollback(&self, tx: Self::Tx) -> impl Future<Output = Result<()>> + Send;
}
