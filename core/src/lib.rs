//! # Tastebud Core
//!
//! Core traits and types for protected aggregate mutations.
//!
//! This crate defines the seams between the critical-section executor and the
//! outside world, without performing any I/O itself:
//!
//! - **Lock keys, tokens and bounds**: what a caller asks the coordination
//!   store for
//! - **`LockStore`**: client of the coordination store shared by all workers
//! - **`TransactionManager`**: explicit, independent transaction handles
//! - **`Clock`**: injected time source
//!
//! ## Example
//!
//! ```ignore
//! use tastebud_core::lock::{LockBounds, LockKey, LockStore, LockToken};
//!
//! async fn once(store: &impl LockStore) -> tastebud_core::lock::Result<bool> {
//!     let key = LockKey::new("reaction-review", 7);
//!     let token = LockToken::generate();
//!     let bounds = LockBounds::default();
//!     store.try_acquire(&key, &token, bounds.lease).await
//! }
//! ```

pub mod error;
pub mod lock;
pub mod transaction;

pub use chrono::{DateTime, Utc};
pub use error::{LockError, TransactionError};
pub use lock::{Backoff, LockBounds, LockHandle, LockKey, LockStore, LockToken, ReleaseOutcome};
pub use transaction::TransactionManager;

/// Environment module - injected dependencies
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use tastebud_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
