//! # Tastebud Testing
//!
//! Testing utilities for lock coordination and protected sections.
//!
//! This crate provides:
//! - [`InMemoryLockStore`]: lease-based lock store shared by clones, with
//!   fault injection and a harness to pre-hold keys
//! - [`JournalTransactions`]: transaction manager whose writes only become
//!   visible on commit
//! - [`ExclusionRecorder`]: enter/exit recorder proving mutual exclusion
//! - [`FixedClock`]: deterministic time
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tastebud_runtime::{LockCoordinator, ProtectedExecutor};
//! use tastebud_testing::{InMemoryLockStore, JournalTransactions};
//!
//! #[tokio::test]
//! async fn test_section_commits() {
//!     let locks = InMemoryLockStore::new();
//!     let journal = JournalTransactions::new();
//!     let executor = ProtectedExecutor::new(
//!         LockCoordinator::new(Arc::new(locks)),
//!         journal.clone(),
//!         Default::default(),
//!     );
//!     // ...
//! }
//! ```

pub mod exclusion;
pub mod journal;
pub mod lock_store;

pub use exclusion::{ExclusionRecorder, ExclusionSpan};
pub use journal::{JournalTransactions, JournalTx};
pub use lock_store::InMemoryLockStore;
pub use mocks::{FixedClock, test_clock};

use chrono::{DateTime, Utc};
use tastebud_core::environment::Clock;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use tastebud_testing::mocks::FixedClock;
    /// use tastebud_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Install a `tracing` subscriber honouring `RUST_LOG`, once per process.
///
/// Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
