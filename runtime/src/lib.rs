//! Runtime for protected aggregate mutations.
//!
//! This crate provides the two moving parts of the critical-section
//! executor:
//!
//! - [`LockCoordinator`]: acquires named, lease-based locks within a wait
//!   bound and guarantees a single release per acquisition
//! - [`ProtectedExecutor`]: runs a unit of work under a lock, inside a fresh
//!   transaction that is committed or rolled back before the lock is released
//!
//! plus lock configuration and Prometheus metrics.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tastebud_runtime::{LockConfig, LockCoordinator, ProtectedExecutor};
//!
//! let config = LockConfig::from_env();
//! config.validate()?;
//!
//! let coordinator = LockCoordinator::new(Arc::new(lock_store)).with_backoff(config.backoff);
//! let executor = ProtectedExecutor::new(coordinator, content_store, config.bounds())
//!     .with_commit_margin(config.commit_margin);
//! ```

pub mod config;
pub mod coordinator;
pub mod executor;
pub mod metrics;

pub use config::{ConfigError, LockConfig};
pub use coordinator::{LockCoordinator, LockGuard, LockSet};
pub use executor::{DEFAULT_COMMIT_MARGIN, ProtectedExecutor};
pub use metrics::{MetricsError, PrometheusMetrics};
pub use futures::future::BoxFuture;
