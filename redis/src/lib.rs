//! # Tastebud Redis
//!
//! `Redis` implementation of [`tastebud_core::LockStore`].
//!
//! Every worker instance pointed at the same `Redis` shares one lock
//! namespace. Acquisition is a single `SET key token NX PX lease` and release
//! is a compare-and-delete script, so a holder whose lease already expired
//! can never free the lock of the next holder.

pub mod config;
pub mod store;

pub use config::RedisLockConfig;
pub use store::RedisLockStore;
