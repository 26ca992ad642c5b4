//! Mock implementations for testing.
//!
//! Available with the `test-utils` feature (on by default).

pub mod content_store;

pub use content_store::{InMemoryContentStore, MemoryTx};
