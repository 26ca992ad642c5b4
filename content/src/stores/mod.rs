//! Storage back-ends.

pub mod postgres;

pub use postgres::PostgresContentStore;
