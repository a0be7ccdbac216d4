//! Database module
//!
//! Persistence behind the [`Store`] contract:
//! - PostgreSQL connection pool and embedded migrations
//! - Row types with FromRow
//! - Repository pattern for data access
//! - An in-process store for database-less runs and tests

pub mod memory;
pub mod models;
pub mod pg_store;
pub mod pool;
pub mod repository;
pub mod store;

// Re-export commonly used items
pub use memory::MemoryStore;
pub use pg_store::PgStore;
pub use pool::{create_pool, run_migrations};
pub use store::{SnapshotCommit, Store};
