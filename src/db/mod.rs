//! High-level database handle.
//!
//! [`Database`] owns the pool, the transaction context shared by the manager
//! and the repositories, and the member schema.

mod api;

pub use api::{Database, DatabaseConfig, DatabaseError, DatabaseResult, DatabaseStats};
