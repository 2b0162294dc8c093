//! Connection and pool contracts, plus the SQLite implementation.
//!
//! Everything above this module talks to a database through two traits:
//!
//! - [`Connection`]: one physical session with an auto-commit flag.
//! - [`ConnectionPool`]: hands out reusable connections and takes them back.
//!
//! The pool never resets per-borrower settings. Whoever borrowed a
//! connection is responsible for handing it back with its auto-commit flag
//! as it found it.

mod error;
mod sqlite;

use std::collections::BTreeMap;

pub use error::{PoolError, RawError};
pub use sqlite::{PoolConfig, PoolStats, SqliteConnection, SqlitePool};

/// A statement parameter or column value.
pub type Value = serde_json::Value;

/// A result row keyed by column name.
pub type Row = BTreeMap<String, Value>;

/// A physical database session.
pub trait Connection: Send {
    /// Pool-local identifier, used for logging.
    fn id(&self) -> usize;

    /// Whether each statement commits on its own.
    fn auto_commit(&self) -> bool;

    /// Enable or disable auto-commit. Disabling marks a transaction boundary.
    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), RawError>;

    /// Commit the work done since auto-commit was disabled.
    fn commit(&mut self) -> Result<(), RawError>;

    /// Discard the work done since auto-commit was disabled.
    fn rollback(&mut self) -> Result<(), RawError>;

    /// Run a data-modifying statement, returning the affected row count.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<usize, RawError>;

    /// Run a query, returning every row.
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, RawError>;
}

/// A source of reusable connections.
pub trait ConnectionPool: Send + Sync {
    type Conn: Connection;

    /// Borrow a connection, blocking until one is available.
    fn acquire(&self) -> Result<Self::Conn, PoolError>;

    /// Return a connection for reuse.
    fn release(&self, conn: Self::Conn);

    /// Give up a connection that must not be reused.
    fn discard(&self, conn: Self::Conn) {
        drop(conn);
    }
}
