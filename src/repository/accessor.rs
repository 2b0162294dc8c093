//! Resolution of "the current connection" for a repository operation.

use std::sync::Arc;

use log::debug;

use crate::connection::{Connection, ConnectionPool, RawError};
use crate::transaction::{TransactionContext, UnitOfWorkKey};
use crate::translate::{translate, ErrorKind, SemanticError};

/// Gives repository operations a connection without them knowing whether a
/// transaction is active.
///
/// If the unit of work has a bound connection, operations run on it and
/// leave it bound. Otherwise an ad-hoc connection is borrowed from the pool
/// in auto-commit mode for that single operation and returned right after.
pub struct ConnectionAccessor<P: ConnectionPool> {
    pool: Arc<P>,
    context: Arc<TransactionContext<P::Conn>>,
}

impl<P: ConnectionPool> Clone for ConnectionAccessor<P> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            context: self.context.clone(),
        }
    }
}

impl<P: ConnectionPool> ConnectionAccessor<P> {
    pub fn new(pool: Arc<P>, context: Arc<TransactionContext<P::Conn>>) -> Self {
        Self { pool, context }
    }

    /// Run `f` on the current connection for `key`.
    ///
    /// Backend failures are translated using `operation` and `statement`.
    pub fn with_connection<R>(
        &self,
        key: &UnitOfWorkKey,
        operation: &str,
        statement: &str,
        f: impl FnOnce(&mut P::Conn) -> Result<R, RawError>,
    ) -> Result<R, SemanticError> {
        let mut pending = Some(f);
        if let Ok(Some(result)) = self
            .context
            .lookup(key, |conn| pending.take().map(|f| f(conn)))
        {
            return result.map_err(|raw| translate(operation, statement, raw));
        }

        // Not bound, so the closure above never ran.
        let Some(f) = pending.take() else {
            return Err(SemanticError::new(ErrorKind::Unknown, operation, statement)
                .with_message("transaction binding vanished during lookup"));
        };

        let mut lease = Lease::acquire(self.pool.as_ref())
            .map_err(|e| SemanticError::unavailable(operation, statement, e))?;
        debug!(
            "{operation}: no transaction for unit of work {key}, using connection {}",
            lease.conn().id()
        );

        f(lease.conn()).map_err(|raw| translate(operation, statement, raw))
    }
}

/// An ad-hoc connection that goes back to the pool when dropped.
struct Lease<'a, P: ConnectionPool> {
    pool: &'a P,
    conn: Option<P::Conn>,
}

impl<'a, P: ConnectionPool> Lease<'a, P> {
    fn acquire(pool: &'a P) -> Result<Self, crate::connection::PoolError> {
        let conn = pool.acquire()?;
        Ok(Self {
            pool,
            conn: Some(conn),
        })
    }

    fn conn(&mut self) -> &mut P::Conn {
        // Only emptied in drop.
        match self.conn.as_mut() {
            Some(conn) => conn,
            None => unreachable!("lease used after release"),
        }
    }
}

impl<P: ConnectionPool> Drop for Lease<'_, P> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
