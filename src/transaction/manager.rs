//! Transaction manager - the only component that begins and ends transactions.
//!
//! The TransactionManager handles:
//! - Acquiring a connection and disabling auto-commit
//! - Binding it to the unit of work for the duration of the caller's work
//! - Committing or rolling back depending on how the work ended
//! - Restoring auto-commit, unbinding, and handing the connection back

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, warn};
use serde::Serialize;

use crate::connection::{Connection, ConnectionPool, RawError};
use crate::transaction::context::{BoundConnection, TransactionContext, UnitOfWorkKey};
use crate::transaction::error::{TransactionOutcome, TxError};

/// Counters over the manager's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransactionStats {
    pub committed: usize,
    pub rolled_back: usize,
    /// Units of work currently holding a connection.
    pub active: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Commit,
    Rollback,
}

/// Transaction manager.
///
/// Thread-safe: can be shared across threads via Clone (uses Arc internally).
pub struct TransactionManager<P: ConnectionPool> {
    inner: Arc<ManagerInner<P>>,
}

struct ManagerInner<P: ConnectionPool> {
    pool: Arc<P>,
    context: Arc<TransactionContext<P::Conn>>,
    committed: AtomicUsize,
    rolled_back: AtomicUsize,
}

impl<P: ConnectionPool> Clone for TransactionManager<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: ConnectionPool> TransactionManager<P> {
    /// Create a manager over a pool and the context shared with repositories.
    pub fn new(pool: Arc<P>, context: Arc<TransactionContext<P::Conn>>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                pool,
                context,
                committed: AtomicUsize::new(0),
                rolled_back: AtomicUsize::new(0),
            }),
        }
    }

    pub fn pool(&self) -> &Arc<P> {
        &self.inner.pool
    }

    pub fn context(&self) -> &Arc<TransactionContext<P::Conn>> {
        &self.inner.context
    }

    pub fn stats(&self) -> TransactionStats {
        TransactionStats {
            committed: self.inner.committed.load(Ordering::Relaxed),
            rolled_back: self.inner.rolled_back.load(Ordering::Relaxed),
            active: self.inner.context.bound_count(),
        }
    }

    /// Run `work` inside a transaction bound to `key`.
    ///
    /// If `work` returns Ok, the transaction is committed. If it returns Err
    /// or panics, the transaction is rolled back. Either way the connection
    /// is unbound and returned to the pool with its auto-commit flag as it
    /// was acquired before this returns (or before the panic resumes).
    pub fn run_in_transaction<T, E, F>(
        &self,
        key: &UnitOfWorkKey,
        work: F,
    ) -> Result<T, TxError<E>>
    where
        F: FnOnce(&UnitOfWorkKey) -> Result<T, E>,
    {
        self.begin(key)?;

        let mut guard = Completion {
            manager: self,
            key,
            armed: true,
        };
        let result = work(key);
        guard.armed = false;

        match result {
            Ok(value) => match self.complete(key, Decision::Commit) {
                Ok(()) => Ok(value),
                Err(e) => Err(TxError::CommitFailed(e)),
            },
            Err(e) => {
                // Rollback failures are logged inside; the caller sees the
                // failure that caused the rollback.
                let _ = self.complete(key, Decision::Rollback);
                Err(TxError::WorkFailed(e))
            }
        }
    }

    /// Run `work` inside a transaction under a freshly generated key.
    pub fn with_transaction<T, E, F>(&self, work: F) -> Result<T, TxError<E>>
    where
        F: FnOnce(&UnitOfWorkKey) -> Result<T, E>,
    {
        self.run_in_transaction(&UnitOfWorkKey::new(), work)
    }

    fn begin<E>(&self, key: &UnitOfWorkKey) -> Result<(), TxError<E>> {
        let conn = self
            .inner
            .pool
            .acquire()
            .map_err(TxError::AcquisitionFailed)?;
        let conn_id = conn.id();

        let mut bound = BoundConnection::new(conn);
        if let Err(e) = bound.connection_mut().set_auto_commit(false) {
            warn!("unit of work {key}: could not disable auto-commit on connection {conn_id}: {e}");
            self.hand_back(bound);
            return Err(TxError::BeginFailed(e));
        }

        if let Err(rejected) = self.inner.context.bind(key, bound) {
            warn!("unit of work {key}: {}", rejected.error);
            self.hand_back(rejected.bound);
            return Err(TxError::AlreadyInTransaction(key.clone()));
        }

        debug!("unit of work {key}: began on connection {conn_id}");
        Ok(())
    }

    /// Finish the transaction bound to `key` and hand its connection back.
    ///
    /// Only a commit failure is reported; rollback failures are logged.
    fn complete(&self, key: &UnitOfWorkKey, decision: Decision) -> Result<(), RawError> {
        let Some(mut bound) = self.inner.context.unbind(key) else {
            error!("unit of work {key}: binding removed before the transaction ended");
            return match decision {
                Decision::Commit => Err(RawError::new(
                    "transaction binding was removed before commit",
                )),
                Decision::Rollback => Ok(()),
            };
        };

        let conn_id = bound.connection().id();
        let result = match decision {
            Decision::Commit => bound.connection_mut().commit(),
            Decision::Rollback => {
                if let Err(e) = bound.connection_mut().rollback() {
                    warn!("unit of work {key}: rollback failed on connection {conn_id}: {e}");
                }
                Ok(())
            }
        };

        let outcome = if decision == Decision::Commit && result.is_ok() {
            self.inner.committed.fetch_add(1, Ordering::Relaxed);
            TransactionOutcome::Committed
        } else {
            self.inner.rolled_back.fetch_add(1, Ordering::Relaxed);
            TransactionOutcome::RolledBack
        };

        let elapsed = Utc::now() - bound.bound_at();
        debug!(
            "unit of work {key}: {outcome} on connection {conn_id} after {}ms",
            elapsed.num_milliseconds()
        );

        self.hand_back(bound);
        result
    }

    /// Restore the saved auto-commit flag and return the connection.
    ///
    /// A connection whose flag cannot be restored is discarded.
    fn hand_back(&self, bound: BoundConnection<P::Conn>) {
        let saved = bound.saved_auto_commit();
        let mut conn = bound.into_inner();

        match conn.set_auto_commit(saved) {
            Ok(()) => self.inner.pool.release(conn),
            Err(e) => {
                warn!(
                    "connection {}: could not restore auto-commit ({e}), discarding",
                    conn.id()
                );
                self.inner.pool.discard(conn);
            }
        }
    }
}

/// Rolls back and releases if the work unwinds before returning.
struct Completion<'a, P: ConnectionPool> {
    manager: &'a TransactionManager<P>,
    key: &'a UnitOfWorkKey,
    armed: bool,
}

impl<P: ConnectionPool> Drop for Completion<'_, P> {
    fn drop(&mut self) {
        if self.armed {
            warn!("unit of work {}: work did not return, rolling back", self.key);
            let _ = self.manager.complete(self.key, Decision::Rollback);
        }
    }
}

impl<P: ConnectionPool> std::fmt::Debug for TransactionManager<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("stats", &self.stats())
            .finish()
    }
}
