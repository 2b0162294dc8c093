//! Transaction context: which connection belongs to which unit of work.
//!
//! The registry maps a [`UnitOfWorkKey`] to at most one [`BoundConnection`].
//! Keys are passed explicitly by callers rather than read from thread-local
//! state, so a unit of work may hop threads as long as it stays sequential.
//!
//! Ownership of a bound connection stays with the registry. Repository code
//! borrows it for the length of a closure via [`TransactionContext::lookup`];
//! only the transaction manager binds and unbinds.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use ulid::Ulid;

use crate::connection::Connection;
use crate::transaction::error::ContextError;

/// Identity of one logical unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitOfWorkKey(Arc<str>);

impl UnitOfWorkKey {
    /// Generate a fresh, unique key.
    pub fn new() -> Self {
        Self(Ulid::new().to_string().to_lowercase().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UnitOfWorkKey {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for UnitOfWorkKey {
    fn from(s: &str) -> Self {
        Self(s.into())
    }
}

impl fmt::Display for UnitOfWorkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A connection held for a unit of work, with the state needed to hand it
/// back to the pool as it was found.
#[derive(Debug)]
pub struct BoundConnection<C> {
    conn: C,
    saved_auto_commit: bool,
    bound_at: DateTime<Utc>,
}

impl<C: Connection> BoundConnection<C> {
    /// Wrap a connection, remembering its auto-commit flag as given.
    ///
    /// Call this before changing the flag.
    pub fn new(conn: C) -> Self {
        let saved_auto_commit = conn.auto_commit();
        Self {
            conn,
            saved_auto_commit,
            bound_at: Utc::now(),
        }
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    /// The auto-commit flag the connection had before the transaction.
    pub fn saved_auto_commit(&self) -> bool {
        self.saved_auto_commit
    }

    pub fn bound_at(&self) -> DateTime<Utc> {
        self.bound_at
    }

    pub fn into_inner(self) -> C {
        self.conn
    }
}

/// A bind attempt that was refused. Carries the connection back so the
/// caller can release it.
#[derive(Debug)]
pub struct BindRejected<C> {
    pub error: ContextError,
    pub bound: BoundConnection<C>,
}

type Slot<C> = Arc<Mutex<Option<BoundConnection<C>>>>;

/// Registry of bound connections, keyed by unit of work.
pub struct TransactionContext<C> {
    bindings: RwLock<HashMap<UnitOfWorkKey, Slot<C>>>,
}

impl<C: Connection> TransactionContext<C> {
    pub fn new() -> Self {
        Self {
            bindings: RwLock::new(HashMap::new()),
        }
    }

    /// Bind a connection to `key`. Refused if `key` is already bound.
    pub fn bind(
        &self,
        key: &UnitOfWorkKey,
        bound: BoundConnection<C>,
    ) -> Result<(), BindRejected<C>> {
        let mut bindings = self.bindings.write();
        if bindings.contains_key(key) {
            return Err(BindRejected {
                error: ContextError::AlreadyBound(key.clone()),
                bound,
            });
        }
        bindings.insert(key.clone(), Arc::new(Mutex::new(Some(bound))));
        Ok(())
    }

    /// Run `f` against the connection bound to `key`.
    pub fn lookup<R>(
        &self,
        key: &UnitOfWorkKey,
        f: impl FnOnce(&mut C) -> R,
    ) -> Result<R, ContextError> {
        // Only hold the map lock long enough to find the slot.
        let slot = self
            .bindings
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| ContextError::NoActiveTransaction(key.clone()))?;

        let mut guard = slot.lock();
        match guard.as_mut() {
            Some(bound) => Ok(f(bound.connection_mut())),
            // Unbound between the map read and the slot lock.
            None => Err(ContextError::NoActiveTransaction(key.clone())),
        }
    }

    /// Remove the binding for `key`, returning it. `None` if nothing was bound.
    ///
    /// Waits for an in-flight [`lookup`](Self::lookup) on the same key to
    /// finish before taking the connection.
    pub fn unbind(&self, key: &UnitOfWorkKey) -> Option<BoundConnection<C>> {
        let slot = self.bindings.write().remove(key)?;
        let bound = slot.lock().take();
        bound
    }

    pub fn is_bound(&self, key: &UnitOfWorkKey) -> bool {
        self.bindings.read().contains_key(key)
    }

    /// Number of units of work currently holding a connection.
    pub fn bound_count(&self) -> usize {
        self.bindings.read().len()
    }
}

impl<C: Connection> Default for TransactionContext<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for TransactionContext<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("bound", &self.bindings.read().len())
            .finish()
    }
}
