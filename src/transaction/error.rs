//! Transaction error types.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::connection::{PoolError, RawError};
use crate::transaction::context::UnitOfWorkKey;

/// How a transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransactionOutcome {
    Committed,
    RolledBack,
}

impl fmt::Display for TransactionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionOutcome::Committed => f.write_str("committed"),
            TransactionOutcome::RolledBack => f.write_str("rolled back"),
        }
    }
}

/// Errors from the transaction context registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The unit of work already has a bound connection.
    #[error("unit of work {0} already has a bound connection")]
    AlreadyBound(UnitOfWorkKey),

    /// Nothing is bound for the unit of work.
    #[error("no active transaction for unit of work {0}")]
    NoActiveTransaction(UnitOfWorkKey),
}

/// Errors from [`TransactionManager::run_in_transaction`].
///
/// `E` is the error type of the caller-supplied work.
///
/// [`TransactionManager::run_in_transaction`]: crate::transaction::TransactionManager::run_in_transaction
#[derive(Debug, Error)]
pub enum TxError<E> {
    /// The pool could not provide a connection. Nothing was started.
    #[error("could not acquire a connection: {0}")]
    AcquisitionFailed(#[source] PoolError),

    /// Auto-commit could not be disabled on the fresh connection.
    #[error("could not begin transaction: {0}")]
    BeginFailed(#[source] RawError),

    /// The unit of work is already inside a transaction.
    #[error("unit of work {0} is already in a transaction")]
    AlreadyInTransaction(UnitOfWorkKey),

    /// The work succeeded but the commit did not.
    #[error("commit failed: {0}")]
    CommitFailed(#[source] RawError),

    /// The work itself failed; the transaction was rolled back.
    #[error("unit of work failed: {0}")]
    WorkFailed(#[source] E),
}

impl<E> TxError<E> {
    /// The outcome of the transaction this error ended, if one was started.
    pub fn outcome(&self) -> Option<TransactionOutcome> {
        match self {
            TxError::CommitFailed(_) | TxError::WorkFailed(_) => {
                Some(TransactionOutcome::RolledBack)
            }
            TxError::AcquisitionFailed(_)
            | TxError::BeginFailed(_)
            | TxError::AlreadyInTransaction(_) => None,
        }
    }

    /// The work's own error, if that is what ended the transaction.
    pub fn work_error(&self) -> Option<&E> {
        match self {
            TxError::WorkFailed(e) => Some(e),
            _ => None,
        }
    }

    /// Unwrap the work's own error.
    pub fn into_work_error(self) -> Option<E> {
        match self {
            TxError::WorkFailed(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_outcome_classification() {
        let failed: TxError<String> = TxError::WorkFailed("boom".to_string());
        assert_eq!(failed.outcome(), Some(TransactionOutcome::RolledBack));
        assert_eq!(failed.work_error().map(String::as_str), Some("boom"));

        let commit: TxError<String> = TxError::CommitFailed(RawError::with_code(5, "busy"));
        assert_eq!(commit.outcome(), Some(TransactionOutcome::RolledBack));
        assert!(commit.work_error().is_none());

        let acquire: TxError<String> = TxError::AcquisitionFailed(PoolError::Timeout {
            waited: Duration::from_millis(10),
        });
        assert_eq!(acquire.outcome(), None);
    }

    #[test]
    fn test_error_messages() {
        let key = UnitOfWorkKey::from("01hzz0000000000000000000aa");
        let err = ContextError::NoActiveTransaction(key.clone());
        assert_eq!(
            err.to_string(),
            "no active transaction for unit of work 01hzz0000000000000000000aa"
        );

        let err: TxError<std::io::Error> = TxError::AlreadyInTransaction(key);
        assert!(err.to_string().contains("already in a transaction"));
    }
}
