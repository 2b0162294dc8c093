//! Backend and pool error types.
//!
//! `RawError` is the driver-level failure value: whatever the backend
//! reported, with its vendor code and SQLSTATE when it has them. It is
//! deliberately unclassified; see [`crate::translate`] for that.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// A backend-specific failure carrying an implementation-defined code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawError {
    /// Vendor error code (for SQLite, the extended result code).
    code: Option<i32>,
    /// Five-character SQLSTATE, if the backend reports one.
    sqlstate: Option<String>,
    /// Driver message.
    message: String,
}

impl RawError {
    /// Create an error without a vendor code or SQLSTATE.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            sqlstate: None,
            message: message.into(),
        }
    }

    /// Create an error carrying a vendor code.
    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            sqlstate: None,
            message: message.into(),
        }
    }

    /// Create an error carrying a SQLSTATE.
    pub fn with_sqlstate(sqlstate: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: None,
            sqlstate: Some(sqlstate.into()),
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub fn sqlstate(&self) -> Option<&str> {
        self.sqlstate.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for RawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        match (&self.code, &self.sqlstate) {
            (Some(code), Some(state)) => write!(f, " (code {code}, sqlstate {state})"),
            (Some(code), None) => write!(f, " (code {code})"),
            (None, Some(state)) => write!(f, " (sqlstate {state})"),
            (None, None) => Ok(()),
        }
    }
}

impl std::error::Error for RawError {}

impl From<rusqlite::Error> for RawError {
    fn from(e: rusqlite::Error) -> Self {
        use rusqlite::Error as E;

        match e {
            E::SqliteFailure(ffi, msg) => {
                let message = msg.unwrap_or_else(|| ffi.to_string());
                RawError::with_code(ffi.extended_code, message)
            }
            // Statement/parameter shape mismatches never reach the engine,
            // so they carry no vendor code. Report them as dynamic SQL errors.
            E::InvalidParameterCount(..)
            | E::InvalidParameterName(_)
            | E::InvalidColumnIndex(_)
            | E::InvalidColumnName(_)
            | E::MultipleStatement
            | E::ExecuteReturnedResults => RawError::with_sqlstate("07000", e.to_string()),
            E::InvalidColumnType(..) | E::FromSqlConversionFailure(..) => {
                RawError::with_sqlstate("22000", e.to_string())
            }
            other => RawError::new(other.to_string()),
        }
    }
}

/// Errors returned by a connection pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// No connection became available in time.
    #[error("timed out after {}ms waiting for a connection", .waited.as_millis())]
    Timeout { waited: Duration },

    /// Opening a new physical connection failed.
    #[error("failed to open connection: {0}")]
    Connect(#[source] RawError),
}
