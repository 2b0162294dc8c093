//! Semantic data-access errors.

use std::error::Error as StdError;
use std::fmt;

use serde::Serialize;

use crate::connection::{PoolError, RawError};

/// Backend-independent classification of a data-access failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// The requested record does not exist.
    NotFound,
    /// An integrity or uniqueness rule rejected the change.
    Conflict,
    /// The backend could not be reached or is too busy to answer.
    Unavailable,
    /// The statement itself is malformed.
    InvalidRequest,
    /// Anything not recognized above.
    Unknown,
}

impl ErrorKind {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::Unavailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::InvalidRequest => "invalid request",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A classified data-access failure, with the operation and statement that
/// produced it and the underlying cause.
#[derive(Debug)]
pub struct SemanticError {
    kind: ErrorKind,
    operation: String,
    statement: String,
    message: Option<String>,
    cause: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl SemanticError {
    pub fn new(
        kind: ErrorKind,
        operation: impl Into<String>,
        statement: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            operation: operation.into(),
            statement: statement.into(),
            message: None,
            cause: None,
        }
    }

    /// A missing-record error. Carries no cause: nothing failed underneath.
    pub fn not_found(
        operation: impl Into<String>,
        statement: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::new(ErrorKind::NotFound, operation, statement).with_message(detail)
    }

    /// The pool could not hand out a connection for the operation.
    pub fn unavailable(
        operation: impl Into<String>,
        statement: impl Into<String>,
        cause: PoolError,
    ) -> Self {
        Self::new(ErrorKind::Unavailable, operation, statement).with_cause(cause)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_cause(mut self, cause: impl StdError + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// The backend error this was translated from, if any.
    pub fn raw(&self) -> Option<&RawError> {
        self.cause.as_deref()?.downcast_ref::<RawError>()
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == ErrorKind::Conflict
    }
}

impl fmt::Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} during {}", self.kind, self.operation)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        } else if let Some(cause) = &self.cause {
            write!(f, ": {cause}")?;
        }
        if !self.statement.is_empty() {
            write!(f, " [{}]", self.statement)?;
        }
        Ok(())
    }
}

impl StdError for SemanticError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}
