//! Service layer errors.

use thiserror::Error;

use crate::translate::SemanticError;

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors raised by business logic.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A data-access operation failed.
    #[error("data access error: {0}")]
    Data(#[from] SemanticError),

    /// A business rule rejected the operation.
    #[error("validation failed: {0}")]
    Validation(String),
}
