use thiserror::Error;

use crate::{
    dao::storage::StorageError,
    state::match_machine::InvalidTransition,
    state::scoring::PenaltyUnderflow,
};

/// Errors that can occur in service layer operations.
///
/// Every variant flows back to the acting connection as a `commandRejected`
/// or `operationFailed` event; nothing here terminates the process.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl ServiceError {
    /// Whether this error stems from storage being down rather than from the
    /// client's request.
    pub fn is_storage_outage(&self) -> bool {
        matches!(self, ServiceError::Unavailable(_) | ServiceError::Degraded)
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

impl From<PenaltyUnderflow> for ServiceError {
    fn from(err: PenaltyUnderflow) -> Self {
        ServiceError::InvalidInput(err.to_string())
    }
}
