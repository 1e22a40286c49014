//! Application-level errors (wraps domain errors)

use thiserror::Error;

use crate::domain::DomainError;

/// Failure of a remote persistence call.
///
/// Timeouts, transport errors and rejections by the store all end up here;
/// the engine treats them the same way and rolls back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("sync failed during {operation}: {message}")]
pub struct SyncFailure {
    pub operation: String,
    pub message: String,
}

impl SyncFailure {
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Application errors wrap domain errors and add application-level context.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error("{0}")]
    Sync(#[from] SyncFailure),

    /// The edit was buffered behind a pending store call
    #[error("{operation} is waiting for a pending change to settle")]
    Deferred { operation: String },

    #[error("config error: {message}")]
    Config { message: String },
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
