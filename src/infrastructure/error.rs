//! Store and file errors

use std::path::PathBuf;

use thiserror::Error;

use crate::application::{ApplicationError, SyncFailure};

/// Failures of the store adapters, plus anything the editors reported.
#[derive(Error, Debug)]
pub enum InfraError {
    #[error("{0}")]
    Application(#[from] ApplicationError),

    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid store file {}: {message}", path.display())]
    Format { path: PathBuf, message: String },

    /// The store refused the request
    #[error("rejected: {message}")]
    Rejected { message: String },
}

impl InfraError {
    /// Create an I/O error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Collapse into the failure the editors roll back on.
    pub fn into_sync_failure(self, operation: &str) -> SyncFailure {
        match self {
            InfraError::Application(ApplicationError::Sync(failure)) => failure,
            other => SyncFailure::new(operation, other.to_string()),
        }
    }
}

/// Result type for infrastructure layer operations.
pub type InfraResult<T> = Result<T, InfraError>;
