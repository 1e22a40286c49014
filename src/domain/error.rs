//! Domain-level errors (no external dependencies)

use thiserror::Error;

use crate::domain::entities::Id;
use crate::domain::execution::{StepAction, StepStatus};

/// Domain errors represent structural rule violations.
/// They are raised before any state change and never leave partial mutations behind.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("circular reference: cannot move {node} under {target}")]
    CircularReference { node: Id, target: Id },

    #[error("validation failed: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("dependency integrity violated for steps: {}", steps.join(", "))]
    DependencyIntegrity { steps: Vec<String> },

    #[error("not found: {kind} {id}")]
    NotFound { kind: &'static str, id: Id },

    #[error("step {step}: cannot {action} while {status}")]
    InvalidTransition {
        step: Id,
        status: StepStatus,
        action: StepAction,
    },

    #[error("step {step}: dependency {dependency} is {status}")]
    DependencyNotSatisfied {
        step: Id,
        dependency: Id,
        status: StepStatus,
    },
}

impl DomainError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn node_not_found(id: &Id) -> Self {
        Self::NotFound {
            kind: "node",
            id: id.clone(),
        }
    }

    pub fn step_not_found(id: &Id) -> Self {
        Self::NotFound {
            kind: "step",
            id: id.clone(),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
