//! Application layer: optimistic transactions, edit sessions and services
//!
//! This layer orchestrates domain logic and depends on I/O boundary traits.

pub mod error;
pub mod services;
pub mod session;
pub mod transaction;

pub use error::{ApplicationError, ApplicationResult, SyncFailure};
pub use session::{EditSession, Resolution, Submission};
pub use transaction::{ChangeTransaction, TxOutcome};
