//! Infrastructure layer: persistence, notification and DI container
//!
//! This layer implements I/O boundary traits and wires up services.

pub mod di;
pub mod error;
pub mod store;
pub mod traits;

pub use error::{InfraError, InfraResult};
pub use store::{DocumentStore, InMemoryStore, StoreDocument, TomlStore};
pub use traits::{BomPersistence, ConsoleNotifier, Notifier, NotifyKind, RoutePersistence};
