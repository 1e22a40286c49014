//! Application services
//!
//! Concrete editors that run domain mutations through an edit session.
//! They depend on the persistence and notification traits but are
//! themselves concrete structs, not traits.

mod bom;
mod route;

pub use bom::BomEditor;
pub use route::RouteEditor;
