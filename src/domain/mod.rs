//! Domain layer: structural engines and their invariants
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).
//! Every mutation is a pure function from one snapshot to the next.

pub mod arena;
pub mod bom;
pub mod display;
pub mod entities;
pub mod error;
pub mod execution;
pub mod route;

pub use arena::{BuildReport, FlatNode, TreeArena, TreeNode};
pub use bom::{BomEffect, BomItem, BomItemPatch, BomRecord, BomTree, ExplodedLine};
pub use display::TreeNodeConvert;
pub use entities::*;
pub use error::{DomainError, DomainResult};
pub use execution::{StepAction, StepStatus};
pub use route::{
    DependencyGate, NewStep, Route, RouteEffect, RouteRecord, RouteStep, SamplingMode, StepPatch,
    StepType,
};
