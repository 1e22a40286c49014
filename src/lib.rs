//! Structural integrity engine for bills of materials and manufacturing routes.
//!
//! - `domain`: pure tree and route-chain operations and their invariants
//! - `application`: optimistic transactions, per-instance edit queues, editors
//! - `infrastructure`: persistence and notification behind traits
//! - `cli`: the `bomroute` command line

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
