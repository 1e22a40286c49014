//! I/O boundary traits for testability
//!
//! These traits abstract the remote store and the user-facing notifier,
//! allowing the editors to be tested with in-memory implementations.

use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::application::SyncFailure;
use crate::domain::{
    BomItemPayload, BomRecord, NodeId, RouteBatch, RouteId, RouteRecord, StepId, StepStatus,
};

/// Persistence calls for BOM items.
pub trait BomPersistence: Send + Sync {
    /// Flat list of every item.
    fn load_bom(&self) -> Result<Vec<BomRecord>, SyncFailure>;

    /// Re-parent an item; `None` makes it top level.
    fn move_bom_item(&self, item: &NodeId, new_parent: Option<&NodeId>) -> Result<(), SyncFailure>;

    /// Create an item and return its assigned id.
    fn add_bom_item(
        &self,
        parent: Option<&NodeId>,
        payload: &BomItemPayload,
    ) -> Result<NodeId, SyncFailure>;

    fn update_bom_item(&self, item: &NodeId, payload: &BomItemPayload) -> Result<(), SyncFailure>;

    /// Delete an item; the store cascades to its descendants.
    fn remove_bom_item(&self, item: &NodeId) -> Result<(), SyncFailure>;
}

/// Persistence calls for routes.
pub trait RoutePersistence: Send + Sync {
    fn list_routes(&self) -> Result<Vec<RouteRecord>, SyncFailure>;

    fn load_route(&self, route: &RouteId) -> Result<RouteRecord, SyncFailure>;

    /// Replace the route's steps with `batch` in one call.
    ///
    /// Steps flagged `is_new` get store-assigned ids; dependencies pointing at
    /// their provisional ids are rewritten to match.
    fn batch_save_route(&self, route: &RouteId, batch: &RouteBatch) -> Result<(), SyncFailure>;

    fn record_step_status(
        &self,
        route: &RouteId,
        step: &StepId,
        status: StepStatus,
        at: DateTime<Utc>,
    ) -> Result<(), SyncFailure>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    Success,
    Error,
}

/// User-visible feedback after a store call settles.
pub trait Notifier: Send + Sync {
    fn notify(&self, kind: NotifyKind, message: &str);
}

/// Notifier printing to stderr.
#[derive(Debug, Default, Clone)]
pub struct ConsoleNotifier {
    /// Suppress success messages; errors are always shown
    pub quiet: bool,
}

impl ConsoleNotifier {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, kind: NotifyKind, message: &str) {
        match kind {
            NotifyKind::Success if !self.quiet => eprintln!("{} {}", "✓".green(), message),
            NotifyKind::Success => {}
            NotifyKind::Error => eprintln!("{} {}", "✗".red(), message),
        }
    }
}
