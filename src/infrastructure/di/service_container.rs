//! Service container for dependency injection
//!
//! Wires the editors to the configured store and notifier.

use std::sync::Arc;

use crate::application::services::{BomEditor, RouteEditor};
use crate::application::ApplicationResult;
use crate::config::Settings;
use crate::domain::{RouteId, RouteMeta};
use crate::infrastructure::store::TomlStore;
use crate::infrastructure::traits::{BomPersistence, ConsoleNotifier, Notifier, RoutePersistence};

/// Container holding the shared I/O dependencies.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    pub bom_store: Arc<dyn BomPersistence>,

    pub route_store: Arc<dyn RoutePersistence>,

    pub notifier: Arc<dyn Notifier>,
}

impl ServiceContainer {
    /// Create a container backed by the TOML store at `settings.store_path`.
    pub fn new(settings: Settings) -> Self {
        let store = Arc::new(TomlStore::new(settings.store_path.clone()));
        let notifier = Arc::new(ConsoleNotifier::new(settings.notify.quiet));
        Self::with_deps(settings, store.clone(), store, notifier)
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(
        settings: Settings,
        bom_store: Arc<dyn BomPersistence>,
        route_store: Arc<dyn RoutePersistence>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            bom_store,
            route_store,
            notifier,
        }
    }

    pub fn bom_editor(&self) -> ApplicationResult<BomEditor> {
        BomEditor::load(self.bom_store.clone(), self.notifier.clone())
    }

    pub fn route_editor(&self, id: &RouteId) -> ApplicationResult<RouteEditor> {
        RouteEditor::load(id, self.route_store.clone(), self.notifier.clone())
    }

    pub fn create_route(&self, id: RouteId, meta: RouteMeta) -> ApplicationResult<RouteEditor> {
        RouteEditor::create(id, meta, self.route_store.clone(), self.notifier.clone())
    }
}
