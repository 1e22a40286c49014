//! Document-backed persistence
//!
//! Both stores keep the whole dataset in one `StoreDocument` and implement
//! the remote calls as transactions over it. `TomlStore` persists the
//! document to a TOML file; `InMemoryStore` keeps it in memory and can be
//! told to refuse calls.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, instrument, warn};

use crate::application::SyncFailure;
use crate::domain::route::{self, RouteStep};
use crate::domain::{
    BomItemPayload, BomRecord, Id, NodeId, RouteBatch, RouteId, RouteRecord, StepId, StepStatus,
};
use crate::infrastructure::error::{InfraError, InfraResult};
use crate::infrastructure::traits::{BomPersistence, RoutePersistence};

/// Everything the store knows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDocument {
    /// Lower bound for the next assigned id
    #[serde(default)]
    pub next_id: u64,
    #[serde(default)]
    pub bom: Vec<BomRecord>,
    #[serde(default)]
    pub routes: Vec<RouteRecord>,
}

impl StoreDocument {
    /// Next free numeric id, never reusing one present in the document.
    pub fn allocate_id(&mut self) -> Id {
        let ids = self
            .bom
            .iter()
            .map(|r| &r.id)
            .chain(self.routes.iter().map(|r| &r.id))
            .chain(self.routes.iter().flat_map(|r| r.steps.iter().map(|s| &s.id)));
        let floor = ids
            .filter_map(|id| id.as_str().parse::<u64>().ok())
            .max()
            .map_or(1, |max| max + 1);
        let id = self.next_id.max(floor);
        self.next_id = id + 1;
        Id::from(id)
    }

    fn bom_position(&self, id: &NodeId) -> InfraResult<usize> {
        self.bom
            .iter()
            .position(|r| &r.id == id)
            .ok_or_else(|| InfraError::rejected(format!("BOM item {} does not exist", id)))
    }

    fn bom_parent(&self, id: &NodeId) -> Option<&NodeId> {
        self.bom
            .iter()
            .find(|r| &r.id == id)
            .and_then(|r| r.parent_id.as_ref())
    }

    pub fn move_bom_item(&mut self, item: &NodeId, new_parent: Option<&NodeId>) -> InfraResult<()> {
        let pos = self.bom_position(item)?;
        if let Some(parent) = new_parent {
            self.bom_position(parent)?;
            // walk up from the new parent; meeting `item` means a cycle
            let mut seen = HashSet::new();
            let mut cursor = Some(parent);
            while let Some(current) = cursor {
                if current == item {
                    return Err(InfraError::rejected(format!(
                        "moving {} under {} would create a cycle",
                        item, parent
                    )));
                }
                if !seen.insert(current.clone()) {
                    break;
                }
                cursor = self.bom_parent(current);
            }
        }
        let mut record = self.bom.remove(pos);
        record.parent_id = new_parent.cloned();
        // re-parented items become the last child
        self.bom.push(record);
        Ok(())
    }

    pub fn add_bom_item(&mut self, parent: Option<&NodeId>, payload: &BomItemPayload) -> InfraResult<NodeId> {
        if let Some(parent) = parent {
            self.bom_position(parent)?;
        }
        let id = self.allocate_id();
        self.bom.push(BomRecord {
            id: id.clone(),
            parent_id: parent.cloned(),
            item_ref: payload.item_ref.clone(),
            quantity: payload.quantity,
            unit_of_measure: payload.unit_of_measure.clone(),
            reference_designators: payload.reference_designators.clone(),
            notes: payload.notes.clone(),
        });
        Ok(id)
    }

    pub fn update_bom_item(&mut self, item: &NodeId, payload: &BomItemPayload) -> InfraResult<()> {
        let pos = self.bom_position(item)?;
        let record = &mut self.bom[pos];
        record.item_ref = payload.item_ref.clone();
        record.quantity = payload.quantity;
        record.unit_of_measure = payload.unit_of_measure.clone();
        record.reference_designators = payload.reference_designators.clone();
        record.notes = payload.notes.clone();
        Ok(())
    }

    /// Delete an item and everything below it.
    pub fn remove_bom_item(&mut self, item: &NodeId) -> InfraResult<Vec<NodeId>> {
        self.bom_position(item)?;
        let mut doomed: HashSet<NodeId> = HashSet::from([item.clone()]);
        let mut frontier = VecDeque::from([item.clone()]);
        while let Some(current) = frontier.pop_front() {
            for child in self.bom.iter().filter(|r| r.parent_id.as_ref() == Some(&current)) {
                if doomed.insert(child.id.clone()) {
                    frontier.push_back(child.id.clone());
                }
            }
        }
        let removed: Vec<NodeId> = self
            .bom
            .iter()
            .filter(|r| doomed.contains(&r.id))
            .map(|r| r.id.clone())
            .collect();
        self.bom.retain(|r| !doomed.contains(&r.id));
        Ok(removed)
    }

    pub fn route(&self, id: &RouteId) -> InfraResult<&RouteRecord> {
        self.routes
            .iter()
            .find(|r| &r.id == id)
            .ok_or_else(|| InfraError::rejected(format!("route {} does not exist", id)))
    }

    /// Replace the steps of `route_id` with the batch, creating the route if needed.
    pub fn batch_save_route(&mut self, route_id: &RouteId, batch: &RouteBatch) -> InfraResult<()> {
        let existing: HashMap<StepId, RouteStep> = self
            .routes
            .iter()
            .find(|r| &r.id == route_id)
            .map(|r| r.steps.iter().map(|s| (s.id.clone(), s.clone())).collect())
            .unwrap_or_default();

        let mut assigned: HashMap<StepId, StepId> = HashMap::new();
        let mut unnamed: VecDeque<StepId> = VecDeque::new();
        for payload in batch.steps.iter().filter(|p| p.is_new || p.id.is_none()) {
            let real = self.allocate_id();
            match &payload.id {
                Some(provisional) => {
                    assigned.insert(provisional.clone(), real);
                }
                None => unnamed.push_back(real),
            }
        }

        let mut steps = Vec::with_capacity(batch.steps.len());
        for payload in &batch.steps {
            let id = match (&payload.id, payload.is_new) {
                (Some(id), false) if existing.contains_key(id) => id.clone(),
                (Some(id), false) => {
                    return Err(InfraError::rejected(format!(
                        "step {} is not part of route {}",
                        id, route_id
                    )))
                }
                (Some(id), true) => assigned.get(id).cloned().unwrap_or_else(|| id.clone()),
                (None, _) => unnamed
                    .pop_front()
                    .ok_or_else(|| InfraError::rejected("could not assign a step id"))?,
            };
            let previous = existing.get(&id);
            steps.push(RouteStep {
                id,
                step_number: payload.step_number,
                name: payload.name.clone(),
                step_type: payload.step_type,
                work_cell_ref: payload.work_cell_id.clone(),
                setup_time_minutes: payload.setup_time_minutes,
                cycle_time_minutes: payload.cycle_time_minutes,
                depends_on_step_id: payload
                    .depends_on_step_id
                    .as_ref()
                    .map(|dep| assigned.get(dep).cloned().unwrap_or_else(|| dep.clone())),
                can_start_when_dependency: Some(payload.can_start_when_dependency),
                sampling_mode: payload.quality_check_mode,
                sampling_size: payload.sampling_size,
                form_ref: payload.form_id.clone(),
                status: previous.map(|s| s.status).unwrap_or_default(),
                started_at: previous.and_then(|s| s.started_at),
                completed_at: previous.and_then(|s| s.completed_at),
            });
        }

        route::validate_for_save(&steps).map_err(|e| InfraError::rejected(e.to_string()))?;
        for deleted in &batch.deleted_step_ids {
            if !existing.contains_key(deleted) {
                warn!("deleted step {} was not part of route {}", deleted, route_id);
            }
        }

        let record = RouteRecord {
            id: route_id.clone(),
            name: batch.route_meta.name.clone(),
            revision: batch.route_meta.revision.clone(),
            description: batch.route_meta.description.clone(),
            steps: route::from_records(steps),
        };
        match self.routes.iter_mut().find(|r| &r.id == route_id) {
            Some(slot) => *slot = record,
            None => self.routes.push(record),
        }
        debug!("route {} saved, {} new step ids", route_id, batch.steps.iter().filter(|p| p.is_new).count());
        Ok(())
    }

    pub fn record_step_status(
        &mut self,
        route_id: &RouteId,
        step_id: &StepId,
        status: StepStatus,
        at: DateTime<Utc>,
    ) -> InfraResult<()> {
        let route = self
            .routes
            .iter_mut()
            .find(|r| &r.id == route_id)
            .ok_or_else(|| InfraError::rejected(format!("route {} does not exist", route_id)))?;
        let step = route
            .steps
            .iter_mut()
            .find(|s| &s.id == step_id)
            .ok_or_else(|| InfraError::rejected(format!("step {} does not exist", step_id)))?;
        step.status = status;
        match status {
            StepStatus::InProgress if step.started_at.is_none() => step.started_at = Some(at),
            StepStatus::Completed => step.completed_at = Some(at),
            _ => {}
        }
        Ok(())
    }
}

/// Transactional access to a `StoreDocument`.
///
/// Implementors get both persistence traits for free.
pub trait DocumentStore: Send + Sync {
    /// Read-only view of the current document.
    fn snapshot(&self, operation: &str) -> InfraResult<StoreDocument>;

    /// Run `f` on the document and keep its changes only if it succeeds.
    fn transact<T>(
        &self,
        operation: &str,
        f: impl FnOnce(&mut StoreDocument) -> InfraResult<T>,
    ) -> InfraResult<T>;
}

impl<D: DocumentStore> BomPersistence for D {
    fn load_bom(&self) -> Result<Vec<BomRecord>, SyncFailure> {
        self.snapshot("loadBom")
            .map(|doc| doc.bom)
            .map_err(|e| e.into_sync_failure("loadBom"))
    }

    fn move_bom_item(&self, item: &NodeId, new_parent: Option<&NodeId>) -> Result<(), SyncFailure> {
        self.transact("moveBomItem", |doc| doc.move_bom_item(item, new_parent))
            .map_err(|e| e.into_sync_failure("moveBomItem"))
    }

    fn add_bom_item(&self, parent: Option<&NodeId>, payload: &BomItemPayload) -> Result<NodeId, SyncFailure> {
        self.transact("addBomItem", |doc| doc.add_bom_item(parent, payload))
            .map_err(|e| e.into_sync_failure("addBomItem"))
    }

    fn update_bom_item(&self, item: &NodeId, payload: &BomItemPayload) -> Result<(), SyncFailure> {
        self.transact("updateBomItem", |doc| doc.update_bom_item(item, payload))
            .map_err(|e| e.into_sync_failure("updateBomItem"))
    }

    fn remove_bom_item(&self, item: &NodeId) -> Result<(), SyncFailure> {
        self.transact("removeBomItem", |doc| doc.remove_bom_item(item).map(|_| ()))
            .map_err(|e| e.into_sync_failure("removeBomItem"))
    }
}

impl<D: DocumentStore> RoutePersistence for D {
    fn list_routes(&self) -> Result<Vec<RouteRecord>, SyncFailure> {
        self.snapshot("listRoutes")
            .map(|doc| doc.routes)
            .map_err(|e| e.into_sync_failure("listRoutes"))
    }

    fn load_route(&self, route: &RouteId) -> Result<RouteRecord, SyncFailure> {
        self.snapshot("loadRoute")
            .and_then(|doc| doc.route(route).cloned())
            .map_err(|e| e.into_sync_failure("loadRoute"))
    }

    fn batch_save_route(&self, route: &RouteId, batch: &RouteBatch) -> Result<(), SyncFailure> {
        self.transact("batchSaveRoute", |doc| doc.batch_save_route(route, batch))
            .map_err(|e| e.into_sync_failure("batchSaveRoute"))
    }

    fn record_step_status(
        &self,
        route: &RouteId,
        step: &StepId,
        status: StepStatus,
        at: DateTime<Utc>,
    ) -> Result<(), SyncFailure> {
        self.transact("recordStepStatus", |doc| doc.record_step_status(route, step, status, at))
            .map_err(|e| e.into_sync_failure("recordStepStatus"))
    }
}

/// Store persisted as a single TOML file.
///
/// Every write goes to a temp file in the same directory that is then
/// renamed over the original.
#[derive(Debug)]
pub struct TomlStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TomlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file means empty store.
    pub fn read(&self) -> InfraResult<StoreDocument> {
        if !self.path.exists() {
            debug!("store {} does not exist yet", self.path.display());
            return Ok(StoreDocument::default());
        }
        let content = fs::read_to_string(&self.path)
            .map_err(|e| InfraError::io(format!("reading {}", self.path.display()), e))?;
        toml::from_str(&content).map_err(|e| InfraError::Format {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    #[instrument(level = "debug", skip(self, doc))]
    pub fn write(&self, doc: &StoreDocument) -> InfraResult<()> {
        let content = toml::to_string_pretty(doc).map_err(|e| InfraError::Format {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| InfraError::io(format!("creating {}", dir.display()), e))?;

        let mut tmp = NamedTempFile::new_in(&dir)
            .map_err(|e| InfraError::io(format!("creating temp file in {}", dir.display()), e))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| InfraError::io("writing temp file", e))?;
        tmp.persist(&self.path)
            .map_err(|e| InfraError::io(format!("replacing {}", self.path.display()), e.error))?;
        Ok(())
    }
}

impl DocumentStore for TomlStore {
    fn snapshot(&self, operation: &str) -> InfraResult<StoreDocument> {
        debug!("{}: reading {}", operation, self.path.display());
        self.read()
    }

    fn transact<T>(
        &self,
        operation: &str,
        f: impl FnOnce(&mut StoreDocument) -> InfraResult<T>,
    ) -> InfraResult<T> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        debug!("{}: transaction on {}", operation, self.path.display());
        let mut doc = self.read()?;
        let value = f(&mut doc)?;
        self.write(&doc)?;
        Ok(value)
    }
}

/// Store kept in memory, with injectable failures and a call log.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    doc: Mutex<StoreDocument>,
    failures: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<String>>,
}

impl InMemoryStore {
    pub fn new(doc: StoreDocument) -> Self {
        Self {
            doc: Mutex::new(doc),
            ..Default::default()
        }
    }

    pub fn with_bom(records: Vec<BomRecord>) -> Self {
        Self::new(StoreDocument {
            bom: records,
            ..Default::default()
        })
    }

    pub fn with_routes(routes: Vec<RouteRecord>) -> Self {
        Self::new(StoreDocument {
            routes,
            ..Default::default()
        })
    }

    /// Make the next mutating call fail with `message`.
    pub fn fail_next(&self, message: impl Into<String>) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(message.into());
    }

    /// Names of every call received so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn document(&self) -> StoreDocument {
        self.doc.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn log(&self, operation: &str) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(operation.to_string());
    }
}

impl DocumentStore for InMemoryStore {
    fn snapshot(&self, operation: &str) -> InfraResult<StoreDocument> {
        self.log(operation);
        Ok(self.document())
    }

    fn transact<T>(
        &self,
        operation: &str,
        f: impl FnOnce(&mut StoreDocument) -> InfraResult<T>,
    ) -> InfraResult<T> {
        self.log(operation);
        if let Some(message) = self.failures.lock().unwrap_or_else(|e| e.into_inner()).pop_front() {
            debug!("{}: injected failure", operation);
            return Err(InfraError::rejected(message));
        }
        let mut guard = self.doc.lock().unwrap_or_else(|e| e.into_inner());
        let mut working = guard.clone();
        let value = f(&mut working)?;
        *guard = working;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64, parent: Option<u64>) -> BomRecord {
        BomRecord {
            id: id.into(),
            parent_id: parent.map(NodeId::from),
            item_ref: format!("P-{}", id),
            quantity: 1.0,
            unit_of_measure: "ea".into(),
            reference_designators: None,
            notes: None,
        }
    }

    #[test]
    fn given_existing_ids_when_allocating_then_never_reuses() {
        let mut doc = StoreDocument {
            bom: vec![record(7, None)],
            ..Default::default()
        };
        assert_eq!(doc.allocate_id(), Id::from(8u64));
        assert_eq!(doc.allocate_id(), Id::from(9u64));
    }

    #[test]
    fn given_move_under_own_descendant_then_rejected() {
        let mut doc = StoreDocument {
            bom: vec![record(1, None), record(2, Some(1)), record(3, Some(2))],
            ..Default::default()
        };
        let err = doc.move_bom_item(&"1".into(), Some(&"3".into())).unwrap_err();
        assert!(matches!(err, InfraError::Rejected { .. }));
    }

    #[test]
    fn given_nested_items_when_removing_then_cascades() {
        let mut doc = StoreDocument {
            bom: vec![record(1, None), record(2, Some(1)), record(3, Some(2)), record(4, None)],
            ..Default::default()
        };
        let removed = doc.remove_bom_item(&"1".into()).unwrap();
        assert_eq!(removed.len(), 3);
        assert_eq!(doc.bom.len(), 1);
    }

    #[test]
    fn given_injected_failure_when_mutating_then_document_untouched() {
        let store = InMemoryStore::with_bom(vec![record(1, None)]);
        store.fail_next("offline");
        let result = store.remove_bom_item(&"1".into());
        assert_eq!(result.unwrap_err().message, "rejected: offline");
        assert_eq!(store.document().bom.len(), 1);
    }
}
