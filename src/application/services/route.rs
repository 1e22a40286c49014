//! Route editing service
//!
//! Structural edits are persisted as one batch-save of the whole route.
//! Execution actions are persisted per step.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::application::error::{ApplicationError, ApplicationResult, SyncFailure};
use crate::application::session::{EditSession, Submission};
use crate::application::transaction::TxOutcome;
use crate::domain::route::{self, NewStep, Route, RouteEffect, RouteRecord, StepPatch};
use crate::domain::{Change, DomainError, DomainResult, RouteId, RouteMeta, StepAction, StepId};
use crate::infrastructure::traits::{Notifier, NotifyKind, RoutePersistence};

pub struct RouteEditor {
    session: EditSession<Route, RouteEffect>,
    store: Arc<dyn RoutePersistence>,
    notifier: Arc<dyn Notifier>,
}

impl RouteEditor {
    pub fn load(
        id: &RouteId,
        store: Arc<dyn RoutePersistence>,
        notifier: Arc<dyn Notifier>,
    ) -> ApplicationResult<Self> {
        let record = store.load_route(id)?;
        debug!("load: route {} with {} steps", record.id, record.steps.len());
        Ok(Self::with_route(Route::from(record), store, notifier))
    }

    /// Create a new, empty route and persist its header.
    #[instrument(level = "debug", skip(store, notifier))]
    pub fn create(
        id: RouteId,
        meta: RouteMeta,
        store: Arc<dyn RoutePersistence>,
        notifier: Arc<dyn Notifier>,
    ) -> ApplicationResult<Self> {
        if meta.name.trim().is_empty() {
            return Err(DomainError::validation("name", "must not be empty").into());
        }
        let mut editor = Self::with_route(Route::new(id, meta), store, notifier);
        editor.execute(|route: &Route| route.save())?;
        Ok(editor)
    }

    fn with_route(route: Route, store: Arc<dyn RoutePersistence>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            session: EditSession::new(route),
            store,
            notifier,
        }
    }

    pub fn route(&self) -> &Route {
        self.session.current()
    }

    /// Returns the id of the new step as known after the save.
    pub fn add_step(&mut self, draft: NewStep) -> ApplicationResult<StepId> {
        self.execute(move |route: &Route| route.add_step(draft))?;
        self.route()
            .steps
            .iter()
            .max_by_key(|s| s.step_number)
            .map(|s| s.id.clone())
            .ok_or(ApplicationError::Deferred {
                operation: "add step".into(),
            })
    }

    /// Move `id` to the 0-based `target_index`.
    pub fn reorder(&mut self, id: &StepId, target_index: usize) -> ApplicationResult<()> {
        let id = id.clone();
        self.execute(move |route: &Route| route.reorder(&id, target_index))
    }

    pub fn update_step(&mut self, id: &StepId, patch: StepPatch) -> ApplicationResult<()> {
        let id = id.clone();
        self.execute(move |route: &Route| route.update_step(&id, patch))
    }

    pub fn delete_step(&mut self, id: &StepId) -> ApplicationResult<()> {
        let id = id.clone();
        self.execute(move |route: &Route| route.delete_step(&id))
    }

    /// Explicit save of the current chain.
    pub fn save(&mut self) -> ApplicationResult<()> {
        self.execute(|route: &Route| route.save())
    }

    /// Check the chain without sending anything.
    pub fn validate(&self) -> DomainResult<()> {
        route::validate_for_save(&self.route().steps)
    }

    pub fn transition(&mut self, id: &StepId, action: StepAction) -> ApplicationResult<()> {
        let id = id.clone();
        let at = Utc::now();
        self.execute(move |route: &Route| route.transition(&id, action, at))
    }

    /// Total minutes for `quantity` units.
    pub fn lead_time(&self, quantity: u32) -> f64 {
        route::lead_time(&self.route().steps, quantity)
    }

    pub fn export(&self) -> RouteRecord {
        let route = self.route();
        RouteRecord {
            id: route.id.clone(),
            name: route.meta.name.clone(),
            revision: route.meta.revision.clone(),
            description: route.meta.description.clone(),
            steps: route.steps.clone(),
        }
    }

    fn execute<F>(&mut self, mutation: F) -> ApplicationResult<()>
    where
        F: FnOnce(&Route) -> DomainResult<Change<Route, RouteEffect>> + 'static,
    {
        let effect = match self.session.submit(mutation)? {
            Submission::Started(effect) => effect,
            Submission::Unchanged => return Ok(()),
            Submission::Queued { position } => {
                debug!("queued at {}", position);
                return Ok(());
            }
        };

        let mut first: Option<ApplicationResult<()>> = None;
        let mut in_flight = Some(effect);
        while let Some(effect) = in_flight.take() {
            let result = self.sync(&effect);
            let resolution = match &result {
                Ok(()) => {
                    let fresh = self.reload_after(&effect);
                    self.session.resolve_with(Ok(()), move |route| reconcile(route, fresh))
                }
                Err(failure) => self.session.resolve(Err(failure.clone())),
            };

            if let Some(resolution) = resolution {
                self.report_outcome(&effect, &resolution.outcome);
                for dropped in &resolution.dropped {
                    self.notifier.notify(NotifyKind::Error, &dropped.to_string());
                }
                in_flight = resolution.next;
            }
            if first.is_none() {
                first = Some(result.map_err(ApplicationError::from));
            }
        }
        first.unwrap_or(Ok(()))
    }

    fn sync(&self, effect: &RouteEffect) -> Result<(), SyncFailure> {
        let route_id = &self.route().id;
        match effect {
            RouteEffect::BatchSave(batch) => self.store.batch_save_route(route_id, batch),
            RouteEffect::StatusChange { step_id, status, at } => {
                self.store.record_step_status(route_id, step_id, *status, *at)
            }
        }
    }

    // Store-assigned step ids only become known by reading the route back.
    fn reload_after(&self, effect: &RouteEffect) -> Option<RouteRecord> {
        if !matches!(effect, RouteEffect::BatchSave(_)) {
            return None;
        }
        match self.store.load_route(&self.route().id) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("reload after save failed, keeping local chain: {}", e);
                None
            }
        }
    }

    fn report_outcome(&self, effect: &RouteEffect, outcome: &TxOutcome<Route>) {
        let what = match effect {
            RouteEffect::BatchSave(batch) => format!("saved route {}", batch.route_meta.name),
            RouteEffect::StatusChange { step_id, status, .. } => {
                format!("step {} is now {}", step_id, status)
            }
        };
        match outcome {
            TxOutcome::Committed(_) => {
                info!("{}", what);
                self.notifier.notify(NotifyKind::Success, &what)
            }
            TxOutcome::RolledBack { failure, .. } => self.notifier.notify(
                NotifyKind::Error,
                &format!("{} failed, change rolled back: {}", what, failure.message),
            ),
        }
    }
}

fn reconcile(mut route: Route, fresh: Option<RouteRecord>) -> Route {
    match fresh {
        Some(record) => Route::from(record),
        None => {
            route.deleted_step_ids.clear();
            route
        }
    }
}
