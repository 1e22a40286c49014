//! BOM editing service
//!
//! Binds the BOM engine to an edit session, the persistence adapter and the
//! notifier: every accepted edit shows up locally at once and is rolled back
//! if the store refuses it.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::application::error::{ApplicationError, ApplicationResult, SyncFailure};
use crate::application::session::{EditSession, Submission};
use crate::application::transaction::TxOutcome;
use crate::domain::bom::{self, BomEffect, BomItem, BomItemPatch, BomRecord, BomTree};
use crate::domain::{BuildReport, FlatNode, NodeId, TreeArena};
use crate::infrastructure::traits::{BomPersistence, Notifier, NotifyKind};

/// Service for structural edits of one BOM.
pub struct BomEditor {
    session: EditSession<BomTree, BomEffect>,
    store: Arc<dyn BomPersistence>,
    notifier: Arc<dyn Notifier>,
    report: BuildReport,
}

impl BomEditor {
    /// Load the flat item list from the store and build the tree.
    pub fn load(store: Arc<dyn BomPersistence>, notifier: Arc<dyn Notifier>) -> ApplicationResult<Self> {
        let records = store.load_bom()?;
        debug!("load: {} records", records.len());
        let (tree, report) = TreeArena::build_with_report(records.into_iter().map(FlatNode::from));
        if !report.is_clean() {
            warn!("BOM repaired on load: {:?}", report);
        }
        Ok(Self {
            session: EditSession::new(tree),
            store,
            notifier,
            report,
        })
    }

    pub fn tree(&self) -> &BomTree {
        self.session.current()
    }

    /// Repairs `build` had to make when the BOM was loaded.
    pub fn load_report(&self) -> &BuildReport {
        &self.report
    }

    /// Flat export, parent before children.
    pub fn flatten(&self) -> Vec<BomRecord> {
        bom::flatten(self.tree())
    }

    /// Returns false if the move was a no-op.
    pub fn move_item(&mut self, dragged: &NodeId, target: Option<&NodeId>) -> ApplicationResult<bool> {
        let (dragged, target) = (dragged.clone(), target.cloned());
        let synced = self.execute(move |tree: &BomTree| bom::move_item(tree, &dragged, target.as_ref()))?;
        Ok(synced.is_some())
    }

    /// Returns the id the store assigned to the new item.
    pub fn add_item(&mut self, parent: Option<&NodeId>, item: BomItem) -> ApplicationResult<NodeId> {
        let parent = parent.cloned();
        let synced = self.execute(move |tree: &BomTree| bom::add_item(tree, parent.as_ref(), item))?;
        match synced {
            Some(Synced {
                assigned: Some(id), ..
            }) => Ok(id),
            Some(Synced {
                effect: BomEffect::Add { provisional_id, .. },
                ..
            }) => Ok(provisional_id),
            _ => Err(ApplicationError::Deferred {
                operation: "add item".into(),
            }),
        }
    }

    pub fn update_item(&mut self, id: &NodeId, patch: BomItemPatch) -> ApplicationResult<bool> {
        let id = id.clone();
        let synced = self.execute(move |tree: &BomTree| bom::update_item(tree, &id, patch))?;
        Ok(synced.is_some())
    }

    /// Delete an item and its subtree. Returns every removed id.
    pub fn remove_item(&mut self, id: &NodeId) -> ApplicationResult<Vec<NodeId>> {
        let id = id.clone();
        let synced = self.execute(move |tree: &BomTree| bom::remove_item(tree, &id))?;
        Ok(synced
            .map(|s| s.effect.removed_ids().to_vec())
            .unwrap_or_default())
    }

    #[instrument(level = "debug", skip(self, mutation))]
    fn execute<F>(&mut self, mutation: F) -> ApplicationResult<Option<Synced>>
    where
        F: FnOnce(&BomTree) -> crate::domain::DomainResult<crate::domain::Change<BomTree, BomEffect>> + 'static,
    {
        let effect = match self.session.submit(mutation)? {
            Submission::Started(effect) => effect,
            Submission::Unchanged => return Ok(None),
            Submission::Queued { position } => {
                debug!("queued at {}", position);
                return Ok(None);
            }
        };

        let mut first: Option<ApplicationResult<Synced>> = None;
        let mut in_flight = Some(effect);
        while let Some(effect) = in_flight.take() {
            let result = self.sync(&effect);
            let resolution = match &result {
                Ok(assigned) => {
                    let rename = match (&effect, assigned) {
                        (BomEffect::Add { provisional_id, .. }, Some(new_id)) => {
                            Some((provisional_id.clone(), new_id.clone()))
                        }
                        _ => None,
                    };
                    self.session.resolve_with(Ok(()), move |mut tree| {
                        if let Some((from, to)) = rename {
                            if let Err(e) = tree.rename(&from, to) {
                                warn!("could not apply assigned id: {}", e);
                            }
                        }
                        tree
                    })
                }
                Err(failure) => self.session.resolve(Err(failure.clone())),
            };

            self.report_outcome(&effect, resolution.as_ref().map(|r| &r.outcome));
            if let Some(resolution) = resolution {
                for dropped in &resolution.dropped {
                    self.notifier.notify(NotifyKind::Error, &dropped.to_string());
                }
                in_flight = resolution.next;
            }

            if first.is_none() {
                first = Some(match result {
                    Ok(assigned) => Ok(Synced { effect, assigned }),
                    Err(failure) => Err(failure.into()),
                });
            }
        }
        first.transpose()
    }

    fn sync(&self, effect: &BomEffect) -> Result<Option<NodeId>, SyncFailure> {
        match effect {
            BomEffect::Move {
                item_id,
                new_parent_id,
            } => self
                .store
                .move_bom_item(item_id, new_parent_id.as_ref())
                .map(|_| None),
            BomEffect::Add {
                parent_id, payload, ..
            } => self.store.add_bom_item(parent_id.as_ref(), payload).map(Some),
            BomEffect::Update { item_id, payload } => {
                self.store.update_bom_item(item_id, payload).map(|_| None)
            }
            BomEffect::Remove { item_id, .. } => self.store.remove_bom_item(item_id).map(|_| None),
        }
    }

    fn report_outcome(&self, effect: &BomEffect, outcome: Option<&TxOutcome<BomTree>>) {
        let what = describe(effect);
        match outcome {
            Some(TxOutcome::Committed(_)) => self.notifier.notify(NotifyKind::Success, &what),
            Some(TxOutcome::RolledBack { failure, .. }) => self.notifier.notify(
                NotifyKind::Error,
                &format!("{} failed, change rolled back: {}", what, failure.message),
            ),
            None => {}
        }
    }
}

struct Synced {
    effect: BomEffect,
    assigned: Option<NodeId>,
}

fn describe(effect: &BomEffect) -> String {
    match effect {
        BomEffect::Move {
            item_id,
            new_parent_id: Some(parent),
        } => format!("moved item {} under {}", item_id, parent),
        BomEffect::Move { item_id, .. } => format!("moved item {} to top level", item_id),
        BomEffect::Add { payload, .. } => format!("added {}", payload.item_ref),
        BomEffect::Update { item_id, .. } => format!("updated item {}", item_id),
        BomEffect::Remove { removed_ids, .. } => format!("removed {} item(s)", removed_ids.len()),
    }
}
