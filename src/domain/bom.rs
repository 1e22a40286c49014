//! Bill-of-materials structure engine.
//!
//! Every operation is a pure function over a `BomTree` snapshot: it clones,
//! mutates the copy and hands back the copy together with the store call
//! (`BomEffect`) that makes the change durable.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::arena::{FlatNode, TreeArena};
use crate::domain::entities::{BomItemPayload, Change, NodeId};
use crate::domain::error::{DomainError, DomainResult};

/// Payload of a BOM tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomItem {
    pub item_ref: String,
    pub quantity: f64,
    pub unit_of_measure: String,
    pub reference_designators: Option<String>,
    pub notes: Option<String>,
}

pub type BomTree = TreeArena<BomItem>;

/// Flat BOM record as exchanged with the store and document exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BomRecord {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    pub item_ref: String,
    pub quantity: f64,
    pub unit_of_measure: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_designators: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl BomItem {
    pub fn new(item_ref: impl Into<String>, quantity: f64, unit_of_measure: impl Into<String>) -> Self {
        Self {
            item_ref: item_ref.into(),
            quantity,
            unit_of_measure: unit_of_measure.into(),
            reference_designators: None,
            notes: None,
        }
    }

    pub fn with_designators(mut self, designators: impl Into<String>) -> Self {
        self.reference_designators = Some(designators.into());
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err(DomainError::validation(
                "quantity",
                format!("must be greater than 0, got {}", self.quantity),
            ));
        }
        if self.item_ref.trim().is_empty() {
            return Err(DomainError::validation("itemRef", "must not be empty"));
        }
        if self.unit_of_measure.trim().is_empty() {
            return Err(DomainError::validation("unitOfMeasure", "must not be empty"));
        }
        Ok(())
    }

    pub fn to_payload(&self) -> BomItemPayload {
        BomItemPayload {
            item_ref: self.item_ref.clone(),
            quantity: self.quantity,
            unit_of_measure: self.unit_of_measure.clone(),
            reference_designators: self.reference_designators.clone(),
            notes: self.notes.clone(),
        }
    }
}

impl From<BomRecord> for FlatNode<BomItem> {
    fn from(r: BomRecord) -> Self {
        FlatNode {
            id: r.id,
            parent_id: r.parent_id,
            data: BomItem {
                item_ref: r.item_ref,
                quantity: r.quantity,
                unit_of_measure: r.unit_of_measure,
                reference_designators: r.reference_designators,
                notes: r.notes,
            },
        }
    }
}

impl From<FlatNode<BomItem>> for BomRecord {
    fn from(n: FlatNode<BomItem>) -> Self {
        BomRecord {
            id: n.id,
            parent_id: n.parent_id,
            item_ref: n.data.item_ref,
            quantity: n.data.quantity,
            unit_of_measure: n.data.unit_of_measure,
            reference_designators: n.data.reference_designators,
            notes: n.data.notes,
        }
    }
}

/// Partial edit of a BOM item; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct BomItemPatch {
    pub quantity: Option<f64>,
    pub unit_of_measure: Option<String>,
    pub reference_designators: Option<Option<String>>,
    pub notes: Option<Option<String>>,
}

/// Store call required to persist a BOM mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum BomEffect {
    Move {
        item_id: NodeId,
        new_parent_id: Option<NodeId>,
    },
    Add {
        provisional_id: NodeId,
        parent_id: Option<NodeId>,
        payload: BomItemPayload,
    },
    Update {
        item_id: NodeId,
        payload: BomItemPayload,
    },
    Remove {
        item_id: NodeId,
        removed_ids: Vec<NodeId>,
    },
}

impl BomEffect {
    /// Ids removed by a cascade delete; empty for every other effect.
    pub fn removed_ids(&self) -> &[NodeId] {
        match self {
            BomEffect::Remove { removed_ids, .. } => removed_ids,
            _ => &[],
        }
    }
}

pub fn from_flat(records: impl IntoIterator<Item = BomRecord>) -> BomTree {
    TreeArena::build(records.into_iter().map(FlatNode::from))
}

/// Pre-order flat list, parent before children.
pub fn flatten(tree: &BomTree) -> Vec<BomRecord> {
    tree.flatten().into_iter().map(BomRecord::from).collect()
}

/// Move `dragged` under `target` (None = top level).
///
/// Dropping a node onto itself or onto its current parent is a no-op and
/// produces no store call.
#[instrument(level = "debug", skip(tree))]
pub fn move_item(
    tree: &BomTree,
    dragged: &NodeId,
    target: Option<&NodeId>,
) -> DomainResult<Change<BomTree, BomEffect>> {
    if !tree.contains(dragged) {
        return Err(DomainError::node_not_found(dragged));
    }
    if target == Some(dragged) {
        debug!("move of {} onto itself ignored", dragged);
        return Ok(Change::unchanged(tree.clone()));
    }
    if tree.parent_of(dragged) == target {
        debug!("{} already under {:?}", dragged, target);
        return Ok(Change::unchanged(tree.clone()));
    }

    let mut next = tree.clone();
    next.move_node(dragged, target)?;
    Ok(Change::new(
        next,
        BomEffect::Move {
            item_id: dragged.clone(),
            new_parent_id: target.cloned(),
        },
    ))
}

/// Append a validated item as last child of `parent` (None = new root).
#[instrument(level = "debug", skip(tree))]
pub fn add_item(
    tree: &BomTree,
    parent: Option<&NodeId>,
    item: BomItem,
) -> DomainResult<Change<BomTree, BomEffect>> {
    item.validate()?;
    let provisional_id = NodeId::provisional();
    let payload = item.to_payload();

    let mut next = tree.clone();
    next.insert(provisional_id.clone(), parent, item)?;
    Ok(Change::new(
        next,
        BomEffect::Add {
            provisional_id,
            parent_id: parent.cloned(),
            payload,
        },
    ))
}

#[instrument(level = "debug", skip(tree))]
pub fn update_item(
    tree: &BomTree,
    id: &NodeId,
    patch: BomItemPatch,
) -> DomainResult<Change<BomTree, BomEffect>> {
    let current = tree.get(id).ok_or_else(|| DomainError::node_not_found(id))?;
    let mut item = current.data.clone();
    if let Some(quantity) = patch.quantity {
        item.quantity = quantity;
    }
    if let Some(uom) = patch.unit_of_measure {
        item.unit_of_measure = uom;
    }
    if let Some(designators) = patch.reference_designators {
        item.reference_designators = designators;
    }
    if let Some(notes) = patch.notes {
        item.notes = notes;
    }
    item.validate()?;
    if item == current.data {
        return Ok(Change::unchanged(tree.clone()));
    }

    let payload = item.to_payload();
    let mut next = tree.clone();
    if let Some(node) = next.get_mut(id) {
        node.data = item;
    }
    Ok(Change::new(
        next,
        BomEffect::Update {
            item_id: id.clone(),
            payload,
        },
    ))
}

/// Delete `id` together with its whole subtree.
///
/// No confirmation happens here; the removed ids travel in the effect so
/// callers can prompt, audit or clean up.
#[instrument(level = "debug", skip(tree))]
pub fn remove_item(tree: &BomTree, id: &NodeId) -> DomainResult<Change<BomTree, BomEffect>> {
    let mut next = tree.clone();
    let removed_ids = next.remove_subtree(id)?;
    debug!("removing {} cascades to {} items", id, removed_ids.len());
    Ok(Change::new(
        next,
        BomEffect::Remove {
            item_id: id.clone(),
            removed_ids,
        },
    ))
}

/// One line of an exploded BOM.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplodedLine {
    pub id: NodeId,
    pub item_ref: String,
    pub level: usize,
    pub quantity: f64,
    /// Quantity multiplied along the path from the root
    pub extended_quantity: f64,
    pub unit_of_measure: String,
}

/// Extended quantities in pre-order.
pub fn explode(tree: &BomTree) -> Vec<ExplodedLine> {
    let mut lines = Vec::with_capacity(tree.len());
    // (index, level, multiplier of the parent)
    let mut stack: Vec<_> = tree
        .root_indices()
        .iter()
        .rev()
        .map(|&idx| (idx, 0usize, 1.0f64))
        .collect();
    while let Some((idx, level, multiplier)) = stack.pop() {
        let Some(node) = tree.get_node(idx) else {
            continue;
        };
        let extended = multiplier * node.data.quantity;
        lines.push(ExplodedLine {
            id: node.id.clone(),
            item_ref: node.data.item_ref.clone(),
            level,
            quantity: node.data.quantity,
            extended_quantity: extended,
            unit_of_measure: node.data.unit_of_measure.clone(),
        });
        for &child in node.children.iter().rev() {
            stack.push((child, level + 1, extended));
        }
    }
    lines
}
