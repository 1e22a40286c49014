//! Arena-based ordered hierarchy.
//!
//! Nodes live in a generational arena and are addressed by their string id
//! through a side index, so every walk (descendant checks, cascade removal,
//! traversal) runs on an explicit stack instead of recursion.

use std::collections::HashMap;

use generational_arena::{Arena, Index};
use tracing::{instrument, warn};

use crate::domain::entities::NodeId;
use crate::domain::error::{DomainError, DomainResult};

/// Tree node in the arena-based hierarchy structure.
#[derive(Debug, Clone)]
pub struct TreeNode<T> {
    /// Stable external id of this node
    pub id: NodeId,
    /// Domain payload
    pub data: T,
    /// Index of parent node in the arena, None for root nodes
    pub parent: Option<Index>,
    /// Indices of child nodes in the arena, in display order
    pub children: Vec<Index>,
}

/// One record of a flat parent-linked list.
#[derive(Debug, Clone)]
pub struct FlatNode<T> {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub data: T,
}

/// What `build` had to repair while linking a flat list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Records whose declared parent is not in the list; promoted to roots
    pub orphans: Vec<NodeId>,
    /// Records whose parent link would have closed a cycle; promoted to roots
    pub cycle_breaks: Vec<NodeId>,
    /// Later records that repeated an id already seen; skipped
    pub duplicates: Vec<NodeId>,
}

impl BuildReport {
    pub fn is_clean(&self) -> bool {
        self.orphans.is_empty() && self.cycle_breaks.is_empty() && self.duplicates.is_empty()
    }
}

/// Ordered forest with an id index.
#[derive(Debug, Clone)]
pub struct TreeArena<T> {
    arena: Arena<TreeNode<T>>,
    index: HashMap<NodeId, Index>,
    roots: Vec<Index>,
}

impl<T> Default for TreeArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TreeArena<T> {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            index: HashMap::new(),
            roots: Vec::new(),
        }
    }

    /// Build a forest from a flat parent-linked list.
    ///
    /// Children keep the relative order in which they appear in `records`.
    /// A record whose parent is missing becomes a root instead of being dropped.
    pub fn build(records: impl IntoIterator<Item = FlatNode<T>>) -> Self {
        Self::build_with_report(records).0
    }

    #[instrument(level = "debug", skip(records))]
    pub fn build_with_report(records: impl IntoIterator<Item = FlatNode<T>>) -> (Self, BuildReport) {
        let mut tree = Self::new();
        let mut report = BuildReport::default();
        let mut declared: Vec<(Index, Option<NodeId>)> = Vec::new();

        // pass 1: allocate every node detached
        for record in records {
            if tree.index.contains_key(&record.id) {
                warn!("duplicate id {} skipped", record.id);
                report.duplicates.push(record.id);
                continue;
            }
            let idx = tree.arena.insert(TreeNode {
                id: record.id.clone(),
                data: record.data,
                parent: None,
                children: Vec::new(),
            });
            tree.index.insert(record.id, idx);
            declared.push((idx, record.parent_id));
        }

        // pass 2: link in input order, refusing links that close a cycle
        for (idx, parent_id) in declared {
            let parent_idx = match parent_id {
                None => None,
                Some(pid) => match tree.index.get(&pid) {
                    Some(&p) => Some(p),
                    None => {
                        let id = tree.arena[idx].id.clone();
                        warn!("parent {} of {} not found, treating as root", pid, id);
                        report.orphans.push(id);
                        None
                    }
                },
            };

            match parent_idx {
                Some(p) if p == idx || tree.is_ancestor_idx(idx, p) => {
                    let id = tree.arena[idx].id.clone();
                    warn!("parent link of {} closes a cycle, treating as root", id);
                    report.cycle_breaks.push(id);
                    tree.roots.push(idx);
                }
                Some(p) => {
                    tree.arena[idx].parent = Some(p);
                    tree.arena[p].children.push(idx);
                }
                None => tree.roots.push(idx),
            }
        }

        (tree, report)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &NodeId) -> Option<&TreeNode<T>> {
        self.index.get(id).and_then(|&idx| self.arena.get(idx))
    }

    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut TreeNode<T>> {
        match self.index.get(id) {
            Some(&idx) => self.arena.get_mut(idx),
            None => None,
        }
    }

    pub fn get_node(&self, idx: Index) -> Option<&TreeNode<T>> {
        self.arena.get(idx)
    }

    pub fn roots(&self) -> impl Iterator<Item = &NodeId> + '_ {
        self.roots.iter().map(move |&idx| &self.arena[idx].id)
    }

    pub fn root_indices(&self) -> &[Index] {
        &self.roots
    }

    pub fn parent_of(&self, id: &NodeId) -> Option<&NodeId> {
        self.get(id)
            .and_then(|node| node.parent)
            .map(|p| &self.arena[p].id)
    }

    pub fn children_of(&self, id: &NodeId) -> Vec<&NodeId> {
        self.get(id)
            .map(|node| node.children.iter().map(|&c| &self.arena[c].id).collect())
            .unwrap_or_default()
    }

    /// Number of edges between `id` and its root (roots are level 0).
    pub fn level(&self, id: &NodeId) -> Option<usize> {
        let mut current = self.get(id)?.parent;
        let mut level = 0;
        while let Some(idx) = current {
            level += 1;
            current = self.arena[idx].parent;
        }
        Some(level)
    }

    /// True if `candidate` is reachable by walking down from `ancestor`.
    /// A node is not its own descendant; unknown ids are never descendants.
    #[instrument(level = "trace", skip(self))]
    pub fn is_descendant(&self, ancestor: &NodeId, candidate: &NodeId) -> bool {
        let (Some(&a), Some(&c)) = (self.index.get(ancestor), self.index.get(candidate)) else {
            return false;
        };
        let mut stack: Vec<Index> = self.arena[a].children.clone();
        while let Some(idx) = stack.pop() {
            if idx == c {
                return true;
            }
            stack.extend(self.arena[idx].children.iter().copied());
        }
        false
    }

    // Walks parent links upward from `from`; bounded by the node count.
    fn is_ancestor_idx(&self, ancestor: Index, from: Index) -> bool {
        let mut current = self.arena[from].parent;
        let mut steps = 0;
        while let Some(idx) = current {
            if idx == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.arena.len() {
                return true;
            }
            current = self.arena[idx].parent;
        }
        false
    }

    /// Append a new node as last child of `parent` (or as last root).
    #[instrument(level = "trace", skip(self, data))]
    pub fn insert(&mut self, id: NodeId, parent: Option<&NodeId>, data: T) -> DomainResult<Index> {
        if self.index.contains_key(&id) {
            return Err(DomainError::validation("id", format!("duplicate id {}", id)));
        }
        let parent_idx = match parent {
            Some(pid) => Some(
                *self
                    .index
                    .get(pid)
                    .ok_or_else(|| DomainError::node_not_found(pid))?,
            ),
            None => None,
        };
        let idx = self.arena.insert(TreeNode {
            id: id.clone(),
            data,
            parent: parent_idx,
            children: Vec::new(),
        });
        self.index.insert(id, idx);
        match parent_idx {
            Some(p) => self.arena[p].children.push(idx),
            None => self.roots.push(idx),
        }
        Ok(idx)
    }

    /// Re-parent `node` under `new_parent` (None = root level).
    ///
    /// Rejected with `CircularReference` when the target is the node itself or
    /// lies inside its subtree; the tree is left untouched in that case.
    #[instrument(level = "debug", skip(self))]
    pub fn move_node(&mut self, node: &NodeId, new_parent: Option<&NodeId>) -> DomainResult<()> {
        let idx = *self
            .index
            .get(node)
            .ok_or_else(|| DomainError::node_not_found(node))?;
        let target_idx = match new_parent {
            Some(target) => {
                let t = *self
                    .index
                    .get(target)
                    .ok_or_else(|| DomainError::node_not_found(target))?;
                if t == idx || self.is_descendant(node, target) {
                    return Err(DomainError::CircularReference {
                        node: node.clone(),
                        target: target.clone(),
                    });
                }
                Some(t)
            }
            None => None,
        };

        self.detach(idx);
        self.arena[idx].parent = target_idx;
        match target_idx {
            Some(t) => self.arena[t].children.push(idx),
            None => self.roots.push(idx),
        }
        Ok(())
    }

    fn detach(&mut self, idx: Index) {
        match self.arena[idx].parent {
            Some(p) => self.arena[p].children.retain(|&c| c != idx),
            None => self.roots.retain(|&r| r != idx),
        }
    }

    /// Remove `node` and all of its descendants.
    ///
    /// Returns the removed ids in pre-order (the node itself first).
    #[instrument(level = "debug", skip(self))]
    pub fn remove_subtree(&mut self, node: &NodeId) -> DomainResult<Vec<NodeId>> {
        let idx = *self
            .index
            .get(node)
            .ok_or_else(|| DomainError::node_not_found(node))?;
        self.detach(idx);

        let mut removed = Vec::new();
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            if let Some(removed_node) = self.arena.remove(current) {
                stack.extend(removed_node.children.iter().rev().copied());
                self.index.remove(&removed_node.id);
                removed.push(removed_node.id);
            }
        }
        Ok(removed)
    }

    /// Replace the id of a node, keeping its position and links.
    pub fn rename(&mut self, from: &NodeId, to: NodeId) -> DomainResult<()> {
        if self.index.contains_key(&to) {
            return Err(DomainError::validation("id", format!("duplicate id {}", to)));
        }
        let idx = self
            .index
            .remove(from)
            .ok_or_else(|| DomainError::node_not_found(from))?;
        self.arena[idx].id = to.clone();
        self.index.insert(to, idx);
        Ok(())
    }

    #[instrument(level = "trace", skip(self))]
    pub fn iter(&self) -> TreeIterator<'_, T> {
        TreeIterator::new(self)
    }

    #[instrument(level = "trace", skip(self))]
    pub fn iter_postorder(&self) -> PostOrderIterator<'_, T> {
        PostOrderIterator::new(self)
    }

    /// Number of levels of the deepest branch; 0 for an empty forest.
    #[instrument(level = "debug", skip(self))]
    pub fn depth(&self) -> usize {
        let mut max = 0;
        let mut stack: Vec<(Index, usize)> = self.roots.iter().map(|&r| (r, 1)).collect();
        while let Some((idx, d)) = stack.pop() {
            max = max.max(d);
            stack.extend(self.arena[idx].children.iter().map(|&c| (c, d + 1)));
        }
        max
    }

    /// Collects all leaf nodes (nodes with no children) in pre-order.
    #[instrument(level = "debug", skip(self))]
    pub fn leaf_nodes(&self) -> Vec<&NodeId> {
        self.iter()
            .filter(|(_, node)| node.children.is_empty())
            .map(|(_, node)| &node.id)
            .collect()
    }

    /// Inverse of `build`: pre-order, parent before children.
    pub fn flatten(&self) -> Vec<FlatNode<T>>
    where
        T: Clone,
    {
        self.iter()
            .map(|(_, node)| FlatNode {
                id: node.id.clone(),
                parent_id: node.parent.map(|p| self.arena[p].id.clone()),
                data: node.data.clone(),
            })
            .collect()
    }
}

/// Pre-order traversal over all roots, children left to right.
pub struct TreeIterator<'a, T> {
    tree: &'a TreeArena<T>,
    stack: Vec<Index>,
}

impl<'a, T> TreeIterator<'a, T> {
    fn new(tree: &'a TreeArena<T>) -> Self {
        let stack = tree.roots.iter().rev().copied().collect();
        Self { tree, stack }
    }
}

impl<'a, T> Iterator for TreeIterator<'a, T> {
    type Item = (Index, &'a TreeNode<T>);

    fn next(&mut self) -> Option<Self::Item> {
        let current_idx = self.stack.pop()?;
        let node = self.tree.arena.get(current_idx)?;
        // Push children in reverse order for left-to-right traversal
        for &child in node.children.iter().rev() {
            self.stack.push(child);
        }
        Some((current_idx, node))
    }
}

pub struct PostOrderIterator<'a, T> {
    tree: &'a TreeArena<T>,
    stack: Vec<(Index, bool)>,
}

impl<'a, T> PostOrderIterator<'a, T> {
    fn new(tree: &'a TreeArena<T>) -> Self {
        let stack = tree.roots.iter().rev().map(|&r| (r, false)).collect();
        Self { tree, stack }
    }
}

impl<'a, T> Iterator for PostOrderIterator<'a, T> {
    type Item = (Index, &'a TreeNode<T>);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current_idx, visited)) = self.stack.pop() {
            if let Some(node) = self.tree.arena.get(current_idx) {
                if !visited {
                    self.stack.push((current_idx, true));
                    for &child in node.children.iter().rev() {
                        self.stack.push((child, false));
                    }
                } else {
                    return Some((current_idx, node));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(id: &str, parent: Option<&str>) -> FlatNode<()> {
        FlatNode {
            id: id.into(),
            parent_id: parent.map(NodeId::from),
            data: (),
        }
    }

    fn ids<'a>(it: impl Iterator<Item = (Index, &'a TreeNode<()>)>) -> Vec<String> {
        it.map(|(_, n)| n.id.to_string()).collect()
    }

    #[test]
    fn given_flat_list_when_building_then_children_keep_input_order() {
        let tree = TreeArena::build(vec![
            flat("a", None),
            flat("b", Some("a")),
            flat("c", Some("a")),
            flat("d", Some("b")),
        ]);
        assert_eq!(ids(tree.iter()), vec!["a", "b", "d", "c"]);
        assert_eq!(ids(tree.iter_postorder()), vec!["d", "b", "c", "a"]);
        assert_eq!(tree.depth(), 3);
    }

    #[test]
    fn given_child_listed_before_parent_when_building_then_still_linked() {
        let tree = TreeArena::build(vec![flat("b", Some("a")), flat("a", None)]);
        assert_eq!(tree.parent_of(&"b".into()), Some(&NodeId::from("a")));
        assert_eq!(tree.roots().count(), 1);
    }

    #[test]
    fn given_mutual_parents_when_building_then_cycle_is_cut() {
        let (tree, report) =
            TreeArena::build_with_report(vec![flat("x", Some("y")), flat("y", Some("x"))]);
        assert_eq!(report.cycle_breaks, vec![NodeId::from("y")]);
        assert_eq!(tree.roots().collect::<Vec<_>>(), vec![&NodeId::from("y")]);
        assert!(tree.is_descendant(&"y".into(), &"x".into()));
    }

    #[test]
    fn given_duplicate_ids_when_building_then_first_wins() {
        let (tree, report) =
            TreeArena::build_with_report(vec![flat("a", None), flat("a", Some("a"))]);
        assert_eq!(tree.len(), 1);
        assert_eq!(report.duplicates, vec![NodeId::from("a")]);
    }

    #[test]
    fn given_self_target_when_moving_then_rejected() {
        let mut tree = TreeArena::build(vec![flat("a", None)]);
        let err = tree.move_node(&"a".into(), Some(&"a".into())).unwrap_err();
        assert!(matches!(err, DomainError::CircularReference { .. }));
    }

    #[test]
    fn given_subtree_when_removing_then_index_is_cleaned() {
        let mut tree = TreeArena::build(vec![
            flat("a", None),
            flat("b", Some("a")),
            flat("c", Some("b")),
            flat("d", None),
        ]);
        let removed = tree.remove_subtree(&"b".into()).unwrap();
        assert_eq!(removed, vec![NodeId::from("b"), NodeId::from("c")]);
        assert!(!tree.contains(&"c".into()));
        assert!(tree.children_of(&"a".into()).is_empty());
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn given_renamed_node_then_links_survive() {
        let mut tree = TreeArena::build(vec![flat("a", None), flat("tmp", Some("a"))]);
        tree.rename(&"tmp".into(), "7".into()).unwrap();
        assert_eq!(tree.parent_of(&"7".into()), Some(&NodeId::from("a")));
        assert_eq!(tree.children_of(&"a".into()), vec![&NodeId::from("7")]);
    }
}
