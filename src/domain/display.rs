//! Terminal rendering of BOM trees via `termtree`.

use generational_arena::Index;
use termtree::Tree;
use tracing::instrument;

use crate::domain::bom::{BomItem, BomTree};

pub trait TreeNodeConvert {
    fn to_tree_string(&self) -> Tree<String>;
}

fn label(id: &impl std::fmt::Display, item: &BomItem) -> String {
    let mut s = format!("[{}] {} x{} {}", id, item.item_ref, item.quantity, item.unit_of_measure);
    if let Some(designators) = &item.reference_designators {
        s.push_str(&format!(" ({})", designators));
    }
    s
}

impl TreeNodeConvert for BomTree {
    #[instrument(level = "debug", skip(self))]
    fn to_tree_string(&self) -> Tree<String> {
        fn build_tree(tree: &BomTree, node_idx: Index) -> Option<Tree<String>> {
            let node = tree.get_node(node_idx)?;
            let leaves: Vec<_> = node
                .children
                .iter()
                .filter_map(|&child| build_tree(tree, child))
                .collect();
            Some(Tree::new(label(&node.id, &node.data)).with_leaves(leaves))
        }

        let roots: Vec<_> = self
            .root_indices()
            .iter()
            .filter_map(|&idx| build_tree(self, idx))
            .collect();
        match roots.len() {
            0 => Tree::new("Empty BOM".to_string()),
            _ => Tree::new(format!("BOM ({} items)", self.len())).with_leaves(roots),
        }
    }
}
