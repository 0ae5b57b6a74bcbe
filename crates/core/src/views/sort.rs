use std::cmp::Ordering;

use super::node::{ViewNode, ViewNodeId, ViewTree};

/// Heaviest first; equal keys by name, ordinal ascending.
pub fn compare_nodes(a: &ViewNode, b: &ViewNode) -> Ordering {
    b.sort_key
        .cmp(&a.sort_key)
        .then_with(|| a.display_name.as_str().cmp(b.display_name.as_str()))
}

/// Re-order the children of `parent`. The sort is stable, so sorting an
/// already sorted list never moves rows.
pub fn sort_children(tree: &mut ViewTree, parent: ViewNodeId) {
    let Some(mut children) = tree.node_mut(parent).map(|n| std::mem::take(&mut n.children)) else {
        return;
    };
    let arena = tree.arena();
    children.sort_by(|a, b| compare_nodes(&arena[a.index()], &arena[b.index()]));
    if let Some(node) = tree.node_mut(parent) {
        node.children = children;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::views::node::ViewNodeKind;

    fn tree_with(children: &[(&str, u64)]) -> ViewTree {
        let mut tree = ViewTree::new(0);
        let root = tree.root();
        for &(name, weight) in children {
            let mut node = tree.node(root).cloned().unwrap();
            node.kind = ViewNodeKind::CallTreeNode;
            node.display_name = name.into();
            node.sort_key = Duration::from_millis(weight);
            node.children.clear();
            tree.push_child(root, node);
        }
        tree
    }

    fn names(tree: &ViewTree) -> Vec<String> {
        tree.children(tree.root())
            .iter()
            .map(|&id| tree.node(id).unwrap().display_name.to_string())
            .collect()
    }

    #[test]
    fn descending_weight_then_name() {
        let mut tree = tree_with(&[("b", 10), ("c", 30), ("a", 10), ("B", 10)]);
        let root = tree.root();
        sort_children(&mut tree, root);
        assert_eq!(names(&tree), vec!["c", "B", "a", "b"]);
    }

    #[test]
    fn sorting_twice_is_identical() {
        let mut tree = tree_with(&[("x", 5), ("y", 5), ("z", 7), ("w", 1)]);
        let root = tree.root();
        sort_children(&mut tree, root);
        let first = tree.children(root).to_vec();
        sort_children(&mut tree, root);
        assert_eq!(tree.children(root), first.as_slice());
    }
}
