use std::time::Duration;

use calltree_protocol::CallTreeSettings;
use tracing::{debug, warn};

use crate::model::{CallTreeSource, NodeKey};

use super::ActivePath;
use super::node::{NodeFactory, ViewNodeId, ViewNodeKind, ViewTree};
use super::sort::sort_children;

/// Which neighbours of a call-tree node a caller/callee branch lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Callees,
    Callers,
}

impl Direction {
    fn of(kind: ViewNodeKind) -> Option<Self> {
        match kind {
            ViewNodeKind::CalleeNode => Some(Self::Callees),
            ViewNodeKind::CallerNode => Some(Self::Callers),
            ViewNodeKind::Root
            | ViewNodeKind::Header(_)
            | ViewNodeKind::CallTreeNode
            | ViewNodeKind::Placeholder { .. } => None,
        }
    }

    fn node_kind(self) -> ViewNodeKind {
        match self {
            Self::Callees => ViewNodeKind::CalleeNode,
            Self::Callers => ViewNodeKind::CallerNode,
        }
    }

    fn neighbours(self, source: &dyn CallTreeSource, key: NodeKey) -> Vec<NodeKey> {
        match self {
            Self::Callees => source.children(key),
            Self::Callers => source.callers(key),
        }
    }

    fn has_neighbours(self, source: &dyn CallTreeSource, key: NodeKey) -> bool {
        match self {
            Self::Callees => source.has_children(key),
            Self::Callers => source.has_callers(key),
        }
    }
}

/// Add one level of callees or callers of `of` below `parent`.
///
/// Rows that have further neighbours get a single placeholder child instead
/// of being expanded, unless their function is already on `path`.
pub(crate) fn materialize_level(
    factory: &NodeFactory<'_>,
    tree: &mut ViewTree,
    parent: ViewNodeId,
    of: NodeKey,
    direction: Direction,
    baseline: Duration,
    path: &ActivePath,
) {
    let source = factory.source;
    for key in direction.neighbours(source, of) {
        let node = tree.push_child(parent, factory.data_node(key, direction.node_kind(), baseline));
        let recursive = source.function_of(key).is_some_and(|f| path.contains(f));
        if !recursive && direction.has_neighbours(source, key) {
            tree.push_child(node, factory.placeholder(key, baseline));
        }
    }
    sort_children(tree, parent);
}

/// Replace the placeholder under `node` by its real children.
///
/// `node` may be the placeholder itself or its parent. Nodes without a
/// placeholder are left alone and their current children returned, so
/// expanding twice yields the same rows. If the placeholder's call-tree node
/// no longer resolves, the placeholder is dropped and nothing is added.
pub fn expand(
    tree: &mut ViewTree,
    node: ViewNodeId,
    source: &dyn CallTreeSource,
    settings: &CallTreeSettings,
) -> Vec<ViewNodeId> {
    let node = match tree.node(node) {
        Some(n) if n.is_placeholder() => match n.parent {
            Some(parent) => parent,
            None => return Vec::new(),
        },
        Some(_) => node,
        None => return Vec::new(),
    };

    let (target, baseline) = match tree.children(node) {
        [only] => match tree.node(*only).map(|n| n.kind) {
            Some(ViewNodeKind::Placeholder { target, baseline }) => (target, baseline),
            _ => return tree.children(node).to_vec(),
        },
        children => return children.to_vec(),
    };
    let Some(direction) = tree.node(node).and_then(|n| Direction::of(n.kind)) else {
        return tree.children(node).to_vec();
    };

    tree.detach_children(node);
    if let Some(n) = tree.node_mut(node) {
        n.is_expanded = true;
    }

    if tree.source_id() != source.id() || !source.contains(target) {
        warn!(?target, "placeholder no longer resolves, leaving node empty");
        return Vec::new();
    }

    let factory = NodeFactory::new(source, settings.prepend_module);
    let path = ActivePath::of_view_node(tree, node, source);
    materialize_level(&factory, tree, node, target, direction, baseline, &path);

    let children = tree.children(node).to_vec();
    debug!(?target, children = children.len(), "expanded placeholder");
    children
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CallTree, FunctionId};
    use crate::views::caller_callee::build_caller_callee;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn sample(tree: &mut CallTree, names: &[&str], weight: u64) {
        let stack: Vec<FunctionId> = names.iter().map(|n| tree.intern_function(n, None)).collect();
        tree.add_sample(&stack, ms(weight));
    }

    fn deep_tree() -> CallTree {
        let mut calls = CallTree::new();
        sample(&mut calls, &["main", "f", "g", "h", "i"], 40);
        sample(&mut calls, &["main", "f", "g", "k"], 10);
        sample(&mut calls, &["main", "f"], 50);
        calls
    }

    fn names(tree: &ViewTree, ids: &[ViewNodeId]) -> Vec<String> {
        ids.iter()
            .map(|&id| tree.node(id).unwrap().display_name.to_string())
            .collect()
    }

    #[test]
    fn expands_one_level_with_new_placeholders() {
        let calls = deep_tree();
        let settings = CallTreeSettings::default();
        let f = calls.find_function("f").unwrap();
        let mut tree = build_caller_callee(&calls, f, false, &settings);

        let g = tree.find("g").unwrap();
        assert!(tree.node(tree.children(g)[0]).unwrap().is_placeholder());

        let children = expand(&mut tree, g, &calls, &settings);
        assert_eq!(names(&tree, &children), vec!["h", "k"]);
        let h = children[0];
        assert!(tree.node(tree.children(h)[0]).unwrap().is_placeholder());
        assert!(tree.children(children[1]).is_empty());
        assert!(tree.node(g).unwrap().is_expanded);
    }

    #[test]
    fn expanding_twice_is_idempotent() {
        let calls = deep_tree();
        let settings = CallTreeSettings::default();
        let f = calls.find_function("f").unwrap();
        let mut tree = build_caller_callee(&calls, f, false, &settings);
        let g = tree.find("g").unwrap();

        let first = expand(&mut tree, g, &calls, &settings);
        let size = tree.len();
        let second = expand(&mut tree, g, &calls, &settings);
        assert_eq!(first, second);
        assert_eq!(tree.len(), size);
    }

    #[test]
    fn accepts_the_placeholder_itself() {
        let calls = deep_tree();
        let settings = CallTreeSettings::default();
        let f = calls.find_function("f").unwrap();
        let mut tree = build_caller_callee(&calls, f, false, &settings);
        let g = tree.find("g").unwrap();
        let placeholder = tree.children(g)[0];
        let children = expand(&mut tree, placeholder, &calls, &settings);
        assert_eq!(children.len(), 2);
        assert_eq!(tree.node(children[0]).unwrap().parent, Some(g));
    }

    #[test]
    fn expanded_callees_keep_instance_baseline() {
        let calls = deep_tree();
        let settings = CallTreeSettings::default();
        let f = calls.find_function("f").unwrap();
        let mut tree = build_caller_callee(&calls, f, false, &settings);
        let g = tree.find("g").unwrap();
        let children = expand(&mut tree, g, &calls, &settings);
        // f weighs 100ms, h 40ms.
        let h = tree.node(children[0]).unwrap();
        assert!((h.percentage - 0.4).abs() < 1e-9);
    }

    #[test]
    fn stale_source_yields_empty_children() {
        let calls = deep_tree();
        let settings = CallTreeSettings::default();
        let f = calls.find_function("f").unwrap();
        let mut tree = build_caller_callee(&calls, f, false, &settings);
        let g = tree.find("g").unwrap();

        let replacement = deep_tree();
        let children = expand(&mut tree, g, &replacement, &settings);
        assert!(children.is_empty());
        assert!(tree.children(g).is_empty());
        // The rest of the view is untouched.
        assert_eq!(tree.find("g"), Some(g));
        assert!(tree.find("Called").is_some());
    }

    #[test]
    fn recursive_callee_is_not_expandable() {
        let mut calls = CallTree::new();
        sample(&mut calls, &["main", "f", "g", "f", "g"], 10);
        let settings = CallTreeSettings::default();
        let f = calls.find_function("f").unwrap();
        let mut tree = build_caller_callee(&calls, f, true, &settings);

        let g = tree.find("g").unwrap();
        let children = expand(&mut tree, g, &calls, &settings);
        assert_eq!(names(&tree, &children), vec!["f"]);
        // f is the inspected function, so the cycle stops here.
        assert!(tree.children(children[0]).is_empty());
    }

    #[test]
    fn combined_callee_children_stay_below_their_parent() {
        let mut calls = CallTree::new();
        sample(&mut calls, &["main", "f", "c", "d"], 10);
        sample(&mut calls, &["main", "c", "d"], 90);
        let settings = CallTreeSettings::default();
        let f = calls.find_function("f").unwrap();
        let mut tree = build_caller_callee(&calls, f, true, &settings);

        let c = tree.find("c").unwrap();
        let children = expand(&mut tree, c, &calls, &settings);
        assert_eq!(names(&tree, &children), vec!["d"]);
        let d = tree.node(children[0]).unwrap();
        assert_eq!(d.weight, ms(10));
        assert!(d.weight <= tree.node(c).unwrap().weight);
    }

    #[test]
    fn non_lazy_nodes_return_existing_children() {
        let calls = deep_tree();
        let settings = CallTreeSettings::default();
        let f = calls.find_function("f").unwrap();
        let mut tree = build_caller_callee(&calls, f, false, &settings);
        let root = tree.root();
        let before = tree.children(root).to_vec();
        assert_eq!(expand(&mut tree, root, &calls, &settings), before);
    }
}
