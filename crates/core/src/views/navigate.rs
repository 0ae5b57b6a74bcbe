use calltree_protocol::{CallTreeSettings, RowKind, ViewRow};
use tracing::debug;

use crate::model::CallTreeSource;

use super::expand::expand;
use super::node::{ViewNodeId, ViewNodeKind, ViewTree};

/// Follow the heaviest child from `start` for up to `hot_path_depth`
/// levels, expanding every node on the way and materializing placeholders
/// as needed.
///
/// All other marks are cleared, so afterwards exactly the returned path is
/// marked.
pub fn expand_hottest_path(
    tree: &mut ViewTree,
    start: ViewNodeId,
    source: &dyn CallTreeSource,
    settings: &CallTreeSettings,
) -> Vec<ViewNodeId> {
    let start = match tree.node(start) {
        Some(n) if n.is_placeholder() => match n.parent {
            Some(parent) => parent,
            None => return Vec::new(),
        },
        Some(_) => start,
        None => return Vec::new(),
    };

    for node in tree.nodes_mut() {
        node.is_marked = false;
    }

    let mut path = vec![start];
    let mut current = start;
    for _ in 0..settings.hot_path_depth {
        let children = expand(tree, current, source, settings);
        let Some(&hottest) = children.first() else {
            break;
        };
        if let Some(node) = tree.node_mut(current) {
            node.is_expanded = true;
        }
        path.push(hottest);
        current = hottest;
    }

    for &id in &path {
        if let Some(node) = tree.node_mut(id) {
            node.is_marked = true;
        }
    }
    debug!(length = path.len(), "expanded hottest path");
    path
}

/// Fold `node` and everything below it.
pub fn collapse(tree: &mut ViewTree, node: ViewNodeId) {
    for id in tree.descendants(node) {
        if let Some(n) = tree.node_mut(id) {
            n.is_expanded = false;
        }
    }
}

fn row_kind(kind: ViewNodeKind) -> Option<RowKind> {
    match kind {
        ViewNodeKind::Root => None,
        ViewNodeKind::Header(_) => Some(RowKind::Header),
        ViewNodeKind::CallTreeNode => Some(RowKind::CallTree),
        ViewNodeKind::CallerNode => Some(RowKind::Caller),
        ViewNodeKind::CalleeNode => Some(RowKind::Callee),
        ViewNodeKind::Placeholder { .. } => Some(RowKind::Placeholder),
    }
}

fn to_row(tree: &ViewTree, id: ViewNodeId) -> Option<ViewRow> {
    let node = tree.node(id)?;
    Some(ViewRow {
        node: id.0,
        depth: tree.depth(id) as u32,
        kind: row_kind(node.kind)?,
        name: node.display_name.clone(),
        module: node.module_name.clone(),
        weight: node.weight,
        exclusive_weight: node.exclusive_weight,
        percentage: node.percentage,
        exclusive_percentage: node.exclusive_percentage,
        has_children: node.has_children(),
        is_expanded: node.is_expanded,
        is_marked: node.is_marked,
        search_match: node.search_match,
    })
}

fn flatten(tree: &ViewTree, only_expanded: bool) -> Vec<ViewRow> {
    let mut rows = Vec::new();
    let mut stack: Vec<ViewNodeId> = tree.children(tree.root()).iter().rev().copied().collect();
    while let Some(id) = stack.pop() {
        let Some(row) = to_row(tree, id) else {
            continue;
        };
        if !only_expanded || row.is_expanded {
            stack.extend(tree.children(id).iter().rev().copied());
        }
        rows.push(row);
    }
    rows
}

/// Rows a tree-list widget shows: descends only into expanded nodes.
pub fn visible_rows(tree: &ViewTree) -> Vec<ViewRow> {
    flatten(tree, true)
}

/// Every reachable row regardless of expansion.
pub fn all_rows(tree: &ViewTree) -> Vec<ViewRow> {
    flatten(tree, false)
}
