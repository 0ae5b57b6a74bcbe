use std::time::Duration;

use calltree_protocol::{SharedStr, TextSpan};

use crate::model::{CallTreeSource, FunctionId, NodeKey};

use super::percentage::percentage;

/// Index of a node inside its [`ViewTree`] arena. Stable for the lifetime of
/// the tree, including across lazy expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewNodeId(pub u32);

impl ViewNodeId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Fixed rows of the caller/callee view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderRole {
    /// The inspected function itself, or one of its instances.
    Function,
    /// Parent of the callee subtree.
    Called,
    /// Parent of the caller subtree.
    Callers,
}

impl HeaderRole {
    /// Headers sort above every real weight, in role order.
    pub fn sort_key(self) -> Duration {
        let offset = match self {
            Self::Function => 0,
            Self::Called => 1,
            Self::Callers => 2,
        };
        Duration::MAX - Duration::from_nanos(offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewNodeKind {
    Root,
    Header(HeaderRole),
    CallTreeNode,
    CallerNode,
    CalleeNode,
    /// Stands in for children that have not been materialized yet.
    Placeholder {
        target: NodeKey,
        /// Percentage baseline the real children will use.
        baseline: Duration,
    },
}

#[derive(Debug, Clone)]
pub struct ViewNode {
    pub kind: ViewNodeKind,
    pub display_name: SharedStr,
    pub module_name: Option<SharedStr>,
    /// Ordering key; equals `weight` for data nodes.
    pub sort_key: Duration,
    pub weight: Duration,
    pub exclusive_weight: Duration,
    pub percentage: f64,
    pub exclusive_percentage: f64,
    /// Call-tree node shown by this row. Set for data nodes and function
    /// headers; placeholders keep theirs in the kind.
    pub backing: Option<NodeKey>,
    pub parent: Option<ViewNodeId>,
    pub children: Vec<ViewNodeId>,
    pub is_marked: bool,
    pub is_expanded: bool,
    pub search_match: Option<TextSpan>,
}

impl ViewNode {
    fn blank(kind: ViewNodeKind, display_name: SharedStr) -> Self {
        Self {
            kind,
            display_name,
            module_name: None,
            sort_key: Duration::ZERO,
            weight: Duration::ZERO,
            exclusive_weight: Duration::ZERO,
            percentage: 0.0,
            exclusive_percentage: 0.0,
            backing: None,
            parent: None,
            children: Vec::new(),
            is_marked: false,
            is_expanded: false,
            search_match: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.kind, ViewNodeKind::Placeholder { .. })
    }

    /// Whether any child rows exist, placeholders included.
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// An owned view tree. All nodes live in one arena, so dropping the tree
/// releases every node at once.
#[derive(Debug, Clone)]
pub struct ViewTree {
    nodes: Vec<ViewNode>,
    source_id: u64,
    focus: Option<FunctionId>,
}

impl ViewTree {
    pub(crate) fn new(source_id: u64) -> Self {
        Self {
            nodes: vec![ViewNode::blank(ViewNodeKind::Root, SharedStr::from(""))],
            source_id,
            focus: None,
        }
    }

    pub(crate) fn with_focus(source_id: u64, function: FunctionId) -> Self {
        Self {
            focus: Some(function),
            ..Self::new(source_id)
        }
    }

    pub fn root(&self) -> ViewNodeId {
        ViewNodeId(0)
    }

    /// Id of the call-tree source this tree was built from.
    pub fn source_id(&self) -> u64 {
        self.source_id
    }

    /// The inspected function of a caller/callee view.
    pub fn focus(&self) -> Option<FunctionId> {
        self.focus
    }

    pub fn node(&self, id: ViewNodeId) -> Option<&ViewNode> {
        self.nodes.get(id.index())
    }

    pub(crate) fn node_mut(&mut self, id: ViewNodeId) -> Option<&mut ViewNode> {
        self.nodes.get_mut(id.index())
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut ViewNode> {
        self.nodes.iter_mut()
    }

    pub(crate) fn arena(&self) -> &[ViewNode] {
        &self.nodes
    }

    pub fn children(&self, id: ViewNodeId) -> &[ViewNodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or_default()
    }

    pub(crate) fn push_child(&mut self, parent: ViewNodeId, mut node: ViewNode) -> ViewNodeId {
        let id = ViewNodeId(self.nodes.len() as u32);
        node.parent = Some(parent);
        self.nodes.push(node);
        if let Some(parent) = self.node_mut(parent) {
            parent.children.push(id);
        }
        id
    }

    /// Drop all children of `id` from the tree. Their arena slots stay
    /// allocated but are no longer reachable.
    pub(crate) fn detach_children(&mut self, id: ViewNodeId) {
        let children = self
            .node_mut(id)
            .map(|n| std::mem::take(&mut n.children))
            .unwrap_or_default();
        for child in children {
            if let Some(child) = self.node_mut(child) {
                child.parent = None;
            }
        }
    }

    /// Parents of `id`, nearest first, ending with the root.
    pub fn ancestors(&self, id: ViewNodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.node(id).and_then(|n| n.parent),
        }
    }

    /// `id` and everything reachable below it, in display (pre)order.
    pub fn descendants(&self, id: ViewNodeId) -> Vec<ViewNodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if self.node(current).is_none() {
                continue;
            }
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    /// Number of nodes reachable from the root, the root included.
    pub fn len(&self) -> usize {
        self.descendants(self.root()).len()
    }

    /// Whether the root has no children.
    pub fn is_empty(&self) -> bool {
        self.children(self.root()).is_empty()
    }

    /// First node in display order with exactly this name.
    pub fn find(&self, name: &str) -> Option<ViewNodeId> {
        self.descendants(self.root())
            .into_iter()
            .find(|&id| self.node(id).is_some_and(|n| n.display_name == name))
    }

    /// Depth of `id` below the root (root children are at depth 0).
    pub fn depth(&self, id: ViewNodeId) -> usize {
        self.ancestors(id).count().saturating_sub(1)
    }
}

pub struct Ancestors<'a> {
    tree: &'a ViewTree,
    next: Option<ViewNodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = ViewNodeId;

    fn next(&mut self) -> Option<ViewNodeId> {
        let current = self.next?;
        self.next = self.tree.node(current).and_then(|n| n.parent);
        Some(current)
    }
}

/// Turns call-tree nodes into view nodes for one build.
pub(crate) struct NodeFactory<'a> {
    pub source: &'a dyn CallTreeSource,
    pub prepend_module: bool,
}

impl<'a> NodeFactory<'a> {
    pub fn new(source: &'a dyn CallTreeSource, prepend_module: bool) -> Self {
        Self {
            source,
            prepend_module,
        }
    }

    pub fn data_node(&self, key: NodeKey, kind: ViewNodeKind, baseline: Duration) -> ViewNode {
        let function = self
            .source
            .function_of(key)
            .and_then(|f| self.source.function(f));
        let name = function
            .map(|f| f.display_name(self.prepend_module))
            .unwrap_or_default();
        let weight = self.source.weight(key);
        let exclusive_weight = self.source.exclusive_weight(key);

        let mut node = ViewNode::blank(kind, name);
        node.module_name = function.and_then(|f| f.module.clone());
        node.sort_key = weight;
        node.weight = weight;
        node.exclusive_weight = exclusive_weight;
        node.percentage = percentage(weight, baseline);
        node.exclusive_percentage = percentage(exclusive_weight, baseline);
        node.backing = Some(key);
        node
    }

    pub fn header(
        &self,
        role: HeaderRole,
        name: &str,
        weights: Option<(Duration, Duration)>,
        baseline: Duration,
    ) -> ViewNode {
        let mut node = ViewNode::blank(ViewNodeKind::Header(role), SharedStr::from(name));
        node.sort_key = role.sort_key();
        if let Some((weight, exclusive_weight)) = weights {
            node.weight = weight;
            node.exclusive_weight = exclusive_weight;
            node.percentage = percentage(weight, baseline);
            node.exclusive_percentage = percentage(exclusive_weight, baseline);
        }
        node.is_marked = true;
        node
    }

    pub fn placeholder(&self, target: NodeKey, baseline: Duration) -> ViewNode {
        ViewNode::blank(
            ViewNodeKind::Placeholder { target, baseline },
            SharedStr::from("Placeholder"),
        )
    }
}
