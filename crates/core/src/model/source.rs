use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::call_tree::CallTree;
use super::function::{Function, FunctionId};

/// Interned set of call-path instances a [`FunctionGroup`] is scoped to,
/// see [`CallTree::scope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId(pub u32);

/// Which instances of its function a [`FunctionGroup`] covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupScope {
    All,
    /// Instances whose direct caller is one of the scope's instances.
    CalledBy(ScopeId),
    /// Instances that directly call one of the scope's instances.
    Calling(ScopeId),
}

/// A synthetic node merging instances of one function.
///
/// The children of a group are groups scoped to its own instances, so a
/// merged callee only ever covers time spent below the merged caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionGroup {
    pub function: FunctionId,
    pub scope: GroupScope,
}

impl FunctionGroup {
    /// Every instance of `function`.
    pub fn all(function: FunctionId) -> Self {
        Self {
            function,
            scope: GroupScope::All,
        }
    }
}

/// Non-owning reference to a node of a [`CallTreeSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKey {
    Instance(super::NodeId),
    Group(FunctionGroup),
}

/// Read-only access to a profile's call tree.
///
/// View builds run on worker threads and may read the same source
/// concurrently. Unknown keys resolve to empty lists and zero weights.
pub trait CallTreeSource: Send + Sync {
    /// Identity used to detect that a view was built from another source.
    fn id(&self) -> u64;

    fn root_nodes(&self) -> Vec<NodeKey>;
    fn children(&self, node: NodeKey) -> Vec<NodeKey>;
    fn callers(&self, node: NodeKey) -> Vec<NodeKey>;

    fn has_children(&self, node: NodeKey) -> bool {
        !self.children(node).is_empty()
    }

    fn has_callers(&self, node: NodeKey) -> bool {
        !self.callers(node).is_empty()
    }

    fn weight(&self, node: NodeKey) -> Duration;
    fn exclusive_weight(&self, node: NodeKey) -> Duration;
    fn total_profile_weight(&self) -> Duration;

    /// The single aggregated node of `function`, restricted to instances
    /// called directly by `parent` (or by one of its instances) when a parent
    /// is given. `None` when nothing matches.
    fn combined_node(&self, function: FunctionId, parent: Option<NodeKey>) -> Option<NodeKey>;

    fn all_instances(&self, function: FunctionId) -> Vec<NodeKey>;

    /// Whether `node` still resolves in this source.
    fn contains(&self, node: NodeKey) -> bool;

    fn function_of(&self, node: NodeKey) -> Option<FunctionId>;
    fn function(&self, function: FunctionId) -> Option<&Function>;
}

impl CallTreeSource for CallTree {
    fn id(&self) -> u64 {
        CallTree::id(self)
    }

    fn root_nodes(&self) -> Vec<NodeKey> {
        self.roots().iter().map(|&id| NodeKey::Instance(id)).collect()
    }

    fn children(&self, node: NodeKey) -> Vec<NodeKey> {
        match node {
            NodeKey::Instance(id) => self
                .node(id)
                .map(|n| n.children.iter().map(|&c| NodeKey::Instance(c)).collect())
                .unwrap_or_default(),
            NodeKey::Group(group) => self.group(group).children.clone(),
        }
    }

    fn callers(&self, node: NodeKey) -> Vec<NodeKey> {
        match node {
            NodeKey::Instance(id) => self
                .node(id)
                .and_then(|n| n.caller)
                .map(|c| vec![NodeKey::Instance(c)])
                .unwrap_or_default(),
            NodeKey::Group(group) => self.group(group).callers.clone(),
        }
    }

    fn has_children(&self, node: NodeKey) -> bool {
        match node {
            NodeKey::Instance(id) => self.node(id).is_some_and(|n| n.has_children()),
            NodeKey::Group(group) => !self.group(group).children.is_empty(),
        }
    }

    fn has_callers(&self, node: NodeKey) -> bool {
        match node {
            NodeKey::Instance(id) => self.node(id).is_some_and(|n| n.has_callers()),
            NodeKey::Group(group) => !self.group(group).callers.is_empty(),
        }
    }

    fn weight(&self, node: NodeKey) -> Duration {
        match node {
            NodeKey::Instance(id) => self.node(id).map_or(Duration::ZERO, |n| n.weight),
            NodeKey::Group(group) => self.group(group).weight,
        }
    }

    fn exclusive_weight(&self, node: NodeKey) -> Duration {
        match node {
            NodeKey::Instance(id) => self.node(id).map_or(Duration::ZERO, |n| n.exclusive_weight),
            NodeKey::Group(group) => self.group(group).exclusive_weight,
        }
    }

    fn total_profile_weight(&self) -> Duration {
        self.total_weight()
    }

    fn combined_node(&self, function: FunctionId, parent: Option<NodeKey>) -> Option<NodeKey> {
        let scope = match parent {
            None => GroupScope::All,
            Some(NodeKey::Instance(id)) => {
                self.node(id)?;
                GroupScope::CalledBy(self.scope(vec![id]))
            }
            Some(NodeKey::Group(parent)) => {
                GroupScope::CalledBy(self.scope(self.group(parent).instances.clone()))
            }
        };
        let group = FunctionGroup { function, scope };
        if self.group(group).instances.is_empty() {
            None
        } else {
            Some(NodeKey::Group(group))
        }
    }

    fn all_instances(&self, function: FunctionId) -> Vec<NodeKey> {
        self.instances(function)
            .iter()
            .map(|&id| NodeKey::Instance(id))
            .collect()
    }

    fn contains(&self, node: NodeKey) -> bool {
        match node {
            NodeKey::Instance(id) => self.node(id).is_some(),
            NodeKey::Group(group) => {
                CallTree::function(self, group.function).is_some()
                    && !self.group(group).instances.is_empty()
            }
        }
    }

    fn function_of(&self, node: NodeKey) -> Option<FunctionId> {
        match node {
            NodeKey::Instance(id) => self.node(id).map(|n| n.function),
            NodeKey::Group(group) => CallTree::function(self, group.function).map(|_| group.function),
        }
    }

    fn function(&self, function: FunctionId) -> Option<&Function> {
        CallTree::function(self, function)
    }
}
