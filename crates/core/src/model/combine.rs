use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::call_tree::{CallTree, NodeId};
use super::function::FunctionId;
use super::source::{FunctionGroup, GroupScope, NodeKey, ScopeId};

/// Instance sets referenced by scoped groups. Entries are never removed, so
/// a `ScopeId` stays valid for the lifetime of its tree.
#[derive(Debug, Default)]
pub(crate) struct ScopeTable {
    sets: Vec<Arc<[NodeId]>>,
    index: HashMap<Arc<[NodeId]>, ScopeId>,
}

/// The merged view of every instance selected by a [`FunctionGroup`].
#[derive(Debug)]
pub(crate) struct GroupNode {
    /// Matching instances, heaviest first.
    pub instances: Vec<NodeId>,
    pub weight: Duration,
    pub exclusive_weight: Duration,
    pub children: Vec<NodeKey>,
    pub callers: Vec<NodeKey>,
}

impl CallTree {
    /// Resolve `group`, reusing an earlier resolution when possible.
    pub(crate) fn group(&self, group: FunctionGroup) -> Arc<GroupNode> {
        if let Some(node) = self.groups.read().get(&group) {
            return Arc::clone(node);
        }
        let node = Arc::new(self.combine(group));
        Arc::clone(self.groups.write().entry(group).or_insert(node))
    }

    /// Intern a set of instances. Equal sets share one id.
    pub fn scope(&self, mut instances: Vec<NodeId>) -> ScopeId {
        instances.sort_unstable();
        instances.dedup();
        let set: Arc<[NodeId]> = instances.into();
        if let Some(&id) = self.scopes.read().index.get(&set) {
            return id;
        }
        let mut scopes = self.scopes.write();
        if let Some(&id) = scopes.index.get(&set) {
            return id;
        }
        let id = ScopeId(scopes.sets.len() as u32);
        scopes.sets.push(Arc::clone(&set));
        scopes.index.insert(set, id);
        id
    }

    /// Sorted members of `scope`; empty for ids from another tree.
    fn scope_members(&self, scope: ScopeId) -> Arc<[NodeId]> {
        self.scopes
            .read()
            .sets
            .get(scope.0 as usize)
            .cloned()
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    fn matches(&self, id: NodeId, scope: GroupScope, members: &[NodeId]) -> bool {
        let node = &self.nodes[id.index()];
        match scope {
            GroupScope::All => true,
            GroupScope::CalledBy(_) => node
                .caller
                .is_some_and(|caller| members.binary_search(&caller).is_ok()),
            GroupScope::Calling(_) => node
                .children
                .iter()
                .any(|child| members.binary_search(child).is_ok()),
        }
    }

    fn is_nested_in(&self, id: NodeId, counted: &HashSet<NodeId>) -> bool {
        let mut current = self.nodes[id.index()].caller;
        while let Some(caller) = current {
            if counted.contains(&caller) {
                return true;
            }
            current = self.nodes[caller.index()].caller;
        }
        false
    }

    fn combine(&self, group: FunctionGroup) -> GroupNode {
        let members: Arc<[NodeId]> = match group.scope {
            GroupScope::All => Arc::from(Vec::new()),
            GroupScope::CalledBy(scope) | GroupScope::Calling(scope) => self.scope_members(scope),
        };
        let mut instances: Vec<NodeId> = self
            .instances(group.function)
            .iter()
            .copied()
            .filter(|&id| self.matches(id, group.scope, &members))
            .collect();
        // Outer instances of a recursive function are heavier than the ones
        // nested inside them, so they are counted first.
        instances.sort_by(|a, b| {
            self.nodes[b.index()]
                .weight
                .cmp(&self.nodes[a.index()].weight)
        });

        let mut counted = HashSet::new();
        let mut weight = Duration::ZERO;
        let mut exclusive_weight = Duration::ZERO;
        let mut children = Vec::new();
        let mut callers = Vec::new();
        let mut seen_children: HashSet<FunctionId> = HashSet::new();
        let mut seen_callers: HashSet<FunctionId> = HashSet::new();
        // Neighbour groups only cover instances adjacent to this group's own.
        let own = self.scope(instances.clone());

        for &id in &instances {
            let node = &self.nodes[id.index()];
            if !self.is_nested_in(id, &counted) {
                weight += node.weight;
                counted.insert(id);
            }
            exclusive_weight += node.exclusive_weight;

            for child in &node.children {
                let child_fn = self.nodes[child.index()].function;
                if seen_children.insert(child_fn) {
                    children.push(NodeKey::Group(FunctionGroup {
                        function: child_fn,
                        scope: GroupScope::CalledBy(own),
                    }));
                }
            }

            if let Some(caller) = node.caller {
                let caller_fn = self.nodes[caller.index()].function;
                if seen_callers.insert(caller_fn) {
                    callers.push(NodeKey::Group(FunctionGroup {
                        function: caller_fn,
                        scope: GroupScope::Calling(own),
                    }));
                }
            }
        }

        debug!(
            function = group.function.0,
            instances = instances.len(),
            counted = counted.len(),
            "combined call tree instances"
        );

        GroupNode {
            instances,
            weight,
            exclusive_weight,
            children,
            callers,
        }
    }
}
