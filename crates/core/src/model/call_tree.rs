use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use calltree_protocol::SharedStr;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::combine::{GroupNode, ScopeTable};
use super::function::{Function, FunctionId};
use super::source::{FunctionGroup, NodeKey};

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

/// Index of a call-path instance inside its `CallTree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// One call-path instance: a function reached through one specific stack.
/// Samples with the same stack prefix share the instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallTreeNode {
    pub id: NodeId,
    pub function: FunctionId,
    /// Inclusive time of this call path.
    pub weight: Duration,
    /// Time spent in this call path itself, excluding callees.
    pub exclusive_weight: Duration,
    pub children: Vec<NodeId>,
    pub caller: Option<NodeId>,
}

impl CallTreeNode {
    /// Whether this path calls anything.
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Whether this path has a caller, i.e. is not a root.
    pub fn has_callers(&self) -> bool {
        self.caller.is_some()
    }
}

/// Per-function totals below some node, see [`CallTree::top_functions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSummary {
    pub function: FunctionId,
    pub weight: Duration,
    pub exclusive_weight: Duration,
}

/// An aggregated call tree built from weighted stack samples.
///
/// Append-only while samples are added; afterwards it is shared read-only
/// (usually behind an `Arc`) with any number of view builds.
#[derive(Debug)]
pub struct CallTree {
    id: u64,
    functions: Vec<Function>,
    function_index: HashMap<(SharedStr, Option<SharedStr>), FunctionId>,
    pub(crate) nodes: Vec<CallTreeNode>,
    roots: Vec<NodeId>,
    instances: HashMap<FunctionId, Vec<NodeId>>,
    total_weight: Duration,
    pub(crate) groups: RwLock<HashMap<FunctionGroup, Arc<GroupNode>>>,
    pub(crate) scopes: RwLock<ScopeTable>,
}

impl CallTree {
    /// An empty tree with a fresh identity.
    pub fn new() -> Self {
        Self {
            id: NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed),
            functions: Vec::new(),
            function_index: HashMap::new(),
            nodes: Vec::new(),
            roots: Vec::new(),
            instances: HashMap::new(),
            total_weight: Duration::ZERO,
            groups: RwLock::new(HashMap::new()),
            scopes: RwLock::new(ScopeTable::default()),
        }
    }

    /// Process-unique identity of this tree.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Return the id of `name` in `module`, registering it on first use.
    pub fn intern_function(&mut self, name: &str, module: Option<&str>) -> FunctionId {
        let key = (SharedStr::from(name), module.map(SharedStr::from));
        if let Some(&id) = self.function_index.get(&key) {
            return id;
        }
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(Function::new(key.0.clone(), key.1.clone()));
        self.function_index.insert(key, id);
        id
    }

    /// The interned function behind `id`.
    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(id.index())
    }

    /// Every interned function, in interning order.
    pub fn functions(&self) -> impl Iterator<Item = (FunctionId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FunctionId(i as u32), f))
    }

    /// First function with the given name, in any module.
    pub fn find_function(&self, name: &str) -> Option<FunctionId> {
        self.functions()
            .find(|(_, f)| f.name == name)
            .map(|(id, _)| id)
    }

    /// Account one sample. `stack` lists the frames outermost first.
    ///
    /// Every frame on the stack gets the sample's weight; the innermost frame
    /// additionally gets it as exclusive weight.
    pub fn add_sample(&mut self, stack: &[FunctionId], weight: Duration) {
        let Some((&first, rest)) = stack.split_first() else {
            return;
        };

        let mut node = self.root_for(first);
        self.nodes[node.index()].weight += weight;
        for &function in rest {
            node = self.child_for(node, function);
            self.nodes[node.index()].weight += weight;
        }
        self.nodes[node.index()].exclusive_weight += weight;
        self.total_weight += weight;

        // Combined nodes are derived from the instances; recompute on demand.
        self.groups.get_mut().clear();
    }

    /// The call-path instance `id`, or `None` for ids of another tree.
    pub fn node(&self, id: NodeId) -> Option<&CallTreeNode> {
        self.nodes.get(id.index())
    }

    /// Outermost frames, one per distinct first function.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Every call-path instance of `function`, in creation order.
    pub fn instances(&self, function: FunctionId) -> &[NodeId] {
        self.instances
            .get(&function)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Sum of all sample weights.
    pub fn total_weight(&self) -> Duration {
        self.total_weight
    }

    /// The caller chain of `node`, nearest caller first.
    pub fn backtrace(&self, node: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.node(node).and_then(|n| n.caller);
        while let Some(id) = current {
            chain.push(id);
            current = self.node(id).and_then(|n| n.caller);
        }
        chain
    }

    /// Functions executed below `key` (the node itself included), merged by
    /// function and ranked by exclusive weight.
    ///
    /// Inclusive weight is only counted for the outermost occurrence of a
    /// function on each path so recursion is not counted twice.
    pub fn top_functions(&self, key: NodeKey) -> Vec<FunctionSummary> {
        let starts: Vec<NodeId> = match key {
            NodeKey::Instance(id) if self.node(id).is_some() => vec![id],
            NodeKey::Instance(_) => Vec::new(),
            NodeKey::Group(group) => {
                let instances = self.group(group).instances.clone();
                let all: HashSet<NodeId> = instances.iter().copied().collect();
                // Nested instances are walked as part of their outer one.
                instances
                    .into_iter()
                    .filter(|&id| !self.backtrace(id).iter().any(|c| all.contains(c)))
                    .collect()
            }
        };
        self.rank_functions(&starts)
    }

    /// [`Self::top_functions`] over the whole profile.
    pub fn profile_functions(&self) -> Vec<FunctionSummary> {
        self.rank_functions(&self.roots)
    }

    fn rank_functions(&self, starts: &[NodeId]) -> Vec<FunctionSummary> {
        let mut totals: HashMap<FunctionId, FunctionSummary> = HashMap::new();
        let mut on_path: HashMap<FunctionId, u32> = HashMap::new();
        // (node, leaving): the second visit pops the function off the path.
        let mut stack: Vec<(NodeId, bool)> = starts.iter().rev().map(|&id| (id, false)).collect();

        while let Some((id, leaving)) = stack.pop() {
            let node = &self.nodes[id.index()];
            if leaving {
                if let Some(depth) = on_path.get_mut(&node.function) {
                    *depth -= 1;
                }
                continue;
            }

            let entry = totals
                .entry(node.function)
                .or_insert_with(|| FunctionSummary {
                    function: node.function,
                    weight: Duration::ZERO,
                    exclusive_weight: Duration::ZERO,
                });
            let depth = on_path.entry(node.function).or_insert(0);
            if *depth == 0 {
                entry.weight += node.weight;
            }
            entry.exclusive_weight += node.exclusive_weight;
            *depth += 1;

            stack.push((id, true));
            stack.extend(node.children.iter().rev().map(|&child| (child, false)));
        }

        let mut summaries: Vec<FunctionSummary> = totals.into_values().collect();
        summaries.sort_by(|a, b| {
            b.exclusive_weight
                .cmp(&a.exclusive_weight)
                .then_with(|| a.function.cmp(&b.function))
        });
        summaries
    }

    fn root_for(&mut self, function: FunctionId) -> NodeId {
        if let Some(&id) = self
            .roots
            .iter()
            .find(|id| self.nodes[id.index()].function == function)
        {
            return id;
        }
        let id = self.push_node(function, None);
        self.roots.push(id);
        id
    }

    fn child_for(&mut self, parent: NodeId, function: FunctionId) -> NodeId {
        if let Some(&id) = self.nodes[parent.index()]
            .children
            .iter()
            .find(|id| self.nodes[id.index()].function == function)
        {
            return id;
        }
        let id = self.push_node(function, Some(parent));
        self.nodes[parent.index()].children.push(id);
        id
    }

    fn push_node(&mut self, function: FunctionId, caller: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(CallTreeNode {
            id,
            function,
            weight: Duration::ZERO,
            exclusive_weight: Duration::ZERO,
            children: Vec::new(),
            caller,
        });
        self.instances.entry(function).or_default().push(id);
        id
    }
}

impl Default for CallTree {
    fn default() -> Self {
        Self::new()
    }
}
