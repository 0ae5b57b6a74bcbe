//! View synthesis: turns a [`CallTreeSource`](crate::model::CallTreeSource)
//! into presentation trees.

pub mod caller_callee;
pub mod expand;
pub mod navigate;
pub mod node;
pub mod percentage;
pub mod search;
pub mod sort;
pub mod top_down;

use std::collections::HashSet;
use std::iter;

use crate::model::{CallTreeSource, FunctionId};

pub use caller_callee::build_caller_callee;
pub use expand::expand;
pub use navigate::{all_rows, collapse, expand_hottest_path, visible_rows};
pub use node::{HeaderRole, ViewNode, ViewNodeId, ViewNodeKind, ViewTree};
pub use percentage::{format_percentage, percentage};
pub use search::{SearchResults, clear_search, search};
pub use sort::sort_children;
pub use top_down::build_top_down;

/// Functions on the path currently being expanded. Scoped to one path, so a
/// function may still show up again in unrelated branches.
#[derive(Debug, Default)]
pub(crate) struct ActivePath {
    functions: HashSet<FunctionId>,
}

impl ActivePath {
    /// Returns `false` if `function` is already on the path (recursion).
    pub fn enter(&mut self, function: FunctionId) -> bool {
        self.functions.insert(function)
    }

    pub fn leave(&mut self, function: FunctionId) {
        self.functions.remove(&function);
    }

    pub fn contains(&self, function: FunctionId) -> bool {
        self.functions.contains(&function)
    }

    /// The path from `node` up to the root of an existing view tree,
    /// including the view's inspected function.
    pub fn of_view_node(tree: &ViewTree, node: ViewNodeId, source: &dyn CallTreeSource) -> Self {
        let functions = iter::once(node)
            .chain(tree.ancestors(node))
            .filter_map(|id| tree.node(id)?.backing)
            .filter_map(|key| source.function_of(key))
            .chain(tree.focus())
            .collect();
        Self { functions }
    }
}
