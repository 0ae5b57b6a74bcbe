pub mod call_tree;
mod combine;
pub mod function;
pub mod source;

pub use call_tree::{CallTree, CallTreeNode, FunctionSummary, NodeId};
pub use function::{Function, FunctionId};
pub use source::{CallTreeSource, FunctionGroup, GroupScope, NodeKey, ScopeId};
