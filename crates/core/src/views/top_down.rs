use std::time::Duration;

use calltree_protocol::CallTreeSettings;
use tracing::debug;

use crate::model::{CallTreeSource, FunctionId, NodeKey};

use super::ActivePath;
use super::node::{NodeFactory, ViewNodeId, ViewNodeKind, ViewTree};
use super::sort::sort_children;

enum Step {
    Visit { key: NodeKey, parent: ViewNodeId },
    Leave { function: FunctionId, node: ViewNodeId },
}

/// Build the aggregate call tree rooted at the profile's entry points.
///
/// All percentages are relative to the whole profile. A function that is
/// already on the current path is shown once more, without children, so
/// recursion stays visible but finite.
pub fn build_top_down(source: &dyn CallTreeSource, settings: &CallTreeSettings) -> ViewTree {
    let mut tree = ViewTree::new(source.id());
    let factory = NodeFactory::new(source, settings.prepend_module);
    let baseline: Duration = source.total_profile_weight();
    let root = tree.root();

    let mut path = ActivePath::default();
    let mut steps: Vec<Step> = source
        .root_nodes()
        .into_iter()
        .rev()
        .map(|key| Step::Visit { key, parent: root })
        .collect();

    while let Some(step) = steps.pop() {
        match step {
            Step::Visit { key, parent } => {
                let node = tree.push_child(
                    parent,
                    factory.data_node(key, ViewNodeKind::CallTreeNode, baseline),
                );
                let Some(function) = source.function_of(key) else {
                    continue;
                };
                if !path.enter(function) {
                    continue;
                }
                steps.push(Step::Leave { function, node });
                steps.extend(
                    source
                        .children(key)
                        .into_iter()
                        .rev()
                        .map(|key| Step::Visit { key, parent: node }),
                );
            }
            Step::Leave { function, node } => {
                path.leave(function);
                sort_children(&mut tree, node);
            }
        }
    }
    sort_children(&mut tree, root);

    debug!(nodes = tree.len(), "built top-down call tree");
    tree
}
