use std::time::Duration;

use calltree_protocol::{CallTreeSettings, SharedStr};
use tracing::debug;

use crate::model::{CallTreeSource, FunctionId, NodeKey};

use super::ActivePath;
use super::expand::{Direction, materialize_level};
use super::node::{HeaderRole, NodeFactory, ViewNodeKind, ViewTree};
use super::sort::sort_children;

/// Build the two-sided view of `function`: for each call-path instance (or
/// for all of them merged when `combine_instances` is set) a function node,
/// a "Called" subtree with its callees and a "Callers" subtree with its
/// backtrace.
///
/// Callee percentages are relative to the instance's own weight, caller and
/// instance percentages to the whole profile. Only the first level of each
/// subtree is built; deeper levels are placeholders for [`super::expand`].
pub fn build_caller_callee(
    source: &dyn CallTreeSource,
    function: FunctionId,
    combine_instances: bool,
    settings: &CallTreeSettings,
) -> ViewTree {
    let mut tree = ViewTree::with_focus(source.id(), function);
    let root = tree.root();
    let factory = NodeFactory::new(source, settings.prepend_module);

    let instances: Vec<NodeKey> = if combine_instances {
        source.combined_node(function, None).into_iter().collect()
    } else {
        source.all_instances(function)
    };
    if instances.is_empty() {
        debug!(function = function.0, "no samples for function");
        return tree;
    }

    let total = source.total_profile_weight();
    let single = instances.len() == 1;
    let mut path = ActivePath::default();
    path.enter(function);

    for (index, &instance) in instances.iter().enumerate() {
        let name = if single {
            SharedStr::from("Function")
        } else {
            SharedStr::from(format!("Function instance {}", index + 1))
        };

        let mut function_node =
            factory.data_node(instance, ViewNodeKind::Header(HeaderRole::Function), total);
        function_node.display_name = name;
        function_node.is_marked = true;
        if single {
            function_node.sort_key = HeaderRole::Function.sort_key();
        }
        let function_id = tree.push_child(root, function_node);
        // A lone instance keeps its sections next to it, several instances
        // each get their own.
        let section_parent = if single { root } else { function_id };

        if source.has_children(instance) {
            let instance_weight = source.weight(instance);
            let children = source.children(instance);
            let called_weight: Duration = children.iter().map(|&c| source.weight(c)).sum();
            let called_exclusive: Duration =
                children.iter().map(|&c| source.exclusive_weight(c)).sum();
            let header = factory.header(
                HeaderRole::Called,
                "Called",
                Some((called_weight, called_exclusive)),
                instance_weight,
            );
            let header_id = tree.push_child(section_parent, header);
            materialize_level(
                &factory,
                &mut tree,
                header_id,
                instance,
                Direction::Callees,
                instance_weight,
                &path,
            );
        }

        if source.has_callers(instance) {
            let header = factory.header(HeaderRole::Callers, "Callers", None, total);
            let header_id = tree.push_child(section_parent, header);
            materialize_level(
                &factory,
                &mut tree,
                header_id,
                instance,
                Direction::Callers,
                total,
                &path,
            );
        }

        sort_children(&mut tree, function_id);
    }
    sort_children(&mut tree, root);

    debug!(
        function = function.0,
        instances = instances.len(),
        combine_instances,
        "built caller/callee tree"
    );
    tree
}
