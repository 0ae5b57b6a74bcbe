//! Integration test: parse a folded-stack capture, drive a `CallTreeView`
//! through background builds and check the resulting trees.

use std::sync::Arc;
use std::time::Duration;

use calltree_core::model::CallTree;
use calltree_core::views::{HeaderRole, ViewNodeKind};
use calltree_core::{CallTreeView, ViewMode, ViewNodeId, ViewTree, parse_collapsed};
use calltree_protocol::{CallTreeSettings, RowKind};

const TIMEOUT: Duration = Duration::from_secs(10);

fn fixture() -> CallTree {
    let data = include_bytes!("fixtures/render-loop.folded");
    parse_collapsed(data, Duration::from_millis(1)).expect("failed to parse fixture")
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn view_of(calls: Arc<CallTree>, settings: CallTreeSettings) -> CallTreeView {
    let mut view = CallTreeView::new(settings);
    view.set_source(calls);
    view
}

#[test]
fn top_down_build_covers_whole_profile() {
    let mut view = view_of(Arc::new(fixture()), CallTreeSettings::default());
    view.build_top_down().unwrap();
    view.wait(TIMEOUT).unwrap();

    let tree = view.tree().unwrap();
    let main = tree.node(tree.find("main").unwrap()).unwrap();
    assert_eq!(main.weight, Duration::from_secs(1));
    assert!(close(main.percentage, 1.0));

    // parse;parse;parse folds into one recursive child without children.
    let outer = tree.find("parse").unwrap();
    let inner = tree.children(outer);
    assert_eq!(inner.len(), 1);
    assert!(tree.children(inner[0]).is_empty());
}

#[test]
fn newer_request_supersedes_pending_build() {
    let calls = Arc::new(fixture());
    let malloc = calls.find_function("malloc").unwrap();
    let mut view = view_of(calls, CallTreeSettings::default());

    view.build_top_down().unwrap();
    view.build_caller_callee(malloc).unwrap();
    view.wait(TIMEOUT).unwrap();
    // A late top-down result must not replace the caller/callee tree.
    std::thread::sleep(Duration::from_millis(50));
    view.poll();

    assert_eq!(
        view.mode(),
        Some(ViewMode::CallerCallee {
            function: malloc,
            combine_instances: false,
        })
    );
    let tree = view.tree().unwrap();
    assert!(tree.find("Function instance 1").is_some());
    assert!(tree.find("Function instance 2").is_some());
}

#[test]
fn combining_instances_rebuilds_the_view() {
    let calls = Arc::new(fixture());
    let malloc = calls.find_function("malloc").unwrap();
    let mut view = view_of(calls, CallTreeSettings::default());
    view.build_caller_callee(malloc).unwrap();
    view.wait(TIMEOUT).unwrap();

    let tree = view.tree().unwrap();
    let first = tree.node(tree.find("Function instance 1").unwrap()).unwrap();
    let second = tree.node(tree.find("Function instance 2").unwrap()).unwrap();
    assert!(close(first.percentage, 0.12));
    assert!(close(second.percentage, 0.08));

    assert!(view.set_combine_instances(true).unwrap().is_some());
    view.wait(TIMEOUT).unwrap();
    let tree = view.tree().unwrap();
    let function = tree.node(tree.find("Function").unwrap()).unwrap();
    assert!(close(function.percentage, 0.2));
    assert_eq!(function.weight, Duration::from_millis(200));
}

#[test]
fn replaced_source_leaves_placeholders_empty() {
    let calls = Arc::new(fixture());
    let malloc = calls.find_function("malloc").unwrap();
    let settings = CallTreeSettings {
        combine_instances: true,
        ..CallTreeSettings::default()
    };
    let mut view = view_of(calls, settings);
    view.build_caller_callee(malloc).unwrap();
    view.wait(TIMEOUT).unwrap();

    let update = view.tree().unwrap().find("update").unwrap();
    assert_eq!(view.tree().unwrap().children(update).len(), 1);

    view.set_source(Arc::new(fixture()));
    assert!(view.expand(update).is_empty());
    assert!(view.tree().unwrap().children(update).is_empty());
}

#[test]
fn lazy_callers_expand_on_demand() {
    let calls = Arc::new(fixture());
    let malloc = calls.find_function("malloc").unwrap();
    let settings = CallTreeSettings {
        combine_instances: true,
        ..CallTreeSettings::default()
    };
    let mut view = view_of(calls, settings);
    view.build_caller_callee(malloc).unwrap();
    view.wait(TIMEOUT).unwrap();

    let update = view.tree().unwrap().find("update").unwrap();
    let callers = view.expand(update);
    let tree = view.tree().unwrap();
    assert_eq!(callers.len(), 1);
    let run_frame = tree.node(callers[0]).unwrap();
    assert_eq!(run_frame.display_name, "run_frame");
    // Callers show their own inclusive weight against the whole profile.
    assert_eq!(run_frame.weight, Duration::from_millis(800));
    assert!(close(run_frame.percentage, 0.8));
}

#[test]
fn search_marks_and_navigates_matches() {
    let mut view = view_of(Arc::new(fixture()), CallTreeSettings::default());
    view.build_top_down().unwrap();
    view.wait(TIMEOUT).unwrap();

    let (count, matches) = view.search("ALLOC");
    // malloc under update, malloc under draw_mesh, alloc_page.
    assert_eq!(count, 3);
    assert_eq!(matches.len(), 3);
    let rows = view.visible_rows();
    let matched: Vec<_> = rows.iter().filter(|r| r.search_match.is_some()).collect();
    assert_eq!(matched.len(), 3);

    assert_eq!(view.next_result(), Some(matches[0]));
    assert_eq!(view.search_status(), "1 / 3");

    view.clear_search();
    assert!(view.all_rows().iter().all(|r| r.search_match.is_none()));
}

#[test]
fn hottest_path_reaches_heaviest_leaf() {
    let mut view = view_of(Arc::new(fixture()), CallTreeSettings::default());
    view.build_top_down().unwrap();
    view.wait(TIMEOUT).unwrap();

    let main = view.tree().unwrap().find("main").unwrap();
    let path = view.expand_hottest_path(main);
    let tree = view.tree().unwrap();
    let names: Vec<String> = path
        .iter()
        .map(|&id| tree.node(id).unwrap().display_name.to_string())
        .collect();
    assert_eq!(names, vec!["main", "run_frame", "update", "physics_step"]);

    let marked: Vec<_> = view
        .visible_rows()
        .into_iter()
        .filter(|r| r.is_marked)
        .collect();
    assert_eq!(marked.len(), 4);
    assert!(marked.iter().all(|r| r.kind == RowKind::CallTree));
}

#[test]
fn views_share_one_source_across_threads() {
    let calls = Arc::new(fixture());
    let functions: Vec<_> = calls.functions().map(|(id, _)| id).collect();

    let mut views: Vec<CallTreeView> = functions
        .iter()
        .map(|&function| {
            let mut view = view_of(Arc::clone(&calls), CallTreeSettings::default());
            view.build_caller_callee(function).unwrap();
            view
        })
        .collect();

    for view in &mut views {
        view.wait(TIMEOUT).unwrap();
        assert!(!view.tree().unwrap().is_empty());
    }
}

#[test]
fn rows_serialize_for_front_ends() {
    let mut view = view_of(Arc::new(fixture()), CallTreeSettings::default());
    view.build_top_down().unwrap();
    view.wait(TIMEOUT).unwrap();
    view.search("draw");

    let rows = view.visible_rows();
    let json = serde_json::to_string(&rows).unwrap();
    let back: Vec<calltree_protocol::ViewRow> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, rows);
    assert!(back.iter().any(|r| r.name == "draw_mesh" && r.search_match.is_some()));
}

/// Expand every placeholder reachable from the root.
fn expand_everything(view: &mut CallTreeView) {
    let mut pending = vec![view.tree().unwrap().root()];
    while let Some(id) = pending.pop() {
        pending.extend(view.expand(id));
    }
}

/// Weight a callee-side row is measured against: its branch's function node.
fn branch_weight(tree: &ViewTree, called_header: ViewNodeId) -> Duration {
    let parent = tree.node(called_header).unwrap().parent.unwrap();
    let function = if parent == tree.root() {
        tree.children(parent)
            .iter()
            .copied()
            .find(|&id| tree.node(id).unwrap().kind == ViewNodeKind::Header(HeaderRole::Function))
            .unwrap()
    } else {
        parent
    };
    tree.node(function).unwrap().weight
}

/// Check every row against its parent and its percentage baseline, without
/// leaning on the percentage clamp.
fn assert_weights_bounded(tree: &ViewTree, total: Duration) {
    for id in tree.descendants(tree.root()) {
        let node = tree.node(id).unwrap();
        if node.is_placeholder() || node.kind == ViewNodeKind::Root {
            continue;
        }
        let name = &node.display_name;
        assert!(node.exclusive_weight <= node.weight, "{name}: self above total");
        assert!(node.weight <= total, "{name}: above profile weight");
        assert!(node.exclusive_percentage <= node.percentage + 1e-12);

        let parent = tree.node(node.parent.unwrap()).unwrap();
        let called = tree
            .ancestors(id)
            .find(|&a| tree.node(a).unwrap().kind == ViewNodeKind::Header(HeaderRole::Called));
        let baseline = match node.kind {
            ViewNodeKind::CallTreeNode => {
                if parent.kind != ViewNodeKind::Root {
                    assert!(node.weight <= parent.weight, "{name}: above its caller");
                }
                total
            }
            ViewNodeKind::CalleeNode => {
                assert!(node.weight <= parent.weight, "{name}: above its caller");
                branch_weight(tree, called.unwrap())
            }
            ViewNodeKind::Header(HeaderRole::Called) => branch_weight(tree, id),
            ViewNodeKind::Header(HeaderRole::Callers) => continue,
            _ => total,
        };
        let raw = node.weight.as_secs_f64() / baseline.as_secs_f64();
        assert!(raw <= 1.0 + 1e-12, "{name}: {raw} of its baseline");
        assert!(close(node.percentage, raw), "{name}: {} != {raw}", node.percentage);
    }
}

fn assert_every_view_bounded(calls: CallTree) {
    let calls = Arc::new(calls);
    let total = calls.total_weight();
    let functions: Vec<_> = calls.functions().map(|(id, _)| id).collect();

    let mut view = view_of(Arc::clone(&calls), CallTreeSettings::default());
    view.build_top_down().unwrap();
    view.wait(TIMEOUT).unwrap();
    expand_everything(&mut view);
    assert_weights_bounded(view.tree().unwrap(), total);

    for combine in [false, true] {
        view.set_combine_instances(combine).unwrap();
        for &function in &functions {
            view.build_caller_callee(function).unwrap();
            view.wait(TIMEOUT).unwrap();
            expand_everything(&mut view);
            assert_weights_bounded(view.tree().unwrap(), total);
        }
    }
}

#[test]
fn fully_expanded_fixture_views_stay_within_baselines() {
    assert_every_view_bounded(fixture());
}

/// `c` runs under `f` once and, far heavier, directly under `main`.
fn cross_context() -> CallTree {
    parse_collapsed(b"main;f;c;d 10\nmain;c;d 90\n", Duration::from_millis(1)).unwrap()
}

#[test]
fn merged_callees_do_not_pull_in_other_contexts() {
    let calls = cross_context();
    let f = calls.find_function("f").unwrap();
    let settings = CallTreeSettings {
        combine_instances: true,
        ..CallTreeSettings::default()
    };
    let mut view = view_of(Arc::new(calls), settings);
    view.build_caller_callee(f).unwrap();
    view.wait(TIMEOUT).unwrap();

    let c = view.tree().unwrap().find("c").unwrap();
    let below = view.expand(c);
    let tree = view.tree().unwrap();
    assert_eq!(below.len(), 1);
    let d = tree.node(below[0]).unwrap();
    assert_eq!(d.display_name, "d");
    assert_eq!(d.weight, Duration::from_millis(10));
    assert!(close(d.percentage, 1.0));

    assert_every_view_bounded(cross_context());
}
