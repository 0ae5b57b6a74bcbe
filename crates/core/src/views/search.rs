use calltree_protocol::TextSpan;
use tracing::debug;

use super::node::{ViewNodeId, ViewNodeKind, ViewTree};

/// Matches of the last search, in display order, with a cursor for
/// jumping between them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResults {
    matches: Vec<ViewNodeId>,
    current: Option<usize>,
}

impl SearchResults {
    pub fn count(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn matches(&self) -> &[ViewNodeId] {
        &self.matches
    }

    pub fn current(&self) -> Option<ViewNodeId> {
        self.current.map(|i| self.matches[i])
    }

    /// Move to the next match, wrapping around after the last.
    pub fn next(&mut self) -> Option<ViewNodeId> {
        if self.matches.is_empty() {
            return None;
        }
        let next = self.current.map_or(0, |i| (i + 1) % self.matches.len());
        self.current = Some(next);
        self.current()
    }

    /// Move to the previous match, wrapping around before the first.
    pub fn previous(&mut self) -> Option<ViewNodeId> {
        if self.matches.is_empty() {
            return None;
        }
        let len = self.matches.len();
        let previous = self.current.map_or(len - 1, |i| (i + len - 1) % len);
        self.current = Some(previous);
        self.current()
    }

    /// `"3 / 7"` while a match is selected, `"Not found"` when nothing
    /// matched.
    pub fn status_text(&self) -> String {
        match (self.current, self.matches.len()) {
            (_, 0) => "Not found".to_owned(),
            (Some(i), n) => format!("{} / {n}", i + 1),
            (None, n) => format!("0 / {n}"),
        }
    }
}

/// Simple per-char case folding: the first char of the lowercase mapping,
/// so `İ` folds to `i` and every haystack char stays one matching unit.
fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Byte span of the first case-insensitive occurrence of `needle`.
fn find_ignore_case(haystack: &str, needle: &str) -> Option<TextSpan> {
    let needle: Vec<char> = needle.chars().map(fold).collect();
    if needle.is_empty() {
        return None;
    }
    let chars: Vec<(usize, char)> = haystack.char_indices().collect();
    let window = chars.windows(needle.len()).find(|window| {
        window
            .iter()
            .zip(&needle)
            .all(|(&(_, c), &n)| fold(c) == n)
    })?;
    let (&(start, _), &(last, c)) = (window.first()?, window.last()?);
    Some(TextSpan::new(start, last + c.len_utf8() - start))
}

/// Scan every node of `tree` for `text` and mark the matches.
///
/// Earlier matches are cleared first. Every match gets its span set and all
/// of its ancestors expanded so it is visible. Text shorter than `min_len`
/// characters only clears.
pub fn search(tree: &mut ViewTree, text: &str, min_len: usize) -> SearchResults {
    clear_search(tree);
    if text.chars().count() < min_len {
        return SearchResults::default();
    }

    let mut matches = Vec::new();
    for id in tree.descendants(tree.root()) {
        let Some(node) = tree.node(id) else {
            continue;
        };
        let searchable = match node.kind {
            ViewNodeKind::Root | ViewNodeKind::Placeholder { .. } => false,
            ViewNodeKind::Header(_)
            | ViewNodeKind::CallTreeNode
            | ViewNodeKind::CallerNode
            | ViewNodeKind::CalleeNode => true,
        };
        if !searchable {
            continue;
        }
        if let Some(span) = find_ignore_case(&node.display_name, text) {
            if let Some(node) = tree.node_mut(id) {
                node.search_match = Some(span);
            }
            matches.push(id);
        }
    }

    for &id in &matches {
        let ancestors: Vec<ViewNodeId> = tree.ancestors(id).collect();
        for ancestor in ancestors {
            if let Some(node) = tree.node_mut(ancestor) {
                node.is_expanded = true;
            }
        }
    }

    debug!(text, matches = matches.len(), "searched view tree");
    SearchResults {
        matches,
        current: None,
    }
}

/// Reset every match span. Structure and expansion are left as they are.
pub fn clear_search(tree: &mut ViewTree) {
    for node in tree.nodes_mut() {
        node.search_match = None;
    }
}
