use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::SharedStr;

/// Byte range of a search match inside a display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSpan {
    pub offset: usize,
    pub length: usize,
}

impl TextSpan {
    pub fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }

    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    /// Split `text` into the parts before, inside and after the span.
    ///
    /// Returns `None` when the span does not fall on char boundaries of `text`,
    /// which happens if the span was computed for a different string.
    pub fn split<'a>(&self, text: &'a str) -> Option<(&'a str, &'a str, &'a str)> {
        let before = text.get(..self.offset)?;
        let inside = text.get(self.offset..self.end())?;
        let after = text.get(self.end()..)?;
        Some((before, inside, after))
    }
}

/// Row flavor, mirroring the engine's node kinds minus the invisible root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowKind {
    Header,
    CallTree,
    Caller,
    Callee,
    Placeholder,
}

/// One line of a flattened call-tree view, ready for a tree-list widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRow {
    /// Arena index of the view node, handed back by the UI on expand/select.
    pub node: u32,
    /// Nesting level; direct children of the root are at depth 0.
    pub depth: u32,
    pub kind: RowKind,
    pub name: SharedStr,
    pub module: Option<SharedStr>,
    pub weight: Duration,
    pub exclusive_weight: Duration,
    pub percentage: f64,
    pub exclusive_percentage: f64,
    pub has_children: bool,
    pub is_expanded: bool,
    pub is_marked: bool,
    pub search_match: Option<TextSpan>,
}
