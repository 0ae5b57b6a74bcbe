//! UI-facing controller: owns the current view tree, runs full builds on
//! the rayon pool and keeps only the newest result.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use calltree_protocol::{CallTreeSettings, ViewRow};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{CallTreeSource, FunctionId};
use crate::views::{self, SearchResults, ViewNodeId, ViewTree};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewError {
    #[error("no call tree loaded")]
    NoSource,
    #[error("no view build is pending")]
    NothingPending,
    #[error("view build did not finish within {0:?}")]
    Timeout(Duration),
    /// The worker went away without a result, e.g. because the build panicked.
    #[error("view build worker disconnected")]
    Disconnected,
}

/// Which tree the view shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    TopDown,
    CallerCallee {
        function: FunctionId,
        combine_instances: bool,
    },
}

struct BuildResult {
    generation: u64,
    mode: ViewMode,
    tree: ViewTree,
}

/// The one build whose result will be installed. Each build reports on its
/// own channel, so a dropped worker shows up as a disconnect.
struct PendingBuild {
    generation: u64,
    mode: ViewMode,
    receiver: Receiver<BuildResult>,
}

/// One call-tree view as a UI drives it.
///
/// Full builds run in the background; each request supersedes the previous
/// one, and results of superseded builds are dropped on arrival. Expansion,
/// search and navigation run synchronously on the owning thread.
pub struct CallTreeView {
    settings: CallTreeSettings,
    source: Option<Arc<dyn CallTreeSource>>,
    generation: Arc<AtomicU64>,
    pending: Option<PendingBuild>,
    /// Mode of the installed tree.
    mode: Option<ViewMode>,
    tree: Option<ViewTree>,
    search: SearchResults,
}

impl CallTreeView {
    pub fn new(settings: CallTreeSettings) -> Self {
        Self {
            settings,
            source: None,
            generation: Arc::new(AtomicU64::new(0)),
            pending: None,
            mode: None,
            tree: None,
            search: SearchResults::default(),
        }
    }

    pub fn settings(&self) -> &CallTreeSettings {
        &self.settings
    }

    /// Switch to another profile. Any build in flight becomes stale. The
    /// current tree stays visible until the next build replaces it, but its
    /// placeholders no longer expand.
    pub fn set_source(&mut self, source: Arc<dyn CallTreeSource>) {
        self.invalidate();
        debug!(source = source.id(), "call tree source replaced");
        self.source = Some(source);
    }

    /// Drop the profile and the tree built from it.
    pub fn clear_source(&mut self) {
        self.invalidate();
        self.source = None;
        self.tree = None;
        self.mode = None;
        self.search = SearchResults::default();
    }

    /// Request a top-down tree of the whole profile. Returns the build's
    /// generation.
    pub fn build_top_down(&mut self) -> Result<u64, ViewError> {
        self.spawn(ViewMode::TopDown)
    }

    /// Request the caller/callee tree of `function`, combining instances as
    /// the current settings say.
    pub fn build_caller_callee(&mut self, function: FunctionId) -> Result<u64, ViewError> {
        self.spawn(ViewMode::CallerCallee {
            function,
            combine_instances: self.settings.combine_instances,
        })
    }

    /// Toggle instance combination, rebuilding a caller/callee view that is
    /// shown or pending.
    pub fn set_combine_instances(&mut self, combine: bool) -> Result<Option<u64>, ViewError> {
        self.settings.combine_instances = combine;
        match self.pending_mode().or(self.mode) {
            Some(ViewMode::CallerCallee { function, .. }) => {
                self.build_caller_callee(function).map(Some)
            }
            Some(ViewMode::TopDown) | None => Ok(None),
        }
    }

    fn invalidate(&mut self) -> u64 {
        self.pending = None;
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn spawn(&mut self, mode: ViewMode) -> Result<u64, ViewError> {
        let source = self.source.clone().ok_or(ViewError::NoSource)?;
        let generation = self.invalidate();
        let (sender, receiver) = crossbeam_channel::bounded(1);
        self.pending = Some(PendingBuild {
            generation,
            mode,
            receiver,
        });

        let current = Arc::clone(&self.generation);
        let settings = self.settings.clone();
        debug!(generation, ?mode, "view build requested");

        rayon::spawn(move || {
            // Superseded before it started; the newer request will answer.
            if current.load(Ordering::Acquire) != generation {
                debug!(generation, "skipping superseded view build");
                return;
            }
            let tree = match mode {
                ViewMode::TopDown => views::build_top_down(&*source, &settings),
                ViewMode::CallerCallee {
                    function,
                    combine_instances,
                } => views::build_caller_callee(&*source, function, combine_instances, &settings),
            };
            // The request may be superseded by now; nobody listens then.
            let _ = sender.send(BuildResult {
                generation,
                mode,
                tree,
            });
        });
        Ok(generation)
    }

    fn accept(&mut self, result: BuildResult) -> bool {
        if self.pending.as_ref().map(|p| p.generation) != Some(result.generation) {
            debug!(generation = result.generation, "discarding stale view build");
            return false;
        }
        debug!(
            generation = result.generation,
            nodes = result.tree.len(),
            "view build finished"
        );
        self.pending = None;
        self.mode = Some(result.mode);
        self.tree = Some(result.tree);
        self.search = SearchResults::default();
        true
    }

    fn lost_worker(&mut self) {
        if let Some(pending) = self.pending.take() {
            warn!(generation = pending.generation, "view build ended without a result");
        }
    }

    /// Install the pending build if it has finished. Returns `true` when the
    /// tree changed.
    pub fn poll(&mut self) -> bool {
        let Some(pending) = &self.pending else {
            return false;
        };
        match pending.receiver.try_recv() {
            Ok(result) => self.accept(result),
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                self.lost_worker();
                false
            }
        }
    }

    /// Block until the pending build is installed.
    pub fn wait(&mut self, timeout: Duration) -> Result<(), ViewError> {
        let Some(pending) = &self.pending else {
            return Err(ViewError::NothingPending);
        };
        match pending.receiver.recv_timeout(timeout) {
            Ok(result) => {
                self.accept(result);
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => Err(ViewError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => {
                self.lost_worker();
                Err(ViewError::Disconnected)
            }
        }
    }

    /// Whether a requested build has not been installed yet.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Mode of the tree currently shown. A pending build does not change it
    /// until it is installed.
    pub fn mode(&self) -> Option<ViewMode> {
        self.mode
    }

    /// Mode of the build that is still running, if any.
    pub fn pending_mode(&self) -> Option<ViewMode> {
        self.pending.as_ref().map(|p| p.mode)
    }

    /// The installed view tree, if any.
    pub fn tree(&self) -> Option<&ViewTree> {
        self.tree.as_ref()
    }

    /// Materialize the children behind a placeholder. Empty when nothing is
    /// shown or the placeholder belongs to a replaced source.
    pub fn expand(&mut self, node: ViewNodeId) -> Vec<ViewNodeId> {
        match (self.tree.as_mut(), self.source.as_deref()) {
            (Some(tree), Some(source)) => views::expand(tree, node, source, &self.settings),
            (Some(tree), None) => tree.children(node).to_vec(),
            (None, _) => Vec::new(),
        }
    }

    /// Returns the match count and the matched nodes in display order.
    pub fn search(&mut self, text: &str) -> (usize, Vec<ViewNodeId>) {
        let Some(tree) = self.tree.as_mut() else {
            return (0, Vec::new());
        };
        self.search = views::search(tree, text, self.settings.min_search_length);
        (self.search.count(), self.search.matches().to_vec())
    }

    /// Remove every search mark and reset the result cursor.
    pub fn clear_search(&mut self) {
        if let Some(tree) = self.tree.as_mut() {
            views::clear_search(tree);
        }
        self.search = SearchResults::default();
    }

    /// Move to the next match, wrapping after the last.
    pub fn next_result(&mut self) -> Option<ViewNodeId> {
        self.search.next()
    }

    pub fn previous_result(&mut self) -> Option<ViewNodeId> {
        self.search.previous()
    }

    /// `"i / n"`, or `"Not found"` without matches.
    pub fn search_status(&self) -> String {
        self.search.status_text()
    }

    /// Follow the heaviest child from `start`, marking the path. Returns the
    /// marked nodes.
    pub fn expand_hottest_path(&mut self, start: ViewNodeId) -> Vec<ViewNodeId> {
        match (self.tree.as_mut(), self.source.as_deref()) {
            (Some(tree), Some(source)) => {
                views::expand_hottest_path(tree, start, source, &self.settings)
            }
            _ => Vec::new(),
        }
    }

    /// Fold `node` and everything below it; the rows stay materialized.
    pub fn collapse(&mut self, node: ViewNodeId) {
        if let Some(tree) = self.tree.as_mut() {
            views::collapse(tree, node);
        }
    }

    /// Rows below expanded nodes, in display order.
    pub fn visible_rows(&self) -> Vec<ViewRow> {
        self.tree.as_ref().map(views::visible_rows).unwrap_or_default()
    }

    /// Every materialized row, collapsed or not.
    pub fn all_rows(&self) -> Vec<ViewRow> {
        self.tree.as_ref().map(views::all_rows).unwrap_or_default()
    }
}
