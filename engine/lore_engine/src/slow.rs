//! The slow path: re-analyze the whole corpus on a working clone.
//!
//! A [`SlowPathJob`] is built by the engine under its lock and then run
//! *outside* it, so edits keep committing while analysis is in flight. The
//! job owns everything it needs: a clone of the primary snapshot with the
//! batch's edits already applied, and a clone of the tree cache for reuse of
//! unedited files' trees.
//!
//! Cancellation is cooperative: the engine trips the job's [`CancelFlag`]
//! when a newer batch supersedes it, and the job checks the flag between
//! phases. A cancelled run returns a partial [`SlowPathResult`] whose only
//! useful field is its epoch; the engine discards the rest either way.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lore_core::{FileId, Snapshot, SyntaxTree, TreeCache};
use lore_diagnostic::Diagnostic;
use rayon::prelude::*;

use crate::pipeline::{Indexer, Resolver};

/// Shared flag a superseded run observes to stop early.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A flag that has not been tripped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the flag. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether the flag has been tripped.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A full-corpus analysis run, detached from the engine lock.
#[derive(Debug)]
pub struct SlowPathJob {
    /// Epoch of the batch this run analyzes.
    pub epoch: u32,
    working: Snapshot,
    trees: TreeCache,
    touched: Vec<FileId>,
    cancel: CancelFlag,
}

/// What a slow run produced. Meaningful only if `cancelled` is false and the
/// engine has not superseded the run's epoch in the meantime.
#[derive(Debug)]
pub struct SlowPathResult {
    /// Epoch of the run that produced this result.
    pub epoch: u32,
    /// The working clone after resolution.
    pub snapshot: Snapshot,
    /// Resolved trees for the whole corpus.
    pub trees: Vec<Arc<SyntaxTree>>,
    /// Diagnostics for the whole corpus.
    pub diagnostics: Vec<Diagnostic>,
    /// Every file handle in the corpus, in handle order.
    pub analyzed: Vec<FileId>,
    /// True if the run stopped early because its flag was tripped.
    pub cancelled: bool,
}

impl SlowPathJob {
    /// Package a run for the batch at `epoch`.
    ///
    /// `working` must already contain the batch's edits; `touched` names the
    /// files whose cached trees are stale because of them.
    pub fn new(
        epoch: u32,
        working: Snapshot,
        trees: TreeCache,
        touched: Vec<FileId>,
        cancel: CancelFlag,
    ) -> Self {
        SlowPathJob {
            epoch,
            working,
            trees,
            touched,
            cancel,
        }
    }

    fn cancelled_result(self) -> SlowPathResult {
        tracing::debug!(epoch = self.epoch, "slow run stopped early, superseded");
        SlowPathResult {
            epoch: self.epoch,
            snapshot: self.working,
            trees: Vec::new(),
            diagnostics: Vec::new(),
            analyzed: Vec::new(),
            cancelled: true,
        }
    }

    /// Run the analysis to completion (or early exit on cancellation).
    pub fn run<I: Indexer + Sync, R: Resolver>(
        mut self,
        indexer: &I,
        resolver: &R,
    ) -> SlowPathResult {
        let analyzed: Vec<FileId> = self.working.files.ids().collect();
        tracing::debug!(epoch = self.epoch, files = analyzed.len(), "running slow path");

        // Index phase: rebuild trees for edited files and any file the
        // cache has never seen; everything else reuses its cached tree.
        let stale: Vec<FileId> = analyzed
            .iter()
            .copied()
            .filter(|&id| self.touched.contains(&id) || self.trees.get(id).is_none())
            .collect();
        if self.cancel.is_cancelled() {
            return self.cancelled_result();
        }
        let fresh: Vec<Arc<SyntaxTree>> = stale
            .par_iter()
            .map(|&id| Arc::new(indexer.index(self.working.files.get(id))))
            .collect();
        for tree in fresh {
            self.trees.insert(tree);
        }
        if self.cancel.is_cancelled() {
            return self.cancelled_result();
        }

        // Resolve phase: the whole corpus, in handle order.
        let corpus: Vec<Arc<SyntaxTree>> = analyzed
            .iter()
            .filter_map(|&id| self.trees.get(id).cloned())
            .collect();
        let outcome = resolver.resolve(&mut self.working, corpus);
        self.working.bump_analysis_count();

        SlowPathResult {
            epoch: self.epoch,
            snapshot: self.working,
            trees: outcome.trees,
            diagnostics: outcome.diagnostics,
            analyzed,
            cancelled: false,
        }
    }
}
