//! The engine: commit loop, path dispatch, and run lifecycle.
//!
//! All shared state lives behind one mutex. Commits and publications take
//! the lock briefly; slow-path analysis runs outside it on a detached
//! [`SlowPathJob`], so edits keep flowing while a run is in flight.
//!
//! # Lifecycle
//!
//! - [`Engine::open_corpus`] enters the initial files (seeding from a prior
//!   session's cache where possible) and runs the first full analysis.
//! - [`Engine::commit`] takes an edit batch. Idle, it decides fast vs slow:
//!   fast runs synchronously and returns its publication, slow hands back a
//!   job for the caller to run. Mid-flight, a batch needing its own slow
//!   run supersedes the running job and queues up for the run that replaces
//!   it; a fast-eligible batch just queues, leaving the job undisturbed.
//! - [`Engine::publish_slow`] takes a finished job's result. If the run was
//!   never superseded its results become the new primary state (and any
//!   deferred fast-eligible batch runs on top of them); otherwise the
//!   primary is rewound to the pre-run state and a replacement job covering
//!   all merged edits is handed back.
//!
//! Publications carry the epoch they are complete up to, and the engine
//! asserts they only ever move forward.

use std::path::PathBuf;
use std::sync::Arc;

use lore_core::{FileId, Fingerprint, FingerprintTable, Snapshot, TreeCache};
use parking_lot::Mutex;

use lore_diagnostic::{DiagnosticReconciler, Publication};
use rayon::prelude::*;

use crate::batch::{EditBatch, FileEdit, TypecheckingPath};
use crate::cache::SeedCache;
use crate::config::EngineConfig;
use crate::decide::{decide, fingerprint_edits, would_run_fast, TouchedFiles};
use crate::fast;
use crate::pipeline::{Indexer, Resolver};
use crate::slow::{CancelFlag, SlowPathJob, SlowPathResult};
use crate::undo::UndoRecord;

/// What [`Engine::commit`] did with a batch.
#[derive(Debug)]
pub enum Commit {
    /// The batch ran on the fast path; diagnostics are already final.
    Fast(Publication),
    /// The batch needs a full run; the caller runs the job and hands its
    /// result to [`Engine::publish_slow`].
    Slow(SlowPathJob),
    /// A slow run was in flight; the batch merged into the pending work and
    /// will be covered either by the run that replaces it or, if it stayed
    /// fast-eligible, by a fast run once the in-flight job applies.
    Queued {
        /// Epoch assigned to the commit.
        epoch: u32,
    },
}

/// What [`Engine::publish_slow`] did with a run's result.
#[derive(Debug)]
pub enum SlowPathOutcome {
    /// The run was current; its diagnostics (plus any fast-eligible batch
    /// deferred behind it) are published.
    Applied(Publication),
    /// The run had been superseded. Its results were discarded, the primary
    /// state rewound, and a replacement job covers all merged edits.
    Superseded {
        /// Files whose published diagnostics are stale until the
        /// replacement run completes: everything the abandoned and merged
        /// batches touched, plus files that showed errors before the
        /// abandoned run started.
        refresh: Vec<FileId>,
        /// The replacement job; run it and publish its result.
        next: SlowPathJob,
    },
}

struct InFlight {
    epoch: u32,
    batch: EditBatch,
    undo: UndoRecord,
    cancel: CancelFlag,
    superseded: bool,
}

struct EngineState {
    snapshot: Snapshot,
    trees: TreeCache,
    fingerprints: FingerprintTable,
    reconciler: DiagnosticReconciler,
    in_flight: Option<InFlight>,
    pending: Option<EditBatch>,
    epoch: u32,
    last_published: u32,
}

/// The incremental analysis engine.
pub struct Engine<I, R> {
    config: EngineConfig,
    indexer: I,
    resolver: R,
    state: Mutex<EngineState>,
}

impl<I: Indexer + Sync, R: Resolver> Engine<I, R> {
    /// An engine over an empty corpus.
    pub fn new(config: EngineConfig, indexer: I, resolver: R) -> Self {
        Engine {
            config,
            indexer,
            resolver,
            state: Mutex::new(EngineState {
                snapshot: Snapshot::new(),
                trees: TreeCache::new(),
                fingerprints: FingerprintTable::new(),
                reconciler: DiagnosticReconciler::new(),
                in_flight: None,
                pending: None,
                epoch: 0,
                last_published: 0,
            }),
        }
    }

    /// Enter the initial corpus and run the first full analysis.
    ///
    /// Files whose content is unchanged since `seeds` was recorded skip
    /// re-indexing. Runs synchronously; incremental commits only make sense
    /// once a full analysis exists to be incremental against.
    ///
    /// # Panics
    ///
    /// Panics if the corpus was already opened.
    pub fn open_corpus(&self, files: Vec<(PathBuf, Arc<str>)>, seeds: &SeedCache) -> Publication {
        let mut state = self.state.lock();
        // Reborrow through the guard so the fields split-borrow.
        let state = &mut *state;
        assert!(state.epoch == 0, "corpus already opened");
        state.epoch = 1;

        let mut misses = Vec::new();
        for (path, text) in files {
            let seed = seeds.lookup(&path, &text).map(|(f, t)| (f, t.clone()));
            let id = state.snapshot.files.enter(path, text, 0);
            match seed {
                Some((fingerprint, tree)) => {
                    state.fingerprints.set(id, fingerprint);
                    state.trees.insert(Arc::new(tree.rebound(id)));
                }
                None => misses.push(id),
            }
        }
        tracing::debug!(
            files = state.snapshot.files.len(),
            seeded = state.snapshot.files.len() - misses.len(),
            "opening corpus"
        );

        // Cache misses still need a fingerprint baseline, or their first
        // edit could never qualify for the fast path.
        let indexer = &self.indexer;
        let corpus = &state.snapshot.files;
        let computed: Vec<(FileId, Fingerprint)> = misses
            .par_iter()
            .map(|&id| (id, indexer.fingerprint(&corpus.get(id).text)))
            .collect();
        for (id, fingerprint) in computed {
            state.fingerprints.set(id, fingerprint);
        }

        let job = SlowPathJob::new(
            1,
            state.snapshot.clone(),
            state.trees.clone(),
            Vec::new(),
            CancelFlag::new(),
        );
        let result = job.run(&self.indexer, &self.resolver);
        self.adopt(state, result)
    }

    /// Commit one batch of edits.
    pub fn commit(&self, edits: Vec<(PathBuf, Arc<str>)>) -> Commit {
        let mut state = self.state.lock();
        let state = &mut *state;
        assert!(state.epoch > 0, "commit before the corpus was opened");
        state.epoch += 1;
        let epoch = state.epoch;
        let mut batch = EditBatch::new(
            epoch,
            edits
                .into_iter()
                .map(|(path, text)| FileEdit {
                    path,
                    text,
                    fingerprint: Fingerprint::INVALID,
                })
                .collect(),
        );

        if let Some(in_flight) = state.in_flight.as_mut() {
            // The running job must not observe this batch, so the primary
            // tables stay untouched; fingerprints are still computed now so
            // the eligibility check and merges compare content, not
            // placeholders.
            fingerprint_edits(&self.indexer, &mut batch);
            if let Some(older) = state.pending.take() {
                batch.merge_older(older);
            }
            // A batch that would run fast anyway is not worth abandoning an
            // arbitrarily far-along full run for; it waits its turn. The
            // check is read-only, so deciding it again at publish time
            // reaches the same answer.
            if !in_flight.superseded
                && would_run_fast(&self.config, &state.snapshot, &state.fingerprints, &batch)
            {
                tracing::debug!(epoch, "deferring fast-eligible commit behind in-flight run");
            } else if !in_flight.superseded {
                in_flight.superseded = true;
                in_flight.cancel.cancel();
                batch.cancellation_expected = true;
                batch.preemption_count = 1;
                tracing::debug!(
                    epoch,
                    superseding = in_flight.epoch,
                    "commit supersedes in-flight slow run"
                );
            }
            state.pending = Some(batch);
            return Commit::Queued { epoch };
        }

        let (touched, undo) = self.decide_locked(state, &mut batch);
        match batch.path {
            // Fast commits cannot be superseded, so the undo state is moot.
            TypecheckingPath::Fast => Commit::Fast(self.run_fast_locked(state, &touched)),
            TypecheckingPath::Slow => {
                Commit::Slow(self.launch_locked(state, batch, touched.into_vec(), undo))
            }
        }
    }

    /// Fold a finished slow run back into the engine.
    ///
    /// # Panics
    ///
    /// Panics if no run with the result's epoch is in flight, or if the
    /// result would publish out of epoch order (both engine bugs).
    pub fn publish_slow(&self, result: SlowPathResult) -> SlowPathOutcome {
        let mut state = self.state.lock();
        let state = &mut *state;
        let Some(in_flight) = state.in_flight.take() else {
            panic!("publishing a slow run the engine does not know about");
        };
        assert!(
            in_flight.epoch == result.epoch,
            "slow run result for epoch {} while epoch {} is in flight",
            result.epoch,
            in_flight.epoch
        );

        if !in_flight.superseded {
            assert!(!result.cancelled, "run cancelled without being superseded");
            let publication = self.adopt(state, result);
            // Edits deferred behind the run land on top of its results now.
            let Some(mut pending) = state.pending.take() else {
                return SlowPathOutcome::Applied(publication);
            };
            let (touched, _undo) = self.decide_locked(state, &mut pending);
            debug_assert!(
                pending.path == TypecheckingPath::Fast,
                "deferred batch no longer fast-eligible"
            );
            return SlowPathOutcome::Applied(self.run_fast_locked(state, &touched));
        }

        // Rewind to the pre-run state, then re-launch over the union of the
        // abandoned batch and everything committed since.
        let erroring = in_flight.undo.restore(
            &mut state.snapshot,
            &mut state.trees,
            &mut state.fingerprints,
        );
        state
            .reconciler
            .restore_files_with_errors(erroring.iter().copied());

        let Some(mut pending) = state.pending.take() else {
            panic!("superseded slow run with no pending batch");
        };
        pending.merge_older(in_flight.batch);

        let (touched, undo) = self.decide_locked(state, &mut pending);
        debug_assert!(
            pending.path == TypecheckingPath::Slow,
            "merged batch decided fast"
        );

        let mut refresh = touched.to_vec();
        refresh.extend(erroring);
        refresh.sort_unstable();
        refresh.dedup();

        let next = self.launch_locked(state, pending, touched.into_vec(), undo);
        SlowPathOutcome::Superseded { refresh, next }
    }

    /// Run a closure against the current primary snapshot.
    pub fn with_snapshot<T>(&self, f: impl FnOnce(&Snapshot) -> T) -> T {
        let state = self.state.lock();
        f(&state.snapshot)
    }

    /// Whether no slow run is currently in flight.
    pub fn is_idle(&self) -> bool {
        self.state.lock().in_flight.is_none()
    }

    /// Files currently flagged as erroring, sorted by handle.
    pub fn files_with_errors(&self) -> Vec<FileId> {
        self.state.lock().reconciler.files_with_errors()
    }

    /// Record the current corpus into `seeds` for the next session.
    ///
    /// Files without a trustworthy fingerprint (e.g. parse errors) are
    /// skipped; they would miss on load anyway.
    pub fn record_seeds(&self, seeds: &mut SeedCache) {
        let state = self.state.lock();
        for file in state.snapshot.files.iter() {
            let fingerprint = state.fingerprints.get(file.id);
            if fingerprint.is_invalid() {
                continue;
            }
            if let Some(tree) = state.trees.get(file.id) {
                seeds.record(file.path.clone(), &file.text, fingerprint, tree);
            }
        }
    }

    /// Capture undo state, then decide the batch's path (which writes its
    /// edits into the primary tables).
    fn decide_locked(
        &self,
        state: &mut EngineState,
        batch: &mut EditBatch,
    ) -> (TouchedFiles, UndoRecord) {
        let existing: Vec<FileId> = batch
            .edits
            .iter()
            .map(|edit| state.snapshot.files.find(&edit.path))
            .filter(|id| id.exists())
            .collect();
        let undo = UndoRecord::capture(
            batch.epoch,
            &state.snapshot,
            &state.trees,
            &state.fingerprints,
            state.reconciler.files_with_errors(),
            &existing,
        );
        let touched = decide(
            &self.config,
            &self.indexer,
            &mut state.snapshot,
            &mut state.fingerprints,
            batch,
        );
        (touched, undo)
    }

    fn run_fast_locked(&self, state: &mut EngineState, touched: &[FileId]) -> Publication {
        let epoch = state.epoch;
        let result = fast::run(&self.indexer, &self.resolver, &state.snapshot, touched);
        state.snapshot = result.snapshot;
        for tree in &result.trees {
            state.trees.insert(Arc::clone(tree));
        }
        assert!(epoch > state.last_published, "publication out of order");
        state.last_published = epoch;
        state
            .reconciler
            .reconcile(epoch, &result.analyzed, result.diagnostics)
    }

    fn launch_locked(
        &self,
        state: &mut EngineState,
        batch: EditBatch,
        touched: Vec<FileId>,
        undo: UndoRecord,
    ) -> SlowPathJob {
        debug_assert!(undo.epoch == batch.epoch);
        let cancel = CancelFlag::new();
        let job = SlowPathJob::new(
            batch.epoch,
            state.snapshot.clone(),
            state.trees.clone(),
            touched,
            cancel.clone(),
        );
        state.in_flight = Some(InFlight {
            epoch: batch.epoch,
            batch,
            undo,
            cancel,
            superseded: false,
        });
        job
    }

    fn adopt(&self, state: &mut EngineState, result: SlowPathResult) -> Publication {
        assert!(
            result.epoch > state.last_published,
            "publication out of order ({} after {})",
            result.epoch,
            state.last_published
        );
        state.snapshot = result.snapshot;
        for tree in &result.trees {
            state.trees.insert(Arc::clone(tree));
        }
        state.last_published = result.epoch;
        state
            .reconciler
            .reconcile(result.epoch, &result.analyzed, result.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{LineIndexer, LineResolver};
    use lore_diagnostic::ErrorCode;
    use pretty_assertions::assert_eq;

    fn engine() -> Engine<LineIndexer, LineResolver> {
        Engine::new(EngineConfig::default(), LineIndexer, LineResolver)
    }

    fn text(s: &str) -> Arc<str> {
        Arc::from(s)
    }

    fn open(engine: &Engine<LineIndexer, LineResolver>) -> Publication {
        engine.open_corpus(
            vec![
                (PathBuf::from("a.lore"), text("def alpha")),
                (PathBuf::from("b.lore"), text("use alpha")),
            ],
            &SeedCache::new(),
        )
    }

    #[test]
    fn test_open_corpus_publishes_initial_diagnostics() {
        let engine = engine();
        let publication = open(&engine);
        assert_eq!(publication.epoch, 1);
        assert_eq!(publication.diagnostics.len(), 2);
        assert!(publication.diagnostics.iter().all(|(_, d)| d.is_empty()));
        assert!(engine.is_idle());
    }

    #[test]
    fn test_shape_preserving_commit_is_fast() {
        let engine = engine();
        open(&engine);
        let commit = engine.commit(vec![(PathBuf::from("b.lore"), text("use alpha\nuse ghost"))]);
        let Commit::Fast(publication) = commit else {
            panic!("expected fast commit");
        };
        assert_eq!(publication.epoch, 2);
        assert_eq!(publication.diagnostics.len(), 1);
        let (file, diagnostics) = &publication.diagnostics[0];
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, ErrorCode::UnresolvedReference);
        assert_eq!(engine.files_with_errors(), vec![*file]);
    }

    #[test]
    fn test_shape_changing_commit_runs_slow() {
        let engine = engine();
        open(&engine);
        let commit = engine.commit(vec![(PathBuf::from("a.lore"), text("def renamed"))]);
        let Commit::Slow(job) = commit else {
            panic!("expected slow commit");
        };
        let result = job.run(&LineIndexer, &LineResolver);
        let SlowPathOutcome::Applied(publication) = engine.publish_slow(result) else {
            panic!("expected the run to apply");
        };
        assert_eq!(publication.epoch, 2);
        // The symbol table is monotonic, so b.lore's `use alpha` still
        // resolves even though a.lore no longer defines it.
        assert!(publication.diagnostics.iter().all(|(_, d)| d.is_empty()));
        assert!(engine.is_idle());
    }

    #[test]
    fn test_commit_mid_flight_supersedes() {
        let engine = engine();
        open(&engine);
        let Commit::Slow(job) = engine.commit(vec![(PathBuf::from("a.lore"), text("def a2"))])
        else {
            panic!("expected slow commit");
        };
        let Commit::Queued { epoch } =
            engine.commit(vec![(PathBuf::from("b.lore"), text("def b1\nuse gone"))])
        else {
            panic!("expected queued commit");
        };
        assert_eq!(epoch, 3);

        let result = job.run(&LineIndexer, &LineResolver);
        assert!(result.cancelled);
        let SlowPathOutcome::Superseded { refresh, next } = engine.publish_slow(result) else {
            panic!("expected the run to be superseded");
        };
        // Both edited files need refreshed diagnostics.
        assert_eq!(refresh.len(), 2);
        assert_eq!(next.epoch, 3);

        let SlowPathOutcome::Applied(publication) =
            engine.publish_slow(next.run(&LineIndexer, &LineResolver))
        else {
            panic!("expected the replacement run to apply");
        };
        assert_eq!(publication.epoch, 3);
        // The replacement run covers the merged edits from both commits.
        engine.with_snapshot(|snapshot| {
            let a = snapshot.files.find(std::path::Path::new("a.lore"));
            assert_eq!(&*snapshot.files.get(a).text, "def a2");
        });
        let all: Vec<_> = publication
            .diagnostics
            .iter()
            .flat_map(|(_, d)| d.iter())
            .collect();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].code, ErrorCode::UnresolvedReference);
    }

    #[test]
    fn test_fast_eligible_commit_mid_flight_defers_without_cancelling() {
        let engine = engine();
        open(&engine);
        let Commit::Slow(job) = engine.commit(vec![(PathBuf::from("a.lore"), text("def a2"))])
        else {
            panic!("expected slow commit");
        };
        // Same declaration shape for b, so this waits out the run instead
        // of abandoning it.
        let Commit::Queued { epoch } =
            engine.commit(vec![(PathBuf::from("b.lore"), text("use alpha\n# note"))])
        else {
            panic!("expected queued commit");
        };
        assert_eq!(epoch, 3);

        let result = job.run(&LineIndexer, &LineResolver);
        assert!(!result.cancelled);
        let SlowPathOutcome::Applied(publication) = engine.publish_slow(result) else {
            panic!("expected the run to apply");
        };
        // The deferred edit ran fast on top of the applied run.
        assert_eq!(publication.epoch, 3);
        assert!(engine.is_idle());
        engine.with_snapshot(|snapshot| {
            let a = snapshot.files.find(std::path::Path::new("a.lore"));
            let b = snapshot.files.find(std::path::Path::new("b.lore"));
            assert_eq!(&*snapshot.files.get(a).text, "def a2");
            assert_eq!(&*snapshot.files.get(b).text, "use alpha\n# note");
        });
    }

    #[test]
    #[should_panic(expected = "does not know about")]
    fn test_publishing_unknown_run_panics() {
        let engine = engine();
        open(&engine);
        let Commit::Slow(job) = engine.commit(vec![(PathBuf::from("a.lore"), text("def a2"))])
        else {
            panic!("expected slow commit");
        };
        let result = job.run(&LineIndexer, &LineResolver);
        engine.publish_slow(result);
        // The run is gone; publishing again must be rejected.
        let Commit::Slow(job) = engine.commit(vec![(PathBuf::from("a.lore"), text("def a3"))])
        else {
            panic!("expected slow commit");
        };
        let stale = job.run(&LineIndexer, &LineResolver);
        engine.publish_slow(stale);
        engine.publish_slow(SlowPathResult {
            epoch: 99,
            snapshot: Snapshot::new(),
            trees: Vec::new(),
            diagnostics: Vec::new(),
            analyzed: Vec::new(),
            cancelled: false,
        });
    }
}
