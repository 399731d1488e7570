//! The fast/slow path decider.
//!
//! Given a committed batch, decide whether the edited files can be
//! re-analyzed in isolation (fast path) or the whole corpus must be redone
//! on a fresh working clone (slow path). The rule: an edit is fast-path
//! eligible iff it provably cannot change anything another file observes,
//! which is exactly "the declaration-shape fingerprint is unchanged".
//!
//! Deciding has side effects on the primary snapshot: new file contents are
//! written into the file table and new fingerprints into the fingerprint
//! table, whichever path is chosen. Callers that need to undo a slow run
//! must therefore capture their undo state *before* calling [`decide`].

use std::sync::Arc;

use lore_core::{FileId, FingerprintTable, Snapshot};
use rayon::prelude::*;
use smallvec::SmallVec;

use crate::batch::{EditBatch, TypecheckingPath};
use crate::config::EngineConfig;
use crate::pipeline::Indexer;

/// Compute fingerprints for every edit in the batch, in parallel.
///
/// Read-only; used both by [`decide`] and for batches committed while a
/// slow run is in flight (which must not touch the primary tables).
pub fn fingerprint_edits<I: Indexer + Sync>(indexer: &I, batch: &mut EditBatch) {
    batch
        .edits
        .par_iter_mut()
        .for_each(|edit| edit.fingerprint = indexer.fingerprint(&edit.text));
}

/// File handles touched by a batch; almost always a handful.
pub type TouchedFiles = SmallVec<[FileId; 4]>;

/// Decide the path for `batch` and apply its edits to the primary tables.
///
/// Returns the file handles touched by the batch, in edit order.
pub fn decide<I: Indexer + Sync>(
    config: &EngineConfig,
    indexer: &I,
    snapshot: &mut Snapshot,
    fingerprints: &mut FingerprintTable,
    batch: &mut EditBatch,
) -> TouchedFiles {
    fingerprint_edits(indexer, batch);

    let mut eligible = !batch.is_poisoned();
    let mut touched = TouchedFiles::new();

    for edit in &batch.edits {
        let known = snapshot.files.find(&edit.path);
        let id = if known.exists() {
            snapshot
                .files
                .replace(known, Arc::clone(&edit.text), batch.epoch);
            known
        } else {
            // A new file can introduce definitions nothing has a baseline
            // for, so it always forces the slow path.
            batch.has_new_files = true;
            eligible = false;
            snapshot
                .files
                .enter(edit.path.clone(), Arc::clone(&edit.text), batch.epoch)
        };
        touched.push(id);

        let before = fingerprints.get(id);
        if edit.fingerprint.is_invalid() || edit.fingerprint != before {
            eligible = false;
        }
        // The new fingerprint is recorded either way; the slow path will
        // re-analyze everything against it.
        fingerprints.set(id, edit.fingerprint);
    }

    if config.disable_fast_path {
        tracing::debug!("taking slow path because fast path is disabled");
        eligible = false;
    }
    if batch.edits.len() > config.max_files_on_fast_path {
        tracing::debug!(
            edited = batch.edits.len(),
            limit = config.max_files_on_fast_path,
            "taking slow path because too many files changed"
        );
        eligible = false;
    }
    if snapshot.analysis_count() == 0 {
        tracing::debug!("taking slow path because nothing has been analyzed yet");
        eligible = false;
    }
    if batch.is_poisoned() {
        tracing::debug!("taking slow path because the batch includes merged edits");
    }

    batch.path = if eligible {
        TypecheckingPath::Fast
    } else {
        TypecheckingPath::Slow
    };
    tracing::debug!(epoch = batch.epoch, path = ?batch.path, "decided analysis path");
    touched
}

/// Whether `batch` would take the fast path, without applying anything.
///
/// Read-only twin of the eligibility rules in [`decide`], for batches
/// committed while a slow run is in flight: those must not touch the
/// primary tables, but the engine still needs to know whether they require
/// a run of their own. Expects [`fingerprint_edits`] to have run on the
/// batch already.
pub fn would_run_fast(
    config: &EngineConfig,
    snapshot: &Snapshot,
    fingerprints: &FingerprintTable,
    batch: &EditBatch,
) -> bool {
    if batch.is_poisoned()
        || config.disable_fast_path
        || batch.edits.len() > config.max_files_on_fast_path
        || snapshot.analysis_count() == 0
    {
        return false;
    }
    batch.edits.iter().all(|edit| {
        let id = snapshot.files.find(&edit.path);
        id.exists() && !edit.fingerprint.is_invalid() && edit.fingerprint == fingerprints.get(id)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::FileEdit;
    use crate::frontend::LineIndexer;
    use lore_core::Fingerprint;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn edit(path: &str, text: &str) -> FileEdit {
        FileEdit {
            path: PathBuf::from(path),
            text: Arc::from(text),
            fingerprint: Fingerprint::INVALID,
        }
    }

    /// Snapshot with one analyzed file `a.lore` containing `def alpha`.
    fn seeded() -> (Snapshot, FingerprintTable) {
        let mut snapshot = Snapshot::new();
        let id = snapshot
            .files
            .enter(PathBuf::from("a.lore"), Arc::from("def alpha\nuse alpha"), 0);
        let mut fingerprints = FingerprintTable::new();
        fingerprints.set(id, LineIndexer.fingerprint("def alpha\nuse alpha"));
        snapshot.bump_analysis_count();
        (snapshot, fingerprints)
    }

    #[test]
    fn test_same_shape_edit_is_fast() {
        let (mut snapshot, mut fingerprints) = seeded();
        let mut batch = EditBatch::new(1, vec![edit("a.lore", "def alpha\nuse alpha\nuse alpha")]);
        let touched = decide(
            &EngineConfig::default(),
            &LineIndexer,
            &mut snapshot,
            &mut fingerprints,
            &mut batch,
        );
        assert_eq!(batch.path, TypecheckingPath::Fast);
        assert_eq!(touched.to_vec(), vec![FileId::from_raw(1)]);
        // The edit landed in the primary file table.
        assert_eq!(
            &*snapshot.files.get(FileId::from_raw(1)).text,
            "def alpha\nuse alpha\nuse alpha"
        );
    }

    #[test]
    fn test_shape_change_is_slow() {
        let (mut snapshot, mut fingerprints) = seeded();
        let mut batch = EditBatch::new(1, vec![edit("a.lore", "def alpha\ndef beta")]);
        decide(
            &EngineConfig::default(),
            &LineIndexer,
            &mut snapshot,
            &mut fingerprints,
            &mut batch,
        );
        assert_eq!(batch.path, TypecheckingPath::Slow);
    }

    #[test]
    fn test_new_file_is_slow_and_entered() {
        let (mut snapshot, mut fingerprints) = seeded();
        let mut batch = EditBatch::new(1, vec![edit("b.lore", "use alpha")]);
        let touched = decide(
            &EngineConfig::default(),
            &LineIndexer,
            &mut snapshot,
            &mut fingerprints,
            &mut batch,
        );
        assert_eq!(batch.path, TypecheckingPath::Slow);
        assert!(batch.has_new_files);
        assert_eq!(touched.to_vec(), vec![FileId::from_raw(2)]);
        assert_eq!(snapshot.files.len(), 2);
    }

    #[test]
    fn test_parse_error_is_slow() {
        let (mut snapshot, mut fingerprints) = seeded();
        let mut batch = EditBatch::new(1, vec![edit("a.lore", "def alpha\nwhat is this")]);
        decide(
            &EngineConfig::default(),
            &LineIndexer,
            &mut snapshot,
            &mut fingerprints,
            &mut batch,
        );
        assert_eq!(batch.path, TypecheckingPath::Slow);
        assert!(fingerprints.get(FileId::from_raw(1)).is_invalid());
    }

    #[test]
    fn test_disable_fast_path_forces_slow() {
        let (mut snapshot, mut fingerprints) = seeded();
        let config = EngineConfig {
            disable_fast_path: true,
            ..EngineConfig::default()
        };
        let mut batch = EditBatch::new(1, vec![edit("a.lore", "def alpha\nuse alpha")]);
        decide(&config, &LineIndexer, &mut snapshot, &mut fingerprints, &mut batch);
        assert_eq!(batch.path, TypecheckingPath::Slow);
    }

    #[test]
    fn test_too_many_files_forces_slow() {
        let (mut snapshot, mut fingerprints) = seeded();
        let config = EngineConfig {
            max_files_on_fast_path: 0,
            ..EngineConfig::default()
        };
        let mut batch = EditBatch::new(1, vec![edit("a.lore", "def alpha\nuse alpha")]);
        decide(&config, &LineIndexer, &mut snapshot, &mut fingerprints, &mut batch);
        assert_eq!(batch.path, TypecheckingPath::Slow);
    }

    #[test]
    fn test_unanalyzed_snapshot_forces_slow() {
        let mut snapshot = Snapshot::new();
        snapshot
            .files
            .enter(PathBuf::from("a.lore"), Arc::from("def alpha"), 0);
        let mut fingerprints = FingerprintTable::new();
        fingerprints.set(FileId::from_raw(1), LineIndexer.fingerprint("def alpha"));
        let mut batch = EditBatch::new(1, vec![edit("a.lore", "def alpha")]);
        decide(
            &EngineConfig::default(),
            &LineIndexer,
            &mut snapshot,
            &mut fingerprints,
            &mut batch,
        );
        assert_eq!(batch.path, TypecheckingPath::Slow);
    }

    #[test]
    fn test_would_run_fast_reads_without_writing() {
        let (snapshot, fingerprints) = seeded();
        let config = EngineConfig::default();

        let mut same = EditBatch::new(2, vec![edit("a.lore", "def alpha\nuse alpha\n# note")]);
        fingerprint_edits(&LineIndexer, &mut same);
        assert!(would_run_fast(&config, &snapshot, &fingerprints, &same));
        // No edit landed anywhere.
        assert_eq!(&*snapshot.files.get(FileId::from_raw(1)).text, "def alpha\nuse alpha");

        let mut reshaped = EditBatch::new(2, vec![edit("a.lore", "def beta")]);
        fingerprint_edits(&LineIndexer, &mut reshaped);
        assert!(!would_run_fast(&config, &snapshot, &fingerprints, &reshaped));

        let mut fresh = EditBatch::new(2, vec![edit("b.lore", "use alpha")]);
        fingerprint_edits(&LineIndexer, &mut fresh);
        assert!(!would_run_fast(&config, &snapshot, &fingerprints, &fresh));
    }

    #[test]
    fn test_poisoned_batch_stays_slow() {
        let (mut snapshot, mut fingerprints) = seeded();
        let mut batch = EditBatch::new(2, vec![edit("a.lore", "def alpha\nuse alpha")]);
        batch.merge_older(EditBatch::new(1, vec![]));
        decide(
            &EngineConfig::default(),
            &LineIndexer,
            &mut snapshot,
            &mut fingerprints,
            &mut batch,
        );
        assert_eq!(batch.path, TypecheckingPath::Slow);
    }
}
