//! Undo state for cancellable slow runs.
//!
//! Before a slow run's edits touch the primary tables, the engine captures
//! exactly what those edits will displace: the whole snapshot (cheap, the
//! symbol table is copy-on-write), the cached trees of the touched files,
//! the whole fingerprint table (a batch that creates a file writes an
//! entry no per-file capture could roll back), and which files currently
//! show errors. If the run is later superseded, [`UndoRecord::restore`]
//! puts it all back so the replacement run starts from the same state the
//! abandoned one did.
//!
//! Restoring consumes the record, so restoring twice is unrepresentable.

use std::sync::Arc;

use lore_core::{FileId, FingerprintTable, Snapshot, SyntaxTree, TreeCache};
use rustc_hash::FxHashMap;

/// Everything needed to rewind the primary tables to before one slow run.
#[derive(Debug)]
pub struct UndoRecord {
    /// Epoch of the run this record can undo.
    pub epoch: u32,
    snapshot: Snapshot,
    evicted_trees: FxHashMap<FileId, Option<Arc<SyntaxTree>>>,
    fingerprints: FingerprintTable,
    files_with_errors: Vec<FileId>,
}

impl UndoRecord {
    /// Capture the pre-run state for a slow run at `epoch` that will touch
    /// `touched` files.
    ///
    /// Must run before the decider writes the batch's edits into `snapshot`
    /// and `fingerprints`; otherwise the captured state already includes
    /// what it is supposed to undo.
    pub fn capture(
        epoch: u32,
        snapshot: &Snapshot,
        trees: &TreeCache,
        fingerprints: &FingerprintTable,
        files_with_errors: Vec<FileId>,
        touched: &[FileId],
    ) -> Self {
        let mut evicted_trees = FxHashMap::default();
        for &id in touched {
            evicted_trees.insert(id, trees.get(id).cloned());
        }
        UndoRecord {
            epoch,
            snapshot: snapshot.clone(),
            evicted_trees,
            fingerprints: fingerprints.clone(),
            files_with_errors,
        }
    }

    /// Rewind the primary tables to the captured state.
    ///
    /// Returns the pre-run erroring files, so the caller can fold them into
    /// the refresh set for the replacement run.
    pub fn restore(
        self,
        snapshot: &mut Snapshot,
        trees: &mut TreeCache,
        fingerprints: &mut FingerprintTable,
    ) -> Vec<FileId> {
        tracing::debug!(epoch = self.epoch, "restoring pre-run state for superseded run");
        *snapshot = self.snapshot;
        for (id, tree) in self.evicted_trees {
            match tree {
                Some(tree) => trees.insert(tree),
                None => {
                    trees.take(id);
                }
            }
        }
        *fingerprints = self.fingerprints;
        self.files_with_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lore_core::Fingerprint;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn test_restore_rewinds_touched_files() {
        let mut snapshot = Snapshot::new();
        let a = snapshot
            .files
            .enter(PathBuf::from("a.lore"), Arc::from("def alpha"), 0);
        let mut trees = TreeCache::new();
        trees.insert(Arc::new(SyntaxTree::new(a)));
        let mut fingerprints = FingerprintTable::new();
        let before = Fingerprint::of_shape(["alpha"]);
        fingerprints.set(a, before);

        let record = UndoRecord::capture(1, &snapshot, &trees, &fingerprints, vec![a], &[a]);

        // Simulate the run's mutations.
        snapshot.files.replace(a, Arc::from("def beta"), 1);
        snapshot.enter_symbol("beta", a, 1);
        fingerprints.set(a, Fingerprint::of_shape(["beta"]));
        trees.take(a);

        let erroring = record.restore(&mut snapshot, &mut trees, &mut fingerprints);
        assert_eq!(erroring, vec![a]);
        assert_eq!(&*snapshot.files.get(a).text, "def alpha");
        assert!(snapshot.symbols().find("beta") == lore_core::SymbolId::NONE);
        assert_eq!(fingerprints.get(a), before);
        assert!(trees.get(a).is_some());
    }

    #[test]
    fn test_restore_removes_trees_absent_at_capture() {
        let mut snapshot = Snapshot::new();
        let a = snapshot
            .files
            .enter(PathBuf::from("a.lore"), Arc::from(""), 0);
        let mut trees = TreeCache::new();
        let mut fingerprints = FingerprintTable::new();

        let record = UndoRecord::capture(1, &snapshot, &trees, &fingerprints, vec![], &[a]);
        trees.insert(Arc::new(SyntaxTree::new(a)));

        record.restore(&mut snapshot, &mut trees, &mut fingerprints);
        assert!(trees.get(a).is_none());
    }

    #[test]
    fn test_restore_drops_fingerprints_of_files_created_after_capture() {
        let mut snapshot = Snapshot::new();
        let a = snapshot
            .files
            .enter(PathBuf::from("a.lore"), Arc::from("def alpha"), 0);
        let mut trees = TreeCache::new();
        let mut fingerprints = FingerprintTable::new();
        fingerprints.set(a, Fingerprint::of_shape(["alpha"]));
        let before = fingerprints.clone();

        let record = UndoRecord::capture(1, &snapshot, &trees, &fingerprints, vec![], &[a]);

        // A batch that creates a file writes its fingerprint before the
        // run is launched; rewinding must not leave that entry behind.
        let b = snapshot
            .files
            .enter(PathBuf::from("b.lore"), Arc::from("def beta"), 1);
        fingerprints.set(b, Fingerprint::of_shape(["beta"]));

        record.restore(&mut snapshot, &mut trees, &mut fingerprints);
        assert_eq!(fingerprints, before);
        assert!(fingerprints.get(b).is_invalid());
        assert_eq!(snapshot.files.len(), 1);
    }
}
