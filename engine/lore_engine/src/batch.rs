//! Edit batches and the merge protocol.
//!
//! A batch carries the edits of one commit plus the bookkeeping the engine
//! needs to decide between the fast and slow paths. When a slow run is
//! superseded, its batch is merged into the newer one with
//! [`EditBatch::merge_older`], so the eventual run covers every edit that
//! ever targeted it.
//!
//! # Design
//!
//! Merging is deliberately lossy about *why* the older batch was slow and
//! permanent about *that* it was: a merged batch stays on the slow path even
//! if the combined edits would individually have qualified for the fast
//! path. The older batch's pre-edit fingerprint baseline is gone, so
//! re-deciding against the current tables could wrongly classify a
//! shape-changing edit pair that cancels out as fast.

use std::path::PathBuf;
use std::sync::Arc;

use lore_core::Fingerprint;
use rustc_hash::FxHashSet;

/// How an edit batch will be analyzed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TypecheckingPath {
    /// Re-analyze only the edited files against the existing symbol table.
    Fast,
    /// Re-analyze the whole corpus on a fresh working clone.
    Slow,
}

/// One file's new content within a batch.
#[derive(Clone, Debug)]
pub struct FileEdit {
    /// Workspace-relative path; files are created on first mention.
    pub path: PathBuf,
    /// Full replacement content.
    pub text: Arc<str>,
    /// Declaration-shape fingerprint of `text`, computed at decision time.
    pub fingerprint: Fingerprint,
}

/// A committed set of edits plus the path decision made for it.
#[derive(Clone, Debug)]
pub struct EditBatch {
    /// Monotonic commit number assigned by the engine.
    pub epoch: u32,
    /// How many original commits this batch represents (merges sum it).
    pub edit_count: u32,
    /// How many in-flight slow runs this batch has superseded.
    pub preemption_count: u32,
    /// Whether any edit created a previously unknown file.
    pub has_new_files: bool,
    /// Whether a superseded slow run is expected to stop for this batch.
    pub cancellation_expected: bool,
    /// The chosen analysis path.
    pub path: TypecheckingPath,
    /// The edits, newest version per path.
    pub edits: Vec<FileEdit>,
    poisoned: bool,
}

impl EditBatch {
    /// A fresh single-commit batch, path undecided (defaults to slow until
    /// the decider proves fast eligibility).
    pub fn new(epoch: u32, edits: Vec<FileEdit>) -> Self {
        EditBatch {
            epoch,
            edit_count: 1,
            preemption_count: 0,
            has_new_files: false,
            cancellation_expected: false,
            path: TypecheckingPath::Slow,
            edits,
            poisoned: false,
        }
    }

    /// Whether a merge has pinned this batch to the slow path.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Fold an older batch into this one.
    ///
    /// Counters are summed, flags are or-ed, and where both batches touch a
    /// file this batch's newer content wins. The result is pinned to the
    /// slow path (see the module docs).
    ///
    /// # Panics
    ///
    /// Panics if `older` is not actually older, which would mean the engine
    /// merged commits out of chronological order.
    pub fn merge_older(&mut self, older: EditBatch) {
        assert!(
            self.epoch > older.epoch,
            "merged batches out of chronological order ({} <= {})",
            self.epoch,
            older.epoch
        );
        self.edit_count += older.edit_count;
        self.preemption_count += older.preemption_count;
        self.has_new_files |= older.has_new_files;
        self.cancellation_expected |= older.cancellation_expected;

        let newer_paths: FxHashSet<&PathBuf> = self.edits.iter().map(|e| &e.path).collect();
        let mut carried: Vec<FileEdit> = older
            .edits
            .into_iter()
            .filter(|e| !newer_paths.contains(&e.path))
            .collect();
        drop(newer_paths);
        self.edits.append(&mut carried);

        self.path = TypecheckingPath::Slow;
        self.poisoned = true;
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn edit(path: &str, text: &str) -> FileEdit {
        FileEdit {
            path: PathBuf::from(path),
            text: Arc::from(text),
            fingerprint: Fingerprint::of_shape([text]),
        }
    }

    #[test]
    fn test_merge_sums_counters_and_ors_flags() {
        let mut newer = EditBatch::new(5, vec![edit("a.lore", "def a2")]);
        let mut older = EditBatch::new(3, vec![edit("b.lore", "def b")]);
        older.has_new_files = true;
        older.cancellation_expected = true;
        newer.merge_older(older);
        assert_eq!(newer.edit_count, 2);
        assert!(newer.has_new_files);
        assert!(newer.cancellation_expected);
        assert_eq!(newer.epoch, 5);
    }

    #[test]
    fn test_merge_newer_content_wins() {
        let mut newer = EditBatch::new(5, vec![edit("a.lore", "def a2")]);
        let older = EditBatch::new(3, vec![edit("a.lore", "def a1"), edit("b.lore", "def b")]);
        newer.merge_older(older);
        assert_eq!(newer.edits.len(), 2);
        let a = newer.edits.iter().find(|e| e.path.ends_with("a.lore"));
        assert_eq!(&*a.unwrap().text, "def a2");
        assert!(newer.edits.iter().any(|e| e.path.ends_with("b.lore")));
    }

    #[test]
    fn test_merge_pins_slow_path() {
        let mut newer = EditBatch::new(5, vec![edit("a.lore", "# comment only")]);
        newer.path = TypecheckingPath::Fast;
        newer.merge_older(EditBatch::new(3, vec![]));
        assert_eq!(newer.path, TypecheckingPath::Slow);
        assert!(newer.is_poisoned());
    }

    #[test]
    fn test_merge_chain_accumulates() {
        let mut batch = EditBatch::new(2, vec![edit("a.lore", "v2")]);
        batch.merge_older(EditBatch::new(1, vec![edit("b.lore", "v1")]));
        let mut top = EditBatch::new(3, vec![edit("c.lore", "v3")]);
        top.preemption_count = 1;
        batch.preemption_count = 1;
        top.merge_older(batch);
        assert_eq!(top.edit_count, 3);
        assert_eq!(top.preemption_count, 2);
        assert_eq!(top.edits.len(), 3);
    }

    #[test]
    #[should_panic(expected = "chronological order")]
    fn test_merge_rejects_newer_into_older() {
        let mut batch = EditBatch::new(2, vec![]);
        batch.merge_older(EditBatch::new(4, vec![]));
    }
}
