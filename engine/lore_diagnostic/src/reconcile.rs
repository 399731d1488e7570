//! Per-run diagnostic reconciliation.
//!
//! After each analysis run the engine knows three things: the diagnostics
//! the run produced, the set of files the run actually analyzed, and which
//! files were flagged as erroring by earlier runs. The reconciler turns that
//! into what gets published:
//!
//! - A file analyzed in this run has its published diagnostics *fully
//!   replaced* by this run's results, even with an empty list, so stale
//!   errors are cleared.
//! - A file not analyzed in this run keeps its previously published
//!   diagnostics untouched, and if it was flagged as erroring it stays
//!   flagged, so its diagnostics are never silently dropped.

use rustc_hash::FxHashSet;

use lore_core::FileId;

use crate::diagnostic::{Diagnostic, Severity};

/// The per-epoch bundle handed to the diagnostic consumer.
///
/// One entry per analyzed file, sorted by file handle; an empty diagnostic
/// list is meaningful (it clears the file on the client).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Publication {
    /// Edit epoch these diagnostics are complete up to.
    pub epoch: u32,
    /// Per-file diagnostics to publish, sorted by file handle.
    pub diagnostics: Vec<(FileId, Vec<Diagnostic>)>,
}

impl Publication {
    /// Diagnostics published for one file, if it was part of this run.
    pub fn for_file(&self, file: FileId) -> Option<&[Diagnostic]> {
        self.diagnostics
            .iter()
            .find(|(id, _)| *id == file)
            .map(|(_, list)| list.as_slice())
    }
}

/// Tracks which files currently have published errors across runs.
#[derive(Clone, Debug, Default)]
pub struct DiagnosticReconciler {
    files_with_errors: FxHashSet<FileId>,
}

impl DiagnosticReconciler {
    /// Create a reconciler with no files flagged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one run's results into the published state.
    ///
    /// `analyzed` is the exact set of files the run re-derived diagnostics
    /// for; `diagnostics` must only mention files in that set.
    pub fn reconcile(
        &mut self,
        epoch: u32,
        analyzed: &[FileId],
        mut diagnostics: Vec<Diagnostic>,
    ) -> Publication {
        diagnostics.sort();

        let mut analyzed_sorted: Vec<FileId> = analyzed.to_vec();
        analyzed_sorted.sort_unstable();
        analyzed_sorted.dedup();

        debug_assert!(
            diagnostics
                .iter()
                .all(|d| analyzed_sorted.binary_search(&d.file).is_ok()),
            "diagnostic for a file outside the analyzed set"
        );

        let mut per_file: Vec<(FileId, Vec<Diagnostic>)> = analyzed_sorted
            .iter()
            .map(|&id| (id, Vec::new()))
            .collect();
        for diagnostic in diagnostics {
            if let Ok(slot) = per_file.binary_search_by_key(&diagnostic.file, |(id, _)| *id) {
                per_file[slot].1.push(diagnostic);
            }
        }

        for (id, list) in &per_file {
            let has_errors = list.iter().any(|d| d.severity == Severity::Error);
            if has_errors {
                self.files_with_errors.insert(*id);
            } else {
                self.files_with_errors.remove(id);
            }
        }

        Publication {
            epoch,
            diagnostics: per_file,
        }
    }

    /// Files currently flagged as erroring, sorted by handle.
    pub fn files_with_errors(&self) -> Vec<FileId> {
        let mut files: Vec<FileId> = self.files_with_errors.iter().copied().collect();
        files.sort_unstable();
        files
    }

    /// Replace the flagged set wholesale (used when an abandoned run is
    /// rolled back to its pre-run state).
    pub fn restore_files_with_errors(&mut self, files: impl IntoIterator<Item = FileId>) {
        self.files_with_errors = files.into_iter().collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::unresolved_reference;
    use pretty_assertions::assert_eq;

    fn file(raw: u32) -> FileId {
        FileId::from_raw(raw)
    }

    #[test]
    fn test_analyzed_file_fully_replaced() {
        let mut reconciler = DiagnosticReconciler::new();
        let first = reconciler.reconcile(
            1,
            &[file(1)],
            vec![unresolved_reference(file(1), 2, "alpha")],
        );
        assert_eq!(first.for_file(file(1)).map(<[_]>::len), Some(1));
        assert_eq!(reconciler.files_with_errors(), vec![file(1)]);

        // Re-analyzing with no findings publishes an explicit empty list.
        let second = reconciler.reconcile(2, &[file(1)], vec![]);
        assert_eq!(second.for_file(file(1)), Some(&[][..]));
        assert!(reconciler.files_with_errors().is_empty());
    }

    #[test]
    fn test_unanalyzed_file_untouched_and_stays_flagged() {
        let mut reconciler = DiagnosticReconciler::new();
        reconciler.reconcile(
            1,
            &[file(1), file(2)],
            vec![unresolved_reference(file(2), 1, "beta")],
        );
        // A later run that only analyzes file 1 says nothing about file 2
        // and leaves it flagged.
        let publication = reconciler.reconcile(2, &[file(1)], vec![]);
        assert_eq!(publication.for_file(file(2)), None);
        assert_eq!(reconciler.files_with_errors(), vec![file(2)]);
    }

    #[test]
    fn test_publication_sorted_by_file() {
        let mut reconciler = DiagnosticReconciler::new();
        let publication = reconciler.reconcile(
            1,
            &[file(3), file(1), file(2)],
            vec![
                unresolved_reference(file(3), 1, "c"),
                unresolved_reference(file(1), 1, "a"),
            ],
        );
        let order: Vec<FileId> = publication.diagnostics.iter().map(|(id, _)| *id).collect();
        assert_eq!(order, vec![file(1), file(2), file(3)]);
    }

    #[test]
    fn test_restore_replaces_flagged_set() {
        let mut reconciler = DiagnosticReconciler::new();
        reconciler.reconcile(
            1,
            &[file(1)],
            vec![unresolved_reference(file(1), 1, "alpha")],
        );
        reconciler.restore_files_with_errors([file(5), file(2)]);
        assert_eq!(reconciler.files_with_errors(), vec![file(2), file(5)]);
    }
}
