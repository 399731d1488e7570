//! Seams to the external analysis passes.
//!
//! The engine does not know how to parse or resolve anything; it drives an
//! [`Indexer`] (text → syntax tree) and a [`Resolver`] (trees + symbol
//! table → annotated trees + diagnostics) through these traits. The crate
//! ships a reference implementation for a line-oriented declaration
//! language in [`crate::frontend`].

use std::sync::Arc;

use lore_core::{Fingerprint, Snapshot, SourceFile, SyntaxTree};
use lore_diagnostic::Diagnostic;

/// Turns file content into a syntax tree.
pub trait Indexer {
    /// Index one file version.
    ///
    /// Unparseable content must still yield a tree, with the problems
    /// embedded as [`lore_core::ParseError`]s; indexing never fails.
    fn index(&self, file: &SourceFile) -> SyntaxTree;

    /// Digest the externally visible declaration shape of `text`.
    ///
    /// Must be a pure function of content (no dependence on prior state),
    /// and cheap enough to run on every edit. Content whose shape cannot be
    /// determined (parse errors in declaration position) should return
    /// [`Fingerprint::INVALID`], which forces the slow path.
    fn fingerprint(&self, text: &str) -> Fingerprint;
}

/// What a resolution pass produced.
#[derive(Clone, Debug)]
pub struct ResolveOutcome {
    /// The input trees, annotated with resolution targets.
    pub trees: Vec<Arc<SyntaxTree>>,
    /// All findings, including parse errors carried over from the trees.
    pub diagnostics: Vec<Diagnostic>,
}

/// Resolves references in a set of trees against a snapshot.
pub trait Resolver {
    /// Resolve and check `trees` against (and into) `snapshot`.
    ///
    /// The snapshot is the run's private working clone; the resolver may
    /// grow its symbol table with the trees' declarations. Must be
    /// deterministic for identical inputs, trees included — the engine
    /// relies on that to compare fast-path and slow-path results.
    fn resolve(&self, snapshot: &mut Snapshot, trees: Vec<Arc<SyntaxTree>>) -> ResolveOutcome;
}
