//! Syntax trees and the per-file tree cache.
//!
//! A [`SyntaxTree`] is the indexer's output for one file version:
//! declarations, references, and any parse errors embedded as data (an
//! unparseable file still produces a tree; see the error-handling contract).
//! The resolver consumes trees and returns annotated copies with reference
//! targets filled in.
//!
//! Trees are immutable once built and shared via `Arc`; "deep-copying the
//! tree cache" for a slow-path run is therefore a pointer copy per entry.

use std::sync::Arc;

use crate::file::FileId;
use crate::snapshot::SymbolId;

/// A top-level declaration in a file.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Decl {
    /// Declared name.
    pub name: String,
    /// 1-based line of the declaration.
    pub line: u32,
}

/// A reference to a name, with its resolution target once resolved.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Reference {
    /// Referenced name.
    pub name: String,
    /// 1-based line of the reference.
    pub line: u32,
    /// Resolution target; `None` until resolved, or when unresolvable.
    pub target: Option<SymbolId>,
}

/// A parse error embedded in a tree instead of failing the index call.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct ParseError {
    /// 1-based line the error was detected on.
    pub line: u32,
    /// Human-readable description.
    pub message: String,
}

/// Indexer output for one file version.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct SyntaxTree {
    /// The file this tree was built from.
    pub file: FileId,
    /// Declarations, in source order.
    pub decls: Vec<Decl>,
    /// References, in source order.
    pub refs: Vec<Reference>,
    /// Parse errors, in source order. Never aborts indexing.
    pub parse_errors: Vec<ParseError>,
    /// Whether the resolver has annotated this tree.
    pub resolved: bool,
}

impl SyntaxTree {
    /// A fresh, unresolved tree for a file.
    pub fn new(file: FileId) -> Self {
        SyntaxTree {
            file,
            decls: Vec::new(),
            refs: Vec::new(),
            parse_errors: Vec::new(),
            resolved: false,
        }
    }

    /// Rebind this tree to a (possibly different) file handle and strip any
    /// resolution state.
    ///
    /// Used when seeding trees from the on-disk cache: handles and symbol
    /// ids are session-local, so a seeded tree keeps only its parse results.
    pub fn rebound(mut self, file: FileId) -> Self {
        self.file = file;
        self.resolved = false;
        for reference in &mut self.refs {
            reference.target = None;
        }
        self
    }
}

/// Per-file cache of the most recent tree.
///
/// Indexed densely by [`FileId`]; entries are replaced whenever a file is
/// reindexed, and upgraded in place when the resolver produces an annotated
/// tree.
#[derive(Clone, Debug, Default)]
pub struct TreeCache {
    entries: Vec<Option<Arc<SyntaxTree>>>,
}

impl TreeCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent tree for a file, if any.
    pub fn get(&self, id: FileId) -> Option<&Arc<SyntaxTree>> {
        if !id.exists() {
            return None;
        }
        self.entries.get(id.to_index()).and_then(Option::as_ref)
    }

    /// Install the most recent tree for a file, growing the cache lazily.
    pub fn insert(&mut self, tree: Arc<SyntaxTree>) {
        let id = tree.file;
        assert!(id.exists(), "TreeCache::insert with invalid handle");
        let index = id.to_index();
        if index >= self.entries.len() {
            self.entries.resize(index + 1, None);
        }
        self.entries[index] = Some(tree);
    }

    /// Remove and return the entry for a file (used when evicting state
    /// that an undo record must preserve).
    pub fn take(&mut self, id: FileId) -> Option<Arc<SyntaxTree>> {
        if !id.exists() {
            return None;
        }
        self.entries.get_mut(id.to_index()).and_then(Option::take)
    }

    /// Iterate over cached trees in handle order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<SyntaxTree>> {
        self.entries.iter().filter_map(Option::as_ref)
    }

    /// Number of populated entries.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    /// Whether the cache has no populated entries.
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(Option::is_none)
    }
}
