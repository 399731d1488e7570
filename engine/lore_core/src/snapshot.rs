//! The snapshot: file table + symbol table, versioned.
//!
//! Exactly one *primary* snapshot per engine accumulates indexing results.
//! Every analysis run clones it and works on the clone, so mutation during
//! analysis can never corrupt the primary. The symbol table sits behind an
//! `Arc` with copy-on-write semantics, which makes the clone cheap (pointer
//! copies) instead of a deep copy per run.
//!
//! The symbol table only ever grows. Re-entering a known name is a no-op
//! that returns the existing id, so repeated analysis of an unchanged corpus
//! does not disturb generations.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::file::{FileId, FileTable};

/// Handle for a symbol in the symbol table. 1-based; 0 is invalid.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct SymbolId(u32);

impl SymbolId {
    /// The invalid sentinel.
    pub const NONE: SymbolId = SymbolId(0);

    /// Create from a raw 1-based id.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        SymbolId(raw)
    }

    /// Raw 1-based id.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whether this handle refers to a real symbol.
    #[inline]
    pub const fn exists(self) -> bool {
        self.0 != 0
    }

    #[inline]
    const fn to_index(self) -> usize {
        debug_assert!(self.0 != 0);
        (self.0 - 1) as usize
    }
}

impl fmt::Debug for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolId({})", self.0)
    }
}

/// A discovered top-level definition.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Symbol {
    /// Declared name.
    pub name: String,
    /// File that first defined the name.
    pub file: FileId,
    /// 1-based line of the definition in that file.
    pub line: u32,
}

/// Monotonically growing table of all discovered symbols.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    by_name: FxHashMap<String, SymbolId>,
}

impl SymbolTable {
    /// Look up a symbol id by name.
    pub fn find(&self, name: &str) -> SymbolId {
        self.by_name.get(name).copied().unwrap_or(SymbolId::NONE)
    }

    /// Get a symbol by id.
    ///
    /// # Panics
    ///
    /// Panics on an invalid or out-of-range id (engine bug).
    pub fn get(&self, id: SymbolId) -> &Symbol {
        assert!(id.exists(), "SymbolTable::get with invalid id");
        &self.symbols[id.to_index()]
    }

    /// Number of symbols discovered so far.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether no symbols have been discovered yet.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    fn insert(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId::from_raw(
            u32::try_from(self.symbols.len() + 1)
                .unwrap_or_else(|_| panic!("symbol table exceeded u32::MAX entries")),
        );
        self.by_name.insert(symbol.name.clone(), id);
        self.symbols.push(symbol);
        id
    }
}

/// A versioned view of the corpus: files plus the shared symbol table.
///
/// Cloning is cheap by design; see the module docs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Snapshot {
    /// All files known to this snapshot.
    pub files: FileTable,
    symbols: Arc<SymbolTable>,
    generation: u32,
    analysis_count: u32,
}

impl Snapshot {
    /// Create an empty snapshot (generation 0, nothing analyzed yet).
    pub fn new() -> Self {
        Snapshot {
            files: FileTable::new(),
            symbols: Arc::new(SymbolTable::default()),
            generation: 0,
            analysis_count: 0,
        }
    }

    /// Read access to the symbol table.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Enter a definition, returning the existing id if the name is known.
    ///
    /// Only an actual insertion copies the table (copy-on-write) and bumps
    /// the generation; re-entering a known name leaves the snapshot
    /// untouched, including its sharing with other clones.
    pub fn enter_symbol(&mut self, name: &str, file: FileId, line: u32) -> SymbolId {
        let existing = self.symbols.find(name);
        if existing.exists() {
            return existing;
        }
        self.generation += 1;
        Arc::make_mut(&mut self.symbols).insert(Symbol {
            name: name.to_owned(),
            file,
            line,
        })
    }

    /// Version counter, bumped on every symbol-table mutation.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// How many analysis runs have produced results against this lineage.
    ///
    /// Zero means the resolver has never run; incremental reanalysis is
    /// meaningless before the first full run.
    pub fn analysis_count(&self) -> u32 {
        self.analysis_count
    }

    /// Record that an analysis run completed against this snapshot.
    pub fn bump_analysis_count(&mut self) {
        self.analysis_count += 1;
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_enter_symbol_is_monotonic() {
        let mut snapshot = Snapshot::new();
        let a = snapshot.enter_symbol("alpha", FileId::from_raw(1), 1);
        let b = snapshot.enter_symbol("beta", FileId::from_raw(1), 2);
        let a2 = snapshot.enter_symbol("alpha", FileId::from_raw(2), 9);
        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(snapshot.symbols().len(), 2);
        // The original definition site wins.
        assert_eq!(snapshot.symbols().get(a).file, FileId::from_raw(1));
    }

    #[test]
    fn test_reentering_known_name_keeps_generation() {
        let mut snapshot = Snapshot::new();
        snapshot.enter_symbol("alpha", FileId::from_raw(1), 1);
        let generation = snapshot.generation();
        snapshot.enter_symbol("alpha", FileId::from_raw(1), 1);
        assert_eq!(snapshot.generation(), generation);
    }

    #[test]
    fn test_clone_is_isolated_from_primary() {
        let mut primary = Snapshot::new();
        primary.enter_symbol("alpha", FileId::from_raw(1), 1);
        let mut clone = primary.clone();
        clone.enter_symbol("beta", FileId::from_raw(2), 1);
        // Mutating the clone must not leak into the primary.
        assert_eq!(primary.symbols().len(), 1);
        assert_eq!(clone.symbols().len(), 2);
        assert!(primary.symbols().find("beta") == SymbolId::NONE);
    }

    #[test]
    fn test_clone_shares_table_until_mutation() {
        let mut primary = Snapshot::new();
        primary.enter_symbol("alpha", FileId::from_raw(1), 1);
        let clone = primary.clone();
        assert!(Arc::ptr_eq(&primary.symbols, &clone.symbols));
    }
}
