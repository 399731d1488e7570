//! Core data model for the lore analysis engine.
//!
//! Everything that flows between the indexer, the resolver, and the
//! re-analysis engine lives here: file identities and contents, declaration
//! fingerprints, syntax trees, and the snapshot that owns the ever-growing
//! symbol table.
//!
//! # Ownership model
//!
//! There is exactly one *primary* [`snapshot::Snapshot`] per engine. Analysis
//! runs never mutate it directly; they clone it (cheap, the symbol table is
//! behind an `Arc`) and work on the clone. The clone either becomes the new
//! primary when the run commits, or is dropped when the run is superseded.

pub mod file;
pub mod fingerprint;
pub mod snapshot;
pub mod tree;

pub use file::{FileId, FileTable, SourceFile};
pub use fingerprint::{Fingerprint, FingerprintTable};
pub use snapshot::{Snapshot, Symbol, SymbolId, SymbolTable};
pub use tree::{Decl, ParseError, Reference, SyntaxTree, TreeCache};
