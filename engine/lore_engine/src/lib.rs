//! The lore incremental re-analysis engine.
//!
//! Given a corpus already analyzed into a shared symbol table and a stream
//! of edit batches, the engine keeps diagnostics up to date while doing as
//! little work as possible:
//!
//! ```text
//! edits ──► EditBatch ──► merge? ──► FastPathDecider ──┬─► fast path (sync)
//!                                                      └─► slow path (job)
//!                                          │
//!                  new snapshot + diagnostics ──► DiagnosticReconciler
//!                                          │
//!                                     publication
//! ```
//!
//! The *fast path* reanalyzes only the edited files and is sound exactly
//! when no file's declaration shape (fingerprint) changed. The *slow path*
//! reanalyzes the whole corpus on a snapshot clone outside the engine's
//! exclusive section; a newer slow-path batch arriving mid-flight supersedes
//! it, and the undo machinery rolls the primary state back so the merged
//! batch can run from a consistent base. No stale or partial result is ever
//! published.
//!
//! Entry point: [`engine::Engine`].

pub mod batch;
pub mod cache;
pub mod config;
pub mod decide;
pub mod engine;
pub mod fast;
pub mod frontend;
pub mod pipeline;
pub mod slow;
pub mod undo;

pub use batch::{EditBatch, FileEdit, TypecheckingPath};
pub use cache::{CacheError, SeedCache};
pub use config::EngineConfig;
pub use engine::{Commit, Engine, SlowPathOutcome};
pub use frontend::{LineIndexer, LineResolver};
pub use pipeline::{Indexer, ResolveOutcome, Resolver};
pub use slow::{CancelFlag, SlowPathJob, SlowPathResult};
pub use undo::UndoRecord;
