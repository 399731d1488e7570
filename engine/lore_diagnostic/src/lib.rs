//! Diagnostics for the lore engine.
//!
//! Two concerns live here:
//! - [`Diagnostic`] and its constructors: the per-file findings produced by
//!   indexing and resolution.
//! - [`reconcile::DiagnosticReconciler`]: the state machine that decides,
//!   after each analysis run, which files' published diagnostics must be
//!   replaced and which must be left untouched.
//!
//! Message *content* is deliberately simple; the engine's contract is about
//! which diagnostics get (re)published when, not about wording.

mod diagnostic;
pub mod reconcile;

pub use diagnostic::{
    duplicate_definition, parse_error, unresolved_reference, Diagnostic, ErrorCode, Severity,
};
pub use reconcile::{DiagnosticReconciler, Publication};
