//! Reference frontend: a line-oriented declaration language.
//!
//! Each line is one of:
//!
//! ```text
//! def name        # declares `name`
//! use name        # references `name`
//! # comment       # ignored, as are blank lines
//! ```
//!
//! Anything else is a parse error, embedded in the tree rather than failing
//! the index call. The declaration *shape* of a file is the sorted set of
//! its `def` names, so edits to `use` lines and comments keep the
//! fingerprint stable and stay eligible for the fast path.
//!
//! This is intentionally the smallest frontend that exercises the whole
//! engine: real cross-file references, real parse errors, and a real
//! distinction between shape-changing and shape-preserving edits. It backs
//! the test-suite and the `lored` driver.

use std::sync::Arc;

use lore_core::{Decl, Fingerprint, ParseError, Reference, Snapshot, SourceFile, SyntaxTree};
use lore_diagnostic::{duplicate_definition, parse_error, unresolved_reference};
use rustc_hash::FxHashSet;

use crate::pipeline::{Indexer, ResolveOutcome, Resolver};

/// One parsed line.
enum Line<'a> {
    Blank,
    Def(&'a str),
    Use(&'a str),
    Malformed(&'a str),
}

fn is_ident(token: &str) -> bool {
    let mut chars = token.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_line(line: &str) -> Line<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Line::Blank;
    }
    let mut tokens = trimmed.split_whitespace();
    let keyword = tokens.next().unwrap_or_default();
    let name = tokens.next();
    let rest = tokens.next();
    match (keyword, name, rest) {
        ("def", Some(name), None) if is_ident(name) => Line::Def(name),
        ("use", Some(name), None) if is_ident(name) => Line::Use(name),
        ("def" | "use", _, _) => Line::Malformed("expected exactly one name"),
        _ => Line::Malformed("expected `def` or `use`"),
    }
}

/// Indexer for the line language.
#[derive(Clone, Copy, Debug, Default)]
pub struct LineIndexer;

impl Indexer for LineIndexer {
    fn index(&self, file: &SourceFile) -> SyntaxTree {
        let mut tree = SyntaxTree::new(file.id);
        for (number, raw) in file.text.lines().enumerate() {
            let line = u32::try_from(number + 1).unwrap_or(u32::MAX);
            match parse_line(raw) {
                Line::Blank => {}
                Line::Def(name) => tree.decls.push(Decl {
                    name: name.to_owned(),
                    line,
                }),
                Line::Use(name) => tree.refs.push(Reference {
                    name: name.to_owned(),
                    line,
                    target: None,
                }),
                Line::Malformed(message) => tree.parse_errors.push(ParseError {
                    line,
                    message: message.to_owned(),
                }),
            }
        }
        tree
    }

    fn fingerprint(&self, text: &str) -> Fingerprint {
        let mut names: Vec<&str> = Vec::new();
        for raw in text.lines() {
            match parse_line(raw) {
                Line::Blank | Line::Use(_) => {}
                Line::Def(name) => names.push(name),
                // A file that does not parse has no trustworthy shape.
                Line::Malformed(_) => return Fingerprint::INVALID,
            }
        }
        names.sort_unstable();
        names.dedup();
        Fingerprint::of_shape(names)
    }
}

/// Resolver for the line language.
///
/// Enters every declaration into the working snapshot's symbol table, then
/// resolves references against it. Deterministic: trees are processed in the
/// order given, lines in source order.
#[derive(Clone, Copy, Debug, Default)]
pub struct LineResolver;

impl Resolver for LineResolver {
    fn resolve(&self, snapshot: &mut Snapshot, trees: Vec<Arc<SyntaxTree>>) -> ResolveOutcome {
        let mut diagnostics = Vec::new();

        // Declarations first, across all trees, so references resolve
        // regardless of file order within the run.
        for tree in &trees {
            let mut seen_here: FxHashSet<&str> = FxHashSet::default();
            for decl in &tree.decls {
                let duplicate_in_file = !seen_here.insert(decl.name.as_str());
                let id = snapshot.enter_symbol(&decl.name, tree.file, decl.line);
                let owner = snapshot.symbols().get(id);
                if duplicate_in_file || owner.file != tree.file {
                    let original = snapshot.files.get(owner.file).path.display().to_string();
                    diagnostics.push(duplicate_definition(
                        tree.file,
                        decl.line,
                        &decl.name,
                        &original,
                    ));
                }
            }
        }

        let mut resolved = Vec::with_capacity(trees.len());
        for tree in trees {
            let mut annotated = (*tree).clone();
            for error in &annotated.parse_errors {
                diagnostics.push(parse_error(
                    annotated.file,
                    error.line,
                    error.message.as_str(),
                ));
            }
            for reference in &mut annotated.refs {
                let target = snapshot.symbols().find(&reference.name);
                if target.exists() {
                    reference.target = Some(target);
                } else {
                    reference.target = None;
                    diagnostics.push(unresolved_reference(
                        annotated.file,
                        reference.line,
                        &reference.name,
                    ));
                }
            }
            annotated.resolved = true;
            resolved.push(Arc::new(annotated));
        }

        ResolveOutcome {
            trees: resolved,
            diagnostics,
        }
    }
}
