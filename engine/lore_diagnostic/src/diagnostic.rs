//! Diagnostic type, severities, error codes, and constructors.

use std::fmt;

use lore_core::FileId;

/// Stable code identifying a class of diagnostic.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ErrorCode {
    /// E1001: content that could not be parsed.
    ParseError = 1001,
    /// E2001: a reference to a name with no known definition.
    UnresolvedReference = 2001,
    /// E2002: a definition whose name is already owned by another file.
    DuplicateDefinition = 2002,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:04}", *self as u32)
    }
}

/// How severe a diagnostic is.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Severity {
    /// Must be fixed; the file is in error.
    Error,
    /// Worth flagging; does not mark the file as erroring.
    Warning,
}

/// A single finding in a single file.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Diagnostic {
    /// File the finding is in.
    pub file: FileId,
    /// 1-based line.
    pub line: u32,
    /// Severity.
    pub severity: Severity,
    /// Stable code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} [{}]", self.line, self.message, self.code)
    }
}

/// Content on a line could not be parsed.
pub fn parse_error(file: FileId, line: u32, message: impl Into<String>) -> Diagnostic {
    Diagnostic {
        file,
        line,
        severity: Severity::Error,
        code: ErrorCode::ParseError,
        message: message.into(),
    }
}

/// A reference to a name with no definition anywhere in the corpus.
pub fn unresolved_reference(file: FileId, line: u32, name: &str) -> Diagnostic {
    Diagnostic {
        file,
        line,
        severity: Severity::Error,
        code: ErrorCode::UnresolvedReference,
        message: format!("unresolved reference to `{name}`"),
    }
}

/// A definition colliding with a name first defined in another file.
pub fn duplicate_definition(file: FileId, line: u32, name: &str, original: &str) -> Diagnostic {
    Diagnostic {
        file,
        line,
        severity: Severity::Error,
        code: ErrorCode::DuplicateDefinition,
        message: format!("`{name}` is already defined in {original}"),
    }
}
