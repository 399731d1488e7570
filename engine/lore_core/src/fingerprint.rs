//! Declaration-shape fingerprints.
//!
//! A [`Fingerprint`] is a 32-bit digest of a file's externally visible
//! declaration shape. Equal fingerprints mean identical visible definitions,
//! so an edit that keeps the fingerprint stable cannot have changed anything
//! another file could observe. That equivalence is what makes the fast path
//! sound: see `lore_engine::decide`.
//!
//! The digest is a pure function of content. What counts as "declaration
//! shape" is the indexer's business; this module only provides the digest
//! type, the shape-hashing helper, and the per-file table.

use std::fmt;
use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use crate::file::FileId;

/// Content-derived digest of a file's declaration shape.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct Fingerprint(u32);

impl Fingerprint {
    /// Sentinel that never equals a computed fingerprint.
    ///
    /// Doubles as "unknown" (table entry never written) and "invalidated"
    /// (content could not be fingerprinted, e.g. a parse error). Both force
    /// the slow path; the engine intentionally does not distinguish them.
    pub const INVALID: Fingerprint = Fingerprint(u32::MAX);

    /// Build a fingerprint from an already-computed digest, remapping the
    /// sentinel value so computed fingerprints never collide with it.
    #[inline]
    pub const fn from_digest(digest: u64) -> Self {
        let folded = (digest as u32) ^ ((digest >> 32) as u32);
        if folded == u32::MAX {
            Fingerprint(u32::MAX - 1)
        } else {
            Fingerprint(folded)
        }
    }

    /// Digest an ordered sequence of shape parts (e.g. declared names).
    ///
    /// Callers are responsible for sorting the parts first if their source
    /// order is not meaningful.
    pub fn of_shape<'a>(parts: impl IntoIterator<Item = &'a str>) -> Self {
        let mut hasher = FxHasher::default();
        let mut count: u64 = 0;
        for part in parts {
            part.hash(&mut hasher);
            count += 1;
        }
        count.hash(&mut hasher);
        Self::from_digest(hasher.finish())
    }

    /// Whether this is the invalid sentinel (never matches anything).
    #[inline]
    pub const fn is_invalid(self) -> bool {
        self.0 == u32::MAX
    }

    /// Raw digest value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            write!(f, "Fingerprint(INVALID)")
        } else {
            write!(f, "Fingerprint({:08x})", self.0)
        }
    }
}

impl Default for Fingerprint {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Last-known fingerprint per file handle.
///
/// Grows lazily: reads beyond the current size yield
/// [`Fingerprint::INVALID`], which never matches a computed value and so
/// forces the slow path for that file. Writes extend the table as needed, so
/// it always covers at least the highest handle ever written.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FingerprintTable {
    entries: Vec<Fingerprint>,
}

impl FingerprintTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last-known fingerprint for a file, or the invalid sentinel if none
    /// was ever recorded.
    pub fn get(&self, id: FileId) -> Fingerprint {
        if !id.exists() {
            return Fingerprint::INVALID;
        }
        self.entries
            .get(id.to_index())
            .copied()
            .unwrap_or(Fingerprint::INVALID)
    }

    /// Record the latest fingerprint for a file, growing the table lazily.
    pub fn set(&mut self, id: FileId, fingerprint: Fingerprint) {
        assert!(id.exists(), "FingerprintTable::set with invalid handle");
        let index = id.to_index();
        if index >= self.entries.len() {
            self.entries.resize(index + 1, Fingerprint::INVALID);
        }
        self.entries[index] = fingerprint;
    }

    /// Number of entries currently backed by storage.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no backed entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_shape_digest_is_stable() {
        let a = Fingerprint::of_shape(["alpha", "beta"]);
        let b = Fingerprint::of_shape(["alpha", "beta"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_shape_digest_depends_on_parts() {
        let a = Fingerprint::of_shape(["alpha", "beta"]);
        let b = Fingerprint::of_shape(["alpha"]);
        let c = Fingerprint::of_shape(["alpha", "gamma"]);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_computed_never_invalid() {
        // from_digest remaps the sentinel value.
        assert!(!Fingerprint::from_digest(u64::from(u32::MAX)).is_invalid());
        assert!(!Fingerprint::of_shape([]).is_invalid());
    }

    #[test]
    fn test_table_reads_beyond_size_are_invalid() {
        let table = FingerprintTable::new();
        assert!(table.get(FileId::from_raw(7)).is_invalid());
        assert!(table.get(FileId::NONE).is_invalid());
    }

    #[test]
    fn test_table_grows_lazily() {
        let mut table = FingerprintTable::new();
        let print = Fingerprint::of_shape(["x"]);
        table.set(FileId::from_raw(3), print);
        assert_eq!(table.len(), 3);
        assert!(table.get(FileId::from_raw(1)).is_invalid());
        assert!(table.get(FileId::from_raw(2)).is_invalid());
        assert_eq!(table.get(FileId::from_raw(3)), print);
    }
}
