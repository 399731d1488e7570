//! On-disk seed cache for warm starts.
//!
//! Stores, per path, a digest of the file content plus the fingerprint and
//! unresolved tree computed from it. On the next session, files whose
//! content digest still matches skip the initial indexing work; everything
//! else is a miss. File handles and symbol ids are session-local, so looked
//! up trees are rebound before use (see [`lore_core::SyntaxTree::rebound`]).
//!
//! Cache problems are never fatal to the engine: a missing, truncated, or
//! version-skewed cache file degrades to a cold start.

use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use lore_core::{Fingerprint, SyntaxTree};
use rustc_hash::{FxHashMap, FxHasher};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bumped whenever the serialized layout changes.
const CACHE_VERSION: u32 = 1;

/// Failure to read or write the cache file.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache codec: {0}")]
    Codec(#[from] bincode::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct SeedEntry {
    content_digest: u64,
    fingerprint: Fingerprint,
    tree: SyntaxTree,
}

/// Per-path seed data from a previous session.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SeedCache {
    version: u32,
    entries: FxHashMap<PathBuf, SeedEntry>,
}

impl SeedCache {
    /// An empty cache (every lookup misses).
    pub fn new() -> Self {
        SeedCache {
            version: CACHE_VERSION,
            entries: FxHashMap::default(),
        }
    }

    /// Content digest used for hit/miss checks.
    pub fn digest(text: &str) -> u64 {
        let mut hasher = FxHasher::default();
        text.hash(&mut hasher);
        hasher.finish()
    }

    /// Record a file's current seed data, replacing any previous entry.
    pub fn record(&mut self, path: PathBuf, text: &str, fingerprint: Fingerprint, tree: &SyntaxTree) {
        self.entries.insert(
            path,
            SeedEntry {
                content_digest: Self::digest(text),
                fingerprint,
                tree: tree.clone(),
            },
        );
    }

    /// Seed data for a path, if its content is unchanged since recording.
    pub fn lookup(&self, path: &Path, text: &str) -> Option<(Fingerprint, &SyntaxTree)> {
        let entry = self.entries.get(path)?;
        if entry.content_digest != Self::digest(text) {
            return None;
        }
        Some((entry.fingerprint, &entry.tree))
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load a cache from disk.
    ///
    /// A missing file or a version-skewed cache yields an empty cache;
    /// only genuine io/codec failures surface as errors.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no seed cache, cold start");
                return Ok(Self::new());
            }
            Err(error) => return Err(error.into()),
        };
        let cache: SeedCache = bincode::deserialize(&bytes)?;
        if cache.version != CACHE_VERSION {
            tracing::debug!(
                found = cache.version,
                expected = CACHE_VERSION,
                "seed cache version skew, cold start"
            );
            return Ok(Self::new());
        }
        Ok(cache)
    }

    /// Write the cache to disk, creating parent directories as needed.
    pub fn store(&self, path: &Path) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = bincode::serialize(self)?;
        fs::write(path, bytes)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests {
    use super::*;
    use lore_core::FileId;
    use pretty_assertions::assert_eq;

    fn tree_with_decl(name: &str) -> SyntaxTree {
        let mut tree = SyntaxTree::new(FileId::from_raw(1));
        tree.decls.push(lore_core::Decl {
            name: name.to_owned(),
            line: 1,
        });
        tree
    }

    #[test]
    fn test_lookup_hits_on_unchanged_content() {
        let mut cache = SeedCache::new();
        let print = Fingerprint::of_shape(["alpha"]);
        cache.record(PathBuf::from("a.lore"), "def alpha", print, &tree_with_decl("alpha"));

        let hit = cache.lookup(Path::new("a.lore"), "def alpha");
        assert!(hit.is_some());
        let (fingerprint, tree) = hit.unwrap();
        assert_eq!(fingerprint, print);
        assert_eq!(tree.decls[0].name, "alpha");
    }

    #[test]
    fn test_lookup_misses_on_changed_content() {
        let mut cache = SeedCache::new();
        let print = Fingerprint::of_shape(["alpha"]);
        cache.record(PathBuf::from("a.lore"), "def alpha", print, &tree_with_decl("alpha"));
        assert!(cache.lookup(Path::new("a.lore"), "def alpha2").is_none());
        assert!(cache.lookup(Path::new("b.lore"), "def alpha").is_none());
    }

    #[test]
    fn test_roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("seeds.bin");

        let mut cache = SeedCache::new();
        cache.record(
            PathBuf::from("a.lore"),
            "def alpha",
            Fingerprint::of_shape(["alpha"]),
            &tree_with_decl("alpha"),
        );
        cache.store(&file).unwrap();

        let loaded = SeedCache::load(&file).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.lookup(Path::new("a.lore"), "def alpha").is_some());
    }

    #[test]
    fn test_missing_file_is_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = SeedCache::load(&dir.path().join("absent.bin")).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_version_skew_is_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("seeds.bin");
        let mut cache = SeedCache::new();
        cache.version = CACHE_VERSION + 1;
        cache.store(&file).unwrap();
        let loaded = SeedCache::load(&file).unwrap();
        assert!(loaded.is_empty());
    }
}
