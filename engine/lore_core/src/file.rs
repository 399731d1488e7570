//! File identities and the in-memory file table.
//!
//! Files are identified by a stable [`FileId`] handle. A file is created on
//! first reference, gets its content replaced (same handle) on each edit, and
//! is never deleted within a session. Handle 0 is reserved as the invalid
//! sentinel so that `FileId` can be used in dense tables with a cheap
//! validity check.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;

/// Stable handle for a file in the corpus.
///
/// Handles are dense, 1-based, and never reused. 0 is the invalid sentinel.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct FileId(u32);

impl FileId {
    /// The invalid sentinel; never refers to a real file.
    pub const NONE: FileId = FileId(0);

    /// Create from a raw 1-based id.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        FileId(raw)
    }

    /// Raw 1-based id.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whether this handle refers to a real file.
    #[inline]
    pub const fn exists(self) -> bool {
        self.0 != 0
    }

    /// Index into dense per-file tables.
    ///
    /// Only valid for existing handles.
    #[inline]
    pub const fn to_index(self) -> usize {
        debug_assert!(self.0 != 0);
        (self.0 - 1) as usize
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::NONE
    }
}

/// A single version of a file's content.
///
/// Immutable once created; edits replace the whole `Arc<SourceFile>` in the
/// file table, so clones of the table keep seeing the version they were
/// cloned with.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SourceFile {
    /// The file's stable handle.
    pub id: FileId,
    /// Workspace-relative path.
    pub path: PathBuf,
    /// Current content.
    pub text: Arc<str>,
    /// Epoch of the edit batch that produced this version (0 = initial).
    pub epoch: u32,
}

/// Dense table of all files known to a snapshot.
///
/// Entries are `Arc`-shared between snapshot clones, so cloning the table
/// copies pointers, not file contents.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FileTable {
    files: Vec<Arc<SourceFile>>,
    by_path: FxHashMap<PathBuf, FileId>,
}

impl FileTable {
    /// Create an empty file table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files known.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no files are known yet.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Look up a file handle by path.
    pub fn find(&self, path: &Path) -> FileId {
        self.by_path.get(path).copied().unwrap_or(FileId::NONE)
    }

    /// Get a file by handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle is invalid or out of range (engine bug).
    pub fn get(&self, id: FileId) -> &Arc<SourceFile> {
        assert!(id.exists(), "FileTable::get called with invalid handle");
        &self.files[id.to_index()]
    }

    /// Enter a new file, assigning the next handle.
    ///
    /// # Panics
    ///
    /// Panics if a file with the same path already exists (callers must use
    /// [`FileTable::find`] + [`FileTable::replace`] for edits).
    pub fn enter(&mut self, path: PathBuf, text: Arc<str>, epoch: u32) -> FileId {
        assert!(
            !self.by_path.contains_key(&path),
            "FileTable::enter called for known path {}",
            path.display()
        );
        // A wrapped handle would silently alias an existing file in every
        // dense table keyed by it, so overflow is fatal.
        let id = FileId::from_raw(
            u32::try_from(self.files.len() + 1)
                .unwrap_or_else(|_| panic!("file table exceeded u32::MAX entries")),
        );
        self.files.push(Arc::new(SourceFile {
            id,
            path: path.clone(),
            text,
            epoch,
        }));
        self.by_path.insert(path, id);
        id
    }

    /// Replace the content of an existing file, keeping its handle.
    pub fn replace(&mut self, id: FileId, text: Arc<str>, epoch: u32) {
        let old = self.get(id);
        let path = old.path.clone();
        self.files[id.to_index()] = Arc::new(SourceFile {
            id,
            path,
            text,
            epoch,
        });
    }

    /// Iterate over all file handles, in handle order.
    pub fn ids(&self) -> impl Iterator<Item = FileId> + '_ {
        self.files.iter().map(|f| f.id)
    }

    /// Iterate over all files, in handle order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<SourceFile>> {
        self.files.iter()
    }
}
