//! Manifest data model: the authoritative listing of files and their
//! identity for one point in time.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// One file under the backup root.
///
/// Paths are relative to the root, slash-normalized and case-preserving.
/// A path never contains `..` segments; [`is_safe_relative_path`] enforces
/// this at both scan and restore time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the backup root.
    pub path: PathBuf,
    /// File size in bytes.
    pub size: u64,
    /// Unix timestamp of last modification.
    pub modified: i64,
    /// Content digest (hex, algorithm per config).
    pub hash: String,
}

/// Ordered listing of every file in one backup run.
///
/// Entries are always sorted by relative path using `Path`'s own
/// component-wise ordering (`a/b.txt` sorts before `a.txt`). That is the
/// ordering contract for manifests and archive frames alike: diffing,
/// binary-search lookup and frame emission all use the same comparator,
/// so serialization is deterministic regardless of hashing completion
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Backup set this manifest belongs to.
    pub set_id: String,
    /// Unix timestamp of the scan that produced this manifest.
    pub created_at: i64,
    /// Sum of all entry sizes.
    pub total_bytes: u64,
    /// Path-sorted file entries.
    pub entries: Vec<FileEntry>,
}

impl Manifest {
    /// Builds a manifest from unordered entries, sorting by path and
    /// computing the total byte count.
    #[must_use]
    pub fn from_entries(set_id: String, created_at: i64, mut entries: Vec<FileEntry>) -> Self {
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        let total_bytes = entries.iter().map(|e| e.size).sum();
        Self {
            set_id,
            created_at,
            total_bytes,
            entries,
        }
    }

    /// Looks up an entry by relative path. Entries are sorted, so this is
    /// a binary search.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&FileEntry> {
        self.entries
            .binary_search_by(|e| e.path.as_path().cmp(path))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the manifest has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Rejects absolute paths and any path containing `..` or other
/// non-normal components. Applied to every path read back out of an
/// archive before it is joined onto a restore target.
#[must_use]
pub fn is_safe_relative_path(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}
