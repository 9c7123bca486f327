//! Manifest diffing: classifies every path into exactly one of
//! Unchanged / Added / Modified / Deleted.

use crate::manifest::Manifest;
use std::path::PathBuf;

/// Classification of every path across two manifests.
///
/// The four buckets partition the union of both manifests' paths; a path
/// appears in exactly one of them. The classification is a pure function
/// of the two manifests.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// Present in both with identical size, mtime and hash.
    pub unchanged: Vec<PathBuf>,
    /// Present only in the current manifest.
    pub added: Vec<PathBuf>,
    /// Present in both but differing in size, mtime or hash.
    pub modified: Vec<PathBuf>,
    /// Present only in the previous manifest.
    pub deleted: Vec<PathBuf>,
}

impl ChangeSet {
    /// True when nothing was added, modified or deleted.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Paths whose content must be written into the archive, in the order
    /// they appear in the current manifest.
    #[must_use]
    pub fn paths_to_archive(&self) -> Vec<&PathBuf> {
        // added and modified are each manifest-ordered; merge preserves that
        let mut paths: Vec<&PathBuf> = self.added.iter().chain(self.modified.iter()).collect();
        paths.sort();
        paths
    }
}

/// Diff the current manifest against the previous snapshot manifest.
///
/// With no previous manifest every entry classifies as Added (full backup).
/// The hash is authoritative: a size/mtime match alone never classifies a
/// path as Unchanged here — any metadata-trusting shortcut happens earlier,
/// in the scanner, and only when explicitly enabled.
#[must_use]
pub fn diff(current: &Manifest, previous: Option<&Manifest>) -> ChangeSet {
    let Some(previous) = previous else {
        return ChangeSet {
            added: current.entries.iter().map(|e| e.path.clone()).collect(),
            ..ChangeSet::default()
        };
    };

    let mut changes = ChangeSet::default();

    // Both manifests are path-sorted; walk them like a merge
    let mut cur = current.entries.iter().peekable();
    let mut prev = previous.entries.iter().peekable();

    loop {
        match (cur.peek(), prev.peek()) {
            (Some(c), Some(p)) => match c.path.cmp(&p.path) {
                std::cmp::Ordering::Less => {
                    changes.added.push(c.path.clone());
                    cur.next();
                }
                std::cmp::Ordering::Greater => {
                    changes.deleted.push(p.path.clone());
                    prev.next();
                }
                std::cmp::Ordering::Equal => {
                    if c.size == p.size && c.modified == p.modified && c.hash == p.hash {
                        changes.unchanged.push(c.path.clone());
                    } else {
                        changes.modified.push(c.path.clone());
                    }
                    cur.next();
                    prev.next();
                }
            },
            (Some(c), None) => {
                changes.added.push(c.path.clone());
                cur.next();
            }
            (None, Some(p)) => {
                changes.deleted.push(p.path.clone());
                prev.next();
            }
            (None, None) => break,
        }
    }

    changes
}
