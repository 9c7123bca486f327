//! Filesystem scanner: walks a backup root and produces a path-sorted
//! [`Manifest`] of every regular file, hashing contents in parallel.
//!
//! Per-file problems (permission errors, files deleted mid-scan, symlinks)
//! are collected as warnings rather than aborting the run; only a missing
//! or unreadable root is fatal.

use crate::config::Config;
use crate::errors::{Error, Result};
use crate::manifest::{FileEntry, Manifest};
use crate::utils::hash::HashAlgorithm;
use crate::utils::{current_timestamp, should_ignore, thread_pool};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// A non-fatal problem encountered while scanning.
#[derive(Debug, Clone)]
pub struct ScanWarning {
    /// Path the problem relates to (relative to the root where possible).
    pub path: PathBuf,
    /// Human-readable reason.
    pub reason: String,
}

/// Result of one scan: the manifest plus everything that was skipped.
#[derive(Debug)]
pub struct ScanReport {
    /// Path-sorted manifest of all readable regular files.
    pub manifest: Manifest,
    /// Files and directory entries that could not be included.
    pub warnings: Vec<ScanWarning>,
}

/// Scanner for one backup set.
pub struct Scanner<'a> {
    /// Backup set the produced manifest belongs to.
    set_id: String,
    /// Digest algorithm for file contents.
    algorithm: HashAlgorithm,
    /// Files at or above this size are memory-mapped for hashing.
    mmap_threshold: u64,
    /// Patterns excluded from the walk.
    ignore_patterns: Vec<String>,
    /// When set, entries whose size and mtime match are not re-hashed.
    /// Only populated when `trust_mtime` is explicitly enabled.
    baseline: Option<&'a Manifest>,
}

impl<'a> Scanner<'a> {
    /// Create a scanner from config.
    ///
    /// `previous` is the last committed snapshot manifest; it is consulted
    /// for the mtime fast path only when `performance.trust_mtime` is on.
    #[must_use]
    pub fn new(set_id: &str, config: &Config, previous: Option<&'a Manifest>) -> Self {
        Self {
            set_id: set_id.to_string(),
            algorithm: config.core.hash_algorithm,
            mmap_threshold: config.performance.mmap_threshold,
            ignore_patterns: config.scan.ignore_patterns.clone(),
            baseline: if config.performance.trust_mtime {
                previous
            } else {
                None
            },
        }
    }

    /// Walk `root` and hash every regular file into a manifest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Access`] only if `root` itself is missing, is not a
    /// directory, or cannot be read.
    pub fn scan(&self, root: &Path) -> Result<ScanReport> {
        let metadata = std::fs::metadata(root).map_err(|source| Error::Access {
            path: root.to_path_buf(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(Error::Access {
                path: root.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotADirectory,
                    "backup root is not a directory",
                ),
            });
        }

        let mut warnings = Vec::new();
        let mut files: Vec<(PathBuf, u64, i64)> = Vec::new();

        for entry in WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                let rel = e.path().strip_prefix(root).unwrap_or(e.path());
                rel.as_os_str().is_empty() || !should_ignore(rel, &self.ignore_patterns)
            })
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map_or_else(|| root.to_path_buf(), Path::to_path_buf);
                    warnings.push(ScanWarning {
                        path: path.strip_prefix(root).unwrap_or(&path).to_path_buf(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let rel = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_path_buf();

            if entry.file_type().is_symlink() {
                // Symlinks are never followed: a link pointing outside the
                // root would escape the backup boundary
                warnings.push(ScanWarning {
                    path: rel,
                    reason: "symbolic link skipped".to_string(),
                });
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }

            match entry.metadata() {
                Ok(meta) => {
                    let modified = meta
                        .modified()
                        .ok()
                        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                        .and_then(|d| i64::try_from(d.as_secs()).ok())
                        .unwrap_or(0);
                    files.push((rel, meta.len(), modified));
                }
                Err(e) => warnings.push(ScanWarning {
                    path: rel,
                    reason: e.to_string(),
                }),
            }
        }

        debug!(set = %self.set_id, files = files.len(), "scan walk complete");

        // Hash in parallel, then re-sort into path order below; completion
        // order is nondeterministic
        let algorithm = self.algorithm;
        let mmap_threshold = self.mmap_threshold;
        let baseline = self.baseline;
        let hashed: Vec<std::result::Result<FileEntry, ScanWarning>> =
            thread_pool::run_in_pool(|| {
                files
                    .par_iter()
                    .map(|(rel, size, modified)| {
                        if let Some(previous) = baseline
                            && let Some(prev) = previous.get(rel)
                            && prev.size == *size
                            && prev.modified == *modified
                        {
                            return Ok(FileEntry {
                                path: rel.clone(),
                                size: *size,
                                modified: *modified,
                                hash: prev.hash.clone(),
                            });
                        }

                        match algorithm.hash_file(&root.join(rel), mmap_threshold) {
                            Ok(hash) => Ok(FileEntry {
                                path: rel.clone(),
                                size: *size,
                                modified: *modified,
                                hash,
                            }),
                            Err(e) => Err(ScanWarning {
                                path: rel.clone(),
                                reason: e.to_string(),
                            }),
                        }
                    })
                    .collect()
            });

        let mut entries = Vec::with_capacity(hashed.len());
        for result in hashed {
            match result {
                Ok(entry) => entries.push(entry),
                Err(warning) => warnings.push(warning),
            }
        }

        let manifest = Manifest::from_entries(self.set_id.clone(), current_timestamp(), entries);
        Ok(ScanReport { manifest, warnings })
    }
}
