//! Restorer: reconstructs a source tree from an archive chain.
//!
//! Every archive in the chain is checksum-verified before the first
//! filesystem write, so a corrupt archive leaves the target untouched.
//! Chains replay oldest-to-newest; each archive's frames are written and
//! its recorded deletions applied, which reproduces the final tree when
//! the chain starts at a full backup.

use crate::archive::{ARCHIVE_EXT, Archive, set_archive_dir};
use crate::errors::{Error, Result};
use crate::output;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// How restore treats files already present in the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreMode {
    /// Write every archived path, replacing whatever is there.
    FullOverwrite,
    /// Skip a path when the target file's mtime is newer than the
    /// archived mtime (protects local edits).
    MergeKeepNewer,
}

/// Summary of one restore run.
#[derive(Debug, Default)]
pub struct RestoreReport {
    /// Archives replayed, oldest first.
    pub archives_applied: usize,
    /// Files written to the target.
    pub files_written: usize,
    /// Files skipped by `MergeKeepNewer`.
    pub files_skipped: usize,
    /// Paths removed because an archive recorded their deletion.
    pub files_deleted: usize,
}

/// Restores archive chains for one archive directory.
pub struct Restorer {
    /// Root archive directory (contains one subdirectory per set).
    archive_dir: PathBuf,
}

impl Restorer {
    /// Create a restorer over the configured archive directory.
    #[must_use]
    pub fn new(archive_dir: PathBuf) -> Self {
        Self { archive_dir }
    }

    /// Resolve the incremental chain for a set, oldest first.
    ///
    /// Headers of every archive on disk are read; the chain head is the
    /// archive no other archive references as its prior. Timestamps have
    /// one-second resolution, so they only break ties between sibling
    /// heads left behind by retried runs, never decide against a
    /// referenced predecessor. Prior-archive references are followed back
    /// to the full backup, and only archives actually on the chain are
    /// checksum-verified.
    ///
    /// # Errors
    ///
    /// [`Error::ChainGap`] if a referenced archive is missing,
    /// [`Error::CorruptArchive`] if a chain member fails verification, or
    /// `Other` if the set has no archives at all.
    pub fn resolve_chain(&self, set_id: &str) -> Result<Vec<Archive>> {
        let set_dir = set_archive_dir(&self.archive_dir, set_id);
        let mut by_id: HashMap<String, Archive> = HashMap::new();

        if set_dir.exists() {
            for entry in fs::read_dir(&set_dir).map_err(|source| Error::Access {
                path: set_dir.clone(),
                source,
            })? {
                let entry = entry.map_err(|source| Error::Access {
                    path: set_dir.clone(),
                    source,
                })?;
                let path = entry.path();
                if path.extension().and_then(|s| s.to_str()) != Some(ARCHIVE_EXT) {
                    continue;
                }
                match Archive::open_unverified(&path) {
                    Ok(archive) => {
                        by_id.insert(archive.header.archive_id.clone(), archive);
                    }
                    Err(e) => output::warning(&format!(
                        "Skipping unreadable archive {}: {e}",
                        path.display()
                    )),
                }
            }
        }

        if by_id.is_empty() {
            return Err(Error::Other(anyhow::anyhow!(
                "no archives found for backup set '{set_id}' in {}",
                set_dir.display()
            )));
        }

        let referenced: HashSet<String> = by_id
            .values()
            .filter_map(|a| a.header.prior_archive.clone())
            .collect();
        let head_id = by_id
            .values()
            .filter(|a| !referenced.contains(&a.header.archive_id))
            .max_by_key(|a| (a.header.created_at, a.header.archive_id.clone()))
            // No unreferenced archive means a reference cycle; walk from
            // the newest so the gap check below surfaces it
            .or_else(|| {
                by_id
                    .values()
                    .max_by_key(|a| (a.header.created_at, a.header.archive_id.clone()))
            })
            .map(|a| a.header.archive_id.clone())
            .unwrap_or_default();

        let mut chain = Vec::new();
        let mut next = Some(head_id);
        while let Some(id) = next {
            let Some(archive) = by_id.remove(&id) else {
                return Err(Error::ChainGap {
                    set_id: set_id.to_string(),
                    missing: id,
                });
            };
            next = archive.header.prior_archive.clone();
            chain.push(archive);
        }

        chain.reverse();

        // A corrupt orphan off the chain must not block a restore of an
        // intact chain
        for archive in &chain {
            archive.verify_checksum()?;
        }

        debug!(set = set_id, archives = chain.len(), "chain resolved");
        Ok(chain)
    }

    /// Restore the full chain for a set into `target`.
    ///
    /// # Errors
    ///
    /// Chain and verification errors as in [`Restorer::resolve_chain`];
    /// [`Error::Write`] once applying begins. No filesystem mutation
    /// happens unless the entire chain verified.
    pub fn restore(&self, set_id: &str, target: &Path, mode: RestoreMode) -> Result<RestoreReport> {
        let chain = self.resolve_chain(set_id)?;

        let mut report = RestoreReport::default();
        for archive in &chain {
            apply_archive(archive, target, mode, &mut report)?;
            report.archives_applied += 1;
        }
        Ok(report)
    }

    /// Restore a single explicit archive file (no chain resolution).
    ///
    /// # Errors
    ///
    /// [`Error::CorruptArchive`] before any write, [`Error::Write`] after.
    pub fn restore_archive(
        archive_path: &Path,
        target: &Path,
        mode: RestoreMode,
    ) -> Result<RestoreReport> {
        let archive = Archive::open(archive_path)?;
        let mut report = RestoreReport::default();
        apply_archive(&archive, target, mode, &mut report)?;
        report.archives_applied = 1;
        Ok(report)
    }
}

fn apply_archive(
    archive: &Archive,
    target: &Path,
    mode: RestoreMode,
    report: &mut RestoreReport,
) -> Result<()> {
    let mut written = 0usize;
    let mut skipped = 0usize;

    let deleted = archive.replay(|rel, bytes| {
        let dest = target.join(rel);
        let entry = archive.manifest.get(rel);

        if mode == RestoreMode::MergeKeepNewer
            && let Some(entry) = entry
            && let Ok(meta) = fs::metadata(&dest)
            && let Ok(modified) = meta.modified()
            && let Ok(age) = modified.duration_since(std::time::UNIX_EPOCH)
            && i64::try_from(age.as_secs()).unwrap_or(i64::MAX) > entry.modified
        {
            skipped += 1;
            return Ok(());
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&dest, bytes).map_err(|source| Error::Write {
            path: dest.clone(),
            source,
        })?;

        // Re-apply the archived mtime so MergeKeepNewer composes across
        // chain replays and repeated restores
        if let Some(entry) = entry {
            let mtime = filetime::FileTime::from_unix_time(entry.modified, 0);
            if let Err(e) = filetime::set_file_mtime(&dest, mtime) {
                output::warning(&format!(
                    "Could not restore mtime for {}: {e}",
                    dest.display()
                ));
            }
        }

        written += 1;
        Ok(())
    })?;

    for rel in &deleted {
        let dest = target.join(rel);
        if mode == RestoreMode::MergeKeepNewer
            && let Ok(meta) = fs::metadata(&dest)
            && let Ok(modified) = meta.modified()
            && let Ok(age) = modified.duration_since(std::time::UNIX_EPOCH)
            && i64::try_from(age.as_secs()).unwrap_or(i64::MAX) > archive.header.created_at
        {
            // Locally edited after the backup that deleted it; keep it
            report.files_skipped += 1;
            continue;
        }
        match fs::remove_file(&dest) {
            Ok(()) => report.files_deleted += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(Error::Write {
                    path: dest,
                    source,
                });
            }
        }
    }

    report.files_written += written;
    report.files_skipped += skipped;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveWriter;
    use crate::diff::diff;
    use crate::manifest::Manifest;
    use crate::utils::compress::{CompressionType, ZstdCodec};
    use anyhow::Result;
    use tempfile::TempDir;

    fn scan(root: &Path) -> Manifest {
        let config = crate::config::Config::default();
        crate::scanner::Scanner::new("steam", &config, None)
            .scan(root)
            .unwrap()
            .manifest
    }

    fn write_archive(
        temp: &TempDir,
        root: &Path,
        previous: Option<&Manifest>,
        prior_id: Option<String>,
    ) -> Result<(String, Manifest)> {
        let manifest = scan(root);
        write_manifest_archive(temp, root, manifest, previous, prior_id)
    }

    /// Like `write_archive` but with an explicit creation timestamp.
    fn write_archive_at(
        temp: &TempDir,
        root: &Path,
        previous: Option<&Manifest>,
        prior_id: Option<String>,
        created_at: i64,
    ) -> Result<(String, Manifest)> {
        let mut manifest = scan(root);
        manifest.created_at = created_at;
        write_manifest_archive(temp, root, manifest, previous, prior_id)
    }

    fn write_manifest_archive(
        temp: &TempDir,
        root: &Path,
        manifest: Manifest,
        previous: Option<&Manifest>,
        prior_id: Option<String>,
    ) -> Result<(String, Manifest)> {
        let changes = diff(&manifest, previous);
        let codec = ZstdCodec::new(3);
        let writer = ArchiveWriter::new(
            set_archive_dir(&temp.path().join("archives"), "steam"),
            &codec,
            CompressionType::Zstd,
        );
        let info = writer.write(&manifest, &changes, root, prior_id)?;
        Ok((info.archive_id, manifest))
    }

    #[test]
    fn test_full_restore_round_trip() -> Result<()> {
        let temp = TempDir::new()?;
        let root = temp.path().join("root");
        std::fs::create_dir_all(root.join("sub"))?;
        std::fs::write(root.join("a.txt"), "hi")?;
        std::fs::write(root.join("sub/b.txt"), "yo")?;

        write_archive(&temp, &root, None, None)?;

        let target = temp.path().join("target");
        let restorer = Restorer::new(temp.path().join("archives"));
        let report = restorer.restore("steam", &target, RestoreMode::FullOverwrite)?;

        assert_eq!(report.archives_applied, 1);
        assert_eq!(report.files_written, 2);
        assert_eq!(std::fs::read(target.join("a.txt"))?, b"hi");
        assert_eq!(std::fs::read(target.join("sub/b.txt"))?, b"yo");
        Ok(())
    }

    #[test]
    fn test_chain_replay_with_modification_and_deletion() -> Result<()> {
        let temp = TempDir::new()?;
        let root = temp.path().join("root");
        std::fs::create_dir_all(root.join("sub"))?;
        std::fs::write(root.join("a.txt"), "hi")?;
        std::fs::write(root.join("sub/b.txt"), "yo")?;

        let (first_id, first_manifest) = write_archive(&temp, &root, None, None)?;

        std::fs::write(root.join("a.txt"), "hey")?;
        std::fs::remove_file(root.join("sub/b.txt"))?;
        write_archive(&temp, &root, Some(&first_manifest), Some(first_id))?;

        let target = temp.path().join("target");
        let restorer = Restorer::new(temp.path().join("archives"));
        let report = restorer.restore("steam", &target, RestoreMode::FullOverwrite)?;

        assert_eq!(report.archives_applied, 2);
        assert_eq!(std::fs::read(target.join("a.txt"))?, b"hey");
        assert!(!target.join("sub/b.txt").exists());
        assert_eq!(report.files_deleted, 1);
        Ok(())
    }

    #[test]
    fn test_chain_gap_detected() -> Result<()> {
        let temp = TempDir::new()?;
        let root = temp.path().join("root");
        std::fs::create_dir_all(&root)?;
        std::fs::write(root.join("a.txt"), "hi")?;

        let (first_id, first_manifest) = write_archive(&temp, &root, None, None)?;
        std::fs::write(root.join("a.txt"), "hey")?;
        write_archive(&temp, &root, Some(&first_manifest), Some(first_id.clone()))?;

        // Delete the full backup out from under the chain
        let set_dir = set_archive_dir(&temp.path().join("archives"), "steam");
        std::fs::remove_file(set_dir.join(format!("{first_id}.{ARCHIVE_EXT}")))?;

        let restorer = Restorer::new(temp.path().join("archives"));
        let err = restorer
            .restore("steam", &temp.path().join("target"), RestoreMode::FullOverwrite)
            .unwrap_err();
        assert!(matches!(err, Error::ChainGap { ref missing, .. } if *missing == first_id));
        Ok(())
    }

    #[test]
    fn test_head_follows_references_not_timestamps() -> Result<()> {
        let temp = TempDir::new()?;
        let root = temp.path().join("root");
        std::fs::create_dir_all(&root)?;
        std::fs::write(root.join("a.txt"), "v1")?;

        // Clock skew: the full backup carries a newer timestamp than the
        // incremental that references it
        let (first_id, first_manifest) = write_archive_at(&temp, &root, None, None, 300)?;
        std::fs::write(root.join("a.txt"), "v2")?;
        let (second_id, _) = write_archive_at(
            &temp,
            &root,
            Some(&first_manifest),
            Some(first_id.clone()),
            100,
        )?;

        let restorer = Restorer::new(temp.path().join("archives"));
        let chain = restorer.resolve_chain("steam")?;
        let ids: Vec<_> = chain.iter().map(|a| a.header.archive_id.clone()).collect();
        assert_eq!(ids, vec![first_id, second_id]);

        let target = temp.path().join("target");
        restorer.restore("steam", &target, RestoreMode::FullOverwrite)?;
        assert_eq!(std::fs::read(target.join("a.txt"))?, b"v2");
        Ok(())
    }

    #[test]
    fn test_sibling_heads_resolve_to_newest() -> Result<()> {
        let temp = TempDir::new()?;
        let root = temp.path().join("root");
        std::fs::create_dir_all(&root)?;
        std::fs::write(root.join("a.txt"), "v1")?;

        // A retried run after a lost snapshot commit leaves two archives
        // referencing the same prior
        let (first_id, first_manifest) = write_archive_at(&temp, &root, None, None, 100)?;
        std::fs::write(root.join("a.txt"), "v2")?;
        write_archive_at(&temp, &root, Some(&first_manifest), Some(first_id.clone()), 200)?;
        let (retry_id, _) = write_archive_at(
            &temp,
            &root,
            Some(&first_manifest),
            Some(first_id.clone()),
            300,
        )?;

        let restorer = Restorer::new(temp.path().join("archives"));
        let chain = restorer.resolve_chain("steam")?;
        assert_eq!(chain.last().map(|a| a.header.archive_id.clone()), Some(retry_id));
        assert_eq!(chain[0].header.archive_id, first_id);
        assert_eq!(chain.len(), 2);
        Ok(())
    }

    #[test]
    fn test_corrupt_orphan_does_not_block_restore() -> Result<()> {
        let temp = TempDir::new()?;
        let root = temp.path().join("root");
        std::fs::create_dir_all(&root)?;
        std::fs::write(root.join("a.txt"), "v1")?;

        let (first_id, first_manifest) = write_archive_at(&temp, &root, None, None, 100)?;
        std::fs::write(root.join("a.txt"), "v2")?;
        let (orphan_id, _) = write_archive_at(
            &temp,
            &root,
            Some(&first_manifest),
            Some(first_id.clone()),
            200,
        )?;
        write_archive_at(&temp, &root, Some(&first_manifest), Some(first_id), 300)?;

        // Corrupt the superseded sibling; it is off the resolved chain
        let set_dir = set_archive_dir(&temp.path().join("archives"), "steam");
        let orphan_path = set_dir.join(format!("{orphan_id}.{ARCHIVE_EXT}"));
        let mut bytes = std::fs::read(&orphan_path)?;
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&orphan_path, bytes)?;

        let target = temp.path().join("target");
        let restorer = Restorer::new(temp.path().join("archives"));
        let report = restorer.restore("steam", &target, RestoreMode::FullOverwrite)?;
        assert_eq!(report.archives_applied, 2);
        assert_eq!(std::fs::read(target.join("a.txt"))?, b"v2");
        Ok(())
    }

    #[test]
    fn test_merge_keep_newer_preserves_local_edit() -> Result<()> {
        let temp = TempDir::new()?;
        let root = temp.path().join("root");
        std::fs::create_dir_all(&root)?;
        std::fs::write(root.join("a.txt"), "archived a")?;
        std::fs::write(root.join("b.txt"), "archived b")?;

        // Backdate sources so a later local edit counts as newer
        let old = filetime::FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(root.join("a.txt"), old)?;
        filetime::set_file_mtime(root.join("b.txt"), old)?;

        write_archive(&temp, &root, None, None)?;

        let target = temp.path().join("target");
        std::fs::create_dir_all(&target)?;
        std::fs::write(target.join("a.txt"), "local edit")?;

        let restorer = Restorer::new(temp.path().join("archives"));
        let report = restorer.restore("steam", &target, RestoreMode::MergeKeepNewer)?;

        assert_eq!(std::fs::read(target.join("a.txt"))?, b"local edit");
        assert_eq!(std::fs::read(target.join("b.txt"))?, b"archived b");
        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.files_written, 1);
        Ok(())
    }

    #[test]
    fn test_corrupt_archive_means_zero_mutation() -> Result<()> {
        let temp = TempDir::new()?;
        let root = temp.path().join("root");
        std::fs::create_dir_all(&root)?;
        std::fs::write(root.join("a.txt"), "hi")?;

        write_archive(&temp, &root, None, None)?;

        // Corrupt the single archive's checksum region
        let set_dir = set_archive_dir(&temp.path().join("archives"), "steam");
        let archive_file = std::fs::read_dir(&set_dir)?
            .filter_map(std::result::Result::ok)
            .find(|e| e.path().extension().and_then(|s| s.to_str()) == Some(ARCHIVE_EXT))
            .unwrap()
            .path();
        let mut bytes = std::fs::read(&archive_file)?;
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&archive_file, bytes)?;

        let target = temp.path().join("target");
        std::fs::create_dir_all(&target)?;
        std::fs::write(target.join("pre-existing.txt"), "untouched")?;

        let restorer = Restorer::new(temp.path().join("archives"));
        let err = restorer
            .restore("steam", &target, RestoreMode::FullOverwrite)
            .unwrap_err();
        assert!(matches!(err, Error::CorruptArchive { .. }));

        // Target is byte-identical to its pre-restore state
        let entries: Vec<_> = std::fs::read_dir(&target)?.collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(std::fs::read(target.join("pre-existing.txt"))?, b"untouched");
        Ok(())
    }
}
