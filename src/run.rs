//! Backup run driver: wires Scanner → Differ → Archiver → Snapshot commit
//! in order, holding the set lock throughout.
//!
//! The ordering carries the crash-safety guarantee: the snapshot only
//! advances after the archive is finalized, so a failure or kill at any
//! earlier point leaves prior state untouched and a retry redoes the same
//! incremental work.

use crate::archive::{ArchiveInfo, ArchiveWriter, set_archive_dir};
use crate::config::Config;
use crate::diff::{ChangeSet, diff};
use crate::errors::Result;
use crate::lock::{OperationType, SetLock};
use crate::output;
use crate::scanner::{ScanWarning, Scanner};
use crate::store::{Snapshot, SnapshotLoad, SnapshotStore};
use crate::utils::compress::codec_for;
use std::path::Path;
use tracing::info;

/// Outcome of one backup run.
#[derive(Debug)]
pub struct BackupReport {
    /// Classification of every scanned path.
    pub changes: ChangeSet,
    /// Archive written by this run; `None` when nothing changed.
    pub archive: Option<ArchiveInfo>,
    /// Non-fatal scan problems.
    pub warnings: Vec<ScanWarning>,
}

/// Run a full backup cycle for one set.
///
/// # Errors
///
/// Propagates `Access` (root unreadable), `Write` (archive or snapshot
/// write failure) and lock acquisition errors. On any error the previous
/// snapshot and archives are untouched.
pub fn run_backup(config: &Config, set_id: &str, root: &Path) -> Result<BackupReport> {
    let lock = SetLock::acquire(&config.core.state_dir, OperationType::Backup, set_id)?;
    let store = SnapshotStore::new(config.core.state_dir.clone());

    let previous = match store.load(&lock)? {
        SnapshotLoad::Loaded(snapshot) => Some(snapshot),
        SnapshotLoad::Absent => None,
        SnapshotLoad::Corrupt { detail } => {
            output::warning(&format!(
                "Snapshot for '{set_id}' is corrupt ({detail}); running a full backup"
            ));
            None
        }
    };

    info!(set = set_id, root = %root.display(), "scanning");
    let scanner = Scanner::new(set_id, config, previous.as_ref().map(|s| &s.manifest));
    let scan = scanner.scan(root)?;

    info!(set = set_id, files = scan.manifest.len(), "diffing");
    let changes = diff(&scan.manifest, previous.as_ref().map(|s| &s.manifest));

    if changes.is_noop() {
        info!(set = set_id, "no changes detected");
        return Ok(BackupReport {
            changes,
            archive: None,
            warnings: scan.warnings,
        });
    }

    info!(
        set = set_id,
        added = changes.added.len(),
        modified = changes.modified.len(),
        deleted = changes.deleted.len(),
        "archiving"
    );
    let codec = codec_for(config.core.compression, config.core.compression_level);
    let writer = ArchiveWriter::new(
        set_archive_dir(&config.core.archive_dir, set_id),
        codec.as_ref(),
        config.core.compression,
    );
    let archive = writer.write(
        &scan.manifest,
        &changes,
        root,
        previous.map(|s| s.archive_id),
    )?;

    // Snapshot advances only after the archive is on disk under its
    // final name
    store.commit(
        &lock,
        &Snapshot {
            manifest: scan.manifest,
            archive_id: archive.archive_id.clone(),
        },
    )?;

    Ok(BackupReport {
        changes,
        archive: Some(archive),
        warnings: scan.warnings,
    })
}
