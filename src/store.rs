//! Snapshot store: persists the manifest of the last successful backup
//! per backup set, as the diff baseline for the next run.
//!
//! Snapshots are bincode-serialized, zstd-compressed files. Commit is
//! write-to-temp-then-rename, and it happens only after the archive for
//! the run has been finalized, so a crash mid-backup never leaves a
//! snapshot pointing at a missing or partial archive.

use crate::errors::{Error, Result};
use crate::lock::SetLock;
use crate::manifest::Manifest;
use crate::utils::serialization;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Snapshot compression level; snapshots are small so the default is fine.
const SNAPSHOT_COMPRESSION_LEVEL: i32 = 3;

/// The persisted state of one backup set: the last committed manifest and
/// the id of the archive that run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Manifest of the last successful backup.
    pub manifest: Manifest,
    /// Archive id the manifest was written into; becomes the
    /// prior-archive reference of the next incremental run.
    pub archive_id: String,
}

/// Outcome of loading a snapshot.
#[derive(Debug)]
pub enum SnapshotLoad {
    /// No snapshot exists yet (first run for this set).
    Absent,
    /// Snapshot loaded successfully.
    Loaded(Snapshot),
    /// A snapshot file exists but could not be parsed. The store treats
    /// this as absent (forcing a full backup); the caller surfaces the
    /// warning.
    Corrupt {
        /// What failed to parse or decompress.
        detail: String,
    },
}

/// Per-set snapshot persistence rooted at the state directory.
pub struct SnapshotStore {
    /// Directory holding `snapshots/<set_id>.snap` files.
    state_dir: PathBuf,
}

impl SnapshotStore {
    /// Create a store rooted at `state_dir`.
    #[must_use]
    pub fn new(state_dir: PathBuf) -> Self {
        Self { state_dir }
    }

    fn snapshot_path(&self, set_id: &str) -> PathBuf {
        self.state_dir
            .join("snapshots")
            .join(format!("{set_id}.snap"))
    }

    /// Load the snapshot for the locked set.
    ///
    /// Requiring the [`SetLock`] keeps load/commit as the serialization
    /// point for a set without any hidden global state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Access`] if the snapshot file exists but cannot be
    /// read at the I/O level. Parse failures are not errors; they come back
    /// as [`SnapshotLoad::Corrupt`].
    pub fn load(&self, lock: &SetLock) -> Result<SnapshotLoad> {
        let path = self.snapshot_path(lock.set_id());
        if !path.exists() {
            return Ok(SnapshotLoad::Absent);
        }

        let compressed = fs::read(&path).map_err(|source| Error::Access {
            path: path.clone(),
            source,
        })?;

        match Self::decode(&compressed) {
            Ok(snapshot) => {
                debug!(set = lock.set_id(), entries = snapshot.manifest.len(), "snapshot loaded");
                Ok(SnapshotLoad::Loaded(snapshot))
            }
            Err(e) => Ok(SnapshotLoad::Corrupt {
                detail: e.to_string(),
            }),
        }
    }

    /// Atomically replace the snapshot for the locked set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Write`] if the temp file cannot be written or the
    /// rename fails; the prior snapshot is left untouched in that case.
    pub fn commit(&self, lock: &SetLock, snapshot: &Snapshot) -> Result<()> {
        let path = self.snapshot_path(lock.set_id());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let serialized = serialization::serialize(snapshot)?;
        let compressed = zstd::encode_all(&serialized[..], SNAPSHOT_COMPRESSION_LEVEL)
            .map_err(|source| Error::Write {
                path: path.clone(),
                source,
            })?;

        let tmp_path = path.with_extension("snap.tmp");
        fs::write(&tmp_path, compressed).map_err(|source| Error::Write {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &path).map_err(|source| Error::Write {
            path: path.clone(),
            source,
        })?;

        debug!(set = lock.set_id(), archive = %snapshot.archive_id, "snapshot committed");
        Ok(())
    }

    /// Inspect a snapshot without treating corruption as recoverable;
    /// used by `verify`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreCorrupt`] if the snapshot exists but fails to
    /// parse, [`Error::Access`] on read failure.
    pub fn inspect(&self, lock: &SetLock) -> Result<Option<Snapshot>> {
        match self.load(lock)? {
            SnapshotLoad::Absent => Ok(None),
            SnapshotLoad::Loaded(snapshot) => Ok(Some(snapshot)),
            SnapshotLoad::Corrupt { detail } => Err(Error::StoreCorrupt {
                set_id: lock.set_id().to_string(),
                detail,
            }),
        }
    }

    fn decode(compressed: &[u8]) -> anyhow::Result<Snapshot> {
        let decompressed = zstd::decode_all(compressed)?;
        serialization::deserialize(&decompressed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::OperationType;
    use crate::manifest::FileEntry;
    use anyhow::Result;
    use tempfile::TempDir;

    fn sample_snapshot() -> Snapshot {
        Snapshot {
            manifest: Manifest::from_entries(
                "steam".to_string(),
                1_700_000_000,
                vec![FileEntry {
                    path: PathBuf::from("a.txt"),
                    size: 2,
                    modified: 1_700_000_000,
                    hash: "ab".repeat(16),
                }],
            ),
            archive_id: "cd".repeat(16),
        }
    }

    #[test]
    fn test_absent_on_first_run() -> Result<()> {
        let temp = TempDir::new()?;
        let store = SnapshotStore::new(temp.path().to_path_buf());
        let lock = SetLock::acquire(temp.path(), OperationType::Backup, "steam")?;

        assert!(matches!(store.load(&lock)?, SnapshotLoad::Absent));
        Ok(())
    }

    #[test]
    fn test_commit_then_load() -> Result<()> {
        let temp = TempDir::new()?;
        let store = SnapshotStore::new(temp.path().to_path_buf());
        let lock = SetLock::acquire(temp.path(), OperationType::Backup, "steam")?;

        let snapshot = sample_snapshot();
        store.commit(&lock, &snapshot)?;

        match store.load(&lock)? {
            SnapshotLoad::Loaded(loaded) => assert_eq!(loaded, snapshot),
            other => panic!("expected loaded snapshot, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_commit_replaces_previous() -> Result<()> {
        let temp = TempDir::new()?;
        let store = SnapshotStore::new(temp.path().to_path_buf());
        let lock = SetLock::acquire(temp.path(), OperationType::Backup, "steam")?;

        let mut snapshot = sample_snapshot();
        store.commit(&lock, &snapshot)?;
        snapshot.archive_id = "ef".repeat(16);
        store.commit(&lock, &snapshot)?;

        match store.load(&lock)? {
            SnapshotLoad::Loaded(loaded) => assert_eq!(loaded.archive_id, "ef".repeat(16)),
            other => panic!("expected loaded snapshot, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_corrupt_snapshot_treated_as_absent() -> Result<()> {
        let temp = TempDir::new()?;
        let store = SnapshotStore::new(temp.path().to_path_buf());
        let lock = SetLock::acquire(temp.path(), OperationType::Backup, "steam")?;

        let path = store.snapshot_path("steam");
        std::fs::create_dir_all(path.parent().unwrap())?;
        std::fs::write(&path, b"not a snapshot at all")?;

        assert!(matches!(store.load(&lock)?, SnapshotLoad::Corrupt { .. }));
        // inspect() surfaces the same condition as a hard error
        assert!(store.inspect(&lock).is_err());
        Ok(())
    }

    #[test]
    fn test_sets_are_isolated() -> Result<()> {
        let temp = TempDir::new()?;
        let store = SnapshotStore::new(temp.path().to_path_buf());
        let steam = SetLock::acquire(temp.path(), OperationType::Backup, "steam")?;
        let epic = SetLock::acquire(temp.path(), OperationType::Backup, "epic")?;

        store.commit(&steam, &sample_snapshot())?;
        assert!(matches!(store.load(&epic)?, SnapshotLoad::Absent));
        Ok(())
    }

    #[test]
    fn test_no_stray_tmp_after_commit() -> Result<()> {
        let temp = TempDir::new()?;
        let store = SnapshotStore::new(temp.path().to_path_buf());
        let lock = SetLock::acquire(temp.path(), OperationType::Backup, "steam")?;

        store.commit(&lock, &sample_snapshot())?;
        let tmp = store.snapshot_path("steam").with_extension("snap.tmp");
        assert!(!tmp.exists());
        Ok(())
    }
}
