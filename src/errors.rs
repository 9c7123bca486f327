//! Typed error taxonomy for backup and restore runs.
//!
//! Every fatal failure maps to a stable process exit code so scripts
//! wrapping the CLI can distinguish retry-safe conditions (disk full)
//! from ones needing intervention (corrupt archive).

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the backup/restore engine.
#[derive(Debug, Error)]
pub enum Error {
    /// The backup root (or another required path) is missing or unreadable.
    #[error("cannot access {path}: {source}")]
    Access {
        /// Path that could not be accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Writing the archive or snapshot failed; the run aborts and the
    /// snapshot is left uncommitted, so a retry redoes the same work.
    #[error("write failed for {path}: {source}")]
    Write {
        /// Path being written when the failure occurred.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A persisted snapshot could not be parsed. The store recovers by
    /// treating it as absent; this variant surfaces only from `verify`
    /// style inspection.
    #[error("snapshot for set '{set_id}' is corrupt: {detail}")]
    StoreCorrupt {
        /// Backup set whose snapshot failed to parse.
        set_id: String,
        /// Parse or decompression failure description.
        detail: String,
    },

    /// Archive failed integrity verification. No filesystem mutation is
    /// performed when this is returned from a restore.
    #[error("archive {path} failed verification: {detail}")]
    CorruptArchive {
        /// Archive file that failed its checksum or format check.
        path: PathBuf,
        /// What exactly did not verify.
        detail: String,
    },

    /// An intermediate archive in an incremental chain is missing.
    #[error("incremental chain for set '{set_id}' is broken: archive {missing} not found")]
    ChainGap {
        /// Backup set whose chain was being resolved.
        set_id: String,
        /// Archive id referenced by a successor but absent on disk.
        missing: String,
    },

    /// Another run already holds the lock for this backup set.
    #[error("backup set '{set_id}' is locked by another operation")]
    SetLocked {
        /// The contested backup set.
        set_id: String,
    },

    /// Anything else (config parse failures, internal invariants).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Stable exit code for the CLI contract.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Access { .. } => 2,
            Self::Write { .. } => 3,
            Self::StoreCorrupt { .. } => 4,
            Self::CorruptArchive { .. } => 5,
            Self::ChainGap { .. } => 6,
            Self::SetLocked { .. } => 7,
            Self::Other(_) => 1,
        }
    }
}

/// Convenience alias used throughout the engine core.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let errors = [
            Error::Access {
                path: "/x".into(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            },
            Error::Write {
                path: "/x".into(),
                source: std::io::Error::from(std::io::ErrorKind::Other),
            },
            Error::StoreCorrupt {
                set_id: "s".into(),
                detail: "bad".into(),
            },
            Error::CorruptArchive {
                path: "/x".into(),
                detail: "bad".into(),
            },
            Error::ChainGap {
                set_id: "s".into(),
                missing: "abc".into(),
            },
            Error::SetLocked { set_id: "s".into() },
        ];

        let mut codes: Vec<i32> = errors.iter().map(Error::exit_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(!codes.contains(&0));
    }
}
