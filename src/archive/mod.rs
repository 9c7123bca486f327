//! Immutable archive container: one file per backup run.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! magic "KPSA" | version u32 | header len u32 | header (bincode)
//! | manifest len u32 | manifest (bincode)
//! | frame count u32 | frames: [path len u32, path, content len u64, content]
//! | deleted count u32 | [path len u32, path]
//! | xxh3-128 checksum of every preceding byte (16 bytes)
//! ```
//!
//! Frame content is the output of the codec named in the header, so an
//! archive restores correctly regardless of local configuration. Paths are
//! stored slash-normalized and validated against traversal on the way out.

/// Sequential archive reader with up-front verification.
pub mod reader;
/// Staged, checksummed archive writer.
pub mod writer;

pub use reader::Archive;
pub use writer::{ArchiveInfo, ArchiveWriter};

use crate::manifest::Manifest;
use crate::utils::compress::CompressionType;
use crate::utils::serialization;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::xxh3_128;

/// First four bytes of every archive.
pub const MAGIC: &[u8; 4] = b"KPSA";

/// Current container format version.
pub const FORMAT_VERSION: u32 = 1;

/// File extension for finalized archives.
pub const ARCHIVE_EXT: &str = "kpa";

/// Length of the trailing checksum in bytes.
pub const CHECKSUM_LEN: usize = 16;

/// Self-describing archive header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveHeader {
    /// Unique id of this archive (32-hex xxh3 of set, time and manifest).
    pub archive_id: String,
    /// Backup set the archive belongs to.
    pub set_id: String,
    /// Unix timestamp of the run that produced the archive.
    pub created_at: i64,
    /// Archive id this incremental builds on; `None` for a full backup.
    pub prior_archive: Option<String>,
    /// Codec the frame contents were written with.
    pub codec: CompressionType,
}

/// Derive the archive id for a run.
///
/// Includes the creation timestamp so re-running after a failed commit
/// produces a distinct id even when the manifest is identical.
#[must_use]
pub fn archive_id(set_id: &str, created_at: i64, manifest: &Manifest) -> String {
    let manifest_bytes = serialization::serialize(manifest).unwrap_or_default();
    let mut seed = Vec::with_capacity(manifest_bytes.len() + set_id.len() + 8);
    seed.extend_from_slice(set_id.as_bytes());
    seed.extend_from_slice(&created_at.to_le_bytes());
    seed.extend_from_slice(&manifest_bytes);
    format!("{:032x}", xxh3_128(&seed))
}

/// Directory holding one set's archives.
#[must_use]
pub fn set_archive_dir(archive_dir: &Path, set_id: &str) -> PathBuf {
    archive_dir.join(set_id)
}

/// Encode a relative path for the container (forward slashes).
pub(crate) fn encode_path(path: &Path) -> Vec<u8> {
    let mut out = String::new();
    for component in path.components() {
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(&component.as_os_str().to_string_lossy());
    }
    out.into_bytes()
}

/// Decode a container path back into a `PathBuf`.
pub(crate) fn decode_path(bytes: &[u8]) -> anyhow::Result<PathBuf> {
    let s = std::str::from_utf8(bytes)?;
    Ok(s.split('/').collect())
}
