//! Content hashing with a selectable digest algorithm.
//!
//! xxh3-128 is the default (fast, 32 hex chars); SHA-256 is available for
//! setups that want a cryptographic digest. Files under the mmap threshold
//! are read directly; larger files are memory-mapped so each file is read
//! exactly once either way.

use anyhow::{Context, Result};
use memmap2::MmapOptions;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::Path;
use xxhash_rust::xxh3::xxh3_128;

/// Digest choice, set via `core.hash_algorithm` in config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// xxHash3, 128-bit (default).
    #[default]
    Xxh3,
    /// SHA-256.
    Sha256,
}

impl HashAlgorithm {
    /// Hex digest of a byte slice.
    #[must_use]
    pub fn hash_bytes(self, data: &[u8]) -> String {
        match self {
            Self::Xxh3 => format!("{:032x}", xxh3_128(data)),
            Self::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(data);
                format!("{:x}", hasher.finalize())
            }
        }
    }

    /// Hex digest of a file's content, reading the file once.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, read or mapped.
    pub fn hash_file(self, path: &Path, mmap_threshold: u64) -> Result<String> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open for hashing: {}", path.display()))?;
        let metadata = file.metadata()?;

        if metadata.len() == 0 {
            return Ok(self.hash_bytes(b""));
        }

        if metadata.len() < mmap_threshold {
            let content = std::fs::read(path)?;
            Ok(self.hash_bytes(&content))
        } else {
            let mmap = unsafe { MmapOptions::new().map(&file)? };
            Ok(self.hash_bytes(&mmap))
        }
    }
}
