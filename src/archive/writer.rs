//! Archive writer: streams changed content into a staged container file
//! and finalizes it with a rename only after the trailing checksum is on
//! disk.
//!
//! The writer is strictly sequential; frames never interleave. A failure
//! at any point removes the staging file, and because the snapshot is only
//! committed after finalization, a crashed or failed run is invisible to
//! both the restorer and the next backup.

use super::{ARCHIVE_EXT, CHECKSUM_LEN, FORMAT_VERSION, MAGIC, ArchiveHeader};
use crate::diff::ChangeSet;
use crate::errors::{Error, Result};
use crate::manifest::Manifest;
use crate::utils::compress::{Codec, CompressionType};
use crate::utils::serialization;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use xxhash_rust::xxh3::Xxh3;

/// Metadata about a finalized archive.
#[derive(Debug, Clone)]
pub struct ArchiveInfo {
    /// Archive id (also the file stem).
    pub archive_id: String,
    /// Final path of the archive file.
    pub path: PathBuf,
    /// Number of content frames written.
    pub frames: usize,
    /// Total bytes of the finalized container.
    pub bytes_written: u64,
}

/// Writes one archive per backup run.
pub struct ArchiveWriter<'a> {
    /// Directory archives for this set land in.
    set_dir: PathBuf,
    /// Codec applied to every frame.
    codec: &'a dyn Codec,
    /// Codec id recorded in the header.
    compression: CompressionType,
}

/// Tracks a `.tmp` staging file and deletes it unless finalized.
struct Staging {
    path: PathBuf,
    finalized: bool,
}

impl Drop for Staging {
    fn drop(&mut self) {
        if !self.finalized {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Forwards writes to the inner writer while folding them into the
/// running container checksum.
struct HashingWriter<W: Write> {
    inner: W,
    hasher: Xxh3,
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl<'a> ArchiveWriter<'a> {
    /// Create a writer for one set's archive directory.
    #[must_use]
    pub fn new(set_dir: PathBuf, codec: &'a dyn Codec, compression: CompressionType) -> Self {
        Self {
            set_dir,
            codec,
            compression,
        }
    }

    /// Write the archive for a run.
    ///
    /// Content for every Added/Modified path in `changes` is read from
    /// `root` and framed in manifest order; `manifest` is embedded whole so
    /// restore needs no external state; Deleted paths are recorded so a
    /// restore onto an existing tree can remove them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Write`] if the container cannot be written
    /// (disk full, permissions) and [`Error::Access`] if a source file
    /// cannot be read back. Either way the staging file is discarded.
    pub fn write(
        &self,
        manifest: &Manifest,
        changes: &ChangeSet,
        root: &Path,
        prior_archive: Option<String>,
    ) -> Result<ArchiveInfo> {
        let archive_id = super::archive_id(&manifest.set_id, manifest.created_at, manifest);
        let final_path = self.set_dir.join(format!("{archive_id}.{ARCHIVE_EXT}"));
        let staging_path = self.set_dir.join(format!("{archive_id}.{ARCHIVE_EXT}.tmp"));

        fs::create_dir_all(&self.set_dir).map_err(|source| Error::Write {
            path: self.set_dir.clone(),
            source,
        })?;

        let mut staging = Staging {
            path: staging_path.clone(),
            finalized: false,
        };

        let header = ArchiveHeader {
            archive_id: archive_id.clone(),
            set_id: manifest.set_id.clone(),
            created_at: manifest.created_at,
            prior_archive,
            codec: self.compression,
        };

        let file = File::create(&staging_path).map_err(|source| Error::Write {
            path: staging_path.clone(),
            source,
        })?;
        let mut out = HashingWriter {
            inner: BufWriter::new(file),
            hasher: Xxh3::new(),
        };

        let frames = self.write_body(&mut out, &header, manifest, changes, root)?;

        let checksum = out.hasher.digest128().to_le_bytes();
        debug_assert_eq!(checksum.len(), CHECKSUM_LEN);
        // The checksum itself is not part of the hashed region
        out.inner
            .write_all(&checksum)
            .map_err(|source| Error::Write {
                path: staging_path.clone(),
                source,
            })?;

        let file = out
            .inner
            .into_inner()
            .map_err(|e| Error::Write {
                path: staging_path.clone(),
                source: e.into_error(),
            })?;
        file.sync_all().map_err(|source| Error::Write {
            path: staging_path.clone(),
            source,
        })?;
        drop(file);

        let bytes_written = fs::metadata(&staging_path)
            .map(|m| m.len())
            .unwrap_or_default();

        // Finalize: the archive becomes visible only here
        fs::rename(&staging_path, &final_path).map_err(|source| Error::Write {
            path: final_path.clone(),
            source,
        })?;
        staging.finalized = true;

        debug!(archive = %archive_id, frames, bytes = bytes_written, "archive finalized");
        Ok(ArchiveInfo {
            archive_id,
            path: final_path,
            frames,
            bytes_written,
        })
    }

    fn write_body<W: Write>(
        &self,
        out: &mut W,
        header: &ArchiveHeader,
        manifest: &Manifest,
        changes: &ChangeSet,
        root: &Path,
    ) -> Result<usize> {
        let io_err = |source: std::io::Error| Error::Write {
            path: self.set_dir.clone(),
            source,
        };

        out.write_all(MAGIC).map_err(io_err)?;
        out.write_all(&FORMAT_VERSION.to_le_bytes()).map_err(io_err)?;

        let header_bytes = serialization::serialize(header)?;
        write_len_u32(out, header_bytes.len()).map_err(io_err)?;
        out.write_all(&header_bytes).map_err(io_err)?;

        let manifest_bytes = serialization::serialize(manifest)?;
        write_len_u32(out, manifest_bytes.len()).map_err(io_err)?;
        out.write_all(&manifest_bytes).map_err(io_err)?;

        let paths = changes.paths_to_archive();
        write_len_u32(out, paths.len()).map_err(io_err)?;

        let mut frames = 0;
        for rel in paths {
            let abs = root.join(rel);
            let raw = fs::read(&abs).map_err(|source| Error::Access {
                path: abs.clone(),
                source,
            })?;
            let content = self.codec.compress(&raw)?;

            let encoded = super::encode_path(rel);
            write_len_u32(out, encoded.len()).map_err(io_err)?;
            out.write_all(&encoded).map_err(io_err)?;
            out.write_all(&(content.len() as u64).to_le_bytes())
                .map_err(io_err)?;
            out.write_all(&content).map_err(io_err)?;
            frames += 1;
        }

        write_len_u32(out, changes.deleted.len()).map_err(io_err)?;
        for rel in &changes.deleted {
            let encoded = super::encode_path(rel);
            write_len_u32(out, encoded.len()).map_err(io_err)?;
            out.write_all(&encoded).map_err(io_err)?;
        }

        Ok(frames)
    }
}

fn write_len_u32<W: Write>(out: &mut W, len: usize) -> std::io::Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "length exceeds u32"))?;
    out.write_all(&len.to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use crate::utils::compress::ZstdCodec;
    use anyhow::Result;
    use tempfile::TempDir;

    fn scan(root: &Path) -> Manifest {
        let config = crate::config::Config::default();
        crate::scanner::Scanner::new("steam", &config, None)
            .scan(root)
            .unwrap()
            .manifest
    }

    #[test]
    fn test_write_finalizes_without_staging_leftover() -> Result<()> {
        let temp = TempDir::new()?;
        let root = temp.path().join("root");
        std::fs::create_dir_all(root.join("sub"))?;
        std::fs::write(root.join("a.txt"), "hi")?;
        std::fs::write(root.join("sub/b.txt"), "yo")?;

        let manifest = scan(&root);
        let changes = diff(&manifest, None);

        let codec = ZstdCodec::new(3);
        let writer = ArchiveWriter::new(
            temp.path().join("archives"),
            &codec,
            CompressionType::Zstd,
        );
        let info = writer.write(&manifest, &changes, &root, None)?;

        assert!(info.path.exists());
        assert_eq!(info.frames, 2);
        assert_eq!(info.path.extension().unwrap(), ARCHIVE_EXT);

        let leftovers: Vec<_> = std::fs::read_dir(temp.path().join("archives"))?
            .filter_map(std::result::Result::ok)
            .filter(|e| e.path().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
        Ok(())
    }

    #[test]
    fn test_missing_source_file_discards_staging() -> Result<()> {
        let temp = TempDir::new()?;
        let root = temp.path().join("root");
        std::fs::create_dir_all(&root)?;
        std::fs::write(root.join("a.txt"), "hi")?;

        let manifest = scan(&root);
        let changes = diff(&manifest, None);

        // File vanishes between scan and archive
        std::fs::remove_file(root.join("a.txt"))?;

        let codec = ZstdCodec::new(3);
        let writer = ArchiveWriter::new(
            temp.path().join("archives"),
            &codec,
            CompressionType::Zstd,
        );
        assert!(writer.write(&manifest, &changes, &root, None).is_err());

        let archive_dir = temp.path().join("archives");
        if archive_dir.exists() {
            assert_eq!(std::fs::read_dir(&archive_dir)?.count(), 0);
        }
        Ok(())
    }

    #[test]
    fn test_archive_starts_with_magic() -> Result<()> {
        let temp = TempDir::new()?;
        let root = temp.path().join("root");
        std::fs::create_dir_all(&root)?;
        std::fs::write(root.join("a.txt"), "hi")?;

        let manifest = scan(&root);
        let changes = diff(&manifest, None);
        let codec = ZstdCodec::new(3);
        let writer = ArchiveWriter::new(
            temp.path().join("archives"),
            &codec,
            CompressionType::Zstd,
        );
        let info = writer.write(&manifest, &changes, &root, None)?;

        let bytes = std::fs::read(info.path)?;
        assert_eq!(&bytes[..4], MAGIC);
        assert_eq!(
            u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            FORMAT_VERSION
        );
        Ok(())
    }
}
