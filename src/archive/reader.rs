//! Archive reader: verifies the trailing checksum before exposing any
//! contents, then streams frames sequentially.

use super::{CHECKSUM_LEN, FORMAT_VERSION, MAGIC, ArchiveHeader};
use crate::errors::{Error, Result};
use crate::manifest::{Manifest, is_safe_relative_path};
use crate::utils::compress::{Codec, codec_for};
use crate::utils::serialization;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::Xxh3;

/// An opened archive.
///
/// [`Archive::open`] verifies the whole container before returning;
/// [`Archive::open_unverified`] defers that, for callers that inspect
/// many headers but only replay a subset.
#[derive(Debug)]
pub struct Archive {
    /// Parsed header.
    pub header: ArchiveHeader,
    /// Full manifest of the run that produced the archive.
    pub manifest: Manifest,
    /// On-disk location, re-opened by `replay`.
    path: PathBuf,
    /// Byte offset where the frame section starts.
    frames_offset: u64,
}

impl Archive {
    /// Open an archive: verify the trailing checksum over the whole file,
    /// then parse the header and embedded manifest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptArchive`] on checksum mismatch, bad magic,
    /// unknown format version or malformed metadata; [`Error::Access`] if
    /// the file cannot be read.
    pub fn open(path: &Path) -> Result<Self> {
        verify_checksum(path)?;
        Self::open_unverified(path)
    }

    /// Parse the header and manifest without verifying the trailing
    /// checksum. Frames must not be replayed until
    /// [`Archive::verify_checksum`] has passed.
    ///
    /// # Errors
    ///
    /// [`Error::CorruptArchive`] on bad magic, unknown version or
    /// malformed metadata; [`Error::Access`] on read failure.
    pub(crate) fn open_unverified(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| Error::Access {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = BufReader::new(file);

        let corrupt = |detail: &str| Error::CorruptArchive {
            path: path.to_path_buf(),
            detail: detail.to_string(),
        };

        let mut magic = [0u8; 4];
        read_exact(&mut reader, &mut magic, path)?;
        if &magic != MAGIC {
            return Err(corrupt("bad magic"));
        }

        let version = read_u32(&mut reader, path)?;
        if version != FORMAT_VERSION {
            return Err(corrupt(&format!("unsupported format version {version}")));
        }

        let header_len = read_u32(&mut reader, path)? as usize;
        let header_bytes = read_vec(&mut reader, header_len, path)?;
        let header: ArchiveHeader = serialization::deserialize(&header_bytes)
            .map_err(|e| corrupt(&format!("unreadable header: {e}")))?;

        let manifest_len = read_u32(&mut reader, path)? as usize;
        let manifest_bytes = read_vec(&mut reader, manifest_len, path)?;
        let manifest: Manifest = serialization::deserialize(&manifest_bytes)
            .map_err(|e| corrupt(&format!("unreadable manifest: {e}")))?;

        let frames_offset = reader
            .stream_position()
            .map_err(|source| Error::Access {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self {
            header,
            manifest,
            path: path.to_path_buf(),
            frames_offset,
        })
    }

    /// Verify the trailing checksum of the backing file.
    ///
    /// # Errors
    ///
    /// [`Error::CorruptArchive`] on mismatch or truncation,
    /// [`Error::Access`] on read failure.
    pub fn verify_checksum(&self) -> Result<()> {
        verify_checksum(&self.path)
    }

    /// Stream every content frame through `on_frame(relative path,
    /// decompressed bytes)` in archive order, then return the recorded
    /// deleted paths.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptArchive`] on malformed framing or paths
    /// containing traversal segments, and propagates `on_frame` errors.
    pub fn replay<F>(&self, mut on_frame: F) -> Result<Vec<PathBuf>>
    where
        F: FnMut(&Path, &[u8]) -> Result<()>,
    {
        let codec: Box<dyn Codec> = codec_for(self.header.codec, 0);
        let path = &self.path;

        let file = File::open(path).map_err(|source| Error::Access {
            path: path.clone(),
            source,
        })?;
        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(self.frames_offset))
            .map_err(|source| Error::Access {
                path: path.clone(),
                source,
            })?;

        let corrupt = |detail: String| Error::CorruptArchive {
            path: path.clone(),
            detail,
        };

        let frame_count = read_u32(&mut reader, path)?;
        for _ in 0..frame_count {
            let rel = self.read_path(&mut reader)?;
            let content_len = read_u64(&mut reader, path)?;
            let content_len = usize::try_from(content_len)
                .map_err(|_| corrupt("frame too large for this platform".to_string()))?;
            let stored = read_vec(&mut reader, content_len, path)?;
            let raw = codec
                .decompress(&stored)
                .map_err(|e| corrupt(format!("frame for {} corrupt: {e}", rel.display())))?;
            on_frame(&rel, &raw)?;
        }

        let deleted_count = read_u32(&mut reader, path)?;
        let mut deleted = Vec::with_capacity(deleted_count as usize);
        for _ in 0..deleted_count {
            deleted.push(self.read_path(&mut reader)?);
        }

        Ok(deleted)
    }

    fn read_path<R: Read>(&self, reader: &mut R) -> Result<PathBuf> {
        let len = read_u32(reader, &self.path)? as usize;
        let bytes = read_vec(reader, len, &self.path)?;
        let rel = super::decode_path(&bytes).map_err(|e| Error::CorruptArchive {
            path: self.path.clone(),
            detail: format!("invalid path encoding: {e}"),
        })?;
        if !is_safe_relative_path(&rel) {
            return Err(Error::CorruptArchive {
                path: self.path.clone(),
                detail: format!("unsafe path in archive: {}", rel.display()),
            });
        }
        Ok(rel)
    }
}

/// Streaming checksum verification: hash everything except the trailing
/// 16 bytes and compare.
fn verify_checksum(path: &Path) -> Result<()> {
    let file = File::open(path).map_err(|source| Error::Access {
        path: path.to_path_buf(),
        source,
    })?;
    let len = file
        .metadata()
        .map_err(|source| Error::Access {
            path: path.to_path_buf(),
            source,
        })?
        .len();

    let min_len = (MAGIC.len() + 4 + CHECKSUM_LEN) as u64;
    if len < min_len {
        return Err(Error::CorruptArchive {
            path: path.to_path_buf(),
            detail: "file too short to be an archive".to_string(),
        });
    }

    let mut reader = BufReader::new(file);
    let mut hasher = Xxh3::new();
    let mut remaining = len - CHECKSUM_LEN as u64;
    let mut buf = vec![0u8; 65536];

    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        reader
            .read_exact(&mut buf[..want])
            .map_err(|source| Error::Access {
                path: path.to_path_buf(),
                source,
            })?;
        hasher.update(&buf[..want]);
        remaining -= want as u64;
    }

    let mut stored = [0u8; CHECKSUM_LEN];
    reader
        .read_exact(&mut stored)
        .map_err(|source| Error::Access {
            path: path.to_path_buf(),
            source,
        })?;

    if hasher.digest128().to_le_bytes() != stored {
        return Err(Error::CorruptArchive {
            path: path.to_path_buf(),
            detail: "checksum mismatch".to_string(),
        });
    }

    Ok(())
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8], path: &Path) -> Result<()> {
    reader.read_exact(buf).map_err(|source| {
        if source.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::CorruptArchive {
                path: path.to_path_buf(),
                detail: "truncated archive".to_string(),
            }
        } else {
            Error::Access {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

fn read_u32<R: Read>(reader: &mut R, path: &Path) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf, path)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R, path: &Path) -> Result<u64> {
    let mut buf = [0u8; 8];
    read_exact(reader, &mut buf, path)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_vec<R: Read>(reader: &mut R, len: usize, path: &Path) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    read_exact(reader, &mut buf, path)?;
    Ok(buf)
}
