//! Pluggable compression codec injected into the archive writer and
//! reader. The container format stores the codec id in its header so
//! archives are self-describing regardless of local config.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Compression choice, set via `core.compression` in config and recorded
/// in every archive header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    /// Zstandard (default).
    #[default]
    Zstd,
    /// Store frames uncompressed (for trees of already-compressed assets).
    None,
}

/// Byte-level compress/decompress capability.
pub trait Codec: Send + Sync {
    /// Compress a buffer.
    ///
    /// # Errors
    /// Returns an error if compression fails.
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress a buffer produced by `compress`.
    ///
    /// # Errors
    /// Returns an error if the data is corrupt or was produced by a
    /// different codec.
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Zstandard codec at a configurable level.
pub struct ZstdCodec {
    /// Compression level (1-22, 3 is the default).
    level: i32,
}

impl ZstdCodec {
    /// Create a codec at the given level.
    #[must_use]
    pub const fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Codec for ZstdCodec {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::encode_all(data, self.level).map_err(Into::into)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::decode_all(data).map_err(Into::into)
    }
}

/// Pass-through codec.
pub struct NoopCodec;

impl Codec for NoopCodec {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Instantiate the codec for a compression type.
#[must_use]
pub fn codec_for(compression: CompressionType, level: i32) -> Box<dyn Codec> {
    match compression {
        CompressionType::Zstd => Box::new(ZstdCodec::new(level)),
        CompressionType::None => Box::new(NoopCodec),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zstd_round_trip() -> Result<()> {
        let codec = ZstdCodec::new(3);
        let data = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa repeated content".repeat(20);
        let compressed = codec.compress(&data)?;
        assert!(compressed.len() < data.len());
        assert_eq!(codec.decompress(&compressed)?, data);
        Ok(())
    }

    #[test]
    fn test_noop_is_identity() -> Result<()> {
        let codec = NoopCodec;
        let data = b"raw bytes";
        assert_eq!(codec.compress(data)?, data);
        assert_eq!(codec.decompress(data)?, data);
        Ok(())
    }

    #[test]
    fn test_zstd_rejects_garbage() {
        let codec = ZstdCodec::new(3);
        assert!(codec.decompress(&[0xde, 0xad, 0xbe, 0xef]).is_err());
    }
}
