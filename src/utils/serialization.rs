use anyhow::Result;

/// Get the bincode configuration
fn get_config() -> impl bincode::config::Config {
    // Legacy configuration for serde compatibility; allocation limit
    // prevents memory exhaustion on corrupt snapshot or archive data
    bincode::config::legacy().with_limit::<{ 256 * 1024 * 1024 }>()
}

/// Serialize data using bincode v2.0 with serde
///
/// # Errors
///
/// Returns an error if serialization fails
pub fn serialize<T: serde::Serialize>(data: &T) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(data, get_config()).map_err(Into::into)
}

/// Deserialize data using bincode v2.0 with serde
///
/// # Errors
///
/// Returns an error if deserialization fails or data is malformed
pub fn deserialize<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let (result, _bytes_read) = bincode::serde::decode_from_slice(bytes, get_config())?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{FileEntry, Manifest};
    use std::path::PathBuf;

    #[test]
    fn test_manifest_round_trip() -> Result<()> {
        let manifest = Manifest::from_entries(
            "games".to_string(),
            1_700_000_000,
            vec![FileEntry {
                path: PathBuf::from("sub/b.txt"),
                size: 2,
                modified: 1_700_000_000,
                hash: "aa".repeat(16),
            }],
        );

        let bytes = serialize(&manifest)?;
        let decoded: Manifest = deserialize(&bytes)?;
        assert_eq!(manifest, decoded);
        Ok(())
    }

    #[test]
    fn test_deserialize_garbage_fails() {
        let result: Result<Manifest> = deserialize(&[0xff; 64]);
        assert!(result.is_err());
    }
}
