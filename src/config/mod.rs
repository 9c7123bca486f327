//! Configuration parsing and management.
//!
//! Keepsake reads a TOML config from `~/.config/keepsake/config.toml`
//! (override with `KEEPSAKE_CONFIG_PATH`). Backup sets are named entries
//! mapping a set id to its root directory, so `keepsake backup <set>` needs
//! no path argument once a set is configured.

use crate::utils::compress::CompressionType;
use crate::utils::hash::HashAlgorithm;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,

    #[serde(default)]
    pub performance: PerformanceConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    /// Named backup sets: set id -> source root.
    #[serde(default)]
    pub sets: HashMap<String, BackupSetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Destination directory for archives (one subdirectory per set).
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,
    /// Directory holding per-set snapshots and locks.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,
    #[serde(default)]
    pub compression: CompressionType,
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Max parallel hashing workers; 0 means auto (CPU count, capped at 8).
    #[serde(default)]
    pub concurrency_limit: usize,
    #[serde(default = "default_mmap_threshold")]
    pub mmap_threshold: u64,
    /// Reuse the previous snapshot's hash when size and mtime both match.
    /// Off by default; the hash is authoritative unless this is opted into.
    #[serde(default)]
    pub trust_mtime: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Glob-style patterns excluded from every scan.
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSetConfig {
    /// Directory this set backs up.
    pub root_path: PathBuf,
}

fn default_archive_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("keepsake")
        .join("archives")
}

fn default_state_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("keepsake")
        .join("state")
}

const fn default_compression_level() -> i32 {
    3
}

const fn default_mmap_threshold() -> u64 {
    1_048_576 // 1MB
}

fn default_ignore_patterns() -> Vec<String> {
    vec![
        "*.tmp".to_string(),
        "*.swp".to_string(),
        "Thumbs.db".to_string(),
        ".DS_Store".to_string(),
    ]
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            archive_dir: default_archive_dir(),
            state_dir: default_state_dir(),
            hash_algorithm: HashAlgorithm::default(),
            compression: CompressionType::default(),
            compression_level: default_compression_level(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 0,
            mmap_threshold: default_mmap_threshold(),
            trust_mtime: false,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: default_ignore_patterns(),
        }
    }
}

impl Config {
    /// Load configuration from a file, creating a default one if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or created.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Save configuration to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if parent directories cannot be created or the
    /// file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))
    }

    /// Resolve the root path for a set, preferring an explicit CLI path.
    ///
    /// # Errors
    ///
    /// Returns an error if the set is not configured and no path was given.
    pub fn resolve_root(&self, set_id: &str, explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        self.sets
            .get(set_id)
            .map(|s| s.root_path.clone())
            .with_context(|| {
                format!("Backup set '{set_id}' is not configured and no root path was given")
            })
    }
}
