#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]
// Allow pedantic strict lints that create false positives in this codebase
#![allow(clippy::arithmetic_side_effects)] // Simple counters and size totals cannot overflow
#![allow(clippy::indexing_slicing)] // Bounds checked by logic

//! # Keepsake - Incremental Backup Engine
//!
//! Keepsake is a content-addressed, incremental backup tool for large local
//! directory trees (game libraries in particular), built for fast repeat
//! runs and crash-safe state.
//!
//! ## Features
//!
//! - **Content-Addressed Change Detection**: files are hashed (xxHash3 or
//!   SHA-256) and diffed against the last committed snapshot
//! - **Incremental Archives**: each run writes only changed content plus a
//!   full self-describing manifest, linked to its predecessor
//! - **Crash Safety**: archives finalize via staging-file rename and the
//!   snapshot only advances afterwards, so interrupted runs are invisible
//! - **Parallel Hashing**: Rayon workers bounded by a configured limit
//! - **Compression**: Zstandard frames behind a pluggable codec seam
//!
//! ## Architecture
//!
//! - [`scanner`]: directory walk and parallel hashing into a [`manifest::Manifest`]
//! - [`diff`]: classification of paths into added/modified/deleted/unchanged
//! - [`store`]: per-set snapshot persistence (the diff baseline)
//! - [`archive`]: the immutable container format, writer and reader
//! - [`restore`]: chain resolution, verification and replay
//! - [`run`]: the backup state machine tying the above together
//! - [`commands`]: CLI command implementations
//!
//! ## Example Usage
//!
//! ```no_run
//! use keepsake::KeepsakeContext;
//!
//! # fn main() -> anyhow::Result<()> {
//! let ctx = KeepsakeContext::new()?;
//! keepsake::commands::backup::execute(&ctx, "steam", Some("/mnt/games/SteamLibrary".as_ref()))?;
//! # Ok(())
//! # }
//! ```

/// Immutable archive container format, writer and reader.
pub mod archive;

/// CLI command implementations.
pub mod commands;

/// Configuration parsing and management.
pub mod config;

/// Manifest diffing into change sets.
pub mod diff;

/// Typed error taxonomy with stable exit codes.
pub mod errors;

/// Per-backup-set advisory locking.
pub mod lock;

/// Manifest data model.
pub mod manifest;

/// Output formatting and verbosity control.
pub mod output;

/// Restore: chain resolution and replay.
pub mod restore;

/// Backup run driver.
pub mod run;

/// Filesystem scanning and parallel hashing.
pub mod scanner;

/// Snapshot store: the per-set diff baseline.
pub mod store;

/// Utility helpers (hashing, compression, serialization, formatting).
pub mod utils;

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Current version of the keepsake binary.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file path relative to the config directory.
pub const DEFAULT_CONFIG_PATH: &str = "keepsake/config.toml";

/// Central context for all keepsake operations.
///
/// Holds the loaded configuration and where it came from. Environment
/// variables `KEEPSAKE_CONFIG_PATH`, `KEEPSAKE_ARCHIVE_DIR` and
/// `KEEPSAKE_STATE_DIR` override the config file location and the two
/// storage directories, which keeps tests hermetic.
#[derive(Debug, Clone)]
pub struct KeepsakeContext {
    /// Path to the configuration file.
    pub config_path: PathBuf,

    /// Loaded configuration settings.
    pub config: config::Config,
}

impl KeepsakeContext {
    /// Creates a new context by loading the configuration from the default
    /// path (or `KEEPSAKE_CONFIG_PATH`).
    ///
    /// # Errors
    /// Returns an error if the config directory cannot be determined or the
    /// configuration cannot be read or created.
    pub fn new() -> Result<Self> {
        let config_path = if let Ok(path) = std::env::var("KEEPSAKE_CONFIG_PATH") {
            PathBuf::from(path)
        } else {
            let base = dirs::config_dir().context("Could not find config directory")?;
            base.join(DEFAULT_CONFIG_PATH)
        };

        let mut config = config::Config::load(&config_path)?;

        if let Ok(dir) = std::env::var("KEEPSAKE_ARCHIVE_DIR") {
            config.core.archive_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("KEEPSAKE_STATE_DIR") {
            config.core.state_dir = PathBuf::from(dir);
        }

        if let Err(e) = utils::thread_pool::configure_from_config(&config) {
            output::warning(&format!("Failed to configure thread pool: {e}"));
        }

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Creates a context with an explicit config path (for testing).
    ///
    /// # Errors
    /// Returns an error if the configuration cannot be loaded or created.
    pub fn new_explicit(config_path: PathBuf) -> Result<Self> {
        let config = config::Config::load(&config_path)?;
        Ok(Self {
            config_path,
            config,
        })
    }
}
