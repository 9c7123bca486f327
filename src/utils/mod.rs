//! Utility functions shared across the engine.
//!
//! - [`hash`]: content digests (xxh3-128 / SHA-256)
//! - [`compress`]: pluggable compression codec
//! - [`serialization`]: binary serialization
//! - [`thread_pool`]: bounded worker pool for parallel hashing

/// Pluggable compression codec (Zstandard / none)
pub mod compress;
/// Content hashing with selectable algorithm
pub mod hash;
/// Binary serialization utilities
pub mod serialization;
/// Thread pool configuration for parallel hashing
pub mod thread_pool;

use std::path::Path;

/// Determines if a given path should be ignored based on provided patterns.
///
/// Supports `dir/` (any component), `*suffix`, `prefix*`, `*contains*`
/// and exact component matches.
#[must_use]
pub fn should_ignore(path: &Path, patterns: &[String]) -> bool {
    let path_str = path.to_string_lossy();

    for pattern in patterns {
        if pattern.ends_with('/') {
            let dir_name = &pattern[..pattern.len() - 1];
            if path.components().any(|c| c.as_os_str() == dir_name) {
                return true;
            }
        } else if pattern.starts_with('*') && pattern.ends_with('*') && pattern.len() > 2 {
            let search = &pattern[1..pattern.len() - 1];
            if path_str.contains(search) {
                return true;
            }
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            if path_str.ends_with(suffix) {
                return true;
            }
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            if path_str.starts_with(prefix) {
                return true;
            }
        } else if path_str == pattern.as_str()
            || path.components().any(|c| c.as_os_str() == pattern.as_str())
        {
            return true;
        }
    }

    false
}

/// Formats a byte count into a human-readable string with units.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_size(size: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", size.round() as u64, UNITS[unit_index])
    } else {
        format!("{size:.2} {}", UNITS[unit_index])
    }
}

/// Returns the current timestamp as seconds since the Unix epoch.
#[must_use]
pub fn current_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Formats a unix timestamp for display in `list` output.
#[must_use]
pub fn format_timestamp(ts: i64) -> String {
    use chrono::TimeZone;
    chrono::Local
        .timestamp_opt(ts, 0)
        .single()
        .map_or_else(|| ts.to_string(), |dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}
