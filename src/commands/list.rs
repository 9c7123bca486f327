use crate::KeepsakeContext;
use crate::archive::{ARCHIVE_EXT, Archive, set_archive_dir};
use crate::errors::{Error, Result};
use crate::utils::{format_size, format_timestamp};
use colored::Colorize;
use std::fs;

/// List archives, newest first, for one set or for every set with an
/// archive directory.
///
/// # Errors
///
/// Returns an error if the archive directory cannot be read or an
/// archive fails verification while being opened.
pub fn execute(ctx: &KeepsakeContext, set_id: Option<&str>) -> Result<()> {
    let archive_dir = &ctx.config.core.archive_dir;

    let sets: Vec<String> = match set_id {
        Some(id) => vec![id.to_string()],
        None => {
            if !archive_dir.exists() {
                println!("No archives yet");
                return Ok(());
            }
            let mut sets: Vec<String> = fs::read_dir(archive_dir)
                .map_err(|source| Error::Access {
                    path: archive_dir.clone(),
                    source,
                })?
                .filter_map(std::result::Result::ok)
                .filter(|e| e.path().is_dir())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect();
            sets.sort();
            sets
        }
    };

    for set in &sets {
        let set_dir = set_archive_dir(archive_dir, set);
        if !set_dir.exists() {
            println!("{}: no archives", set.bold());
            continue;
        }

        let mut archives = Vec::new();
        for entry in fs::read_dir(&set_dir).map_err(|source| Error::Access {
            path: set_dir.clone(),
            source,
        })? {
            let entry = entry.map_err(|source| Error::Access {
                path: set_dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some(ARCHIVE_EXT) {
                archives.push(Archive::open(&path)?);
            }
        }
        archives.sort_by_key(|a| std::cmp::Reverse(a.header.created_at));

        println!("{}", set.bold());
        for archive in &archives {
            let kind = if archive.header.prior_archive.is_some() {
                "incr"
            } else {
                "full"
            };
            println!(
                "  {} {} {} {} files, {}",
                archive.header.archive_id[..8].yellow(),
                format_timestamp(archive.header.created_at),
                kind,
                archive.manifest.len(),
                format_size(archive.manifest.total_bytes)
            );
        }
    }

    Ok(())
}
