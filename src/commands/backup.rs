use crate::KeepsakeContext;
use crate::errors::Result;
use crate::output;
use crate::run::run_backup;
use crate::utils::format_size;
use std::path::Path;

/// Execute a backup run for `set_id`.
///
/// `root` overrides the configured root for the set; one of the two must
/// be available.
///
/// # Errors
///
/// Propagates engine errors; the caller maps them to exit codes.
pub fn execute(ctx: &KeepsakeContext, set_id: &str, root: Option<&Path>) -> Result<()> {
    let root = ctx.config.resolve_root(set_id, root)?;

    let report = run_backup(&ctx.config, set_id, &root)?;

    for warning in &report.warnings {
        output::warning(&format!(
            "skipped {}: {}",
            warning.path.display(),
            warning.reason
        ));
    }

    match &report.archive {
        Some(archive) => {
            for path in &report.changes.added {
                output::detail(&format!("A {}", path.display()));
            }
            for path in &report.changes.modified {
                output::detail(&format!("M {}", path.display()));
            }
            for path in &report.changes.deleted {
                output::detail(&format!("D {}", path.display()));
            }
            output::success(&format!(
                "Backed up '{set_id}': {} added, {} modified, {} deleted -> {} ({})",
                report.changes.added.len(),
                report.changes.modified.len(),
                report.changes.deleted.len(),
                &archive.archive_id[..8],
                format_size(archive.bytes_written)
            ));
        }
        None => output::info(&format!("No changes detected for '{set_id}', skipping backup")),
    }

    Ok(())
}
