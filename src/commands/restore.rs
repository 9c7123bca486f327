use crate::KeepsakeContext;
use crate::errors::Result;
use crate::lock::{OperationType, SetLock};
use crate::output;
use crate::restore::{RestoreMode, Restorer};
use std::path::Path;

/// Restore a backup set's full chain onto `target`, or a single explicit
/// archive file when `archive` is given.
///
/// # Errors
///
/// Propagates chain, verification and write errors; nothing is written to
/// `target` unless every involved archive verified.
pub fn execute(
    ctx: &KeepsakeContext,
    set_id: &str,
    target: &Path,
    merge: bool,
    archive: Option<&Path>,
) -> Result<()> {
    let mode = if merge {
        RestoreMode::MergeKeepNewer
    } else {
        RestoreMode::FullOverwrite
    };

    let _lock = SetLock::acquire(&ctx.config.core.state_dir, OperationType::Restore, set_id)?;

    let report = match archive {
        Some(path) => Restorer::restore_archive(path, target, mode)?,
        None => {
            let restorer = Restorer::new(ctx.config.core.archive_dir.clone());
            restorer.restore(set_id, target, mode)?
        }
    };

    output::success(&format!(
        "Restored '{set_id}' to {}: {} archive(s), {} file(s) written, {} skipped, {} removed",
        target.display(),
        report.archives_applied,
        report.files_written,
        report.files_skipped,
        report.files_deleted
    ));
    Ok(())
}
