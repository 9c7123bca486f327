use crate::KeepsakeContext;
use crate::errors::Result;
use crate::lock::{OperationType, SetLock};
use crate::output;
use crate::restore::Restorer;
use crate::store::SnapshotStore;

/// Verify a set's archive chain and its snapshot without restoring.
///
/// Every archive in the chain is checksum-verified; the snapshot is
/// parsed strictly (corruption is a hard error here, unlike during a
/// backup run where it only forces a full backup).
///
/// # Errors
///
/// `CorruptArchive`, `ChainGap` or `StoreCorrupt` on the first problem
/// found.
pub fn execute(ctx: &KeepsakeContext, set_id: &str) -> Result<()> {
    let lock = SetLock::acquire(&ctx.config.core.state_dir, OperationType::Verify, set_id)?;

    let restorer = Restorer::new(ctx.config.core.archive_dir.clone());
    let chain = restorer.resolve_chain(set_id)?;

    let store = SnapshotStore::new(ctx.config.core.state_dir.clone());
    let snapshot = store.inspect(&lock)?;

    if let Some(snapshot) = &snapshot {
        let head = chain.last().map(|a| a.header.archive_id.as_str());
        if head != Some(snapshot.archive_id.as_str()) {
            output::warning(&format!(
                "Snapshot for '{set_id}' points at archive {} but the chain head is {}",
                &snapshot.archive_id[..8],
                head.map_or("<none>", |h| &h[..8])
            ));
        }
    }

    output::success(&format!(
        "Verified '{set_id}': {} archive(s) intact{}",
        chain.len(),
        if snapshot.is_some() {
            ", snapshot ok"
        } else {
            ", no snapshot"
        }
    ));
    Ok(())
}
