/// Run a backup for a set.
pub mod backup;
/// List archives per backup set.
pub mod list;
/// Restore a set or a single archive onto a target directory.
pub mod restore;
/// Verify archive chains and the snapshot store.
pub mod verify;
