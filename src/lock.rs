//! Per-backup-set advisory locking.
//!
//! A backup or restore run holds an exclusive lock on its backup set so two
//! runs cannot race on the same snapshot or archive directory. Independent
//! sets lock independent files and run freely in parallel. Locks are
//! released on drop, and stale locks left by crashed processes are cleaned
//! up before acquisition.

use crate::errors::{Error, Result};
use anyhow::Context;
use fs4::fs_std::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

/// Operations that take the set lock, recorded in the lock file for
/// debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    /// Backup run.
    Backup,
    /// Restore run.
    Restore,
    /// Chain verification.
    Verify,
}

impl OperationType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Backup => "backup",
            Self::Restore => "restore",
            Self::Verify => "verify",
        }
    }
}

/// Holds an exclusive lock on one backup set.
///
/// The lock is the sole serialization point for a set: the snapshot store
/// requires a `&SetLock` for load and commit, which keeps "locked" visible
/// in the type system rather than as hidden global state.
pub struct SetLock {
    /// Lock file handle.
    lock_file: File,
    /// Path to the lock file (for error messages).
    lock_path: PathBuf,
    /// The locked backup set.
    set_id: String,
}

impl SetLock {
    /// Acquire an exclusive lock for an operation on a backup set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SetLocked`] if another run holds the lock past the
    /// timeout, or `Other` if the locks directory cannot be created.
    pub fn acquire(state_dir: &Path, operation: OperationType, set_id: &str) -> Result<Self> {
        let locks_dir = state_dir.join("locks");
        fs::create_dir_all(&locks_dir).context("Failed to create locks directory")?;

        Self::cleanup_stale_locks(&locks_dir)?;

        let lock_path = locks_dir.join(format!("{set_id}.lock"));
        let lock_file = Self::try_acquire_lock(&lock_path, operation, set_id)?;

        Ok(Self {
            lock_file,
            lock_path,
            set_id: set_id.to_string(),
        })
    }

    /// The backup set this lock protects.
    #[must_use]
    pub fn set_id(&self) -> &str {
        &self.set_id
    }

    /// Try to acquire the lock file, retrying until the timeout.
    fn try_acquire_lock(lock_path: &Path, operation: OperationType, set_id: &str) -> Result<File> {
        // Shorter timeouts in test mode keep the suite fast
        let lock_timeout = if cfg!(test) {
            Duration::from_millis(100)
        } else {
            Duration::from_secs(30)
        };
        let retry_interval = if cfg!(test) {
            Duration::from_millis(10)
        } else {
            Duration::from_millis(100)
        };

        let start = Instant::now();

        loop {
            let file = File::create(lock_path)
                .with_context(|| format!("Failed to create lock file: {}", lock_path.display()))?;

            match file.try_lock_exclusive() {
                Ok(true) => {
                    use std::io::Write;
                    let mut file_ref = &file;
                    let _ = writeln!(
                        file_ref,
                        "operation={}\nset={}\npid={}\ntime={}",
                        operation.as_str(),
                        set_id,
                        std::process::id(),
                        humantime::format_rfc3339(SystemTime::now())
                    );
                    return Ok(file);
                }
                Ok(false) | Err(_) if start.elapsed() < lock_timeout => {
                    std::thread::sleep(retry_interval);
                }
                Ok(false) | Err(_) => {
                    return Err(Error::SetLocked {
                        set_id: set_id.to_string(),
                    });
                }
            }
        }
    }

    /// Clean up lock files left behind by crashed runs.
    ///
    /// The mtime is written once at acquisition and backups of large
    /// trees run far longer than the threshold, so an old mtime alone is
    /// not proof of staleness: a candidate is removed only if its flock
    /// can actually be taken.
    fn cleanup_stale_locks(locks_dir: &Path) -> Result<()> {
        const STALE_THRESHOLD: Duration = Duration::from_secs(300);

        if !locks_dir.exists() {
            return Ok(());
        }

        let entries = fs::read_dir(locks_dir).context("Failed to read locks directory")?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "lock") {
                continue;
            }

            if let Ok(metadata) = entry.metadata()
                && let Ok(modified) = metadata.modified()
                && let Ok(elapsed) = modified.elapsed()
                && elapsed > STALE_THRESHOLD
                && let Ok(file) = File::open(&path)
                && file.try_lock_exclusive().is_ok_and(|locked| locked)
            {
                if let Err(e) = fs::remove_file(&path) {
                    crate::output::warning(&format!(
                        "Failed to remove stale lock {}: {}",
                        path.display(),
                        e
                    ));
                }
                let _ = file.unlock();
            }
        }

        Ok(())
    }

    /// Release the lock explicitly (normally handled by Drop).
    ///
    /// # Errors
    ///
    /// Returns an error if the unlock operation fails.
    pub fn release(self) -> Result<()> {
        self.lock_file.unlock().context("Failed to release lock")?;
        if let Err(e) = fs::remove_file(&self.lock_path) {
            crate::output::warning(&format!(
                "Failed to remove lock file {}: {}",
                self.lock_path.display(),
                e
            ));
        }
        Ok(())
    }
}

impl Drop for SetLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
        let _ = fs::remove_file(&self.lock_path);
    }
}
