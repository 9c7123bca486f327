//! Bounded worker pool for parallel file hashing.
//!
//! The pool is global and sized once from `performance.concurrency_limit`;
//! hashing work runs inside it via [`run_in_pool`] so the walk itself stays
//! single-threaded while digests fan out across workers.

use once_cell::sync::OnceCell;
use rayon::ThreadPoolBuilder;
use std::sync::Arc;

static THREAD_POOL: OnceCell<Arc<rayon::ThreadPool>> = OnceCell::new();

/// Initialize the global thread pool with the specified number of workers.
///
/// # Errors
///
/// Returns an error if the pool cannot be built or was already initialized.
pub fn init_thread_pool(num_threads: usize) -> anyhow::Result<()> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("keepsake-worker-{i}"))
        .build()?;

    THREAD_POOL
        .set(Arc::new(pool))
        .map_err(|_| anyhow::anyhow!("Thread pool already initialized"))?;

    Ok(())
}

/// Get the global thread pool, initializing with default settings if needed.
///
/// # Panics
///
/// Panics if the pool cannot be created.
pub fn get_thread_pool() -> Arc<rayon::ThreadPool> {
    THREAD_POOL
        .get_or_init(|| {
            let num_threads = default_workers();
            let pool = ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .thread_name(|i| format!("keepsake-worker-{i}"))
                .build()
                .expect("Failed to create thread pool");
            Arc::new(pool)
        })
        .clone()
}

/// Run a function in the configured thread pool.
pub fn run_in_pool<F, R>(f: F) -> R
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    let pool = get_thread_pool();
    pool.install(f)
}

/// Configure the pool from config. A limit of 0 means auto-size.
///
/// # Errors
///
/// Returns an error if the pool has already been initialized.
pub fn configure_from_config(config: &crate::config::Config) -> anyhow::Result<()> {
    if config.performance.concurrency_limit > 0 {
        init_thread_pool(config.performance.concurrency_limit)?;
    }
    Ok(())
}

/// Default worker count: available parallelism capped at 8.
#[must_use]
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
        .min(8)
}
