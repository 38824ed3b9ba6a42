//! Worker pool for the export stage.
//! Analysis is single-threaded; only store writes fan out.

use rayon::ThreadPool;
use tracing::info;

/// Half the cores, minimum 1 worker.
pub fn default_workers() -> usize {
    std::cmp::max(1, num_cpus::get() / 2)
}

/// Build a dedicated pool so exports never touch the global rayon pool.
pub fn build_export_pool(workers: usize) -> Result<ThreadPool, rayon::ThreadPoolBuildError> {
    let workers = workers.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("threadtrace-export-{i}"))
        .build()?;

    info!(
        target: "threadtrace::export",
        workers,
        cores = num_cpus::get(),
        "export pool ready"
    );

    Ok(pool)
}
