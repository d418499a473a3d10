//! Parallel candidate evaluation.

use std::panic::{catch_unwind, AssertUnwindSafe};

use rayon::prelude::*;
use tracing::warn;

use sw_types::{SearchError, SwResult};

/// Fixed-size worker pool running one fit-and-score job per candidate.
///
/// Results come back positionally aligned with the job list, regardless of
/// which worker finishes first, so selection-by-index stays correct. A job
/// that errors or panics becomes a `None` failure marker; it never takes
/// down the coordinator or sibling jobs.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    num_workers: usize,
}

impl WorkerPool {
    /// `num_workers == 0` means all available parallelism.
    pub fn new(num_workers: usize) -> SwResult<Self> {
        let workers = if num_workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            num_workers
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| SearchError::InvalidConfig {
                message: format!("failed to build worker pool: {e}"),
            })?;
        Ok(Self {
            pool,
            num_workers: workers,
        })
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Run `f` over every job, blocking until the whole batch completes.
    pub fn run_batch<J, R, F>(&self, jobs: &[J], f: F) -> Vec<Option<R>>
    where
        J: Sync,
        R: Send,
        F: Fn(&J) -> SwResult<R> + Sync,
    {
        self.pool.install(|| {
            jobs.par_iter()
                .map(|job| match catch_unwind(AssertUnwindSafe(|| f(job))) {
                    Ok(Ok(result)) => Some(result),
                    Ok(Err(error)) => {
                        warn!(%error, "worker job failed");
                        None
                    }
                    Err(_) => {
                        warn!("worker job panicked");
                        None
                    }
                })
                .collect()
        })
    }
}
