//! Parallel-execution backends.
//!
//! A backend receives the batches assembled by the
//! [`BatchScheduler`](crate::BatchScheduler) and returns one outcome per
//! call, in call order, per batch.

use rayon::prelude::*;
use tally_core::{Error, Result};

use crate::batch::{Batch, CallOutcome};

/// Executes batches of calls.
pub trait ParallelBackend: Send + Sync {
    /// Run every batch. The outer `Err` means the backend itself failed;
    /// individual call failures are carried in the outcomes.
    fn execute(&self, batches: &[Batch]) -> Result<Vec<Vec<CallOutcome>>>;

    /// Backend name (for logs).
    fn name(&self) -> &str;
}

/// Runs batches one after another on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialBackend;

impl ParallelBackend for SerialBackend {
    fn execute(&self, batches: &[Batch]) -> Result<Vec<Vec<CallOutcome>>> {
        Ok(batches.iter().map(Batch::run).collect())
    }

    fn name(&self) -> &str {
        "serial"
    }
}

/// Runs batches on a rayon worker pool, one batch per task.
#[derive(Debug, Clone, Copy, Default)]
pub struct RayonBackend {
    threads: usize,
}

impl RayonBackend {
    /// Use the global rayon pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a dedicated pool of `threads` workers (0 = global pool).
    pub fn with_threads(threads: usize) -> Self {
        Self { threads }
    }
}

impl ParallelBackend for RayonBackend {
    fn execute(&self, batches: &[Batch]) -> Result<Vec<Vec<CallOutcome>>> {
        let run = || batches.par_iter().map(Batch::run).collect::<Vec<_>>();
        if self.threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.threads)
                .build()
                .map_err(|e| Error::Batch(format!("failed to create thread pool: {e}")))?;
            Ok(pool.install(run))
        } else {
            Ok(run())
        }
    }

    fn name(&self) -> &str {
        "rayon"
    }
}
