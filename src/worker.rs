use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::{PipelineError, Result};

/// Bounded pool for the blocking and upstream stages of a submission.
///
/// Every image operation and every external call acquires one permit, so at
/// most `size` of them run at once across all submissions in the process.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run CPU-bound work on the blocking thread pool.
    pub async fn run_blocking<T, F>(&self, task: &'static str, work: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| PipelineError::WorkerPool(format!("{task}: pool closed")))?;
        tokio::task::spawn_blocking(work)
            .await
            .map_err(|e| PipelineError::WorkerPool(format!("{task}: {e}")))
    }

    /// Await an upstream call while holding a permit.
    pub async fn run<F>(&self, task: &'static str, call: F) -> Result<F::Output>
    where
        F: Future,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| PipelineError::WorkerPool(format!("{task}: pool closed")))?;
        Ok(call.await)
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(2)
    }
}
