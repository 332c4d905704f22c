//! Batch orchestrator: runs a whole batch through a [`WorkerPool`].
//!
//! All jobs are submitted up front, then drained in completion order. Each
//! resolution bumps a shared atomic counter and pushes `resolved / total` to
//! the sink, so the last progress event is exactly `1.0` and happens once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use af_core::config::{BatchConfig, DEFAULT_WORKERS};
use af_core::{BatchId, JobStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::converter::Converter;
use crate::error::SetupError;
use crate::job::{Job, JobOutcome};
use crate::pool::WorkerPool;
use crate::sink::StatusSink;

// ---------------------------------------------------------------------------
// Progress tracking
// ---------------------------------------------------------------------------

/// Resolved-job counter shared between the orchestrator and observers.
#[derive(Debug)]
pub struct ProgressTracker {
    total: usize,
    resolved: AtomicUsize,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            resolved: AtomicUsize::new(0),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn resolved(&self) -> usize {
        self.resolved.load(Ordering::Acquire)
    }

    /// Record one more resolved job and return the new count.
    pub fn resolve(&self) -> usize {
        self.resolved.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Fraction of resolved jobs; exactly `1.0` once all have resolved.
    pub fn fraction(&self) -> f64 {
        let resolved = self.resolved();
        if self.total == 0 || resolved >= self.total {
            1.0
        } else {
            resolved as f64 / self.total as f64
        }
    }
}

// ---------------------------------------------------------------------------
// BatchResult
// ---------------------------------------------------------------------------

/// Final tally of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: BatchId,
    pub completed: usize,
    pub failed: usize,
    /// Per-job outcomes in completion order.
    pub outcomes: Vec<JobOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchResult {
    pub fn total(&self) -> usize {
        self.completed + self.failed
    }

    /// Whether every job completed.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Outcomes of failed jobs, in completion order.
    pub fn failures(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed())
    }

    /// Wall-clock duration of the run.
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// `"N succeeded, M failed"`.
    pub fn summary(&self) -> String {
        format!("{} succeeded, {} failed", self.completed, self.failed)
    }
}

// ---------------------------------------------------------------------------
// BatchOrchestrator
// ---------------------------------------------------------------------------

/// Runs batches of jobs with bounded parallelism.
#[derive(Clone)]
pub struct BatchOrchestrator {
    converter: Arc<dyn Converter>,
    workers: usize,
    job_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl BatchOrchestrator {
    /// Create an orchestrator with the default pool size and no job timeout.
    pub fn new(converter: Arc<dyn Converter>) -> Self {
        Self {
            converter,
            workers: DEFAULT_WORKERS,
            job_timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Create an orchestrator using the `[batch]` configuration section.
    pub fn from_config(converter: Arc<dyn Converter>, config: &BatchConfig) -> Self {
        Self::new(converter)
            .with_workers(config.effective_workers())
            .with_job_timeout(config.job_timeout())
    }

    /// Builder: set the pool size. 0 is rejected when the batch starts.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Builder: set the per-job timeout.
    pub fn with_job_timeout(mut self, limit: Option<Duration>) -> Self {
        self.job_timeout = limit;
        self
    }

    /// Builder: attach a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Token that cancels batches run by this orchestrator.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `jobs` to completion, reporting to `sink`.
    ///
    /// Individual job failures never abort the batch; they are recorded in the
    /// returned [`BatchResult`].
    ///
    /// # Errors
    ///
    /// Returns a [`SetupError`] before anything runs if `jobs` is empty, a job
    /// is not pending, or the pool size is 0.
    pub async fn run(
        &self,
        jobs: Vec<Job>,
        sink: Arc<dyn StatusSink>,
    ) -> Result<BatchResult, SetupError> {
        if jobs.is_empty() {
            return Err(SetupError::EmptyBatch);
        }
        if let Some(job) = jobs.iter().find(|j| j.status() != JobStatus::Pending) {
            return Err(SetupError::JobNotPending {
                input: job.input().to_path_buf(),
                status: job.status(),
            });
        }

        let mut pool = WorkerPool::new(self.workers, Arc::clone(&self.converter), Arc::clone(&sink))?
            .with_job_timeout(self.job_timeout)
            .with_cancellation(self.cancel.clone());

        let batch_id = BatchId::new();
        let started_at = Utc::now();
        let total = jobs.len();
        let progress = ProgressTracker::new(total);

        tracing::info!(
            batch_id = %batch_id,
            jobs = total,
            workers = pool.size(),
            "Starting batch"
        );

        for job in jobs {
            pool.submit(job);
        }

        let mut outcomes = Vec::with_capacity(total);
        let mut completed = 0;
        let mut failed = 0;

        while let Some(job) = pool.take_completed().await {
            match job.status() {
                JobStatus::Completed => completed += 1,
                JobStatus::Failed => failed += 1,
                other => {
                    tracing::error!(job_id = %job.id(), status = %other, "Worker returned an unresolved job");
                    failed += 1;
                }
            }

            let resolved = progress.resolve();
            sink.on_progress(
                progress.fraction(),
                &format!("Completed {resolved} of {total} files"),
            );
            outcomes.push(JobOutcome::from(job));
        }

        let result = BatchResult {
            batch_id,
            completed,
            failed,
            outcomes,
            started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            batch_id = %batch_id,
            elapsed_ms = result.elapsed().num_milliseconds(),
            "Batch finished: {}",
            result.summary()
        );
        sink.on_batch_finished(&result);

        Ok(result)
    }

    /// Run `jobs` on a separate task and return its handle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        &self,
        jobs: Vec<Job>,
        sink: Arc<dyn StatusSink>,
    ) -> JoinHandle<Result<BatchResult, SetupError>> {
        let this = self.clone();
        tokio::spawn(async move { this.run(jobs, sink).await })
    }
}

impl std::fmt::Debug for BatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOrchestrator")
            .field("workers", &self.workers)
            .field("job_timeout", &self.job_timeout)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
