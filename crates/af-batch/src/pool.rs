//! Bounded worker pool executing jobs through a [`Converter`].
//!
//! Every submitted job gets its own task in a [`JoinSet`]. A semaphore with
//! `N` permits bounds how many of them are PROCESSING at once: a worker takes
//! its permit before reporting PROCESSING and keeps it until the terminal
//! status has been reported. [`WorkerPool::take_completed`] yields jobs in
//! completion order.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use af_core::{ConversionError, JobId, JobStatus};
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::converter::{ConversionRequest, Converter, ProgressSender};
use crate::error::SetupError;
use crate::job::Job;
use crate::sink::StatusSink;

/// State shared by every worker task of one pool.
#[derive(Clone)]
struct Worker {
    semaphore: Arc<Semaphore>,
    converter: Arc<dyn Converter>,
    sink: Arc<dyn StatusSink>,
    job_timeout: Option<Duration>,
    cancel: CancellationToken,
}

/// Bounded set of execution slots.
///
/// Dropping the pool aborts any job still running.
pub struct WorkerPool {
    size: usize,
    worker: Worker,
    tasks: JoinSet<Job>,
    /// Copies of submitted jobs not yet returned, used to resolve a job whose
    /// task ended without handing it back.
    unresolved: HashMap<JobId, Job>,
}

impl WorkerPool {
    /// Create a pool running at most `size` conversions at once.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::InvalidPoolSize`] when `size` is 0.
    pub fn new(
        size: usize,
        converter: Arc<dyn Converter>,
        sink: Arc<dyn StatusSink>,
    ) -> Result<Self, SetupError> {
        if size == 0 {
            return Err(SetupError::InvalidPoolSize);
        }
        Ok(Self {
            size,
            worker: Worker {
                semaphore: Arc::new(Semaphore::new(size)),
                converter,
                sink,
                job_timeout: None,
                cancel: CancellationToken::new(),
            },
            tasks: JoinSet::new(),
            unresolved: HashMap::new(),
        })
    }

    /// Builder: fail any single conversion that runs longer than `limit`.
    pub fn with_job_timeout(mut self, limit: Option<Duration>) -> Self {
        self.worker.job_timeout = limit;
        self
    }

    /// Builder: attach a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.worker.cancel = token;
        self
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs submitted but not yet returned by [`take_completed`](Self::take_completed).
    pub fn outstanding(&self) -> usize {
        self.unresolved.len()
    }

    /// Enqueue a job. Never waits for a free slot.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&mut self, job: Job) {
        self.unresolved.insert(job.id(), job.clone());
        let worker = self.worker.clone();
        self.tasks.spawn(async move { worker.run(job).await });
    }

    /// Wait for the next job to resolve, in completion order.
    ///
    /// Returns `None` once every submitted job has been taken.
    pub async fn take_completed(&mut self) -> Option<Job> {
        loop {
            match self.tasks.join_next().await {
                Some(Ok(job)) => {
                    self.unresolved.remove(&job.id());
                    return Some(job);
                }
                Some(Err(e)) => {
                    tracing::error!("Worker task ended without returning its job: {e}");
                }
                None => {
                    let id = *self.unresolved.keys().next()?;
                    let mut job = self.unresolved.remove(&id)?;
                    force_fail(
                        &mut job,
                        ConversionError::unclassified("worker task ended unexpectedly"),
                    );
                    return Some(job);
                }
            }
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("outstanding", &self.unresolved.len())
            .field("available", &self.worker.semaphore.available_permits())
            .finish_non_exhaustive()
    }
}

impl Worker {
    /// Drive one job to a terminal state and hand it back, even if the
    /// converter or the sink panics along the way.
    async fn run(&self, mut job: Job) -> Job {
        let driven = AssertUnwindSafe(self.drive(&mut job)).catch_unwind().await;
        if let Err(panic) = driven {
            let message = panic_message(panic.as_ref());
            tracing::error!(job_id = %job.id(), "Worker panicked: {message}");
            force_fail(
                &mut job,
                ConversionError::unclassified(format!("worker panicked: {message}")),
            );
        }
        job
    }

    async fn drive(&self, job: &mut Job) {
        // Jobs wait for a slot even after cancellation so that no more than
        // `N` are ever PROCESSING; cancelled in-flight jobs free theirs fast.
        let permit = self.semaphore.clone().acquire_owned().await.ok();

        self.set_status(job, Ok(()));

        let result = match permit {
            Some(_) if self.cancel.is_cancelled() => Err(ConversionError::Cancelled),
            Some(_) => self.convert(job).await,
            None => Err(ConversionError::unclassified("worker pool closed")),
        };

        self.set_status(job, result);
        drop(permit);
    }

    /// Apply the next transition and report it. `Ok(())` on a pending job
    /// starts it; on a processing job it completes it.
    fn set_status(&self, job: &mut Job, result: Result<(), ConversionError>) {
        let transition = match (job.status(), result) {
            (JobStatus::Pending, _) => job.start(),
            (_, Ok(())) => job.complete(),
            (_, Err(err)) => job.fail(err),
        };
        match transition {
            Ok(()) => self.sink.on_status_change(job, job.status()),
            Err(e) => tracing::error!(job_id = %job.id(), "{e}"),
        }
    }

    async fn convert(&self, job: &Job) -> Result<(), ConversionError> {
        let request = ConversionRequest {
            job_id: job.id(),
            input: job.input().to_path_buf(),
            output: job.output().to_path_buf(),
            settings: Arc::clone(job.settings()),
            cancel: self.cancel.child_token(),
        };
        let progress = {
            let sink = Arc::clone(&self.sink);
            let job_id = job.id();
            ProgressSender::new(move |fraction| sink.on_job_progress(job_id, fraction))
        };

        tracing::debug!(job_id = %job.id(), input = %job.input().display(), "Converting");

        let conversion = AssertUnwindSafe(self.converter.convert(&request, &progress))
            .catch_unwind()
            .map(|outcome| {
                outcome.unwrap_or_else(|panic| {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(job_id = %request.job_id, "Converter panicked: {message}");
                    Err(ConversionError::unclassified(format!(
                        "converter panicked: {message}"
                    )))
                })
            });

        let bounded = async {
            match self.job_timeout {
                Some(limit) => tokio::time::timeout(limit, conversion)
                    .await
                    .unwrap_or(Err(ConversionError::timed_out(limit))),
                None => conversion.await,
            }
        };

        tokio::select! {
            result = bounded => result,
            () = self.cancel.cancelled() => Err(ConversionError::Cancelled),
        }
    }
}

/// Move `job` to FAILED without involving the sink. A job that already
/// reached a terminal state keeps it.
fn force_fail(job: &mut Job, error: ConversionError) {
    if job.status() == JobStatus::Pending {
        let _ = job.start();
    }
    if job.status() == JobStatus::Processing {
        let _ = job.fail(error);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::NoopSink;
    use af_core::ConversionSettings;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Sleepy {
        delay: Duration,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Sleepy {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Converter for Sleepy {
        async fn convert(
            &self,
            _request: &ConversionRequest,
            progress: &ProgressSender,
        ) -> Result<(), ConversionError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            progress.send(1.0);
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Panicky;

    #[async_trait]
    impl Converter for Panicky {
        async fn convert(
            &self,
            _request: &ConversionRequest,
            _progress: &ProgressSender,
        ) -> Result<(), ConversionError> {
            panic!("decoder exploded");
        }
    }

    struct Yielding;

    #[async_trait]
    impl Converter for Yielding {
        async fn convert(
            &self,
            _request: &ConversionRequest,
            _progress: &ProgressSender,
        ) -> Result<(), ConversionError> {
            tokio::task::yield_now().await;
            Ok(())
        }
    }

    /// Counts PROCESSING jobs as the sink sees them, lingering on terminal
    /// reports so a released slot would be visible before the report lands.
    #[derive(Default)]
    struct ProcessingCounter {
        processing: AtomicUsize,
        peak: AtomicUsize,
    }

    impl StatusSink for ProcessingCounter {
        fn on_status_change(&self, _job: &Job, status: JobStatus) {
            if status == JobStatus::Processing {
                let now = self.processing.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
            } else {
                std::thread::sleep(Duration::from_micros(300));
                self.processing.fetch_sub(1, Ordering::SeqCst);
            }
        }

        fn on_progress(&self, _fraction: f64, _message: &str) {}
    }

    /// Panics when told a job named `a` completed.
    struct PanickingSink;

    impl StatusSink for PanickingSink {
        fn on_status_change(&self, job: &Job, status: JobStatus) {
            if status == JobStatus::Completed && job.input().ends_with("a.wav") {
                panic!("sink exploded");
            }
        }

        fn on_progress(&self, _fraction: f64, _message: &str) {}
    }

    fn job(name: &str) -> Job {
        Job::new(
            format!("/music/{name}.wav"),
            format!("/out/{name}.mp3"),
            Arc::new(ConversionSettings::default()),
        )
    }

    #[test]
    fn zero_workers_rejected() {
        let err = WorkerPool::new(0, Arc::new(Panicky), Arc::new(NoopSink)).unwrap_err();
        assert_matches!(err, SetupError::InvalidPoolSize);
    }

    #[tokio::test]
    async fn take_completed_on_empty_pool_is_none() {
        let mut pool = WorkerPool::new(2, Arc::new(Panicky), Arc::new(NoopSink)).unwrap();
        assert!(pool.take_completed().await.is_none());
    }

    #[tokio::test]
    async fn runs_at_most_n_at_once() {
        let converter = Arc::new(Sleepy::new(Duration::from_millis(20)));
        let mut pool = WorkerPool::new(3, converter.clone(), Arc::new(NoopSink)).unwrap();

        for i in 0..10 {
            pool.submit(job(&format!("t{i}")));
        }
        assert_eq!(pool.outstanding(), 10);

        let mut done = 0;
        while let Some(job) = pool.take_completed().await {
            assert_eq!(job.status(), JobStatus::Completed);
            done += 1;
        }
        assert_eq!(done, 10);
        assert_eq!(pool.outstanding(), 0);
        assert!(converter.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn panic_becomes_unclassified_failure() {
        let mut pool = WorkerPool::new(1, Arc::new(Panicky), Arc::new(NoopSink)).unwrap();
        pool.submit(job("a"));

        let job = pool.take_completed().await.unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert_matches!(
            job.error(),
            Some(ConversionError::Unclassified(msg)) if msg.contains("decoder exploded")
        );
    }

    #[tokio::test]
    async fn slow_job_times_out() {
        let converter = Arc::new(Sleepy::new(Duration::from_secs(30)));
        let mut pool = WorkerPool::new(1, converter, Arc::new(NoopSink))
            .unwrap()
            .with_job_timeout(Some(Duration::from_millis(20)));
        pool.submit(job("slow"));

        let job = pool.take_completed().await.unwrap();
        assert_matches!(job.error(), Some(ConversionError::TimedOut { .. }));
    }

    #[tokio::test]
    async fn cancelled_pool_resolves_every_job() {
        let token = CancellationToken::new();
        let converter = Arc::new(Sleepy::new(Duration::from_secs(30)));
        let mut pool = WorkerPool::new(1, converter, Arc::new(NoopSink))
            .unwrap()
            .with_cancellation(token.clone());

        for name in ["a", "b", "c"] {
            pool.submit(job(name));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let mut cancelled = 0;
        while let Some(job) = pool.take_completed().await {
            assert_eq!(job.status(), JobStatus::Failed);
            assert_eq!(job.error(), Some(&ConversionError::Cancelled));
            cancelled += 1;
        }
        assert_eq!(cancelled, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn slot_is_held_until_terminal_status_is_reported() {
        let sink = Arc::new(ProcessingCounter::default());
        let mut pool = WorkerPool::new(2, Arc::new(Yielding), sink.clone()).unwrap();

        for i in 0..200 {
            pool.submit(job(&format!("t{i}")));
        }
        let mut done = 0;
        while let Some(job) = pool.take_completed().await {
            assert_eq!(job.status(), JobStatus::Completed);
            done += 1;
        }
        assert_eq!(done, 200);
        assert!(
            sink.peak.load(Ordering::SeqCst) <= 2,
            "peak PROCESSING was {}",
            sink.peak.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn panicking_sink_still_returns_every_job() {
        let mut pool = WorkerPool::new(2, Arc::new(Yielding), Arc::new(PanickingSink)).unwrap();
        for name in ["a", "b", "c"] {
            pool.submit(job(name));
        }

        let drained = tokio::time::timeout(Duration::from_secs(3), async {
            let mut jobs = Vec::new();
            while let Some(job) = pool.take_completed().await {
                jobs.push(job);
            }
            jobs
        })
        .await
        .expect("pool hung after a sink panic");

        assert_eq!(drained.len(), 3);
        assert!(drained.iter().all(|job| job.status().is_terminal()));
        assert_eq!(pool.outstanding(), 0);
    }
}
