//! Status sinks: observers of a running batch.
//!
//! The orchestrator and its workers push every job transition and aggregate
//! progress update into a [`StatusSink`]. Sinks are called from worker tasks
//! as well as the coordinating task, so they must be cheap and must not block
//! or panic.

use std::sync::Arc;

use af_core::events::{EventBus, EventPayload};
use af_core::{JobId, JobStatus};

use crate::job::Job;
use crate::orchestrator::BatchResult;

/// Observer of job transitions and batch progress.
pub trait StatusSink: Send + Sync {
    /// A job moved to `status`. `job` already reflects the new state.
    fn on_status_change(&self, job: &Job, status: JobStatus);

    /// Aggregate batch progress in `[0, 1]` with a human-readable message.
    fn on_progress(&self, fraction: f64, message: &str);

    /// Converter-reported progress of a single job.
    fn on_job_progress(&self, _job_id: JobId, _fraction: f32) {}

    /// Called exactly once after every job has resolved.
    fn on_batch_finished(&self, _result: &BatchResult) {}
}

impl<S: StatusSink + ?Sized> StatusSink for Arc<S> {
    fn on_status_change(&self, job: &Job, status: JobStatus) {
        (**self).on_status_change(job, status);
    }

    fn on_progress(&self, fraction: f64, message: &str) {
        (**self).on_progress(fraction, message);
    }

    fn on_job_progress(&self, job_id: JobId, fraction: f32) {
        (**self).on_job_progress(job_id, fraction);
    }

    fn on_batch_finished(&self, result: &BatchResult) {
        (**self).on_batch_finished(result);
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

impl StatusSink for EventBus {
    fn on_status_change(&self, job: &Job, status: JobStatus) {
        self.broadcast(EventPayload::JobStatusChanged {
            job_id: job.id(),
            input: job.input().display().to_string(),
            status,
            error: job.error().cloned(),
        });
    }

    fn on_progress(&self, fraction: f64, message: &str) {
        self.broadcast(EventPayload::BatchProgress {
            progress: fraction,
            message: message.to_string(),
        });
    }

    fn on_job_progress(&self, job_id: JobId, fraction: f32) {
        self.broadcast(EventPayload::JobProgress {
            job_id,
            progress: fraction,
        });
    }

    fn on_batch_finished(&self, result: &BatchResult) {
        self.broadcast(EventPayload::BatchFinished {
            batch_id: result.batch_id,
            completed: result.completed,
            failed: result.failed,
        });
    }
}

// ---------------------------------------------------------------------------
// TracingSink
// ---------------------------------------------------------------------------

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn on_status_change(&self, job: &Job, status: JobStatus) {
        match job.error() {
            Some(err) if status == JobStatus::Failed => tracing::warn!(
                job_id = %job.id(),
                input = %job.input().display(),
                %status,
                kind = err.kind(),
                "Job failed: {err}"
            ),
            _ => tracing::info!(
                job_id = %job.id(),
                input = %job.input().display(),
                %status,
                "Job status changed"
            ),
        }
    }

    fn on_progress(&self, fraction: f64, message: &str) {
        tracing::info!("[{:.0}%] {message}", fraction * 100.0);
    }

    fn on_job_progress(&self, job_id: JobId, fraction: f32) {
        tracing::trace!(%job_id, "[{:.0}%] converting", fraction * 100.0);
    }

    fn on_batch_finished(&self, result: &BatchResult) {
        tracing::info!(batch_id = %result.batch_id, "Batch finished: {}", result.summary());
    }
}

// ---------------------------------------------------------------------------
// NoopSink / FanoutSink
// ---------------------------------------------------------------------------

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl StatusSink for NoopSink {
    fn on_status_change(&self, _job: &Job, _status: JobStatus) {}

    fn on_progress(&self, _fraction: f64, _message: &str) {}
}

/// Forwards every call to each inner sink in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn StatusSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a sink.
    pub fn with(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl std::fmt::Debug for FanoutSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl StatusSink for FanoutSink {
    fn on_status_change(&self, job: &Job, status: JobStatus) {
        for sink in &self.sinks {
            sink.on_status_change(job, status);
        }
    }

    fn on_progress(&self, fraction: f64, message: &str) {
        for sink in &self.sinks {
            sink.on_progress(fraction, message);
        }
    }

    fn on_job_progress(&self, job_id: JobId, fraction: f32) {
        for sink in &self.sinks {
            sink.on_job_progress(job_id, fraction);
        }
    }

    fn on_batch_finished(&self, result: &BatchResult) {
        for sink in &self.sinks {
            sink.on_batch_finished(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use af_core::events::EventPayload;
    use af_core::{BatchId, ConversionError, ConversionSettings};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn failed_job() -> Job {
        let mut job = Job::new(
            "/music/b.mp3",
            "/out/b.flac",
            Arc::new(ConversionSettings::default()),
        );
        job.start().unwrap();
        job.fail(ConversionError::UnsupportedCodec("wmav2".into()))
            .unwrap();
        job
    }

    fn result() -> BatchResult {
        BatchResult {
            batch_id: BatchId::new(),
            completed: 2,
            failed: 1,
            outcomes: Vec::new(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn event_bus_publishes_payloads() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let job = failed_job();

        bus.on_status_change(&job, JobStatus::Failed);
        bus.on_job_progress(job.id(), 0.5);
        bus.on_progress(1.0, "Completed 3 of 3 files");
        bus.on_batch_finished(&result());

        match rx.try_recv().unwrap().payload {
            EventPayload::JobStatusChanged {
                job_id,
                input,
                status,
                error,
            } => {
                assert_eq!(job_id, job.id());
                assert_eq!(input, "/music/b.mp3");
                assert_eq!(status, JobStatus::Failed);
                assert_eq!(error, Some(ConversionError::UnsupportedCodec("wmav2".into())));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
        assert!(matches!(
            rx.try_recv().unwrap().payload,
            EventPayload::JobProgress { .. }
        ));
        match rx.try_recv().unwrap().payload {
            EventPayload::BatchProgress { progress, message } => {
                assert_eq!(progress, 1.0);
                assert_eq!(message, "Completed 3 of 3 files");
            }
            other => panic!("unexpected payload: {other:?}"),
        }
        assert!(matches!(
            rx.try_recv().unwrap().payload,
            EventPayload::BatchFinished {
                completed: 2,
                failed: 1,
                ..
            }
        ));
    }

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    impl StatusSink for Counting {
        fn on_status_change(&self, _job: &Job, _status: JobStatus) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }

        fn on_progress(&self, _fraction: f64, _message: &str) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_finished(&self, _result: &BatchResult) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn fanout_forwards_to_every_sink() {
        let a = Arc::new(Counting::default());
        let b = Arc::new(Counting::default());
        let fanout = FanoutSink::new()
            .with(a.clone())
            .with(b.clone())
            .with(Arc::new(NoopSink))
            .with(Arc::new(TracingSink));
        assert_eq!(fanout.len(), 4);

        let job = failed_job();
        fanout.on_status_change(&job, JobStatus::Failed);
        fanout.on_progress(0.5, "Completed 1 of 2 files");
        fanout.on_job_progress(job.id(), 0.25);
        fanout.on_batch_finished(&result());

        // on_job_progress uses the default no-op hook.
        assert_eq!(a.calls.load(Ordering::SeqCst), 3);
        assert_eq!(b.calls.load(Ordering::SeqCst), 3);
    }
}
