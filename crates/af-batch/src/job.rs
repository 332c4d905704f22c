//! A single file's conversion request and its lifecycle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use af_core::{ConversionError, ConversionSettings, JobId, JobStatus};
use serde::{Deserialize, Serialize};

use crate::error::InvalidTransition;

/// One file's conversion request plus its lifecycle status.
///
/// A job is owned by exactly one party at a time: the caller while the batch
/// is assembled, the worker executing it, then the orchestrator once it is
/// resolved. Status only moves `Pending -> Processing -> Completed | Failed`.
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    input: PathBuf,
    output: PathBuf,
    settings: Arc<ConversionSettings>,
    status: JobStatus,
    error: Option<ConversionError>,
}

impl Job {
    /// Create a pending job.
    pub fn new(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        settings: Arc<ConversionSettings>,
    ) -> Self {
        Self {
            id: JobId::new(),
            input: input.into(),
            output: output.into(),
            settings,
            status: JobStatus::Pending,
            error: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// The batch-wide settings snapshot.
    pub fn settings(&self) -> &Arc<ConversionSettings> {
        &self.settings
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// The recorded failure, set only when the job is `Failed`.
    pub fn error(&self) -> Option<&ConversionError> {
        self.error.as_ref()
    }

    fn transition(&mut self, to: JobStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(to) {
            return Err(InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// `Pending -> Processing`.
    pub fn start(&mut self) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::Processing)
    }

    /// `Processing -> Completed`.
    pub fn complete(&mut self) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::Completed)
    }

    /// `Processing -> Failed`, recording the classified failure.
    pub fn fail(&mut self, error: ConversionError) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error);
        Ok(())
    }
}

/// The resolved state of one job, as reported in a batch result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub input: PathBuf,
    pub output: PathBuf,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ConversionError>,
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == JobStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == JobStatus::Failed
    }
}

impl From<Job> for JobOutcome {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            input: job.input,
            output: job.output,
            status: job.status,
            error: job.error,
        }
    }
}
