//! The [`Converter`] trait: performs one file's conversion.
//!
//! The orchestrator only sees converters through this trait. The production
//! implementation is [`FfmpegConverter`]; tests substitute scripted fakes.

use std::path::PathBuf;
use std::sync::Arc;

use af_av::ToolRegistry;
use af_core::{ConversionError, ConversionSettings, JobId};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Everything a converter needs to process one job.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub job_id: JobId,
    pub input: PathBuf,
    pub output: PathBuf,
    pub settings: Arc<ConversionSettings>,
    /// Fires when the batch is cancelled. Converters that spawn processes
    /// should stop them when it does.
    pub cancel: CancellationToken,
}

/// Sender for reporting fractional progress of one conversion.
///
/// Wraps a callback receiving a fraction in `[0, 1]`.
pub struct ProgressSender {
    callback: Box<dyn Fn(f32) + Send + Sync>,
}

impl ProgressSender {
    /// Create a new sender from the given callback.
    pub fn new(callback: impl Fn(f32) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Create a no-op sender that discards all progress reports.
    pub fn noop() -> Self {
        Self {
            callback: Box::new(|_| {}),
        }
    }

    /// Report progress. Values outside `[0, 1]` are clamped.
    pub fn send(&self, fraction: f32) {
        (self.callback)(fraction.clamp(0.0, 1.0));
    }
}

impl std::fmt::Debug for ProgressSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSender").finish_non_exhaustive()
    }
}

/// Converts one input file to one output file.
///
/// Implementations must be safe to invoke concurrently for different jobs.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Perform the conversion, returning a classified failure on error.
    async fn convert(
        &self,
        request: &ConversionRequest,
        progress: &ProgressSender,
    ) -> Result<(), ConversionError>;
}

/// [`Converter`] that runs ffmpeg once per job.
#[derive(Debug, Clone)]
pub struct FfmpegConverter {
    tools: Arc<ToolRegistry>,
}

impl FfmpegConverter {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }

    /// Fail fast when ffmpeg is not available at all.
    pub fn check(&self) -> af_core::Result<()> {
        self.tools.require("ffmpeg").map(|_| ())
    }
}

#[async_trait]
impl Converter for FfmpegConverter {
    async fn convert(
        &self,
        request: &ConversionRequest,
        progress: &ProgressSender,
    ) -> Result<(), ConversionError> {
        af_av::convert_audio(
            &self.tools,
            &request.input,
            &request.output,
            &request.settings,
            |fraction| progress.send(fraction),
            Some(request.cancel.clone()),
        )
        .await
    }
}
