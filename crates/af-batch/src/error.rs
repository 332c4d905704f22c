//! Batch setup and job state errors.

use std::path::PathBuf;

use af_core::JobStatus;

/// A batch could not be started. Reported before any job runs.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("no files selected for conversion")]
    EmptyBatch,

    #[error("none of the {skipped} selected files has a supported extension (mp3, wav, m4a, flac)")]
    NoSupportedInputs { skipped: usize },

    #[error("output directory {} does not exist", .0.display())]
    OutputDirMissing(PathBuf),

    #[error("output path {} is not a directory", .0.display())]
    OutputNotADirectory(PathBuf),

    #[error(
        "{} and {} would both be written to {}",
        first.display(),
        second.display(),
        output.display()
    )]
    OutputCollision {
        output: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("converting {} would overwrite the input file", .0.display())]
    OverwritesInput(PathBuf),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("worker pool size must be at least 1")]
    InvalidPoolSize,

    #[error("job for {} is {status}, expected pending", input.display())]
    JobNotPending { input: PathBuf, status: JobStatus },
}

/// A job was asked to make a lifecycle transition its state machine forbids.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal job transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_error_messages() {
        assert_eq!(
            SetupError::EmptyBatch.to_string(),
            "no files selected for conversion"
        );
        let err = SetupError::OutputCollision {
            output: "/out/a.mp3".into(),
            first: "/x/a.wav".into(),
            second: "/y/a.flac".into(),
        };
        assert_eq!(
            err.to_string(),
            "/x/a.wav and /y/a.flac would both be written to /out/a.mp3"
        );
    }

    #[test]
    fn transition_message() {
        let err = InvalidTransition {
            from: JobStatus::Completed,
            to: JobStatus::Processing,
        };
        assert_eq!(err.to_string(), "illegal job transition completed -> processing");
    }
}
