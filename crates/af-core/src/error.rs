//! Error types shared by every audioforge crate.
//!
//! [`Error`] covers setup, configuration and tooling failures. Per-file
//! conversion failures are described by [`ConversionError`], which is the
//! classification recorded against a failed job and never aborts a batch.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Unified error type for non-job failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input data (settings, paths, arguments) failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configuration file could not be parsed.
    #[error("Config error: {0}")]
    Config(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool (ffmpeg, ffprobe) returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// A single conversion failed.
    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// The operation was cancelled before it finished.
    #[error("Operation cancelled")]
    Cancelled,

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Classified failure of one conversion job.
///
/// Every variant except [`ConversionError::Unclassified`] is a failure kind
/// the converter recognised. Unclassified errors carry the raw message of
/// whatever went wrong, including converter panics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ConversionError {
    #[error("input file not found: {0}")]
    InputMissing(String),

    #[error("unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("corrupt input: {0}")]
    CorruptInput(String),

    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("{tool} not available: {message}")]
    ToolMissing { tool: String, message: String },

    #[error("{tool} exited with {}: {stderr}", describe_exit(.exit_code))]
    ToolFailed {
        tool: String,
        exit_code: Option<i32>,
        /// Last lines of the tool's stderr.
        stderr: String,
    },

    #[error("failed to write output: {0}")]
    OutputWrite(String),

    #[error("timed out after {}", describe_limit(.limit_ms))]
    TimedOut {
        /// The per-job limit that expired, in milliseconds.
        limit_ms: u64,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("unexpected error: {0}")]
    Unclassified(String),
}

/// `1500` -> `"1.5s"`, `120000` -> `"120s"`.
fn describe_limit(limit_ms: &u64) -> String {
    let limit_ms = *limit_ms;
    if limit_ms % 1000 == 0 {
        format!("{}s", limit_ms / 1000)
    } else {
        let secs = format!("{:.3}", limit_ms as f64 / 1000.0);
        format!("{}s", secs.trim_end_matches('0'))
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "no exit status".to_string(),
    }
}

impl ConversionError {
    /// Wrap an arbitrary error message as an unclassified failure.
    pub fn unclassified(message: impl std::fmt::Display) -> Self {
        ConversionError::Unclassified(message.to_string())
    }

    /// A job that ran past `limit`.
    pub fn timed_out(limit: Duration) -> Self {
        ConversionError::TimedOut {
            limit_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Short machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ConversionError::InputMissing(_) => "input_missing",
            ConversionError::UnsupportedInput(_) => "unsupported_input",
            ConversionError::CorruptInput(_) => "corrupt_input",
            ConversionError::UnsupportedCodec(_) => "unsupported_codec",
            ConversionError::ToolMissing { .. } => "tool_missing",
            ConversionError::ToolFailed { .. } => "tool_failed",
            ConversionError::OutputWrite(_) => "output_write",
            ConversionError::TimedOut { .. } => "timed_out",
            ConversionError::Cancelled => "cancelled",
            ConversionError::Unclassified(_) => "unclassified",
        }
    }

    /// Whether the converter recognised this failure.
    pub fn is_classified(&self) -> bool {
        !matches!(self, ConversionError::Unclassified(_))
    }

    /// Message suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            ConversionError::InputMissing(path) => {
                format!("The file {path} no longer exists.")
            }
            ConversionError::UnsupportedInput(detail) => {
                format!("This file type cannot be converted ({detail}).")
            }
            ConversionError::CorruptInput(_) => {
                "The file appears to be damaged or is not a valid audio file.".to_string()
            }
            ConversionError::UnsupportedCodec(codec) => {
                format!("The audio codec is not supported: {codec}.")
            }
            ConversionError::ToolMissing { tool, .. } => {
                format!("{tool} could not be found. Make sure it is installed and in your PATH.")
            }
            ConversionError::ToolFailed { tool, .. } => {
                format!("{tool} reported an error while converting this file.")
            }
            ConversionError::OutputWrite(detail) => {
                format!("The converted file could not be written: {detail}.")
            }
            ConversionError::TimedOut { limit_ms } => {
                format!(
                    "The conversion took longer than {} and was stopped.",
                    describe_limit(limit_ms)
                )
            }
            ConversionError::Cancelled => "The conversion was cancelled.".to_string(),
            ConversionError::Unclassified(message) => {
                format!("An unexpected error occurred: {message}")
            }
        }
    }
}
