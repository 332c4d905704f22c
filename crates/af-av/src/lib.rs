//! # af-av
//!
//! External tool management and ffmpeg-backed audio conversion for
//! audioforge.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout,
//!   streaming stderr and cancellation support for running external
//!   processes.
//! - **Conversion** ([`convert_audio`]) -- one ffmpeg run per file with
//!   progress parsing and failure classification.

pub mod command;
pub mod convert;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use convert::{classify_failure, convert_audio, ffmpeg_args, probe_duration, ProgressParser};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
