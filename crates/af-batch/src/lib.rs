//! # af-batch
//!
//! Concurrent batch conversion for audioforge.
//!
//! This crate provides:
//!
//! - **[`BatchRequest`]** -- turns a file selection, an output directory and
//!   one settings snapshot into validated pending [`Job`]s.
//! - **[`Converter`]** trait -- a single file's conversion, with
//!   [`FfmpegConverter`] as the production implementation.
//! - **[`WorkerPool`]** -- bounded parallel execution with per-job timeout,
//!   cancellation and panic isolation.
//! - **[`BatchOrchestrator`]** -- submits a batch, drains results in
//!   completion order, aggregates progress and returns a [`BatchResult`].
//! - **[`StatusSink`]** -- observer of job transitions and progress, with
//!   event-bus, tracing, no-op and fan-out implementations.

pub mod converter;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod pool;
pub mod request;
pub mod sink;

// Re-export key types at the crate root.
pub use converter::{ConversionRequest, Converter, FfmpegConverter, ProgressSender};
pub use error::{InvalidTransition, SetupError};
pub use job::{Job, JobOutcome};
pub use orchestrator::{BatchOrchestrator, BatchResult, ProgressTracker};
pub use pool::WorkerPool;
pub use request::BatchRequest;
pub use sink::{FanoutSink, NoopSink, StatusSink, TracingSink};
