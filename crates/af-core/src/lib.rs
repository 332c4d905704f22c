//! af-core: shared types, IDs, errors, settings, configuration and events.
//!
//! This crate is the foundational dependency for the other af-* crates,
//! providing type-safe identifiers, the error and failure-classification
//! types, the output format table with its settings snapshot, named presets,
//! application configuration, and a broadcast event bus.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod presets;
pub mod settings;
pub mod status;

// Re-export the most commonly used items at the crate root.
pub use error::{ConversionError, Error, Result};
pub use ids::*;
pub use settings::{
    BitrateMode, Channels, ConversionSettings, FormatSpec, OutputFormat, SampleRate,
};
pub use status::JobStatus;
