//! audioforge - concurrent batch audio conversion
//!
//! This library crate exposes the binary's building blocks for integration
//! testing.

pub mod config;
pub mod console;
pub mod scan;
