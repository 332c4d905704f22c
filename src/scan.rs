//! Expanding command-line inputs into a list of audio files.

use std::path::{Path, PathBuf};

use af_core::settings::is_supported_input;
use anyhow::Result;
use walkdir::WalkDir;

/// Expand `inputs` into files, preserving order.
///
/// Files are passed through as given (unsupported ones are skipped later,
/// when the batch is assembled). Directories are walked recursively and
/// contribute their supported audio files in sorted order.
pub fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for input in inputs {
        if !input.exists() {
            anyhow::bail!("Input does not exist: {:?}", input);
        }
        if input.is_dir() {
            files.extend(walk_dir(input));
        } else {
            files.push(input.clone());
        }
    }

    Ok(files)
}

fn walk_dir(dir: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping unreadable entry under {}: {e}", dir.display());
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_supported_input(path))
        .collect();

    found.sort();
    tracing::debug!(dir = %dir.display(), files = found.len(), "Scanned directory");
    found
}
