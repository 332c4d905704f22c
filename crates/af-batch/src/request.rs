//! Batch assembly: from a file selection to a validated list of jobs.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use af_core::settings::is_supported_input;
use af_core::ConversionSettings;

use crate::error::SetupError;
use crate::job::Job;

/// A file selection plus the settings snapshot to apply to all of it.
///
/// Each input carries its own output directory; inputs added without one use
/// the request's default. Unsupported files are skipped as they are added,
/// and an input added twice for the same directory is kept only once, at its
/// first position.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    output_dir: PathBuf,
    settings: ConversionSettings,
    entries: Vec<Entry>,
    seen: HashSet<(PathBuf, PathBuf)>,
    skipped: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
struct Entry {
    input: PathBuf,
    output_dir: PathBuf,
}

fn normalise(path: &Path) -> PathBuf {
    path.canonicalize()
        .unwrap_or_else(|_| path.components().collect())
}

impl BatchRequest {
    /// Create a request whose inputs default to `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>, settings: ConversionSettings) -> Self {
        Self {
            output_dir: output_dir.into(),
            settings,
            entries: Vec::new(),
            seen: HashSet::new(),
            skipped: Vec::new(),
        }
    }

    /// Builder: add one input file, converted into the default directory.
    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        let output_dir = self.output_dir.clone();
        self.push(path.into(), output_dir);
        self
    }

    /// Builder: add one input file, converted into `output_dir`.
    pub fn input_to(mut self, path: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        self.push(path.into(), output_dir.into());
        self
    }

    /// Builder: add several input files in order, all converted into the
    /// default directory.
    pub fn inputs(mut self, paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        for path in paths {
            let output_dir = self.output_dir.clone();
            self.push(path.into(), output_dir);
        }
        self
    }

    fn push(&mut self, input: PathBuf, output_dir: PathBuf) {
        if !is_supported_input(&input) {
            tracing::debug!(path = %input.display(), "Skipping unsupported file");
            self.skipped.push(input);
            return;
        }
        if !self.seen.insert((normalise(&input), normalise(&output_dir))) {
            tracing::debug!(path = %input.display(), "Skipping duplicate file");
            return;
        }
        self.entries.push(Entry { input, output_dir });
    }

    /// Accepted `(input, output directory)` pairs in selection order.
    pub fn accepted(&self) -> impl Iterator<Item = (&Path, &Path)> {
        self.entries
            .iter()
            .map(|e| (e.input.as_path(), e.output_dir.as_path()))
    }

    /// Inputs dropped for having an unsupported extension.
    pub fn skipped(&self) -> &[PathBuf] {
        &self.skipped
    }

    /// Directory used by inputs added without one.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn settings(&self) -> &ConversionSettings {
        &self.settings
    }

    /// Output path for `input` in the default directory.
    pub fn output_path_for(&self, input: &Path) -> PathBuf {
        self.output_path_in(input, &self.output_dir)
    }

    /// Output path for `input`: `<output_dir>/<input stem>.<format extension>`.
    pub fn output_path_in(&self, input: &Path, output_dir: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());
        output_dir.join(format!("{stem}.{}", self.settings.format.extension()))
    }

    /// Validate the request and create one pending job per input.
    ///
    /// # Errors
    ///
    /// Returns a [`SetupError`] if the settings are invalid, an output
    /// directory is unusable, nothing convertible was selected, two inputs
    /// map to the same output, or an output would overwrite its input.
    pub fn build(&self) -> Result<Vec<Job>, SetupError> {
        self.settings
            .validate()
            .map_err(|e| SetupError::InvalidSettings(e.to_string()))?;

        if self.entries.is_empty() {
            return Err(if self.skipped.is_empty() {
                SetupError::EmptyBatch
            } else {
                SetupError::NoSupportedInputs {
                    skipped: self.skipped.len(),
                }
            });
        }

        let mut checked: HashSet<&Path> = HashSet::new();
        for entry in &self.entries {
            let dir = entry.output_dir.as_path();
            if !checked.insert(dir) {
                continue;
            }
            if !dir.exists() {
                return Err(SetupError::OutputDirMissing(dir.to_path_buf()));
            }
            if !dir.is_dir() {
                return Err(SetupError::OutputNotADirectory(dir.to_path_buf()));
            }
        }

        let settings = Arc::new(self.settings.clone());
        let mut claimed: HashMap<PathBuf, &Path> = HashMap::new();
        let mut jobs = Vec::with_capacity(self.entries.len());

        for Entry { input, output_dir } in &self.entries {
            let output = self.output_path_in(input, output_dir);
            let key = normalise(&output);

            if key == normalise(input) {
                return Err(SetupError::OverwritesInput(input.clone()));
            }
            if let Some(first) = claimed.insert(key, input) {
                return Err(SetupError::OutputCollision {
                    output,
                    first: first.to_path_buf(),
                    second: input.clone(),
                });
            }

            jobs.push(Job::new(input.clone(), output, Arc::clone(&settings)));
        }

        tracing::debug!(
            jobs = jobs.len(),
            directories = checked.len(),
            skipped = self.skipped.len(),
            settings = %self.settings.describe(),
            "Batch assembled"
        );
        Ok(jobs)
    }
}
