//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from TOML. Every section
//! defaults sensibly so a completely empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::presets;
use crate::settings::{BitrateMode, Channels, ConversionSettings, OutputFormat, SampleRate};

/// Default number of concurrent conversions.
pub const DEFAULT_WORKERS: usize = 4;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub batch: BatchConfig,
    pub tools: ToolsConfig,
    pub defaults: DefaultsConfig,
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Config(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.batch.workers == 0 {
            warnings.push(format!(
                "batch.workers is 0; {DEFAULT_WORKERS} workers will be used"
            ));
        }

        if self.batch.job_timeout_secs == Some(0) {
            warnings.push("batch.job_timeout_secs is 0; jobs will not time out".into());
        }

        for (name, path) in [
            ("ffmpeg_path", &self.tools.ffmpeg_path),
            ("ffprobe_path", &self.tools.ffprobe_path),
        ] {
            if let Some(p) = path {
                if !p.exists() {
                    warnings.push(format!(
                        "tools.{name} {} does not exist; falling back to PATH",
                        p.display()
                    ));
                }
            }
        }

        if let Some(ref name) = self.defaults.preset {
            if presets::find(name).is_none() {
                warnings.push(format!("defaults.preset '{name}' is not a known preset"));
            }
        }

        if let Err(e) = self.defaults.settings() {
            warnings.push(format!("defaults: {e}"));
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub workers: usize,
    /// Per-job time limit; unset means unlimited.
    pub job_timeout_secs: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            job_timeout_secs: None,
        }
    }
}

impl BatchConfig {
    /// Effective pool size (a configured 0 falls back to the default).
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            DEFAULT_WORKERS
        } else {
            self.workers
        }
    }

    /// Effective per-job timeout.
    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_secs
            .filter(|&s| s > 0)
            .map(Duration::from_secs)
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// Default conversion settings used when the command line does not
/// override them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub preset: Option<String>,
    pub format: Option<OutputFormat>,
    pub bitrate_mode: Option<BitrateMode>,
    pub bitrate: Option<u32>,
    pub vbr_quality: Option<u8>,
    pub sample_rate: Option<SampleRate>,
    pub channels: Option<Channels>,
    pub output_dir: Option<PathBuf>,
}

impl DefaultsConfig {
    /// Resolve the configured defaults into validated settings.
    ///
    /// A preset, if named, is the base; individual fields override it. When
    /// only the format changes, the base is that format's own defaults.
    pub fn settings(&self) -> Result<ConversionSettings> {
        let mut settings = match self.preset.as_deref() {
            Some(name) => {
                presets::find(name)
                    .ok_or_else(|| Error::validation(format!("unknown preset '{name}'")))?
                    .settings
            }
            None => ConversionSettings::default(),
        };

        if let Some(format) = self.format {
            if format != settings.format {
                settings = ConversionSettings::for_format(format);
            }
        }
        if let Some(mode) = self.bitrate_mode {
            settings.bitrate_mode = mode;
        }
        if let Some(bitrate) = self.bitrate {
            settings.bitrate = Some(bitrate);
        }
        if let Some(q) = self.vbr_quality {
            settings.vbr_quality = q;
        }
        if let Some(rate) = self.sample_rate {
            settings.sample_rate = rate;
        }
        if let Some(channels) = self.channels {
            settings.channels = channels;
        }

        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert_eq!(cfg.batch.workers, 4);
        assert!(cfg.batch.job_timeout().is_none());
        assert!(cfg.validate().is_empty(), "{:?}", cfg.validate());
    }

    #[test]
    fn parse_empty_toml_uses_defaults() {
        let cfg = Config::from_toml("").unwrap();
        assert_eq!(cfg.batch.effective_workers(), DEFAULT_WORKERS);
        assert_eq!(cfg.defaults.settings().unwrap(), ConversionSettings::default());
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[batch]
workers = 2
job_timeout_secs = 600

[tools]
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"

[defaults]
format = "flac"
sample_rate = 96000
channels = "mono"
output_dir = "/tmp/out"
"#;
        let cfg = Config::from_toml(toml).unwrap();
        assert_eq!(cfg.batch.workers, 2);
        assert_eq!(cfg.batch.job_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(
            cfg.tools.ffmpeg_path,
            Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg"))
        );

        let settings = cfg.defaults.settings().unwrap();
        assert_eq!(settings.format, OutputFormat::Flac);
        assert_eq!(settings.sample_rate, SampleRate::Hz96000);
        assert_eq!(settings.channels, Channels::Mono);
    }

    #[test]
    fn preset_base_with_override() {
        let cfg = Config::from_toml(
            r#"
[defaults]
preset = "voice"
bitrate = 64
"#,
        )
        .unwrap();
        let settings = cfg.defaults.settings().unwrap();
        assert_eq!(settings.channels, Channels::Mono);
        assert_eq!(settings.bitrate, Some(64));
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = Config::from_toml("[batch\nworkers = ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn zero_workers_and_timeout_warn() {
        let mut cfg = Config::default();
        cfg.batch.workers = 0;
        cfg.batch.job_timeout_secs = Some(0);
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("workers")));
        assert!(warnings.iter().any(|w| w.contains("job_timeout_secs")));
        assert_eq!(cfg.batch.effective_workers(), DEFAULT_WORKERS);
        assert!(cfg.batch.job_timeout().is_none());
    }

    #[test]
    fn bad_defaults_warn() {
        let mut cfg = Config::default();
        cfg.defaults.preset = Some("nope".into());
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("preset")));

        let mut cfg = Config::default();
        cfg.defaults.format = Some(OutputFormat::Mp3);
        cfg.defaults.sample_rate = Some(SampleRate::Hz96000);
        assert!(cfg.validate().iter().any(|w| w.contains("sample rate")));
    }

    #[test]
    fn load_or_default_with_missing_file() {
        let cfg = Config::load_or_default(Some(Path::new("/nonexistent/audioforge.toml")));
        assert_eq!(cfg.batch.workers, DEFAULT_WORKERS);
        assert_eq!(Config::load_or_default(None).batch.workers, DEFAULT_WORKERS);
    }

    #[test]
    fn load_or_default_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audioforge.toml");
        std::fs::write(&path, "[batch]\nworkers = 8\n").unwrap();
        assert_eq!(Config::load_or_default(Some(&path)).batch.workers, 8);
    }
}
