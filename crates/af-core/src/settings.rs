//! Output formats, the per-format capability table, and the settings
//! snapshot handed to converters.
//!
//! Format-specific rules (which bitrates, sample rates and bitrate modes a
//! format accepts) live in [`FormatSpec`] rows rather than in branching code,
//! so settings construction and validation consult a single table.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Extensions accepted as conversion input (lowercase).
pub const SUPPORTED_INPUT_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "flac"];

/// Whether `path` has an extension this tool can convert from.
pub fn is_supported_input(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let ext = e.to_ascii_lowercase();
            SUPPORTED_INPUT_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// OutputFormat
// ---------------------------------------------------------------------------

/// Target container/codec of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Mp3,
    M4a,
    Wav,
    Flac,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Mp3,
        OutputFormat::M4a,
        OutputFormat::Wav,
        OutputFormat::Flac,
    ];

    /// The capability row for this format.
    pub fn spec(self) -> &'static FormatSpec {
        match self {
            OutputFormat::Mp3 => &MP3,
            OutputFormat::M4a => &M4A,
            OutputFormat::Wav => &WAV,
            OutputFormat::Flac => &FLAC,
        }
    }

    /// File extension written for this format.
    pub fn extension(self) -> &'static str {
        self.spec().extension
    }

    /// Lossy formats take a bitrate; lossless ones do not.
    pub fn supports_bitrate(self) -> bool {
        !self.spec().bitrates.is_empty()
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mp3" => Ok(OutputFormat::Mp3),
            "m4a" | "aac" => Ok(OutputFormat::M4a),
            "wav" => Ok(OutputFormat::Wav),
            "flac" => Ok(OutputFormat::Flac),
            other => Err(Error::validation(format!(
                "unknown output format '{other}' (expected mp3, m4a, wav or flac)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Format table
// ---------------------------------------------------------------------------

/// One rung of a lossy quality ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QualityLevel {
    pub label: &'static str,
    pub bitrate: u32,
}

/// Capabilities and defaults of one output format.
#[derive(Debug, Serialize)]
pub struct FormatSpec {
    pub format: OutputFormat,
    pub extension: &'static str,
    pub description: &'static str,
    /// Allowed constant bitrates in kbps; empty for lossless formats.
    pub bitrates: &'static [u32],
    pub default_bitrate: Option<u32>,
    /// Quality slider rungs, low to high.
    pub quality_ladder: &'static [QualityLevel],
    pub supports_vbr: bool,
    /// Allowed sample rates in Hz.
    pub sample_rates: &'static [u32],
}

impl FormatSpec {
    /// Whether `rate` is an allowed sample rate for this format.
    pub fn allows_sample_rate(&self, rate: SampleRate) -> bool {
        self.sample_rates.contains(&rate.hz())
    }

    /// Whether `kbps` is an allowed constant bitrate for this format.
    pub fn allows_bitrate(&self, kbps: u32) -> bool {
        self.bitrates.contains(&kbps)
    }

    fn supports_bitrate_for(&self, kbps: u32) -> bool {
        // Lossless formats ignore the bitrate entirely.
        self.bitrates.is_empty() || self.allows_bitrate(kbps)
    }
}

/// Default quality slider position (the "Good" rung).
pub const DEFAULT_QUALITY_INDEX: usize = 2;

static MP3: FormatSpec = FormatSpec {
    format: OutputFormat::Mp3,
    extension: "mp3",
    description: "Lossy compression format",
    bitrates: &[64, 96, 128, 160, 192, 256, 320],
    default_bitrate: Some(192),
    quality_ladder: &[
        QualityLevel { label: "Economy", bitrate: 128 },
        QualityLevel { label: "Standard", bitrate: 160 },
        QualityLevel { label: "Good", bitrate: 192 },
        QualityLevel { label: "Best", bitrate: 320 },
    ],
    supports_vbr: true,
    sample_rates: &[22050, 44100, 48000],
};

static M4A: FormatSpec = FormatSpec {
    format: OutputFormat::M4a,
    extension: "m4a",
    description: "Lossy compression format",
    bitrates: &[64, 96, 128, 160, 192, 256],
    default_bitrate: Some(160),
    quality_ladder: &[
        QualityLevel { label: "Economy", bitrate: 96 },
        QualityLevel { label: "Standard", bitrate: 128 },
        QualityLevel { label: "Good", bitrate: 160 },
        QualityLevel { label: "Best", bitrate: 256 },
    ],
    supports_vbr: false,
    sample_rates: &[22050, 44100, 48000, 96000],
};

static WAV: FormatSpec = FormatSpec {
    format: OutputFormat::Wav,
    extension: "wav",
    description: "Lossless format",
    bitrates: &[],
    default_bitrate: None,
    quality_ladder: &[],
    supports_vbr: false,
    sample_rates: &[22050, 44100, 48000, 96000],
};

static FLAC: FormatSpec = FormatSpec {
    format: OutputFormat::Flac,
    extension: "flac",
    description: "Lossless format",
    bitrates: &[],
    default_bitrate: None,
    quality_ladder: &[],
    supports_vbr: false,
    sample_rates: &[22050, 44100, 48000, 96000],
};

/// WAV quality ladder: each rung is a sample rate.
pub const WAV_QUALITY_LADDER: &[(&str, SampleRate)] = &[
    ("Tape", SampleRate::Hz22050),
    ("CD Quality", SampleRate::Hz44100),
    ("DVD", SampleRate::Hz48000),
    ("Extra High", SampleRate::Hz96000),
];

/// Labels of the VBR quality scale, index 0 (best) to 5 (smallest).
pub const VBR_QUALITY_LABELS: [&str; 6] = ["Best", "High", "Normal", "Medium", "Low", "Smallest"];

/// Default VBR quality ("Normal").
pub const DEFAULT_VBR_QUALITY: u8 = 2;

// ---------------------------------------------------------------------------
// Settings value types
// ---------------------------------------------------------------------------

/// Constant or variable bitrate encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitrateMode {
    #[default]
    Constant,
    Variable,
}

/// Sample rates the converter can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum SampleRate {
    Hz22050,
    #[default]
    Hz44100,
    Hz48000,
    Hz96000,
}

impl SampleRate {
    pub fn hz(self) -> u32 {
        match self {
            SampleRate::Hz22050 => 22050,
            SampleRate::Hz44100 => 44100,
            SampleRate::Hz48000 => 48000,
            SampleRate::Hz96000 => 96000,
        }
    }
}

impl TryFrom<u32> for SampleRate {
    type Error = Error;

    fn try_from(hz: u32) -> Result<Self> {
        match hz {
            22050 => Ok(SampleRate::Hz22050),
            44100 => Ok(SampleRate::Hz44100),
            48000 => Ok(SampleRate::Hz48000),
            96000 => Ok(SampleRate::Hz96000),
            other => Err(Error::validation(format!(
                "unsupported sample rate {other} Hz (expected 22050, 44100, 48000 or 96000)"
            ))),
        }
    }
}

impl From<SampleRate> for u32 {
    fn from(rate: SampleRate) -> Self {
        rate.hz()
    }
}

impl fmt::Display for SampleRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.hz())
    }
}

/// Output channel layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channels {
    Mono,
    #[default]
    Stereo,
}

impl Channels {
    pub fn count(self) -> u8 {
        match self {
            Channels::Mono => 1,
            Channels::Stereo => 2,
        }
    }
}

impl FromStr for Channels {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mono" | "1" => Ok(Channels::Mono),
            "stereo" | "2" => Ok(Channels::Stereo),
            other => Err(Error::validation(format!(
                "unknown channel layout '{other}' (expected mono or stereo)"
            ))),
        }
    }
}

impl fmt::Display for Channels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channels::Mono => write!(f, "mono"),
            Channels::Stereo => write!(f, "stereo"),
        }
    }
}

// ---------------------------------------------------------------------------
// ConversionSettings
// ---------------------------------------------------------------------------

/// Settings snapshot applied to every job of a batch.
///
/// `bitrate` is only meaningful for lossy formats in constant mode and
/// `vbr_quality` only for variable mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionSettings {
    pub format: OutputFormat,
    #[serde(default)]
    pub bitrate_mode: BitrateMode,
    #[serde(default)]
    pub bitrate: Option<u32>,
    #[serde(default = "default_vbr_quality")]
    pub vbr_quality: u8,
    #[serde(default)]
    pub sample_rate: SampleRate,
    #[serde(default)]
    pub channels: Channels,
}

fn default_vbr_quality() -> u8 {
    DEFAULT_VBR_QUALITY
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self::for_format(OutputFormat::Mp3)
    }
}

impl ConversionSettings {
    /// Defaults for `format`: its default bitrate in constant mode, 44.1 kHz
    /// stereo.
    pub fn for_format(format: OutputFormat) -> Self {
        Self {
            format,
            bitrate_mode: BitrateMode::Constant,
            bitrate: format.spec().default_bitrate,
            vbr_quality: DEFAULT_VBR_QUALITY,
            sample_rate: SampleRate::Hz44100,
            channels: Channels::Stereo,
        }
    }

    /// Pick a constant bitrate from the format's quality ladder.
    pub fn with_quality_index(mut self, index: usize) -> Result<Self> {
        let ladder = self.format.spec().quality_ladder;
        if ladder.is_empty() {
            // Lossless: the WAV ladder maps to sample rates.
            if self.format == OutputFormat::Wav {
                let (_, rate) = WAV_QUALITY_LADDER.get(index).ok_or_else(|| {
                    Error::validation(format!("quality index {index} out of range"))
                })?;
                self.sample_rate = *rate;
                return Ok(self);
            }
            return Err(Error::validation(format!(
                "{} has no quality levels",
                self.format
            )));
        }
        let level = ladder
            .get(index)
            .ok_or_else(|| Error::validation(format!("quality index {index} out of range")))?;
        self.bitrate_mode = BitrateMode::Constant;
        self.bitrate = Some(level.bitrate);
        Ok(self)
    }

    /// Human-readable one-line summary.
    pub fn describe(&self) -> String {
        let quality = match (self.format.supports_bitrate(), self.bitrate_mode) {
            (false, _) => "lossless".to_string(),
            (true, BitrateMode::Variable) => format!(
                "VBR {} ({})",
                self.vbr_quality,
                VBR_QUALITY_LABELS
                    .get(self.vbr_quality as usize)
                    .copied()
                    .unwrap_or("?")
            ),
            (true, BitrateMode::Constant) => match self.bitrate {
                Some(kbps) => format!("{kbps} kbps"),
                None => "default bitrate".to_string(),
            },
        };
        format!(
            "{} {}, {}, {}",
            self.format.extension().to_uppercase(),
            quality,
            self.sample_rate,
            self.channels
        )
    }

    /// Check the settings against the format table.
    pub fn validate(&self) -> Result<()> {
        let spec = self.format.spec();

        if !spec.allows_sample_rate(self.sample_rate) {
            return Err(Error::validation(format!(
                "{} does not support a sample rate of {}",
                self.format, self.sample_rate
            )));
        }

        match self.bitrate_mode {
            BitrateMode::Variable => {
                if !spec.supports_vbr {
                    return Err(Error::validation(format!(
                        "{} does not support variable bitrate",
                        self.format
                    )));
                }
                if self.vbr_quality as usize >= VBR_QUALITY_LABELS.len() {
                    return Err(Error::validation(format!(
                        "VBR quality {} out of range (0-5)",
                        self.vbr_quality
                    )));
                }
            }
            BitrateMode::Constant => {
                if let Some(kbps) = self.bitrate {
                    if !spec.supports_bitrate_for(kbps) {
                        return Err(Error::validation(format!(
                            "{} does not support a bitrate of {kbps} kbps",
                            self.format
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}
