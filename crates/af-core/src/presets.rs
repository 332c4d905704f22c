//! Named settings presets.

use serde::Serialize;

use crate::settings::{BitrateMode, Channels, ConversionSettings, OutputFormat, SampleRate};

/// A named, ready-made settings combination.
#[derive(Debug, Clone, Serialize)]
pub struct Preset {
    /// Lookup key used on the command line and in config files.
    pub name: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub settings: ConversionSettings,
}

impl Preset {
    /// Multi-line description including the concrete settings.
    pub fn detailed_description(&self) -> String {
        format!(
            "{}\n{}\nSettings: {}",
            self.display_name,
            self.description,
            self.settings.describe()
        )
    }
}

#[allow(clippy::too_many_arguments)]
fn preset(
    name: &'static str,
    display_name: &'static str,
    description: &'static str,
    format: OutputFormat,
    bitrate_mode: BitrateMode,
    bitrate: Option<u32>,
    vbr_quality: u8,
    sample_rate: SampleRate,
    channels: Channels,
) -> Preset {
    Preset {
        name,
        display_name,
        description,
        settings: ConversionSettings {
            format,
            bitrate_mode,
            bitrate,
            vbr_quality,
            sample_rate,
            channels,
        },
    }
}

/// All built-in presets.
pub fn all() -> Vec<Preset> {
    use BitrateMode::{Constant, Variable};

    vec![
        preset(
            "voice",
            "Voice / Podcast",
            "Small mono MP3 for speech recordings",
            OutputFormat::Mp3,
            Constant,
            Some(96),
            2,
            SampleRate::Hz44100,
            Channels::Mono,
        ),
        preset(
            "music",
            "Music",
            "Standard-quality stereo MP3",
            OutputFormat::Mp3,
            Constant,
            Some(192),
            2,
            SampleRate::Hz44100,
            Channels::Stereo,
        ),
        preset(
            "music-hq",
            "Music (High Quality)",
            "Best-quality variable bitrate MP3",
            OutputFormat::Mp3,
            Variable,
            None,
            0,
            SampleRate::Hz48000,
            Channels::Stereo,
        ),
        preset(
            "mobile",
            "Mobile",
            "Compact AAC for phones and tablets",
            OutputFormat::M4a,
            Constant,
            Some(128),
            2,
            SampleRate::Hz44100,
            Channels::Stereo,
        ),
        preset(
            "cd",
            "CD Audio",
            "Uncompressed 16-bit WAV at CD sample rate",
            OutputFormat::Wav,
            Constant,
            None,
            2,
            SampleRate::Hz44100,
            Channels::Stereo,
        ),
        preset(
            "archive",
            "Archive",
            "Lossless FLAC for long-term storage",
            OutputFormat::Flac,
            Constant,
            None,
            2,
            SampleRate::Hz48000,
            Channels::Stereo,
        ),
    ]
}

/// Look up a preset by name, ignoring case.
pub fn find(name: &str) -> Option<Preset> {
    all()
        .into_iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
}
