use af_core::{Channels, OutputFormat};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "audioforge")]
#[command(author, version, about = "Batch audio conversion with ffmpeg")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert files (or whole directories) to another format
    Convert(ConvertArgs),

    /// List output formats with their bitrates and sample rates
    Formats,

    /// List the built-in conversion presets
    Presets,

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Input files or directories
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output directory (defaults to `defaults.output_dir` from the config)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Named preset to start from
    #[arg(short, long)]
    pub preset: Option<String>,

    /// Output format: mp3, m4a, wav, flac
    #[arg(short, long)]
    pub format: Option<OutputFormat>,

    /// Constant bitrate in kbps
    #[arg(short, long, conflicts_with = "vbr")]
    pub bitrate: Option<u32>,

    /// Variable bitrate quality, 0 (best) to 5 (smallest); MP3 only
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=5))]
    pub vbr: Option<u8>,

    /// Quality slider position, 0 (economy) to 3 (best)
    #[arg(short, long, conflicts_with_all = ["bitrate", "vbr"])]
    pub quality: Option<usize>,

    /// Sample rate in Hz: 22050, 44100, 48000, 96000
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Channels: mono or stereo
    #[arg(long)]
    pub channels: Option<Channels>,

    /// Number of files converted at once
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Per-file time limit in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Print the batch result as JSON
    #[arg(long)]
    pub json: bool,
}
