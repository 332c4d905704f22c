//! Audio conversion through ffmpeg.
//!
//! [`convert_audio`] runs one ffmpeg invocation per file, streams its
//! `-progress` output into a fractional progress callback, and classifies
//! failures into [`ConversionError`] kinds from the exit status and stderr.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use af_core::settings::{is_supported_input, BitrateMode, ConversionSettings, OutputFormat};
use af_core::ConversionError;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Upper bound for a single ffmpeg run. Batch-level job timeouts are shorter
/// and enforced by the caller.
const FFMPEG_TIMEOUT: Duration = Duration::from_secs(86400);

/// Timeout for the ffprobe duration lookup.
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// LAME `-q:a` value for each VBR quality level (Best..Smallest).
const LAME_VBR_QUALITY: [u8; 6] = [0, 2, 4, 5, 7, 9];

/// Suffix of the temporary file ffmpeg writes to before the final rename.
const PART_SUFFIX: &str = "part";

// ---------------------------------------------------------------------------
// Argument construction
// ---------------------------------------------------------------------------

/// ffmpeg muxer name for `format`.
fn muxer(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Mp3 => "mp3",
        OutputFormat::M4a => "ipod",
        OutputFormat::Wav => "wav",
        OutputFormat::Flac => "flac",
    }
}

/// Codec flags for `settings`, without sample rate or channel flags.
fn codec_args(settings: &ConversionSettings) -> Vec<String> {
    let spec = settings.format.spec();
    let bitrate = settings.bitrate.or(spec.default_bitrate);

    let mut args: Vec<String> = Vec::new();
    match settings.format {
        OutputFormat::Mp3 => {
            args.extend(["-c:a".into(), "libmp3lame".into()]);
            match settings.bitrate_mode {
                BitrateMode::Variable => {
                    let q = LAME_VBR_QUALITY
                        .get(settings.vbr_quality as usize)
                        .copied()
                        .unwrap_or(LAME_VBR_QUALITY[2]);
                    args.extend(["-q:a".into(), q.to_string()]);
                }
                BitrateMode::Constant => {
                    if let Some(kbps) = bitrate {
                        args.extend(["-b:a".into(), format!("{kbps}k")]);
                    }
                }
            }
        }
        OutputFormat::M4a => {
            args.extend(["-c:a".into(), "aac".into()]);
            if let Some(kbps) = bitrate {
                args.extend(["-b:a".into(), format!("{kbps}k")]);
            }
        }
        OutputFormat::Wav => args.extend(["-c:a".into(), "pcm_s16le".into()]),
        OutputFormat::Flac => args.extend(["-c:a".into(), "flac".into()]),
    }
    args
}

/// Build the full ffmpeg argument list converting `input` into `output`.
///
/// The muxer is named explicitly with `-f`, so `output` may carry any
/// extension (the converter writes to a `.part` file first).
pub fn ffmpeg_args(input: &Path, output: &Path, settings: &ConversionSettings) -> Vec<String> {
    let mut args: Vec<String> = [
        "-y",
        "-hide_banner",
        "-nostdin",
        "-progress",
        "pipe:2",
        "-nostats",
        "-i",
    ]
    .into_iter()
    .map(String::from)
    .collect();

    args.push(input.to_string_lossy().to_string());
    args.extend(["-vn", "-map", "0:a:0"].map(String::from));
    args.extend(codec_args(settings));
    args.extend([
        "-ar".to_string(),
        settings.sample_rate.hz().to_string(),
        "-ac".to_string(),
        settings.channels.count().to_string(),
        "-f".to_string(),
        muxer(settings.format).to_string(),
    ]);
    args.push(output.to_string_lossy().to_string());
    args
}

/// Temporary path used while `output` is being written.
pub fn part_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".");
    name.push(PART_SUFFIX);
    PathBuf::from(name)
}

// ---------------------------------------------------------------------------
// Progress parsing
// ---------------------------------------------------------------------------

fn duration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Duration:\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").expect("valid duration regex")
    })
}

/// Parse `HH:MM:SS.xx` from an ffmpeg `Duration:` banner line into seconds.
pub fn parse_banner_duration(line: &str) -> Option<f64> {
    let caps = duration_regex().captures(line)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Incremental parser for ffmpeg stderr with `-progress pipe:2`.
///
/// Feed it one line at a time. It returns a new fraction at the end of each
/// progress block when the fraction moved forward, and `1.0` on
/// `progress=end`. Reported values never decrease.
#[derive(Debug, Default)]
pub struct ProgressParser {
    duration_secs: Option<f64>,
    out_time_us: Option<i64>,
    last: f32,
}

impl ProgressParser {
    /// Create a parser, optionally seeded with a probed duration.
    pub fn new(duration_secs: Option<f64>) -> Self {
        Self {
            duration_secs: duration_secs.filter(|d| *d > 0.0),
            ..Self::default()
        }
    }

    /// Known input duration in seconds.
    pub fn duration_secs(&self) -> Option<f64> {
        self.duration_secs
    }

    /// Consume one stderr line.
    pub fn feed(&mut self, line: &str) -> Option<f32> {
        let line = line.trim();

        if let Some(val) = line.strip_prefix("out_time_us=") {
            // "N/A" before the first packet is written.
            self.out_time_us = val.trim().parse::<i64>().ok();
            return None;
        }

        if let Some(state) = line.strip_prefix("progress=") {
            if state.trim() == "end" {
                return self.advance(1.0);
            }
            let (Some(out_us), Some(dur)) = (self.out_time_us, self.duration_secs) else {
                return None;
            };
            let fraction = (out_us as f64 / 1_000_000.0 / dur).clamp(0.0, 1.0) as f32;
            return self.advance(fraction);
        }

        if self.duration_secs.is_none() {
            self.duration_secs = parse_banner_duration(line).filter(|d| *d > 0.0);
        }
        None
    }

    fn advance(&mut self, fraction: f32) -> Option<f32> {
        if fraction > self.last {
            self.last = fraction;
            Some(fraction)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Failure classification
// ---------------------------------------------------------------------------

const CORRUPT_MARKERS: &[&str] = &[
    "Invalid data found when processing input",
    "moov atom not found",
    "Header missing",
    "invalid frame size",
    "Error while decoding stream",
];

const CODEC_MARKERS: &[&str] = &[
    "Unknown encoder",
    "Encoder not found",
    "Decoder not found",
    "Unsupported codec",
    "could not find codec parameters",
    "codec not currently supported",
];

const NO_AUDIO_MARKERS: &[&str] = &[
    "matches no streams",
    "does not contain any stream",
    "Output file #0 does not contain any stream",
];

const OUTPUT_MARKERS: &[&str] = &[
    "Permission denied",
    "No space left on device",
    "Read-only file system",
    "Error opening output",
    "Could not write header",
];

fn first_line_with<'a>(stderr: &'a str, markers: &[&str]) -> Option<&'a str> {
    stderr
        .lines()
        .find(|line| markers.iter().any(|m| line.contains(m)))
        .map(str::trim)
}

/// Classify a failed ffmpeg run from its exit code and stderr tail.
pub fn classify_failure(input: &Path, exit_code: Option<i32>, stderr: &str) -> ConversionError {
    let input_str = input.to_string_lossy();

    if let Some(line) = first_line_with(stderr, &["No such file or directory"]) {
        if line.contains(input_str.as_ref()) {
            return ConversionError::InputMissing(input_str.to_string());
        }
        return ConversionError::OutputWrite(line.to_string());
    }
    if let Some(line) = first_line_with(stderr, CODEC_MARKERS) {
        return ConversionError::UnsupportedCodec(line.to_string());
    }
    if first_line_with(stderr, NO_AUDIO_MARKERS).is_some() {
        return ConversionError::UnsupportedInput("no audio stream".to_string());
    }
    if let Some(line) = first_line_with(stderr, CORRUPT_MARKERS) {
        return ConversionError::CorruptInput(line.to_string());
    }
    if let Some(line) = first_line_with(stderr, OUTPUT_MARKERS) {
        return ConversionError::OutputWrite(line.to_string());
    }

    ConversionError::ToolFailed {
        tool: "ffmpeg".to_string(),
        exit_code,
        stderr: stderr.trim().to_string(),
    }
}

/// Map an error from running the tool itself (rather than a failed
/// conversion) to a job failure.
fn tool_error_to_conversion(err: af_core::Error) -> ConversionError {
    match err {
        af_core::Error::Cancelled => ConversionError::Cancelled,
        af_core::Error::Tool { tool, message } if message.starts_with("failed to spawn") => {
            ConversionError::ToolMissing { tool, message }
        }
        af_core::Error::Tool { tool, message } => ConversionError::ToolFailed {
            tool,
            exit_code: None,
            stderr: message,
        },
        other => ConversionError::unclassified(other),
    }
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Ask ffprobe for the container duration of `input` in seconds.
///
/// Returns `None` when ffprobe is unavailable or reports nothing usable; the
/// banner `Duration:` line is used instead in that case.
pub async fn probe_duration(tools: &ToolRegistry, input: &Path) -> Option<f64> {
    let ffprobe = tools.get("ffprobe")?;

    let mut cmd = ToolCommand::new(ffprobe.path.clone());
    cmd.timeout(PROBE_TIMEOUT);
    cmd.args([
        "-v",
        "error",
        "-show_entries",
        "format=duration",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
    ]);
    cmd.arg(input.to_string_lossy().as_ref());

    match cmd.execute().await {
        Ok(output) => output
            .stdout
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|d| *d > 0.0),
        Err(e) => {
            tracing::debug!(input = %input.display(), "ffprobe duration lookup failed: {e}");
            None
        }
    }
}

/// Removes the `.part` file when dropped unless [`keep`](Self::keep) was
/// called. Covers early returns as well as a dropped conversion future.
struct PartFile {
    path: PathBuf,
    keep: bool,
}

impl PartFile {
    fn new(path: PathBuf) -> Self {
        Self { path, keep: false }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(&mut self) {
        self.keep = true;
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), "Failed to remove partial output: {e}");
            }
        }
    }
}

/// Convert `input` to `output` with ffmpeg according to `settings`.
///
/// `on_progress` receives non-decreasing fractions in `[0, 1]`. The output
/// only appears under its final name once ffmpeg succeeded. On failure,
/// cancellation, or when the returned future is dropped, the partial file
/// is removed.
pub async fn convert_audio(
    tools: &ToolRegistry,
    input: &Path,
    output: &Path,
    settings: &ConversionSettings,
    mut on_progress: impl FnMut(f32),
    cancel: Option<CancellationToken>,
) -> Result<(), ConversionError> {
    if !input.is_file() {
        return Err(ConversionError::InputMissing(input.display().to_string()));
    }
    if !is_supported_input(input) {
        let ext = input
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| "no extension".to_string());
        return Err(ConversionError::UnsupportedInput(ext));
    }

    let ffmpeg = tools
        .require("ffmpeg")
        .map_err(|e| ConversionError::ToolMissing {
            tool: "ffmpeg".to_string(),
            message: e.to_string(),
        })?;

    let duration = probe_duration(tools, input).await;
    let mut part = PartFile::new(part_path(output));

    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        settings = %settings.describe(),
        "Converting"
    );

    let mut cmd = ToolCommand::new(ffmpeg.path.clone());
    cmd.timeout(FFMPEG_TIMEOUT);
    cmd.args(ffmpeg_args(input, part.path(), settings));

    let mut parser = ProgressParser::new(duration);
    let run = cmd
        .execute_streaming(
            |line| {
                if let Some(fraction) = parser.feed(line) {
                    on_progress(fraction);
                }
            },
            cancel,
        )
        .await;

    let tool_output = match run {
        Ok(out) => out,
        Err(e) => return Err(tool_error_to_conversion(e)),
    };

    if !tool_output.status.success() {
        let err = classify_failure(input, tool_output.status.code(), &tool_output.stderr);
        tracing::debug!(input = %input.display(), kind = err.kind(), "ffmpeg failed");
        return Err(err);
    }

    if let Err(e) = tokio::fs::rename(part.path(), output).await {
        return Err(ConversionError::OutputWrite(format!(
            "{}: {e}",
            output.display()
        )));
    }
    part.keep();

    on_progress(1.0);
    Ok(())
}
