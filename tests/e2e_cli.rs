//! CLI end-to-end tests
//!
//! Tests for the audioforge command-line interface. Conversion tests use a
//! shell script standing in for ffmpeg, so they only run on unix.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the audioforge binary
#[allow(deprecated)]
fn audioforge_cmd() -> Command {
    Command::cargo_bin("audioforge").unwrap()
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = audioforge_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = audioforge_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("audioforge"))
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = audioforge_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "audioforge {}",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_cli_convert_help() {
    let mut cmd = audioforge_cmd();
    cmd.args(["convert", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Convert files"))
        .stdout(predicate::str::contains("--workers"));
}

#[test]
fn test_cli_formats_lists_table() {
    let mut cmd = audioforge_cmd();
    cmd.arg("formats")
        .assert()
        .success()
        .stdout(predicate::str::contains("MP3"))
        .stdout(predicate::str::contains("64, 96, 128, 160, 192, 256, 320 kbps"))
        .stdout(predicate::str::contains("FLAC"))
        .stdout(predicate::str::contains("22050, 44100, 48000, 96000 Hz"));
}

#[test]
fn test_cli_presets_lists_presets() {
    let mut cmd = audioforge_cmd();
    cmd.arg("presets")
        .assert()
        .success()
        .stdout(predicate::str::contains("voice"))
        .stdout(predicate::str::contains("archive"));
}

#[test]
fn test_cli_check_tools_command() {
    let mut cmd = audioforge_cmd();
    cmd.arg("check-tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("ffmpeg"))
        .stdout(predicate::str::contains("ffprobe"));
}

#[test]
fn test_cli_validate_valid_config() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("audioforge.toml");
    fs::write(
        &config_file,
        r#"
[batch]
workers = 2
job_timeout_secs = 120

[defaults]
preset = "music"
"#,
    )
    .unwrap();

    let mut cmd = audioforge_cmd();
    cmd.args(["validate", config_file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("Workers: 2"))
        .stdout(predicate::str::contains("Job timeout: 120s"));
}

#[test]
fn test_cli_validate_reports_warnings() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("audioforge.toml");
    fs::write(&config_file, "[defaults]\npreset = \"nope\"\n").unwrap();

    let mut cmd = audioforge_cmd();
    cmd.args(["validate", config_file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("warning"))
        .stdout(predicate::str::contains("nope"));
}

#[test]
fn test_cli_validate_invalid_toml() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("audioforge.toml");
    fs::write(&config_file, "[batch\nworkers = ").unwrap();

    let mut cmd = audioforge_cmd();
    cmd.args(["validate", config_file.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config file"));
}

#[test]
fn test_cli_convert_nonexistent_input() {
    let temp = tempdir().unwrap();
    let mut cmd = audioforge_cmd();
    cmd.args(["convert", "/nonexistent/path/track.wav", "-o"])
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_cli_convert_requires_output_dir() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("a.wav");
    fs::write(&input, b"RIFF").unwrap();
    let config_file = temp.path().join("empty.toml");
    fs::write(&config_file, "").unwrap();

    let mut cmd = audioforge_cmd();
    cmd.args(["convert", "--config"])
        .arg(&config_file)
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No output directory"));
}

#[test]
fn test_cli_convert_rejects_invalid_settings() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("a.wav");
    fs::write(&input, b"RIFF").unwrap();

    let mut cmd = audioforge_cmd();
    cmd.args(["convert", "--format", "m4a", "--vbr", "2", "-o"])
        .arg(temp.path())
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid conversion settings"));
}

#[test]
fn test_cli_convert_only_unsupported_files() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("notes.txt");
    fs::write(&input, b"hello").unwrap();
    let out = temp.path().join("out");
    fs::create_dir(&out).unwrap();

    let mut cmd = audioforge_cmd();
    cmd.args(["convert", "-o"])
        .arg(&out)
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("supported extension"));
}

// ---------------------------------------------------------------------------
// Conversions through a stand-in ffmpeg
// ---------------------------------------------------------------------------

/// Write a fake ffmpeg that reports progress and writes its output file,
/// failing for any input whose path contains "bad".
#[cfg(unix)]
fn fake_ffmpeg(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.join("ffmpeg");
    fs::write(
        &script,
        r#"#!/bin/sh
prev=""
input=""
last=""
for arg; do
  if [ "$prev" = "-i" ]; then input="$arg"; fi
  prev="$arg"
  last="$arg"
done
if [ -z "$input" ]; then
  echo "ffmpeg version 0.0-test"
  exit 0
fi
case "$input" in
  *bad*)
    echo "$input: Invalid data found when processing input" >&2
    exit 1
    ;;
esac
echo "  Duration: 00:00:02.00, start: 0.000000" >&2
echo "out_time_us=1000000" >&2
echo "progress=continue" >&2
echo "progress=end" >&2
printf 'converted' > "$last"
"#,
    )
    .unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    script
}

#[cfg(unix)]
fn config_with_ffmpeg(dir: &Path, ffmpeg: &Path) -> PathBuf {
    let config_file = dir.join("audioforge.toml");
    fs::write(
        &config_file,
        format!(
            "[batch]\nworkers = 2\n\n[tools]\nffmpeg_path = {:?}\n",
            ffmpeg.to_str().unwrap()
        ),
    )
    .unwrap();
    config_file
}

#[cfg(unix)]
#[test]
fn test_cli_convert_directory_success() {
    let temp = tempdir().unwrap();
    let ffmpeg = fake_ffmpeg(temp.path());
    let config_file = config_with_ffmpeg(temp.path(), &ffmpeg);

    let music = temp.path().join("music");
    fs::create_dir_all(music.join("album")).unwrap();
    fs::write(music.join("a.wav"), b"RIFF").unwrap();
    fs::write(music.join("album/b.mp3"), b"ID3").unwrap();
    fs::write(music.join("album/cover.jpg"), b"JPEG").unwrap();
    let out = temp.path().join("out");
    fs::create_dir(&out).unwrap();

    let mut cmd = audioforge_cmd();
    cmd.args(["convert", "--config"])
        .arg(&config_file)
        .args(["--format", "flac", "-o"])
        .arg(&out)
        .arg(&music)
        .assert()
        .success()
        .stdout(predicate::str::contains("Converting 2 file(s)"))
        .stdout(predicate::str::contains("[100%] Completed 2 of 2 files"))
        .stdout(predicate::str::contains("2 succeeded, 0 failed"));

    assert_eq!(fs::read_to_string(out.join("a.flac")).unwrap(), "converted");
    assert_eq!(fs::read_to_string(out.join("b.flac")).unwrap(), "converted");
    assert!(!out.join("a.flac.part").exists());
}

#[cfg(unix)]
#[test]
fn test_cli_convert_partial_failure_exits_nonzero() {
    let temp = tempdir().unwrap();
    let ffmpeg = fake_ffmpeg(temp.path());
    let config_file = config_with_ffmpeg(temp.path(), &ffmpeg);

    let good = temp.path().join("good.wav");
    let bad = temp.path().join("bad.wav");
    fs::write(&good, b"RIFF").unwrap();
    fs::write(&bad, b"RIFF").unwrap();
    let out = temp.path().join("out");
    fs::create_dir(&out).unwrap();

    let mut cmd = audioforge_cmd();
    cmd.args(["convert", "--config"])
        .arg(&config_file)
        .arg("-o")
        .arg(&out)
        .arg(&good)
        .arg(&bad)
        .assert()
        .failure()
        .stdout(predicate::str::contains("1 succeeded, 1 failed"))
        .stdout(predicate::str::contains("corrupt input"));

    assert!(out.join("good.mp3").exists());
    assert!(!out.join("bad.mp3").exists());
    assert!(!out.join("bad.mp3.part").exists());
}

#[cfg(unix)]
#[test]
fn test_cli_convert_json_output() {
    let temp = tempdir().unwrap();
    let ffmpeg = fake_ffmpeg(temp.path());
    let config_file = config_with_ffmpeg(temp.path(), &ffmpeg);

    let input = temp.path().join("voice.m4a");
    fs::write(&input, b"ftyp").unwrap();
    let out = temp.path().join("out");
    fs::create_dir(&out).unwrap();

    let output = audioforge_cmd()
        .args(["convert", "--json", "--preset", "voice", "--config"])
        .arg(&config_file)
        .arg("-o")
        .arg(&out)
        .arg(&input)
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["completed"], 1);
    assert_eq!(json["failed"], 0);
    assert_eq!(json["outcomes"][0]["status"], "completed");
    assert!(json["outcomes"][0]["output"]
        .as_str()
        .unwrap()
        .ends_with("voice.mp3"));
}
