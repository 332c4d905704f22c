mod cli;

use audioforge::{config, console, scan};

use af_av::ToolRegistry;
use af_batch::{BatchOrchestrator, BatchRequest, FanoutSink, FfmpegConverter, TracingSink};
use af_core::config::{Config, DefaultsConfig};
use af_core::events::EventBus;
use af_core::settings::{BitrateMode, ConversionSettings, OutputFormat, VBR_QUALITY_LABELS};
use af_core::{presets, SampleRate};
use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, ConvertArgs};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "audioforge=debug,af_batch=debug,af_av=debug,af_core=debug".to_string()
        } else {
            "audioforge=info,af_batch=warn,af_av=warn,af_core=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Convert(args) => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(convert(args, config))
        }
        Commands::Formats => print_formats().map(|()| ExitCode::SUCCESS),
        Commands::Presets => print_presets().map(|()| ExitCode::SUCCESS),
        Commands::CheckTools => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            check_tools(&config)
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("audioforge {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Merge command-line overrides onto the configured defaults.
fn resolve_settings(args: &ConvertArgs, defaults: &DefaultsConfig) -> Result<ConversionSettings> {
    // A preset on the command line replaces the configured defaults entirely.
    let mut merged = match &args.preset {
        Some(name) => DefaultsConfig {
            preset: Some(name.clone()),
            ..DefaultsConfig::default()
        },
        None => defaults.clone(),
    };

    if let Some(format) = args.format {
        merged.format = Some(format);
    }
    if let Some(bitrate) = args.bitrate {
        merged.bitrate_mode = Some(BitrateMode::Constant);
        merged.bitrate = Some(bitrate);
    }
    if let Some(q) = args.vbr {
        merged.bitrate_mode = Some(BitrateMode::Variable);
        merged.vbr_quality = Some(q);
    }
    if let Some(hz) = args.sample_rate {
        merged.sample_rate = Some(SampleRate::try_from(hz)?);
    }
    if let Some(channels) = args.channels {
        merged.channels = Some(channels);
    }

    let mut settings = merged.settings()?;
    if let Some(index) = args.quality {
        settings = settings.with_quality_index(index)?;
        settings.validate()?;
    }
    Ok(settings)
}

async fn convert(args: ConvertArgs, config: Config) -> Result<ExitCode> {
    let settings = resolve_settings(&args, &config.defaults).context("Invalid conversion settings")?;

    let output_dir: PathBuf = args
        .output
        .clone()
        .or_else(|| config.defaults.output_dir.clone())
        .context("No output directory given; use --output or set defaults.output_dir")?;

    let files = scan::collect_inputs(&args.inputs)?;
    let request = BatchRequest::new(&output_dir, settings).inputs(files);
    for skipped in request.skipped() {
        tracing::warn!("Skipping unsupported file: {}", skipped.display());
    }
    let jobs = request.build().context("Cannot start batch")?;

    let tools = ToolRegistry::discover(&config.tools);
    let converter = FfmpegConverter::new(Arc::new(tools));
    converter
        .check()
        .context("ffmpeg is required for conversion; run `audioforge check-tools`")?;

    let mut orchestrator = BatchOrchestrator::from_config(Arc::new(converter), &config.batch);
    if let Some(workers) = args.workers {
        orchestrator = orchestrator.with_workers(workers);
    }
    if let Some(secs) = args.timeout {
        orchestrator = orchestrator.with_job_timeout((secs > 0).then(|| Duration::from_secs(secs)));
    }

    if !args.json {
        println!(
            "Converting {} file(s) to {} with {} worker(s) -> {}",
            jobs.len(),
            request.settings().describe(),
            orchestrator.workers(),
            output_dir.display()
        );
    }

    // Ctrl-C cancels the batch; jobs still resolve and are reported.
    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling batch...");
            cancel.cancel();
        }
    });

    let bus = Arc::new(EventBus::default());
    let printer = (!args.json).then(|| tokio::spawn(console::print_events(bus.subscribe())));
    let sink = FanoutSink::new().with(bus.clone()).with(Arc::new(TracingSink));

    let result = orchestrator
        .run(jobs, Arc::new(sink))
        .await
        .context("Cannot start batch")?;

    if let Some(printer) = printer {
        let _ = printer.await;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", console::render_summary(&result));
    }

    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_formats() -> Result<()> {
    for format in OutputFormat::ALL {
        let spec = format.spec();
        println!("{} ({})", format.extension().to_uppercase(), spec.description);

        if spec.bitrates.is_empty() {
            println!("  Bitrate:      lossless");
        } else {
            let rates: Vec<String> = spec.bitrates.iter().map(|b| b.to_string()).collect();
            println!(
                "  Bitrates:     {} kbps (default {})",
                rates.join(", "),
                spec.default_bitrate.map(|b| b.to_string()).unwrap_or_default()
            );
        }
        if !spec.quality_ladder.is_empty() {
            let ladder: Vec<String> = spec
                .quality_ladder
                .iter()
                .map(|l| format!("{} {}", l.label, l.bitrate))
                .collect();
            println!("  Quality:      {}", ladder.join(" / "));
        }
        if spec.supports_vbr {
            println!("  VBR:          0-5 ({})", VBR_QUALITY_LABELS.join(", "));
        }
        let rates: Vec<String> = spec.sample_rates.iter().map(|r| r.to_string()).collect();
        println!("  Sample rates: {} Hz", rates.join(", "));
        println!();
    }
    Ok(())
}

fn print_presets() -> Result<()> {
    for preset in presets::all() {
        println!("{:<10} {}", preset.name, preset.display_name);
        println!("           {}", preset.description);
        println!("           {}", preset.settings.describe());
    }
    Ok(())
}

fn check_tools(config: &Config) -> Result<ExitCode> {
    println!("Checking external tools...\n");

    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut ffmpeg_ok = false;

    for tool in &tools {
        let status = if tool.available { "✓" } else { "✗" };
        if tool.name == "ffmpeg" && tool.available {
            ffmpeg_ok = true;
        }

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if ffmpeg_ok {
        println!("ffmpeg is available; conversions can run.");
    } else {
        println!("ffmpeg is missing. Install it or set tools.ffmpeg_path in the config.");
    }

    Ok(ExitCode::SUCCESS)
}

fn validate_config(path: Option<&Path>) -> Result<ExitCode> {
    let (label, config) = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            (p.display().to_string(), config::load_config(p)?)
        }
        None => match config::find_default_config() {
            Some(p) => {
                println!("Validating config: {:?}", p);
                let config = config::load_config(&p)?;
                (p.display().to_string(), config)
            }
            None => {
                println!("No config file found, using defaults");
                ("defaults".to_string(), Config::default())
            }
        },
    };

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✓ Configuration is valid ({label})");
    } else {
        println!("⚠ Configuration has {} warning(s):", warnings.len());
        for warning in &warnings {
            println!("  - {warning}");
        }
    }

    println!("  Workers: {}", config.batch.effective_workers());
    match config.batch.job_timeout() {
        Some(limit) => println!("  Job timeout: {}s", limit.as_secs()),
        None => println!("  Job timeout: none"),
    }
    if let Ok(settings) = config.defaults.settings() {
        println!("  Default settings: {}", settings.describe());
    }
    if let Some(ref dir) = config.defaults.output_dir {
        println!("  Output directory: {}", dir.display());
    }

    Ok(ExitCode::SUCCESS)
}
