//! capgif command-line interface.
//!
//! Records a monitor (or part of one) for a fixed duration and writes the
//! result as an animated GIF.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use capgif::capture::{list_monitors, Rectangle, ScreenSource};
use capgif::config::Config;
use capgif::recording::{PngStore, Recorder};

/// capgif - record the screen into animated GIFs
#[derive(Parser, Debug)]
#[command(name = "capgif")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available monitors
    Monitors,
    /// Record the screen into a GIF
    Record(RecordOptions),
}

#[derive(Parser, Debug, Clone)]
struct RecordOptions {
    /// Output file path (overrides configured output directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Recording length in seconds
    #[arg(short, long)]
    duration: Option<f64>,

    /// Maximum frames per second
    #[arg(long)]
    fps: Option<f64>,

    /// Monitor ID (use 'capgif monitors' to find)
    #[arg(short, long)]
    monitor: Option<u32>,

    /// Capture only this area of the monitor, as X,Y,WIDTH,HEIGHT
    #[arg(long, value_parser = parse_region)]
    region: Option<Rectangle>,
}

fn parse_region(value: &str) -> Result<Rectangle, String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let [x, y, width, height] = parts.as_slice() else {
        return Err("expected X,Y,WIDTH,HEIGHT".to_string());
    };
    let region = Rectangle::new(
        x.parse().map_err(|e| format!("bad x: {}", e))?,
        y.parse().map_err(|e| format!("bad y: {}", e))?,
        width.parse().map_err(|e| format!("bad width: {}", e))?,
        height.parse().map_err(|e| format!("bad height: {}", e))?,
    );
    if region.width == 0 || region.height == 0 {
        return Err("region must not be empty".to_string());
    }
    Ok(region)
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let result = match cli.command {
        Commands::Monitors => cmd_monitors(),
        Commands::Record(options) => cmd_record(options),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn cmd_monitors() -> Result<()> {
    let monitors = list_monitors()?;
    if monitors.is_empty() {
        println!("No monitors found.");
        return Ok(());
    }
    for m in monitors {
        let primary = if m.is_primary { " (primary)" } else { "" };
        println!(
            "{:>4}  {}x{} at {},{}  {}{}",
            m.id, m.width, m.height, m.x, m.y, m.name, primary
        );
    }
    Ok(())
}

fn cmd_record(options: RecordOptions) -> Result<()> {
    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("failed to load config, using defaults: {:#}", e);
        Config::default()
    });

    let max_duration = f64::from(config.recording.max_duration_secs);
    let seconds = options.duration.unwrap_or(max_duration);
    if !seconds.is_finite() || seconds <= 0.0 || seconds > max_duration {
        return Err(anyhow!("duration must be between 0 and {} seconds", max_duration));
    }

    let output = match options.output {
        Some(path) => path,
        None => {
            config.ensure_output_dir()?;
            config.output_path()
        }
    };

    let mut source = match options.monitor.or(config.recording.monitor) {
        Some(id) => ScreenSource::with_monitor(id)?,
        None => ScreenSource::new(),
    };
    if let Some(region) = options.region {
        source = source.with_region(region);
    }
    let info = source.monitor_info()?;
    tracing::info!("recording monitor {} ({}x{})", info.name, info.width, info.height);

    let settings = config.recorder_settings(options.fps);
    let recorder = Recorder::new(source, PngStore, settings).context("failed to set up recorder")?;

    recorder.start()?;
    println!("Recording for {:.1}s...", seconds);
    thread::sleep(Duration::from_secs_f64(seconds));
    recorder.stop();

    let summary = recorder
        .export(&output)
        .with_context(|| format!("failed to export {}", output.display()))?;
    println!(
        "Saved {} ({} frames written, {} skipped)",
        output.display(),
        summary.written,
        summary.skipped
    );
    Ok(())
}
