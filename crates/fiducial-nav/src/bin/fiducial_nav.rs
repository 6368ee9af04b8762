use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use fiducial_nav::replay::{load_frames, replay, write_csv};
use fiducial_nav::LocatorConfig;

#[cfg(not(feature = "tracing"))]
use log::LevelFilter;

#[cfg(not(feature = "tracing"))]
use log::info;
#[cfg(feature = "tracing")]
use tracing::info;

/// Camera positioning from recorded fiducial-marker detections.
#[derive(Parser, Debug)]
#[command(name = "fiducial-nav", author, version, about, long_about = None)]
struct Cli {
    /// Log level (`error`, `warn`, `info`, `debug`, `trace`). With the
    /// `tracing` feature, `RUST_LOG` is used instead.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay recorded detector output and print one position row per frame.
    Locate {
        /// Session config (markers, camera, stage parameters).
        #[arg(long, value_name = "FILE")]
        config: PathBuf,
        /// Recorded frames: `[{timestamp_s, markers: [{id, corners}]}]`.
        #[arg(long, value_name = "FILE")]
        frames: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,
        /// Write to this file instead of stdout.
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Validate a session config.
    CheckConfig {
        #[arg(long, value_name = "FILE")]
        config: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    #[cfg(not(feature = "tracing"))]
    {
        let level = fiducial_nav::core::parse_level(&cli.log_level).unwrap_or(LevelFilter::Warn);
        fiducial_nav::core::init_with_level(level)?;
    }
    #[cfg(feature = "tracing")]
    fiducial_nav::core::init_tracing(false);

    match cli.command {
        Command::Locate {
            config,
            frames,
            format,
            output,
        } => locate(&config, &frames, format, output.as_deref()),
        Command::CheckConfig { config } => check_config(&config),
    }
}

#[cfg_attr(feature = "tracing", tracing::instrument(level = "info", skip(format, output)))]
fn locate(
    config: &Path,
    frames: &Path,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut locator = LocatorConfig::load_json(config)?.build_locator()?;
    let frames = load_frames(frames)?;
    info!(
        "replaying {} frames against {} markers",
        frames.len(),
        locator.markers().len()
    );

    let rows = replay(&mut locator, &frames);
    let fused = rows.iter().filter(|r| r.fused().is_some()).count();
    info!("{fused}/{} frames produced a position", rows.len());

    let mut out: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(std::io::stdout().lock()),
    };
    match format {
        OutputFormat::Csv => write_csv(&rows, &mut out)?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, &rows)?;
            writeln!(out)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn check_config(config: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = LocatorConfig::load_json(config)?;
    cfg.validate()?;
    let camera = cfg.camera_model()?;
    println!("ok: {} markers, camera {}", cfg.markers.len(), camera.kind());
    Ok(())
}
