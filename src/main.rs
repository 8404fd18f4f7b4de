//! sciplane - detect, describe and extract planes from scientific images.

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use image::{ColorType, ImageFormat};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sciplane::{
    config::{Cli, Command, ExtractConfig, GlobalOptions},
    detect, ByteOrder, Engine, FileRangeReader, FormatError, PixelType, SampleBuffer,
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.options.verbose);

    if let Err(e) = cli.options.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let result = match &cli.command {
        Command::Detect { file } => run_detect(file),
        Command::Info { file } => run_info(file, &cli.options),
        Command::Extract(config) => run_extract(config, &cli.options),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Install the stderr subscriber. `RUST_LOG` overrides the default filter.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "sciplane=debug"
    } else {
        "sciplane=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// =============================================================================
// Detect Command
// =============================================================================

fn run_detect(file: &Path) -> Result<(), CliError> {
    let reader = FileRangeReader::open(file).map_err(FormatError::from)?;
    let kind = detect(&reader)?;
    println!("{}", kind);
    Ok(())
}

// =============================================================================
// Info Command
// =============================================================================

fn run_info(file: &Path, options: &GlobalOptions) -> Result<(), CliError> {
    let engine = open(file, options)?;
    let report = serde_json::json!({
        "source": engine.identifier(),
        "format": engine.format().name(),
        "decoder": engine.decoder_used(),
        "codec": engine.codec(),
        "series": engine.descriptors(),
        "metadata": engine.metadata(),
        "calibration": engine.calibration(),
    });
    let text = serde_json::to_string_pretty(&report).map_err(|e| CliError::Output(e.to_string()))?;
    println!("{}", text);
    engine.close();
    Ok(())
}

// =============================================================================
// Extract Command
// =============================================================================

fn run_extract(config: &ExtractConfig, options: &GlobalOptions) -> Result<(), CliError> {
    let engine = open(&config.file, options)?;
    let pixel_type = engine.descriptor(config.series)?.pixel_type;

    let buffer = engine.decode_plane(config.series, config.plane, config.region)?;
    let png_ok = matches!(buffer.channels, 1 | 3)
        && matches!(pixel_type, PixelType::Uint8 | PixelType::Uint16);

    if config.wants_raw() || !png_ok {
        let raw = engine.decode_plane_as(
            config.series,
            config.plane,
            config.region,
            ByteOrder::LittleEndian,
        )?;
        std::fs::write(&config.output, &raw.data).map_err(|e| CliError::Output(e.to_string()))?;
        info!(
            output = %config.output.display(),
            bytes = raw.len(),
            "wrote raw little-endian samples"
        );
    } else {
        write_png(&config.output, buffer)?;
        info!(output = %config.output.display(), "wrote PNG");
    }
    engine.close();
    Ok(())
}

fn write_png(path: &Path, buffer: SampleBuffer) -> Result<(), CliError> {
    let buffer = buffer.into_interleaved();
    let color = match (buffer.channels, buffer.bytes_per_sample) {
        (1, 1) => ColorType::L8,
        (1, 2) => ColorType::L16,
        (3, 1) => ColorType::Rgb8,
        (3, 2) => ColorType::Rgb16,
        (channels, bytes) => {
            return Err(CliError::Output(format!(
                "cannot write {} channels of {} bytes as PNG",
                channels, bytes
            )))
        }
    };
    image::save_buffer_with_format(
        path,
        &buffer.data,
        buffer.width,
        buffer.height,
        color,
        ImageFormat::Png,
    )
    .map_err(|e| CliError::Output(e.to_string()))
}

// =============================================================================
// Helpers
// =============================================================================

fn open(file: &Path, options: &GlobalOptions) -> Result<Engine<FileRangeReader>, CliError> {
    let reader = FileRangeReader::open(file).map_err(FormatError::from)?;
    Ok(Engine::open(reader, options.engine_options())?)
}

/// Failures surfaced by the driver.
#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Output error: {0}")]
    Output(String),
}
