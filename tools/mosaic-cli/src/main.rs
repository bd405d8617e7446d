//! Mosaic CLI — redact faces and license plates from images and video.
//!
//! Usage:
//!   mosaic process --input <IMG>             Print `<all>---SPLIT---<faces_only>` to stdout
//!   mosaic anonymize <image|video> <IN> <OUT> Write a redacted copy of an image or video
//!   mosaic check                             Check ffmpeg and detector availability

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mosaic_common::config::AppConfig;
use mosaic_common::error::MosaicError;

mod commands;

use commands::{DetectArgs, MediaMode};

#[derive(Parser)]
#[command(
    name = "mosaic",
    about = "Redact faces and license plates from images and video",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    /// Configuration file (defaults to $XDG_CONFIG_HOME/mosaic/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect and redact one image, printing both encoded variants
    Process {
        /// Input image
        #[arg(short, long)]
        input: PathBuf,

        /// Write the metadata document here
        #[arg(long)]
        output_meta: Option<PathBuf>,

        #[command(flatten)]
        detect: DetectArgs,
    },

    /// Write a redacted copy of an image or video
    Anonymize {
        /// Media kind
        #[arg(value_enum)]
        mode: MediaMode,

        /// Source file
        input: PathBuf,

        /// Destination file
        output: PathBuf,

        #[command(flatten)]
        detect: DetectArgs,
    },

    /// Check system capabilities
    Check {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let base = match &cli.command {
        Commands::Anonymize { .. } => commands::anonymize::base_config(),
        _ => AppConfig::default(),
    };

    let (config, config_error) = match resolve_config(cli.config.as_deref(), base) {
        Ok(resolved) => resolved,
        Err(e) => return report(&anyhow::Error::new(e)),
    };

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    logging.json |= cli.json_logs;
    mosaic_common::logging::init_logging(&logging);

    if let Some(e) = config_error {
        tracing::warn!(
            path = %mosaic_common::config::config_file_path().display(),
            error = %e,
            "Ignoring config file; using defaults"
        );
    }

    let result = match cli.command {
        Commands::Process {
            input,
            output_meta,
            detect,
        } => commands::process::run(input, output_meta, detect, config),
        Commands::Anonymize {
            mode,
            input,
            output,
            detect,
        } => commands::anonymize::run(mode, input, output, detect, config),
        Commands::Check { json } => commands::check::run(json, config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(&e),
    }
}

/// The config to run with, plus a load error to report once logging is up.
///
/// An explicit path must load. A broken default file falls back to `base`.
fn resolve_config(
    explicit: Option<&Path>,
    base: AppConfig,
) -> Result<(AppConfig, Option<MosaicError>), MosaicError> {
    match explicit {
        Some(path) => Ok((AppConfig::load_from_over(path, base)?, None)),
        None => Ok(match AppConfig::load_over(base.clone()) {
            Ok(config) => (config, None),
            Err(e) => (base, Some(e)),
        }),
    }
}

/// Print one diagnostic line and pick the exit status.
fn report(err: &anyhow::Error) -> ExitCode {
    eprintln!("mosaic: {err:#}");
    ExitCode::from(exit_code(err))
}

/// 2 when the input could not be read, 1 for everything else.
fn exit_code(err: &anyhow::Error) -> u8 {
    let unreadable = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<MosaicError>())
        .any(MosaicError::is_source_unreadable);
    if unreadable {
        2
    } else {
        1
    }
}
