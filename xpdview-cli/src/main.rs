//! xpdview CLI - Command-line interface for diffraction data directories.
//!
//! Loads a directory of detector images and integrated patterns and
//! prints or writes the derived views: reduced representations, peak
//! positions and the waterfall.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use clap::{ArgAction, Parser, Subcommand};

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use xpdview_algorithms::OffsetMode;
use xpdview_core::Roi;
use xpdview_io::{scan_layout, ResultWriter, Session, SessionConfig};

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Xpdview(#[from] xpdview_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] xpdview_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ROI needs four values: X0 X1 Y0 Y1")]
    RoiArity,

    #[error("invalid poll interval {0}: expected a positive number of seconds")]
    Interval(f64),
}

/// Live viewer tools for X-ray powder diffraction data directories.
#[derive(Parser)]
#[command(name = "xpdview")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Session configuration (JSON); missing fields take their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the exposures of a directory and their paired patterns
    Info {
        /// Data directory
        directory: PathBuf,
    },

    /// Reduce every image of a directory to one value over an ROI
    Reduce {
        /// Data directory
        directory: PathBuf,

        /// Region of interest as X0 X1 Y0 Y1 (half-open); full image if omitted
        #[arg(long, num_args = 4, value_names = ["X0", "X1", "Y0", "Y1"])]
        roi: Option<Vec<usize>>,

        /// Statistic to apply
        #[arg(short, long, default_value = "sum")]
        statistic: String,

        /// Number of reduction workers (default: one per CPU)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Output CSV file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the series as JSON instead of CSV
        #[arg(long)]
        json: bool,
    },

    /// Find peak positions in every pattern of a directory
    Peaks {
        /// Data directory
        directory: PathBuf,

        /// Neighborhood half-width
        #[arg(long)]
        order: Option<usize>,

        /// Shoulder distance for the peak filter
        #[arg(long)]
        sides: Option<usize>,

        /// Minimum peak height for the peak filter
        #[arg(long)]
        threshold: Option<f64>,

        /// Output CSV file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the peaks as JSON instead of CSV
        #[arg(long)]
        json: bool,
    },

    /// Dump the offset waterfall curves of a directory as JSON
    Waterfall {
        /// Data directory
        directory: PathBuf,

        /// Horizontal offset per curve
        #[arg(long)]
        x_offset: Option<f64>,

        /// Vertical offset per curve
        #[arg(long)]
        y_offset: Option<f64>,

        /// Use raw intensities instead of min-max normalized curves
        #[arg(long)]
        raw: bool,

        /// Scale offsets by the largest curve span
        #[arg(long)]
        range_offsets: bool,

        /// Output JSON file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Poll a directory and report new exposures as they arrive
    Watch {
        /// Data directory
        directory: PathBuf,

        /// Seconds between polls
        #[arg(long, default_value = "2.0")]
        interval: f64,

        /// Track a reduced representation over this ROI (X0 X1 Y0 Y1)
        #[arg(long, num_args = 4, value_names = ["X0", "X1", "Y0", "Y1"])]
        roi: Option<Vec<usize>>,

        /// Statistic for the tracked ROI
        #[arg(short, long, default_value = "sum")]
        statistic: String,

        /// Refresh once and exit
        #[arg(long)]
        once: bool,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_config(path: Option<&Path>) -> Result<SessionConfig> {
    match path {
        Some(path) => {
            log::info!("using configuration {}", path.display());
            Ok(SessionConfig::load_json(path)?)
        }
        None => Ok(SessionConfig::default()),
    }
}

fn parse_roi(values: &[usize]) -> Result<Roi> {
    match values {
        &[x0, x1, y0, y1] => Ok(Roi::new(x0, x1, y0, y1)),
        _ => Err(CliError::RoiArity),
    }
}

/// Pause between polls; sub-100 ms intervals are raised to 100 ms.
fn poll_interval(seconds: f64) -> Result<Duration> {
    if seconds.is_nan() || seconds <= 0.0 {
        return Err(CliError::Interval(seconds));
    }
    Duration::try_from_secs_f64(seconds.max(0.1)).map_err(|_| CliError::Interval(seconds))
}

/// ROI from the command line, or the full first image.
fn roi_or_full(session: &Session, values: Option<&[usize]>) -> Result<Roi> {
    if let Some(values) = values {
        return parse_roi(values);
    }
    let frame = session
        .frame(0)
        .ok_or(xpdview_core::Error::EmptyInput("images"))?;
    let (rows, cols) = frame.image.dim();
    Ok(Roi::full(rows, cols))
}

fn csv_writer(output: Option<&Path>) -> Result<ResultWriter<Box<dyn Write>>> {
    let inner: Box<dyn Write> = match output {
        Some(path) => Box::new(std::fs::File::create(path)?),
        None => Box::new(io::stdout()),
    };
    Ok(ResultWriter::new(inner))
}

fn json_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match output {
        Some(path) => Box::new(io::BufWriter::new(std::fs::File::create(path)?)),
        None => Box::new(io::stdout()),
    })
}

fn open_session(config: SessionConfig, directory: &Path) -> Result<Session> {
    let start = Instant::now();
    let mut session = Session::new(config)?;
    let report = session.set_directory(directory)?;
    log::info!(
        "loaded {} images, {} patterns in {:.2?}",
        report.new_images.len(),
        report.new_patterns.len(),
        start.elapsed()
    );
    Ok(session)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Info { directory } => {
            let layout = scan_layout(&directory, &config.pairing_rule())?;
            println!("Directory: {}", layout.directory.display());
            println!(
                "Exposures: {} ({} with .{} patterns)",
                layout.exposures.len(),
                layout.paired(),
                config.pattern_extension
            );
            if let Some(units) = layout.units {
                println!("Axes: {} / {}", units.x, units.y);
            }
            println!();
            println!("{:<40} Pattern", "Image");
            println!("{:-<65}", "");
            for entry in &layout.exposures {
                let pattern = entry
                    .pattern
                    .as_ref()
                    .and_then(|p| p.file_name())
                    .map_or_else(|| "-".to_string(), |n| n.to_string_lossy().into_owned());
                println!("{:<40} {}", entry.key.as_str(), pattern);
            }
        }

        Commands::Reduce {
            directory,
            roi,
            statistic,
            workers,
            output,
            json,
        } => {
            let config = match workers {
                Some(workers) => config.try_with_workers(workers)?,
                None => config,
            };
            let mut session = open_session(config, &directory)?;
            let roi = roi_or_full(&session, roi.as_deref())?;

            let start = Instant::now();
            let id = session.add_reduction(roi, &statistic)?;
            log::info!("reduced '{}' over {} in {:.2?}", statistic, roi, start.elapsed());

            let series = session
                .reduction(id)
                .ok_or(xpdview_core::Error::EmptyInput("reduction"))?;
            if json {
                let mut out = json_writer(output.as_deref())?;
                serde_json::to_writer_pretty(&mut out, series)?;
                writeln!(out)?;
            } else {
                let mut writer = csv_writer(output.as_deref())?;
                writer.write_series_csv(series, &session.exposure_keys())?;
            }
        }

        Commands::Peaks {
            directory,
            order,
            sides,
            threshold,
            output,
            json,
        } => {
            let order = order.unwrap_or(config.peak_order);
            let sides = sides.unwrap_or(config.peak_sides);
            let threshold = threshold.or(config.peak_threshold);
            let config = config.try_with_peaks(order, sides, threshold)?;
            let session = open_session(config, &directory)?;
            if !session.pending().is_empty() {
                log::warn!(
                    "{} exposures have no pattern and were skipped",
                    session.pending().len()
                );
            }

            if json {
                let mut out = json_writer(output.as_deref())?;
                serde_json::to_writer_pretty(&mut out, session.peaks())?;
                writeln!(out)?;
            } else {
                let mut writer = csv_writer(output.as_deref())?;
                writer.write_peaks_csv(session.peaks())?;
            }
        }

        Commands::Waterfall {
            directory,
            x_offset,
            y_offset,
            raw,
            range_offsets,
            output,
        } => {
            let x_offset = x_offset.unwrap_or(config.x_offset);
            let y_offset = y_offset.unwrap_or(config.y_offset);
            let mut config = config.with_offsets(x_offset, y_offset);
            if raw {
                config = config.with_normalized(false);
            }
            if range_offsets {
                config = config.with_offset_mode(OffsetMode::Range);
            }
            let session = open_session(config, &directory)?;

            let curves = session.waterfall_curves();
            if curves.is_empty() {
                log::warn!("no patterns in {}", directory.display());
            }
            let mut out = json_writer(output.as_deref())?;
            serde_json::to_writer_pretty(&mut out, &curves)?;
            writeln!(out)?;
        }

        Commands::Watch {
            directory,
            interval,
            roi,
            statistic,
            once,
        } => {
            let pause = poll_interval(interval)?;
            let mut session = open_session(config, &directory)?;
            println!(
                "Watching {} ({} images, {} patterns)",
                directory.display(),
                session.exposure_keys().len(),
                session.patterns().len()
            );

            let plot = match roi.as_deref() {
                Some(values) => Some(session.add_reduction(parse_roi(values)?, &statistic)?),
                None => None,
            };

            loop {
                if !once {
                    thread::sleep(pause);
                }
                let report = match session.refresh() {
                    Ok(report) => report,
                    Err(e) => {
                        log::warn!("refresh failed, retrying: {}", e);
                        if once {
                            return Err(e.into());
                        }
                        continue;
                    }
                };

                for key in &report.new_images {
                    println!("+ image {}", key);
                }
                for key in &report.new_patterns {
                    println!("+ pattern {}", key);
                }
                if report.new_peaks > 0 {
                    println!("  {} new peaks", report.new_peaks);
                }
                for path in &report.skipped {
                    println!("! skipped {}", path.display());
                }
                if let Some(series) = plot.and_then(|id| session.reduction(id)) {
                    let first = series.len().saturating_sub(report.new_images.len());
                    for (frame, value) in series.points().skip(first) {
                        println!("  {}[{}] = {}", series.label, frame, value);
                    }
                }

                if once {
                    break;
                }
            }
        }
    }

    Ok(())
}
