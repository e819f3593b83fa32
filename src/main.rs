//! Convert an xtc trajectory into plain-text xyz frames, named after a gro structure file.
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use log::debug;
use thiserror::Error;
use xtcxyz::{ConversionReport, ConvertError, TrajectoryConverter, DEFAULT_CREDIT, DEFAULT_OUTPUT};

/// Write the frames of an xtc trajectory as plain-text xyz blocks.
///
/// Positions are converted from nanometers to angstrom. Atom names are taken from columns 13-15 of
/// the structure file, which must have exactly as many atoms as the trajectory.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Structure file (gro) providing the atom names.
    structure: PathBuf,

    /// Trajectory file (xtc).
    trajectory: PathBuf,

    /// Number of frames to write. If omitted, it is asked for interactively.
    ///
    /// Asking for more frames than the trajectory holds writes all of its frames.
    #[arg(short = 'n', long)]
    frames: Option<usize>,

    /// Output path. An existing file is overwritten.
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Name credited at the end of every frame header.
    #[arg(long, default_value = DEFAULT_CREDIT)]
    credit: String,

    /// Verbosity level (-v for info, -vv for debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Do not print progress.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error("failed to read the number of frames: {0}")]
    Prompt(#[from] io::Error),

    #[error("invalid number of frames '{0}'")]
    FrameCount(String),
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // Usage goes to stderr, help and version to stdout.
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    let log_level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match run(&args) {
        Ok(report) => {
            if !args.quiet && report.written > 0 {
                eprintln!();
            }
            if !report.is_complete() {
                eprintln!(
                    "trajectory ended after {} of {} requested frames",
                    report.written, report.requested
                );
            }
            println!("Data written to {}", args.output.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<ConversionReport, CliError> {
    let converter = TrajectoryConverter::open(&args.structure, &args.trajectory, &args.output)?;
    debug!("{} atoms match between structure and trajectory", converter.natoms());

    let nframes = match args.frames {
        Some(n) => n,
        None => prompt_frame_count(io::stdin().lock(), io::stdout())?,
    };

    let quiet = args.quiet;
    let report =
        converter.write_frames_with_progress(nframes, &args.credit, |idx, total| {
            if !quiet {
                eprint!("\rReading frame no: {idx} / {total}");
                let _ = io::stderr().flush();
            }
        })?;
    Ok(report)
}

fn prompt_frame_count(mut input: impl BufRead, mut output: impl Write) -> Result<usize, CliError> {
    write!(output, "Enter number of Frames needed: ")?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let line = line.trim();
    line.parse()
        .map_err(|_| CliError::FrameCount(line.to_string()))
}
