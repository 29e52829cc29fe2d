//! `ask-reassemble`: decode an oversampled frame capture.
//!
//! Prints, one per line: the cleaned bitstream, the decoded byte list, the
//! payload text, and the stored and computed checksums.

use std::io::Read;
use std::process::ExitCode;

use ask4lane::consts::{FRAME_PREAMBLE, SAMPLES_PER_BIT};
use ask4lane::error::DecodeError;
use ask4lane::reassemble::{Reassembler, Reassembly};
use clap::{Parser, ValueEnum};
use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;

#[derive(Debug, Error)]
enum CliError {
    #[error("failed to read capture from stdin: {0}")]
    Stdin(#[from] std::io::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("no frame found in capture")]
    NotFound,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

fn init_logging(level: LogLevel) {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level.as_filter())
        .with_ansi(false)
        .with_target(false)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(name = "ask-reassemble", version, about = "Decode an oversampled 4b6b frame capture")]
struct Cli {
    /// Capture of '0'/'1' samples. Read from stdin when omitted.
    capture: Option<String>,

    /// Samples per transmitted bit.
    #[arg(long, value_name = "N", default_value_t = SAMPLES_PER_BIT, env = "ASK_SAMPLES_PER_BIT")]
    samples_per_bit: usize,

    /// Exit with status 2 when the checksums disagree.
    #[arg(long)]
    strict: bool,

    /// Search for the frame anywhere in a noisy, unaligned capture.
    #[arg(long)]
    scan: bool,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn")]
    log_level: LogLevel,
}

fn render(frame: &Reassembly) -> String {
    format!(
        "{}\n{:?}\n{}\n{} {}",
        frame.bitstream(),
        frame.bytes,
        frame.text(),
        frame.stored_checksum,
        frame.computed_checksum
    )
}

fn read_capture(capture: Option<&str>, mut stdin: impl Read) -> Result<String, CliError> {
    match capture {
        Some(capture) => Ok(capture.to_owned()),
        None => {
            let mut buf = String::new();
            let _ = stdin.read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn run(cli: &Cli) -> Result<Reassembly, CliError> {
    let reassembler = Reassembler::new(cli.samples_per_bit);
    let capture = read_capture(cli.capture.as_deref(), std::io::stdin())?;
    if cli.scan {
        reassembler
            .find_frame(&capture, &FRAME_PREAMBLE)?
            .ok_or(CliError::NotFound)
    } else {
        Ok(reassembler.reassemble(&capture)?)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    match run(&cli) {
        Ok(frame) => {
            println!("{}", render(&frame));
            if cli.strict && !frame.checksum_ok() {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
