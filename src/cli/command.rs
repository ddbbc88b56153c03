use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ncfod ",
    env!("CFOD_VERSION"),
    "\nbuilt ",
    env!("BUILD_TIMESTAMP"),
);

#[derive(Debug, ClapParser)]
#[command(
    name         = env!("CARGO_PKG_NAME"),
    version      = env!("CARGO_PKG_VERSION"),
    long_version = LONG_VERSION,
    author       = env!("CARGO_PKG_AUTHORS"),
    about        = "Tools for inspecting CHIME/FRB intensity chunks and converting them to filterbank files",
    long_about   = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on first warning).
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Convert msgpack intensity chunks into a sigproc filterbank file.
    Convert(ConvertArgs),

    /// Print chunk information
    Info(InfoArgs),
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Glob for the observation msgpack files (quote it to keep the shell out).
    #[arg(long, value_name = "GLOB", default_value = "./*.msgpack")]
    pub obsglob: String,

    /// Filterbank file name; ".fil" is appended when missing.
    #[arg(short, long, value_name = "PATH", default_value = "chimefrb.fil")]
    pub outfile: PathBuf,

    /// Frequency scrunch factor, a power of 2 up to 16384.
    #[arg(long, value_name = "FACTOR", default_value_t = 4)]
    pub fscrunch: usize,

    /// Dedisperse the channels within each subband to this DM (pc cm^-3)
    /// before scrunching. The file itself stays at DM 0.
    #[arg(long, value_name = "DM")]
    pub subdm: Option<f64>,

    /// Source name for the filterbank header.
    #[arg(long, default_value = "CHIME/FRB candidate")]
    pub source: String,

    /// Available memory in bytes, used to size the file batches (8e9 for 8 GB).
    #[arg(long, value_name = "BYTES", default_value_t = 8e9)]
    pub ram: f64,

    /// Bits per filterbank sample.
    #[arg(long, value_parser = parse_nbits, default_value_t = 32)]
    pub nbits: u32,

    /// Repeat coarsely binned chunks up to the finest binning instead of
    /// rejecting mixed binning.
    #[arg(long)]
    pub upsample: bool,

    /// Threads used to decode chunk files.
    #[arg(long, short = 'j', value_name = "N", default_value_t = 1)]
    pub jobs: usize,
}

fn parse_nbits(s: &str) -> Result<u32, String> {
    match s.parse::<u32>() {
        Ok(n @ (32 | 16 | 8)) => Ok(n),
        _ => Err(format!("must be 32, 16 or 8, got {s}")),
    }
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Input msgpack files.
    #[arg(value_name = "INPUT", required_unless_present = "obsglob")]
    pub inputs: Vec<PathBuf>,

    /// Glob for input files, used instead of explicit paths.
    #[arg(long, value_name = "GLOB", conflicts_with = "inputs")]
    pub obsglob: Option<String>,

    /// Print a YAML summary list instead of text.
    #[arg(long)]
    pub yaml: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

impl Cli {
    /// Level at which library diagnostics become errors.
    pub fn fail_level(&self) -> log::Level {
        if self.strict {
            log::Level::Warn
        } else {
            log::Level::Error
        }
    }
}
