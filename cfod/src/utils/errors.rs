use std::path::PathBuf;

#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

/// Top-level error returned by the file-based read API.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    #[error(transparent)]
    Assemble(#[from] AssembleError),
}

impl Error {
    /// Path of the file that failed, if the error belongs to a single file.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Error::Io { path, .. } | Error::Format { path, .. } => Some(path),
            Error::Assemble(_) => None,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    #[error("Container is not a msgpack array: {0}")]
    Container(String),

    #[error("{0} trailing bytes after the container array")]
    TrailingBytes(usize),

    #[error("Unsupported container version {0}")]
    UnsupportedVersion(u64),

    #[error("Container version {version} must have {expected} fields, found {found}")]
    FieldCount {
        version: u64,
        expected: usize,
        found: usize,
    },

    #[error("Field {index} ({name}) must be {expected}, found {found}")]
    FieldType {
        index: usize,
        name: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid {name} = {value}: {reason}")]
    InvalidField {
        name: &'static str,
        value: u64,
        reason: &'static str,
    },

    #[error("Compressed payloads are not supported (compressed_size = {0})")]
    Compressed(u64),

    #[error("Bit depth must be 1, 2, 4 or 8. Read {0}")]
    InvalidBitDepth(u64),

    #[error("{name} declares {declared} bytes but {actual} are present")]
    SizeMismatch {
        name: &'static str,
        declared: u64,
        actual: usize,
    },

    #[error(
        "Payload of {actual} bytes does not hold {channels}x{samples} samples at {bits} bits (expected {expected} bytes)"
    )]
    PayloadSize {
        channels: usize,
        samples: usize,
        bits: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Padding bits after the last sample are not zero ({0:#04X})")]
    NonZeroPadding(u8),

    #[error(
        "{name} table of {rows}x{cols} blocks of {channel_factor}x{sample_factor} does not cover a {channels}x{samples} grid"
    )]
    ScaleShape {
        name: &'static str,
        rows: usize,
        cols: usize,
        channel_factor: usize,
        sample_factor: usize,
        channels: usize,
        samples: usize,
    },

    #[error("Sentinel value {value} exceeds the {bits}-bit sample range")]
    SentinelOutOfRange { value: u8, bits: usize },

    #[error("Unexpected container header {0:?}")]
    UnexpectedHeader(String),

    #[error("fpga_counts_per_sample = {found} differs from the instrument value {expected}")]
    FpgaCountsMismatch { found: u64, expected: u64 },

    #[error("RFI mask carries {0} bytes while has_rfi_mask is false")]
    UnflaggedRfiMask(usize),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

#[derive(thiserror::Error, Debug)]
pub enum AssembleError {
    #[error("No input files to assemble")]
    EmptyBatch,

    #[error("Channel count mismatch in {}: expected {expected}, found {found}", path.display())]
    ChannelMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("Bit depth mismatch in {}: expected {expected}, found {found}", path.display())]
    BitDepthMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("RFI mask height mismatch in {}: expected {expected}, found {found}", path.display())]
    RfiMaskMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error(
        "Mixed binning in {}: expected {expected}, found {found} (downsampling is not supported)",
        path.display()
    )]
    BinningMismatch {
        path: PathBuf,
        expected: u64,
        found: u64,
    },

    #[error("Binning {found} in {} is not a multiple of the finest binning {finest}", path.display())]
    IncompatibleBinning {
        path: PathBuf,
        finest: u64,
        found: u64,
    },

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}
