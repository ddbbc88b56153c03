use std::path::Path;

use log::{Level, debug};

use crate::log_or_err;
use crate::structs::chunk::{AssembledChunk, CHUNK_HEADER};
use crate::structs::field::read_fields;
use crate::utils::errors::{Error, FormatError};
use crate::utils::instrument::FPGA_COUNTS_PER_SAMPLE;

/// Reads assembled-chunk containers.
///
/// Structural problems are always errors. Anomalies that leave the chunk
/// decodable are reported at [`Level::Warn`] and become errors once the
/// fail level is raised to `Warn`.
#[derive(Debug, Clone)]
pub struct Decoder {
    pub(crate) fail_level: Level,
}

impl Default for Decoder {
    fn default() -> Self {
        Self {
            fail_level: Level::Error,
        }
    }
}

impl Decoder {
    pub fn set_fail_level(&mut self, level: Level) {
        self.fail_level = level;
    }

    pub fn fail_level(&self) -> Level {
        self.fail_level
    }

    /// Decodes the container held in `bytes`.
    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<AssembledChunk, FormatError> {
        let chunk = AssembledChunk::from_fields(read_fields(bytes)?)?;

        if chunk.header != CHUNK_HEADER {
            log_or_err!(self, Level::Warn, FormatError::UnexpectedHeader(chunk.header.clone()));
        }

        if chunk.fpga_counts_per_sample != FPGA_COUNTS_PER_SAMPLE {
            log_or_err!(
                self,
                Level::Warn,
                FormatError::FpgaCountsMismatch {
                    found: chunk.fpga_counts_per_sample,
                    expected: FPGA_COUNTS_PER_SAMPLE,
                }
            );
        }

        if !chunk.has_rfi_mask && !chunk.rfi_mask_bytes.is_empty() {
            log_or_err!(
                self,
                Level::Warn,
                FormatError::UnflaggedRfiMask(chunk.rfi_mask_bytes.len())
            );
        }

        debug!(
            "Chunk v{} beam {}: {}x{} samples at {}, fpga0 {}, binning {}",
            chunk.version.number(),
            chunk.beam,
            chunk.nchan(),
            chunk.nt(),
            chunk.bit_depth,
            chunk.fpga0,
            chunk.binning
        );

        Ok(chunk)
    }

    /// Reads and decodes one file, tagging errors with its path.
    pub fn decode_file<P: AsRef<Path>>(&self, path: P) -> Result<AssembledChunk, Error> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        self.decode_bytes(&bytes).map_err(|source| Error::Format {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Decodes one file with the default (lenient) decoder.
pub fn decode<P: AsRef<Path>>(path: P) -> Result<AssembledChunk, Error> {
    Decoder::default().decode_file(path)
}
