//! Dequantization tables: scale/offset blocks and masked-value sentinels.

use ndarray::{Array1, Array2, Axis};

use crate::process::unpack::BitDepth;
use crate::utils::errors::FormatError;

/// Intensity written for samples whose raw value is a sentinel.
pub const MASKED_FILL: f32 = 0.0;

/// A table of `f32` coefficients, one per block of
/// `channel_factor` channels by `sample_factor` samples.
///
/// CHIME/FRB chunks store one scale and one offset per coarse (FPGA)
/// channel and per packet of `nt_per_packet` samples; the upchannelized
/// channels of a coarse channel share its coefficients.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleTable {
    values: Array2<f32>,
    channel_factor: usize,
    sample_factor: usize,
}

impl ScaleTable {
    pub fn new(values: Array2<f32>, channel_factor: usize, sample_factor: usize) -> Self {
        Self {
            values,
            channel_factor,
            sample_factor,
        }
    }

    /// One coefficient per channel, constant over all `samples`.
    pub fn per_channel(values: Vec<f32>, samples: usize) -> Self {
        let values = Array1::from(values).insert_axis(Axis(1));
        Self::new(values, 1, samples)
    }

    /// Parses `rows * cols` little-endian `f32` values stored row-major.
    pub fn from_le_bytes(
        name: &'static str,
        bytes: &[u8],
        rows: usize,
        cols: usize,
        channel_factor: usize,
        sample_factor: usize,
    ) -> Result<Self, FormatError> {
        let expected = rows
            .checked_mul(cols)
            .and_then(|n| n.checked_mul(4))
            .ok_or(FormatError::InvalidField {
                name,
                value: rows as u64,
                reason: "table size overflows",
            })?;
        if bytes.len() != expected {
            return Err(FormatError::SizeMismatch {
                name,
                declared: expected as u64,
                actual: bytes.len(),
            });
        }

        let values: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(Self::new(
            Array2::from_shape_vec((rows, cols), values)?,
            channel_factor,
            sample_factor,
        ))
    }

    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    pub fn channel_factor(&self) -> usize {
        self.channel_factor
    }

    pub fn sample_factor(&self) -> usize {
        self.sample_factor
    }

    /// Checks that the blocks tile a `channels x samples` grid exactly.
    pub fn check_covers(
        &self,
        name: &'static str,
        channels: usize,
        samples: usize,
    ) -> Result<(), FormatError> {
        let (rows, cols) = self.values.dim();
        let covers = rows * self.channel_factor == channels
            && cols * self.sample_factor == samples
            && (self.channel_factor > 0 || channels == 0)
            && (self.sample_factor > 0 || samples == 0);

        if covers {
            Ok(())
        } else {
            Err(FormatError::ScaleShape {
                name,
                rows,
                cols,
                channel_factor: self.channel_factor,
                sample_factor: self.sample_factor,
                channels,
                samples,
            })
        }
    }
}

/// Raw values that mark a sample as masked rather than measured.
#[derive(Clone)]
pub struct SentinelTable {
    masked: [bool; 256],
    fill: f32,
}

impl SentinelTable {
    /// Builds a table from declared sentinel values, each of which must be
    /// representable at `depth`.
    pub fn new(values: &[u8], depth: BitDepth) -> Result<Self, FormatError> {
        let mut masked = [false; 256];
        for &value in values {
            if value > depth.max_value() {
                return Err(FormatError::SentinelOutOfRange {
                    value,
                    bits: depth.bits(),
                });
            }
            masked[value as usize] = true;
        }

        Ok(Self {
            masked,
            fill: MASKED_FILL,
        })
    }

    /// The lowest and highest representable values, as used by the 8-bit
    /// L1 chunk formats (0 and 255).
    pub fn extremes(depth: BitDepth) -> Self {
        let mut masked = [false; 256];
        masked[0] = true;
        masked[depth.max_value() as usize] = true;
        Self {
            masked,
            fill: MASKED_FILL,
        }
    }

    pub fn none() -> Self {
        Self {
            masked: [false; 256],
            fill: MASKED_FILL,
        }
    }

    pub fn with_fill(mut self, fill: f32) -> Self {
        self.fill = fill;
        self
    }

    #[inline(always)]
    pub fn is_masked(&self, raw: u8) -> bool {
        self.masked[raw as usize]
    }

    pub fn fill(&self) -> f32 {
        self.fill
    }

    pub fn values(&self) -> Vec<u8> {
        (0..=u8::MAX).filter(|&v| self.is_masked(v)).collect()
    }
}

impl std::fmt::Debug for SentinelTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentinelTable")
            .field("values", &self.values())
            .field("fill", &self.fill)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_row_major_le_floats() -> anyhow::Result<()> {
        let bytes: Vec<u8> = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();

        let table = ScaleTable::from_le_bytes("scales", &bytes, 2, 3, 16, 8)?;
        assert_eq!(table.values()[[0, 2]], 3.0);
        assert_eq!(table.values()[[1, 0]], 4.0);
        table.check_covers("scales", 32, 24)?;
        assert!(table.check_covers("scales", 32, 25).is_err());

        assert!(matches!(
            ScaleTable::from_le_bytes("offsets", &bytes[..20], 2, 3, 16, 8),
            Err(FormatError::SizeMismatch {
                name: "offsets",
                declared: 24,
                actual: 20
            })
        ));
        Ok(())
    }

    #[test]
    fn oversized_table_is_rejected() {
        assert!(matches!(
            ScaleTable::from_le_bytes("scales", &[], usize::MAX / 2, 3, 1, 1),
            Err(FormatError::InvalidField { name: "scales", .. })
        ));
    }

    #[test]
    fn per_channel_covers_whole_rows() -> anyhow::Result<()> {
        let table = ScaleTable::per_channel(vec![0.5, 1.5, 2.5], 10);
        assert_eq!(table.values().dim(), (3, 1));
        table.check_covers("scales", 3, 10)?;
        assert!(table.check_covers("scales", 4, 10).is_err());
        Ok(())
    }

    #[test]
    fn sentinels_respect_bit_depth() -> anyhow::Result<()> {
        let table = SentinelTable::new(&[0, 3], BitDepth::Two)?;
        assert!(table.is_masked(3) && table.is_masked(0));
        assert!(!table.is_masked(1));
        assert_eq!(table.values(), vec![0, 3]);

        assert!(matches!(
            SentinelTable::new(&[4], BitDepth::Two),
            Err(FormatError::SentinelOutOfRange { value: 4, bits: 2 })
        ));

        let extremes = SentinelTable::extremes(BitDepth::Eight);
        assert_eq!(extremes.values(), vec![0, 255]);
        Ok(())
    }
}
