use std::fmt::{Display, Formatter};

use ndarray::Array2;

use crate::process::dequantize::dequantize;
use crate::process::unpack::{BitDepth, SubfieldOrder, unpack, unpack_ordered};
use crate::structs::field::{Field, FieldReader};
use crate::structs::scales::{ScaleTable, SentinelTable};
use crate::utils::errors::FormatError;
use crate::utils::instrument::FPGA_NANO;

/// Header string written by the L1 chunk serializer.
pub const CHUNK_HEADER: &str = "assembled_chunk in msgpack format";

/// Layout revision of the container array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ContainerVersion {
    /// 8-bit samples, no RFI information.
    V1,
    /// Adds `frame0_nano` and the packed RFI mask.
    V2,
    /// Adds an explicit bit depth and sentinel table.
    V3,
}

impl ContainerVersion {
    pub fn number(self) -> u64 {
        match self {
            Self::V1 => 1,
            Self::V2 => 2,
            Self::V3 => 3,
        }
    }

    pub fn field_count(self) -> usize {
        match self {
            Self::V1 => 17,
            Self::V2 => 21,
            Self::V3 => 24,
        }
    }
}

impl TryFrom<u64> for ContainerVersion {
    type Error = FormatError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            3 => Ok(Self::V3),
            _ => Err(FormatError::UnsupportedVersion(value)),
        }
    }
}

/// One decoded container: metadata, dequantization tables and the raw
/// packed payload.
///
/// Construction validates the structure (types, sizes, dimensions). The
/// payload stays packed until [`AssembledChunk::decode`] is called.
#[derive(Debug, Clone)]
pub struct AssembledChunk {
    pub header: String,
    pub version: ContainerVersion,
    pub compressed_size: u64,
    pub beam: u64,
    pub bit_depth: BitDepth,
    pub nupfreq: usize,
    pub nt_per_packet: usize,
    pub fpga_counts_per_sample: u64,
    pub nt_coarse: usize,
    pub nscales: usize,
    pub ndata: usize,
    pub fpga0: u64,
    pub fpga_n: u64,
    pub binning: u64,
    pub scales: ScaleTable,
    pub offsets: ScaleTable,
    pub sentinels: SentinelTable,
    pub data: Vec<u8>,
    pub frame0_nano: Option<u64>,
    pub nrfifreq: Option<usize>,
    pub has_rfi_mask: bool,
    pub rfi_mask_bytes: Vec<u8>,
}

fn positive(name: &'static str, value: usize) -> Result<usize, FormatError> {
    if value == 0 {
        return Err(FormatError::InvalidField {
            name,
            value: 0,
            reason: "must be positive",
        });
    }
    Ok(value)
}

impl AssembledChunk {
    pub fn from_fields(fields: Vec<Field>) -> Result<Self, FormatError> {
        let mut r = FieldReader::new(fields);

        let version = ContainerVersion::try_from(r.uint(1, "version")?)?;
        if r.len() != version.field_count() {
            return Err(FormatError::FieldCount {
                version: version.number(),
                expected: version.field_count(),
                found: r.len(),
            });
        }

        let header = r.string(0, "header")?;
        let compressed = r.boolean(2, "compressed")?;
        let compressed_size = r.uint(3, "compressed_size")?;
        if compressed {
            return Err(FormatError::Compressed(compressed_size));
        }

        let beam = r.uint(4, "beam")?;
        let nupfreq = positive("nupfreq", r.usize(5, "nupfreq")?)?;
        let nt_per_packet = positive("nt_per_packet", r.usize(6, "nt_per_packet")?)?;
        let fpga_counts_per_sample = r.uint(7, "fpga_counts_per_sample")?;
        let nt_coarse = positive("nt_coarse", r.usize(8, "nt_coarse")?)?;
        let nscales = r.usize(9, "nscales")?;
        let ndata = r.usize(10, "ndata")?;
        let fpga0 = r.uint(11, "fpga0")?;
        let fpga_n = r.uint(12, "fpgaN")?;
        let binning = r.uint(13, "binning")?;
        if binning == 0 {
            return Err(FormatError::InvalidField {
                name: "binning",
                value: 0,
                reason: "must be positive",
            });
        }

        if nscales % nt_coarse != 0 {
            return Err(FormatError::InvalidField {
                name: "nscales",
                value: nscales as u64,
                reason: "must be a multiple of nt_coarse",
            });
        }
        let nfreq_coarse = nscales / nt_coarse;
        let nchan = nfreq_coarse
            .checked_mul(nupfreq)
            .ok_or(FormatError::InvalidField {
                name: "nupfreq",
                value: nupfreq as u64,
                reason: "channel count overflows",
            })?;
        let nt = nt_coarse
            .checked_mul(nt_per_packet)
            .ok_or(FormatError::InvalidField {
                name: "nt_per_packet",
                value: nt_per_packet as u64,
                reason: "sample count overflows",
            })?;

        let scales = ScaleTable::from_le_bytes(
            "scales",
            &r.take_bin(14, "scales")?,
            nfreq_coarse,
            nt_coarse,
            nupfreq,
            nt_per_packet,
        )?;
        let offsets = ScaleTable::from_le_bytes(
            "offsets",
            &r.take_bin(15, "offsets")?,
            nfreq_coarse,
            nt_coarse,
            nupfreq,
            nt_per_packet,
        )?;

        let data = r.take_bin(16, "data")?;
        if data.len() != ndata {
            return Err(FormatError::SizeMismatch {
                name: "data",
                declared: ndata as u64,
                actual: data.len(),
            });
        }

        let mut frame0_nano = None;
        let mut nrfifreq = None;
        let mut has_rfi_mask = false;
        let mut rfi_mask_bytes = Vec::new();

        if version >= ContainerVersion::V2 {
            frame0_nano = Some(r.uint(17, "frame0_nano")?);
            let rows = r.usize(18, "nrfifreq")?;
            nrfifreq = Some(rows);
            has_rfi_mask = r.boolean(19, "has_rfi_mask")?;
            rfi_mask_bytes = r.take_bin(20, "rfi_mask")?;

            if has_rfi_mask {
                if nt % 8 != 0 {
                    return Err(FormatError::InvalidField {
                        name: "nt",
                        value: nt as u64,
                        reason: "an RFI mask needs a multiple of 8 samples",
                    });
                }
                let expected = rows.checked_mul(nt / 8).ok_or(FormatError::InvalidField {
                    name: "nrfifreq",
                    value: rows as u64,
                    reason: "RFI mask size overflows",
                })?;
                if rfi_mask_bytes.len() != expected {
                    return Err(FormatError::SizeMismatch {
                        name: "rfi_mask",
                        declared: expected as u64,
                        actual: rfi_mask_bytes.len(),
                    });
                }
            }
        }

        let (bit_depth, sentinels) = if version >= ContainerVersion::V3 {
            let bit_depth = BitDepth::try_from(r.uint(21, "nbits")?)?;
            let nsentinels = r.uint(22, "nsentinels")?;
            let values = r.take_bin(23, "sentinels")?;
            if values.len() as u64 != nsentinels {
                return Err(FormatError::SizeMismatch {
                    name: "sentinels",
                    declared: nsentinels,
                    actual: values.len(),
                });
            }
            (bit_depth, SentinelTable::new(&values, bit_depth)?)
        } else {
            (BitDepth::Eight, SentinelTable::extremes(BitDepth::Eight))
        };

        let expected = bit_depth.packed_len(nchan.saturating_mul(nt));
        if data.len() != expected {
            return Err(FormatError::PayloadSize {
                channels: nchan,
                samples: nt,
                bits: bit_depth.bits(),
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            header,
            version,
            compressed_size,
            beam,
            bit_depth,
            nupfreq,
            nt_per_packet,
            fpga_counts_per_sample,
            nt_coarse,
            nscales,
            ndata,
            fpga0,
            fpga_n,
            binning,
            scales,
            offsets,
            sentinels,
            data,
            frame0_nano,
            nrfifreq,
            has_rfi_mask,
            rfi_mask_bytes,
        })
    }

    /// Coarse (FPGA) channels covered by the chunk.
    pub fn nfreq_coarse(&self) -> usize {
        self.nscales / self.nt_coarse
    }

    pub fn nchan(&self) -> usize {
        self.nfreq_coarse() * self.nupfreq
    }

    pub fn nt(&self) -> usize {
        self.nt_coarse * self.nt_per_packet
    }

    /// Unpacks and dequantizes the payload into `(intensity, weights)`,
    /// both shaped `(nchan, nt)`.
    pub fn decode(&self) -> Result<(Array2<f32>, Array2<f32>), FormatError> {
        let raw = unpack(&self.data, self.bit_depth, self.nchan(), self.nt())?;
        dequantize(&raw, &self.scales, &self.offsets, &self.sentinels)
    }

    /// Expands the RFI mask, `true` marking samples that were kept.
    ///
    /// Chunks without a mask yield an all-true `(nchan, nt)` grid.
    pub fn rfi_mask(&self) -> Result<Array2<bool>, FormatError> {
        match self.nrfifreq {
            Some(rows) if self.has_rfi_mask => {
                let bits = unpack_ordered(
                    &self.rfi_mask_bytes,
                    BitDepth::One,
                    SubfieldOrder::LsbFirst,
                    rows,
                    self.nt(),
                )?;
                Ok(bits.mapv(|b| b == 1))
            }
            _ => Ok(Array2::from_elem((self.nchan(), self.nt()), true)),
        }
    }

    /// Fraction of RFI-mask samples flagged as removed.
    pub fn masked_fraction(&self) -> Result<f64, FormatError> {
        let mask = self.rfi_mask()?;
        if mask.is_empty() {
            return Ok(0.0);
        }
        let masked = mask.iter().filter(|&&kept| !kept).count();
        Ok(masked as f64 / mask.len() as f64)
    }

    fn time_at(&self, fpga: f64) -> f64 {
        let frame0 = self.frame0_nano.unwrap_or(0) as f64;
        1e-9 * (frame0 + self.fpga_counts_per_sample as f64 * FPGA_NANO as f64 * fpga)
    }

    /// Start time in seconds since the acquisition epoch. V1 chunks carry
    /// no `frame0_nano` and count from zero.
    pub fn time_start(&self) -> f64 {
        self.time_at(self.fpga0 as f64)
    }

    pub fn time_end(&self) -> f64 {
        self.time_at(self.fpga0 as f64 + self.fpga_n as f64)
    }
}

impl Display for AssembledChunk {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AssembledChunk: beam {}, nt {}, fpga0 {}, rfi ",
            self.beam,
            self.nt(),
            self.fpga0
        )?;
        match (self.has_rfi_mask, self.nrfifreq) {
            (true, Some(rows)) => {
                let masked = self.masked_fraction().map_err(|_| std::fmt::Error)?;
                write!(f, "yes, {} freqs, {}% masked", rows, (masked * 100.0) as u32)
            }
            _ => write!(f, "no"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ChunkBuilder;

    #[test]
    fn version_dispatch() -> anyhow::Result<()> {
        for (version, count) in [(1, 17), (2, 21), (3, 24)] {
            let fields = ChunkBuilder::new(version, 2, 4, 2, 8).fields();
            assert_eq!(fields.len(), count);
            let chunk = AssembledChunk::from_fields(fields)?;
            assert_eq!(chunk.version.number(), version);
            assert_eq!((chunk.nchan(), chunk.nt()), (8, 16));
        }
        Ok(())
    }

    #[test]
    fn rejects_unknown_version() {
        let mut fields = ChunkBuilder::new(2, 2, 4, 2, 8).fields();
        fields[1] = Field::UInt(7);
        assert!(matches!(
            AssembledChunk::from_fields(fields),
            Err(FormatError::UnsupportedVersion(7))
        ));
    }

    #[test]
    fn rejects_wrong_field_count() {
        let mut fields = ChunkBuilder::new(2, 2, 4, 2, 8).fields();
        fields.pop();
        assert!(matches!(
            AssembledChunk::from_fields(fields),
            Err(FormatError::FieldCount {
                version: 2,
                expected: 21,
                found: 20
            })
        ));

        // a V2 array labelled as V3
        let mut fields = ChunkBuilder::new(2, 2, 4, 2, 8).fields();
        fields[1] = Field::UInt(3);
        assert!(matches!(
            AssembledChunk::from_fields(fields),
            Err(FormatError::FieldCount { version: 3, .. })
        ));
    }

    #[test]
    fn rejects_compressed_payload() {
        let mut builder = ChunkBuilder::new(1, 2, 4, 2, 8);
        builder.compressed = true;
        assert!(matches!(
            AssembledChunk::from_fields(builder.fields()),
            Err(FormatError::Compressed(_))
        ));
    }

    #[test]
    fn rejects_truncated_payload() {
        for version in [1, 3] {
            let mut fields = ChunkBuilder::new(version, 2, 4, 2, 8).fields();
            if let Field::Bin(data) = &mut fields[16] {
                data.pop();
            }
            assert!(matches!(
                AssembledChunk::from_fields(fields.clone()),
                Err(FormatError::SizeMismatch { name: "data", .. })
            ));

            // keep ndata consistent so the payload size check fires
            if let Field::UInt(ndata) = &mut fields[10] {
                *ndata -= 1;
            }
            assert!(matches!(
                AssembledChunk::from_fields(fields),
                Err(FormatError::PayloadSize { .. })
            ));
        }
    }

    #[test]
    fn rejects_zero_dimensions() {
        let mut fields = ChunkBuilder::new(2, 2, 4, 2, 8).fields();
        fields[5] = Field::UInt(0);
        assert!(matches!(
            AssembledChunk::from_fields(fields),
            Err(FormatError::InvalidField { name: "nupfreq", .. })
        ));
    }

    #[test]
    fn rejects_wrong_field_type() {
        let mut fields = ChunkBuilder::new(2, 2, 4, 2, 8).fields();
        fields[14] = Field::Str("scales".into());
        assert!(matches!(
            AssembledChunk::from_fields(fields),
            Err(FormatError::FieldType {
                index: 14,
                expected: "bin",
                found: "str",
                ..
            })
        ));
    }

    #[test]
    fn v3_declares_bit_depth_and_sentinels() -> anyhow::Result<()> {
        let mut builder = ChunkBuilder::new(3, 2, 4, 2, 8);
        builder.depth = BitDepth::Two;
        builder.sentinels = vec![3];
        builder.raw = builder.pattern();
        let chunk = AssembledChunk::from_fields(builder.fields())?;

        assert_eq!(chunk.bit_depth, BitDepth::Two);
        assert_eq!(chunk.data.len(), 8 * 16 / 4);
        assert_eq!(chunk.sentinels.values(), vec![3]);

        builder.sentinels = vec![3, 9];
        assert!(matches!(
            AssembledChunk::from_fields(builder.fields()),
            Err(FormatError::SentinelOutOfRange { value: 9, bits: 2 })
        ));
        Ok(())
    }

    #[test]
    fn rfi_mask_is_lsb_first() -> anyhow::Result<()> {
        let mut builder = ChunkBuilder::new(2, 2, 4, 2, 8);
        let nt = builder.nt();
        let mut mask = vec![true; 3 * nt];
        mask[1] = false;
        mask[nt + 8] = false;
        builder.rfi = Some((3, mask));

        let fields = builder.fields();
        if let Field::Bin(bytes) = &fields[20] {
            assert_eq!(bytes[0], 0b1111_1101);
            assert_eq!(bytes[3], 0b1111_1110);
        }

        let chunk = AssembledChunk::from_fields(fields)?;
        let expanded = chunk.rfi_mask()?;
        assert_eq!(expanded.dim(), (3, nt));
        assert!(!expanded[[0, 1]] && !expanded[[1, 8]]);
        assert_eq!(expanded.iter().filter(|&&k| !k).count(), 2);
        Ok(())
    }

    #[test]
    fn missing_rfi_mask_keeps_everything() -> anyhow::Result<()> {
        let chunk = AssembledChunk::from_fields(ChunkBuilder::new(1, 2, 4, 2, 8).fields())?;
        let mask = chunk.rfi_mask()?;
        assert_eq!(mask.dim(), (8, 16));
        assert!(mask.iter().all(|&k| k));
        assert_eq!(chunk.frame0_nano, None);
        assert_eq!(chunk.time_start(), 0.0);
        Ok(())
    }

    #[test]
    fn times_of_extreme_fpga_counts() -> anyhow::Result<()> {
        let mut builder = ChunkBuilder::new(1, 2, 4, 2, 8);
        builder.fpga0 = u64::MAX;
        builder.fpga_n = 16 * 384;
        let chunk = AssembledChunk::from_fields(builder.fields())?;
        assert!(chunk.time_end() >= chunk.time_start());
        assert!(chunk.time_end().is_finite());
        Ok(())
    }

    #[test]
    fn oversized_rfi_mask_rows() {
        let mut builder = ChunkBuilder::new(2, 2, 4, 2, 8);
        builder.rfi = Some((8, vec![true; 8 * 16]));
        let mut fields = builder.fields();
        fields[18] = Field::UInt(1 << 63);
        assert!(matches!(
            AssembledChunk::from_fields(fields),
            Err(FormatError::InvalidField { name: "nrfifreq", .. })
        ));
    }

    #[test]
    fn times_and_display() -> anyhow::Result<()> {
        let mut builder = ChunkBuilder::new(2, 2, 4, 2, 8);
        builder.fpga0 = 1000;
        builder.fpga_n = 16 * 384;
        builder.frame0_nano = 2_000_000_000;
        let chunk = AssembledChunk::from_fields(builder.fields())?;

        let start = chunk.time_start();
        let end = chunk.time_end();
        assert!((start - (2.0 + 384.0 * 2560.0 * 1000.0 * 1e-9)).abs() < 1e-9);
        assert!((end - start - 384.0 * 2560.0 * 6144.0 * 1e-9).abs() < 1e-9);

        assert_eq!(
            chunk.to_string(),
            format!("AssembledChunk: beam {}, nt 16, fpga0 1000, rfi no", builder.beam)
        );

        let nt = builder.nt();
        let mut mask = vec![true; 4 * nt];
        mask[..nt].iter_mut().for_each(|k| *k = false);
        builder.rfi = Some((4, mask));
        let chunk = AssembledChunk::from_fields(builder.fields())?;
        assert!(chunk.to_string().ends_with("rfi yes, 4 freqs, 25% masked"));

        // truncated, not rounded
        let mut mask = vec![true; 4 * nt];
        mask[..nt - 1].iter_mut().for_each(|k| *k = false);
        builder.rfi = Some((4, mask));
        let chunk = AssembledChunk::from_fields(builder.fields())?;
        assert!(chunk.to_string().ends_with("rfi yes, 4 freqs, 23% masked"));
        Ok(())
    }
}
