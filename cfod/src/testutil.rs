//! Synthetic chunk files for tests.

use std::path::{Path, PathBuf};

use bitstream_io::{BigEndian, BitWrite, BitWriter, Endianness, LittleEndian};
use ndarray::Array2;

use crate::process::unpack::BitDepth;
use crate::structs::chunk::CHUNK_HEADER;
use crate::structs::field::Field;

/// Packs values with an independent bit writer; `BigEndian` gives
/// most-significant subfield first.
pub(crate) fn pack<E: Endianness>(values: &[u8], depth: BitDepth, endian: E) -> Vec<u8> {
    let mut writer = BitWriter::endian(Vec::new(), endian);
    for &v in values {
        writer
            .write_unsigned_var::<u8>(depth.bits() as u32, v)
            .expect("value fits bit depth");
    }
    writer.byte_align().expect("align");
    writer.into_writer()
}

fn pack_mask(kept: &[bool]) -> Vec<u8> {
    let bits: Vec<u8> = kept.iter().map(|&k| k as u8).collect();
    pack(&bits, BitDepth::One, LittleEndian)
}

/// Builds container arrays field by field. Public members may be changed
/// before calling [`ChunkBuilder::fields`].
pub(crate) struct ChunkBuilder {
    pub version: u64,
    pub header: String,
    pub compressed: bool,
    pub beam: u64,
    pub nfreq_coarse: usize,
    pub nupfreq: usize,
    pub nt_coarse: usize,
    pub nt_per_packet: usize,
    pub fpga_counts_per_sample: u64,
    pub fpga0: u64,
    pub fpga_n: u64,
    pub binning: u64,
    pub frame0_nano: u64,
    pub depth: BitDepth,
    /// Raw samples, `nchan * nt`, channel-major.
    pub raw: Vec<u8>,
    /// One value per coarse channel and coarse time block.
    pub scales: Vec<f32>,
    pub offsets: Vec<f32>,
    pub sentinels: Vec<u8>,
    /// Mask height and `height * nt` kept flags.
    pub rfi: Option<(usize, Vec<bool>)>,
    /// Mask bytes written while `has_rfi_mask` is false.
    pub stray_rfi_bytes: Vec<u8>,
}

impl ChunkBuilder {
    pub fn new(
        version: u64,
        nfreq_coarse: usize,
        nupfreq: usize,
        nt_coarse: usize,
        nt_per_packet: usize,
    ) -> Self {
        let mut builder = Self {
            version,
            header: CHUNK_HEADER.to_string(),
            compressed: false,
            beam: 147,
            nfreq_coarse,
            nupfreq,
            nt_coarse,
            nt_per_packet,
            fpga_counts_per_sample: 384,
            fpga0: 5_000,
            fpga_n: (nt_coarse * nt_per_packet * 384) as u64,
            binning: 1,
            frame0_nano: 1_500_000_000,
            depth: BitDepth::Eight,
            raw: Vec::new(),
            scales: Vec::new(),
            offsets: Vec::new(),
            sentinels: vec![0, 255],
            rfi: None,
            stray_rfi_bytes: Vec::new(),
        };

        builder.raw = builder.pattern();
        builder.scales = (0..nfreq_coarse * nt_coarse)
            .map(|i| 1.0 + (i / nt_coarse) as f32 * 0.5 + (i % nt_coarse) as f32 * 0.25)
            .collect();
        builder.offsets = (0..nfreq_coarse * nt_coarse)
            .map(|i| -((i / nt_coarse) as f32) + (i % nt_coarse) as f32 * 0.125)
            .collect();
        builder
    }

    pub fn nchan(&self) -> usize {
        self.nfreq_coarse * self.nupfreq
    }

    pub fn nt(&self) -> usize {
        self.nt_coarse * self.nt_per_packet
    }

    /// Raw values that avoid both range extremes when the depth allows it.
    pub fn pattern(&self) -> Vec<u8> {
        let max = self.depth.max_value() as usize;
        let nt = self.nt();
        (0..self.nchan() * nt)
            .map(|i| {
                let (c, t) = (i / nt, i % nt);
                if max < 2 {
                    ((c + t) % 2) as u8
                } else {
                    (1 + (c * 31 + t * 7) % (max - 1)) as u8
                }
            })
            .collect()
    }

    pub fn fields(&self) -> Vec<Field> {
        let data = pack(&self.raw, self.depth, BigEndian);
        let floats = |values: &[f32]| -> Vec<u8> {
            values.iter().flat_map(|v| v.to_le_bytes()).collect()
        };

        let mut fields = vec![
            Field::Str(self.header.clone()),
            Field::UInt(self.version),
            Field::Bool(self.compressed),
            Field::UInt(if self.compressed { data.len() as u64 } else { 0 }),
            Field::UInt(self.beam),
            Field::UInt(self.nupfreq as u64),
            Field::UInt(self.nt_per_packet as u64),
            Field::UInt(self.fpga_counts_per_sample),
            Field::UInt(self.nt_coarse as u64),
            Field::UInt((self.nfreq_coarse * self.nt_coarse) as u64),
            Field::UInt(data.len() as u64),
            Field::UInt(self.fpga0),
            Field::UInt(self.fpga_n),
            Field::UInt(self.binning),
            Field::Bin(floats(&self.scales)),
            Field::Bin(floats(&self.offsets)),
            Field::Bin(data),
        ];

        if self.version >= 2 {
            let (rows, bytes, has_mask) = match &self.rfi {
                Some((rows, kept)) => (*rows, pack_mask(kept), true),
                None => (0, self.stray_rfi_bytes.clone(), false),
            };
            fields.push(Field::UInt(self.frame0_nano));
            fields.push(Field::UInt(rows as u64));
            fields.push(Field::Bool(has_mask));
            fields.push(Field::Bin(bytes));
        }

        if self.version >= 3 {
            fields.push(Field::UInt(self.depth.bits() as u64));
            fields.push(Field::UInt(self.sentinels.len() as u64));
            fields.push(Field::Bin(self.sentinels.clone()));
        }

        fields
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        rmp_serde::to_vec(&self.fields()).expect("serialize container")
    }

    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.to_bytes()).expect("write chunk file");
        path
    }

    /// Reference `(intensity, weights)` computed sample by sample.
    pub fn expected(&self) -> (Array2<f32>, Array2<f32>) {
        let (nchan, nt) = (self.nchan(), self.nt());
        let masked = |raw: u8| {
            if self.version >= 3 {
                self.sentinels.contains(&raw)
            } else {
                raw == 0 || raw == 255
            }
        };

        let intensity = Array2::from_shape_fn((nchan, nt), |(c, t)| {
            let raw = self.raw[c * nt + t];
            let block = (c / self.nupfreq) * self.nt_coarse + t / self.nt_per_packet;
            if masked(raw) {
                0.0
            } else {
                raw as f32 * self.scales[block] + self.offsets[block]
            }
        });
        let weights = Array2::from_shape_fn((nchan, nt), |(c, t)| {
            if masked(self.raw[c * nt + t]) { 0.0 } else { 1.0 }
        });

        (intensity, weights)
    }
}
