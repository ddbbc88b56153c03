use std::path::{Path, PathBuf};

use cfod::structs::chunk::CHUNK_HEADER;
use cfod::structs::field::Field;
use cfod::utils::instrument::FPGA_COUNTS_PER_SAMPLE;

pub const NFREQ_COARSE: usize = 4;
pub const NUPFREQ: usize = 4;
pub const NT_COARSE: usize = 2;
pub const NT_PER_PACKET: usize = 4;
pub const NCHAN: usize = NFREQ_COARSE * NUPFREQ;
pub const NT: usize = NT_COARSE * NT_PER_PACKET;

/// Writes a version 1 chunk of 16 channels and 8 samples where every raw
/// value is `value`, with unit scales and zero offsets.
pub fn write_chunk(dir: &Path, name: &str, fpga0: u64, binning: u64, value: u8) -> PathBuf {
    let nscales = NFREQ_COARSE * NT_COARSE;
    let data = vec![value; NCHAN * NT];
    let ones: Vec<u8> = (0..nscales).flat_map(|_| 1.0f32.to_le_bytes()).collect();
    let zeros = vec![0u8; nscales * 4];

    let fields = vec![
        Field::Str(CHUNK_HEADER.to_string()),
        Field::UInt(1),
        Field::Bool(false),
        Field::UInt(0),
        Field::UInt(1042),
        Field::UInt(NUPFREQ as u64),
        Field::UInt(NT_PER_PACKET as u64),
        Field::UInt(FPGA_COUNTS_PER_SAMPLE),
        Field::UInt(NT_COARSE as u64),
        Field::UInt(nscales as u64),
        Field::UInt(data.len() as u64),
        Field::UInt(fpga0),
        Field::UInt(NT as u64 * FPGA_COUNTS_PER_SAMPLE * binning),
        Field::UInt(binning),
        Field::Bin(ones),
        Field::Bin(zeros),
        Field::Bin(data),
    ];

    let path = dir.join(name);
    let bytes = rmp_serde::to_vec(&fields).expect("serialize chunk");
    std::fs::write(&path, bytes).expect("write chunk");
    path
}
