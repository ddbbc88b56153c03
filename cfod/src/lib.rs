//! Reader for CHIME/FRB intensity data distributed as msgpack
//! "assembled chunks".
//!
//! ## Technical Overview
//!
//! Each file holds one chunk of the L1 intensity stream: a flat msgpack
//! array with metadata, per-block scale and offset tables and a bit-packed
//! sample payload.
//!
//! ### Data Layout
//!
//! **Samples**: channel-major, time fastest, 1, 2, 4 or 8 bits each. Row 0
//! is the highest frequency (800 MHz end).
//! **Tables**: one `f32` scale and offset per coarse (FPGA) channel and per
//! packet of `nt_per_packet` samples.
//! **RFI mask**: one bit per sample, least significant bit first.
//!
//! ### Versions
//!
//! - 1: 8-bit samples, values 0 and 255 mark missing data
//! - 2: adds `frame0_nano` and the RFI mask
//! - 3: adds an explicit bit depth and sentinel table
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cfod::process::assemble::{AssembleOptions, unpack_data, unpack_datafiles};
//!
//! let one = unpack_data("astro_5941664_20180406203904337770_beam0147_00245439_02.msgpack")?;
//! println!("{} channels, {} samples", one.nchan(), one.nt());
//!
//! let paths = ["chunk_01.msgpack", "chunk_02.msgpack"];
//! let batch = unpack_datafiles(&paths, &AssembleOptions::default())?;
//! let spectrum = batch.intensity.column(0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Decoding pipeline.
///
/// 1. **Decoding** ([`process::decode`]): reads the container and validates
///    its structure.
///
/// 2. **Unpacking** ([`process::unpack`]): expands packed samples to bytes.
///
/// 3. **Dequantization** ([`process::dequantize`]): applies scales, offsets
///    and sentinels.
///
/// 4. **Assembly** ([`process::assemble`]): joins files along time.
pub mod process;

/// Data structures of the container format.
///
/// - **Fields** ([`structs::field`]): loosely typed msgpack elements
/// - **Chunks** ([`structs::chunk`]): validated container contents
/// - **Scales** ([`structs::scales`]): dequantization tables
pub mod structs;

/// Supporting infrastructure.
///
/// - **Error Handling** ([`utils::errors`]): error types
/// - **Instrument** ([`utils::instrument`]): telescope constants
/// - **Natural Sort** ([`utils::natural`]): file ordering
pub mod utils;

#[cfg(test)]
pub(crate) mod testutil;
