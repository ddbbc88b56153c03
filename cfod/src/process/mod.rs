/// Container decoding with structural validation and soft checks.
///
/// Provides the [`Decoder`](decode::Decoder) that turns a msgpack file into an
/// [`AssembledChunk`](crate::structs::chunk::AssembledChunk).
pub mod decode;

/// Bit-packed sample expansion.
pub mod unpack;

/// Scale/offset application and weight masks.
pub mod dequantize;

/// Per-file and multi-file unpacking into time-frequency arrays.
///
/// Provides [`unpack_data`](assemble::unpack_data) and
/// [`unpack_datafiles`](assemble::unpack_datafiles).
pub mod assemble;
