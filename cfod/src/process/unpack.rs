//! Expansion of bit-packed samples into one byte per sample.
//!
//! Samples are stored channel-major with time running fastest, as one
//! continuous bit stream: a channel row does not start on a byte boundary
//! unless the preceding rows happen to end on one. Within a byte, samples
//! are taken most-significant subfield first unless declared otherwise.

use std::fmt::{Display, Formatter};

use ndarray::Array2;

use crate::utils::errors::FormatError;

/// Bits per stored sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BitDepth {
    One = 1,
    Two = 2,
    Four = 4,
    Eight = 8,
}

impl BitDepth {
    pub fn bits(self) -> usize {
        self as usize
    }

    /// Largest raw value, `2^bits - 1`.
    pub fn max_value(self) -> u8 {
        (((1u16) << self.bits()) - 1) as u8
    }

    pub fn samples_per_byte(self) -> usize {
        8 / self.bits()
    }

    /// Bytes needed for `samples` packed samples, including a trailing
    /// partial byte.
    pub fn packed_len(self, samples: usize) -> usize {
        samples.div_ceil(self.samples_per_byte())
    }
}

impl TryFrom<u64> for BitDepth {
    type Error = FormatError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            4 => Ok(Self::Four),
            8 => Ok(Self::Eight),
            _ => Err(FormatError::InvalidBitDepth(value)),
        }
    }
}

impl Display for BitDepth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

/// Order of the sub-byte fields within one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubfieldOrder {
    /// The first sample occupies the most significant bits.
    #[default]
    MsbFirst,
    /// The first sample occupies the least significant bits.
    LsbFirst,
}

/// Unpacks `channels * samples` samples stored most-significant subfield
/// first.
pub fn unpack(
    payload: &[u8],
    depth: BitDepth,
    channels: usize,
    samples: usize,
) -> Result<Array2<u8>, FormatError> {
    unpack_ordered(payload, depth, SubfieldOrder::MsbFirst, channels, samples)
}

/// Unpacks `channels * samples` samples into a `(channels, samples)` grid
/// of raw values in `[0, 2^bits - 1]`.
///
/// The payload must be exactly as long as the declared samples require. A
/// trailing partial byte is accepted only when its unused subfields are
/// zero.
pub fn unpack_ordered(
    payload: &[u8],
    depth: BitDepth,
    order: SubfieldOrder,
    channels: usize,
    samples: usize,
) -> Result<Array2<u8>, FormatError> {
    let total = channels
        .checked_mul(samples)
        .ok_or(FormatError::InvalidField {
            name: "samples",
            value: samples as u64,
            reason: "channels x samples overflows",
        })?;

    let expected = depth.packed_len(total);
    if payload.len() != expected {
        return Err(FormatError::PayloadSize {
            channels,
            samples,
            bits: depth.bits(),
            expected,
            actual: payload.len(),
        });
    }

    let mut out = vec![0u8; total];
    match (depth, order) {
        (BitDepth::Eight, _) => out.copy_from_slice(payload),
        (BitDepth::Four, SubfieldOrder::MsbFirst) => expand::<4, true>(payload, &mut out)?,
        (BitDepth::Four, SubfieldOrder::LsbFirst) => expand::<4, false>(payload, &mut out)?,
        (BitDepth::Two, SubfieldOrder::MsbFirst) => expand::<2, true>(payload, &mut out)?,
        (BitDepth::Two, SubfieldOrder::LsbFirst) => expand::<2, false>(payload, &mut out)?,
        (BitDepth::One, SubfieldOrder::MsbFirst) => expand::<1, true>(payload, &mut out)?,
        (BitDepth::One, SubfieldOrder::LsbFirst) => expand::<1, false>(payload, &mut out)?,
    }

    Ok(Array2::from_shape_vec((channels, samples), out)?)
}

#[inline(always)]
const fn shift<const BITS: usize, const MSB_FIRST: bool>(k: usize) -> usize {
    if MSB_FIRST { 8 - BITS * (k + 1) } else { BITS * k }
}

fn expand<const BITS: usize, const MSB_FIRST: bool>(
    payload: &[u8],
    out: &mut [u8],
) -> Result<(), FormatError> {
    let per_byte = 8 / BITS;
    let mask = ((1u16 << BITS) - 1) as u8;

    let mut chunks = out.chunks_exact_mut(per_byte);
    for (dst, &byte) in (&mut chunks).zip(payload) {
        for (k, d) in dst.iter_mut().enumerate() {
            *d = (byte >> shift::<BITS, MSB_FIRST>(k)) & mask;
        }
    }

    let tail = chunks.into_remainder();
    if !tail.is_empty() {
        let byte = payload[payload.len() - 1];
        for (k, d) in tail.iter_mut().enumerate() {
            *d = (byte >> shift::<BITS, MSB_FIRST>(k)) & mask;
        }

        let padding = (tail.len()..per_byte)
            .fold(0u8, |acc, k| acc | (mask << shift::<BITS, MSB_FIRST>(k)));
        if byte & padding != 0 {
            return Err(FormatError::NonZeroPadding(byte & padding));
        }
    }

    Ok(())
}
