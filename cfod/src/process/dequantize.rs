use ndarray::{Array2, Axis};

use crate::structs::scales::{ScaleTable, SentinelTable};
use crate::utils::errors::FormatError;

/// Converts raw samples to intensities and weights.
///
/// Each sample becomes `raw * scale + offset` using the coefficients of its
/// block, with weight 1.0. Sentinel samples take the table's fill value and
/// weight 0.0.
pub fn dequantize(
    raw: &Array2<u8>,
    scales: &ScaleTable,
    offsets: &ScaleTable,
    sentinels: &SentinelTable,
) -> Result<(Array2<f32>, Array2<f32>), FormatError> {
    let (channels, samples) = raw.dim();
    scales.check_covers("scales", channels, samples)?;
    offsets.check_covers("offsets", channels, samples)?;

    if offsets.values().dim() != scales.values().dim()
        || offsets.channel_factor() != scales.channel_factor()
    {
        let (rows, cols) = offsets.values().dim();
        return Err(FormatError::ScaleShape {
            name: "offsets",
            rows,
            cols,
            channel_factor: offsets.channel_factor(),
            sample_factor: offsets.sample_factor(),
            channels: scales.values().nrows() * scales.channel_factor(),
            samples: scales.values().ncols() * scales.sample_factor(),
        });
    }

    let mut intensity = Array2::<f32>::zeros((channels, samples));
    let mut weights = Array2::<f32>::zeros((channels, samples));
    if channels == 0 || samples == 0 {
        return Ok((intensity, weights));
    }

    let channel_factor = scales.channel_factor();
    let sample_factor = scales.sample_factor();
    let fill = sentinels.fill();

    for (c, ((raw_row, mut out_row), mut weight_row)) in raw
        .outer_iter()
        .zip(intensity.outer_iter_mut())
        .zip(weights.outer_iter_mut())
        .enumerate()
    {
        let scale_row = scales.values().row(c / channel_factor);
        let offset_row = offsets.values().row(c / channel_factor);

        for (b, ((raw_block, mut out_block), mut weight_block)) in raw_row
            .axis_chunks_iter(Axis(0), sample_factor)
            .zip(out_row.axis_chunks_iter_mut(Axis(0), sample_factor))
            .zip(weight_row.axis_chunks_iter_mut(Axis(0), sample_factor))
            .enumerate()
        {
            let (scale, offset) = (scale_row[b], offset_row[b]);
            for ((&r, value), weight) in raw_block
                .iter()
                .zip(out_block.iter_mut())
                .zip(weight_block.iter_mut())
            {
                if sentinels.is_masked(r) {
                    *value = fill;
                    *weight = 0.0;
                } else {
                    *value = r as f32 * scale + offset;
                    *weight = 1.0;
                }
            }
        }
    }

    Ok((intensity, weights))
}
