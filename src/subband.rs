use anyhow::{Result, bail};
use cfod::process::assemble::UnpackedBatch;
use cfod::utils::instrument::{BANDWIDTH_MHZ, FREQ_BOTTOM_MHZ, NUM_CHANNELS, SAMPLING_TIME_S};
use log::{info, warn};
use ndarray::{Array1, Array2, ArrayView2, Axis};

/// Allowed frequency scrunch factors.
pub const SCRUNCH_FACTORS: [usize; 15] = [
    1, 2, 4, 8, 16, 32, 64, 128, 256, 512, 1024, 2048, 4096, 8192, 16384,
];

pub const DEFAULT_FSCRUNCH: usize = 4;

/// Longest spectrum a stock sigproc build reads.
pub const SIGPROC_MAX_CHANNELS: usize = 4096;

/// Dispersive delay in seconds at `freq_mhz` for `dm` in pc cm^-3.
pub fn delay_from_dm(dm: f64, freq_mhz: f64) -> f64 {
    if freq_mhz > 0.0 {
        dm / (0.000241 * freq_mhz * freq_mhz)
    } else {
        0.0
    }
}

/// Returns `factor` if it is a supported power of two, the default otherwise.
pub fn checked_fscrunch(factor: usize) -> usize {
    if SCRUNCH_FACTORS.contains(&factor) {
        factor
    } else {
        warn!("fscrunch {factor} is not a power of 2 up to 16384, using {DEFAULT_FSCRUNCH}");
        DEFAULT_FSCRUNCH
    }
}

/// Centre frequencies of `n` equal channels across the band, lowest first.
fn centres(n: usize) -> impl Iterator<Item = f64> {
    let width = BANDWIDTH_MHZ / n as f64;
    (0..n).map(move |i| FREQ_BOTTOM_MHZ + (i as f64 + 0.5) * width)
}

/// Shifts every channel by its delay relative to the centre of its subband.
///
/// Rows are rotated towards earlier times, and the weights of samples that
/// wrapped around are zeroed.
pub fn dedisperse_subbands(
    intensity: &mut Array2<f32>,
    weights: &mut Array2<f32>,
    nsub: usize,
    dm: f64,
    tsamp: f64,
) {
    let (nchan, nt) = intensity.dim();
    if nsub == 0 || nchan % nsub != 0 || nt == 0 {
        return;
    }
    let per_sub = nchan / nsub;
    let sub_delays: Vec<f64> = centres(nsub).map(|f| delay_from_dm(dm, f)).collect();

    for (c, f) in centres(nchan).enumerate() {
        let relative = delay_from_dm(dm, f) - sub_delays[c / per_sub];
        let shift = (relative / tsamp).round() as i64;
        if shift == 0 {
            continue;
        }

        let start = shift.rem_euclid(nt as i64) as usize;
        for array in [&mut *intensity, &mut *weights] {
            let mut row = array.row_mut(c);
            let rolled: Array1<f32> = (0..nt).map(|j| row[(j + start) % nt]).collect();
            row.assign(&rolled);
        }

        let wrapped = shift.unsigned_abs().min(nt as u64) as usize;
        let mut row = weights.row_mut(c);
        if shift > 0 {
            row.slice_mut(ndarray::s![nt - wrapped..]).fill(0.0);
        } else {
            row.slice_mut(ndarray::s![..wrapped]).fill(0.0);
        }
    }
}

/// Averages groups of adjacent channels into `nsub` subbands.
///
/// Intensities are weight-averaged (0 where every weight is 0); subband
/// weights are the plain mean.
pub fn scrunch(
    intensity: ArrayView2<f32>,
    weights: ArrayView2<f32>,
    nsub: usize,
) -> (Array2<f32>, Array2<f32>) {
    let (nchan, nt) = intensity.dim();
    let per_sub = nchan / nsub.max(1);
    let mut out = Array2::<f32>::zeros((nsub, nt));
    let mut out_weights = Array2::<f32>::zeros((nsub, nt));

    for (s, (chans, chan_weights)) in intensity
        .axis_chunks_iter(Axis(0), per_sub.max(1))
        .zip(weights.axis_chunks_iter(Axis(0), per_sub.max(1)))
        .enumerate()
        .take(nsub)
    {
        let weight_sum = chan_weights.sum_axis(Axis(0));
        let weighted_sum = (&chans * &chan_weights).sum_axis(Axis(0));

        for t in 0..nt {
            if weight_sum[t] > 0.0 {
                out[[s, t]] = weighted_sum[t] / weight_sum[t];
            }
            out_weights[[s, t]] = weight_sum[t] / per_sub as f32;
        }
    }

    (out, out_weights)
}

/// A batch reduced to the output channel resolution.
#[derive(Debug, Clone)]
pub struct Subbands {
    pub intensity: Array2<f32>,
    pub weights: Array2<f32>,
    pub tsamp: f64,
    /// Channel width in MHz.
    pub df: f64,
}

impl Subbands {
    /// Intensity with flagged samples zeroed, as written to disk.
    pub fn weighted(&self) -> Array2<f32> {
        &self.intensity * &self.weights
    }

    pub fn nchan(&self) -> usize {
        self.intensity.nrows()
    }
}

/// Scrunches a batch by `fscrunch` (relative to the full 16384-channel
/// resolution), dedispersing within subbands first when `subdm` is given.
pub fn subband(batch: UnpackedBatch, fscrunch: usize, subdm: Option<f64>) -> Result<Subbands> {
    let tsamp = SAMPLING_TIME_S * batch.binning as f64;
    let fscrunch = checked_fscrunch(fscrunch);
    let nsub = NUM_CHANNELS / fscrunch;
    if nsub > SIGPROC_MAX_CHANNELS {
        warn!(
            "Sigproc spectra are capped at {SIGPROC_MAX_CHANNELS} channels by default; \
             rebuild sigproc with a larger limit to read {nsub} channels"
        );
    }

    let nchan = batch.nchan();
    if nchan % nsub != 0 {
        bail!("Cannot split {nchan} channels into {nsub} subbands");
    }
    let df = (nchan / nsub) as f64 * BANDWIDTH_MHZ / nchan as f64;

    let UnpackedBatch {
        mut intensity,
        mut weights,
        ..
    } = batch;

    if nchan == nsub {
        return Ok(Subbands {
            intensity,
            weights,
            tsamp,
            df,
        });
    }

    if let Some(dm) = subdm {
        info!("Dedispersing channels within {nsub} subbands to DM {dm}");
        dedisperse_subbands(&mut intensity, &mut weights, nsub, dm, tsamp);
    }

    let (intensity, weights) = scrunch(intensity.view(), weights.view(), nsub);
    Ok(Subbands {
        intensity,
        weights,
        tsamp,
        df,
    })
}
