use std::path::Path;
use std::sync::mpsc;
use std::thread;

use log::{Level, debug, info};
use ndarray::{Array2, ArrayView2, Axis, concatenate};

use crate::process::decode::Decoder;
use crate::process::unpack::BitDepth;
use crate::structs::chunk::AssembledChunk;
use crate::utils::errors::{AssembleError, Error, FormatError};

/// Arrays and timing of one decoded file.
#[derive(Debug, Clone)]
pub struct UnpackedData {
    /// `(nchan, nt)` dequantized intensities, highest frequency first.
    pub intensity: Array2<f32>,
    /// 1.0 for measured samples, 0.0 for sentinels.
    pub weights: Array2<f32>,
    pub fpga0: u64,
    pub fpga_n: u64,
    pub binning: u64,
    /// `None` for V1 files.
    pub frame0_nano: Option<u64>,
    /// `None` for V1 files.
    pub nrfifreq: Option<usize>,
    /// `true` where a sample was kept by L1 RFI flagging.
    pub rfi_mask: Array2<bool>,
    pub bit_depth: BitDepth,
}

impl UnpackedData {
    pub fn from_chunk(chunk: &AssembledChunk) -> Result<Self, FormatError> {
        let (intensity, weights) = chunk.decode()?;
        Ok(Self {
            intensity,
            weights,
            fpga0: chunk.fpga0,
            fpga_n: chunk.fpga_n,
            binning: chunk.binning,
            frame0_nano: chunk.frame0_nano,
            nrfifreq: chunk.nrfifreq,
            rfi_mask: chunk.rfi_mask()?,
            bit_depth: chunk.bit_depth,
        })
    }

    pub fn nchan(&self) -> usize {
        self.intensity.nrows()
    }

    pub fn nt(&self) -> usize {
        self.intensity.ncols()
    }
}

/// How files with different time binning are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BinningPolicy {
    /// Every file must share one binning.
    #[default]
    Uniform,
    /// Coarser files are repeated up to the finest binning present.
    Upsample,
}

#[derive(Debug, Clone)]
pub struct AssembleOptions {
    pub binning: BinningPolicy,
    /// Decoding threads; 0 and 1 decode on the calling thread.
    pub workers: usize,
    pub fail_level: Level,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            binning: BinningPolicy::Uniform,
            workers: 1,
            fail_level: Level::Error,
        }
    }
}

/// Several files joined along the time axis in input order.
#[derive(Debug, Clone)]
pub struct UnpackedBatch {
    /// `(nchan, total_nt)`, lowest frequency first.
    pub intensity: Array2<f32>,
    pub weights: Array2<f32>,
    pub fpga0s: Vec<u64>,
    pub fpga_ns: Vec<u64>,
    pub binning: u64,
    /// Same channel order as `intensity`.
    pub rfi_mask: Array2<bool>,
    pub frame0_nanos: Vec<Option<u64>>,
}

impl UnpackedBatch {
    pub fn nchan(&self) -> usize {
        self.intensity.nrows()
    }

    pub fn nt(&self) -> usize {
        self.intensity.ncols()
    }
}

fn unpack_with(decoder: &Decoder, path: &Path) -> Result<UnpackedData, Error> {
    let chunk = decoder.decode_file(path)?;
    UnpackedData::from_chunk(&chunk).map_err(|source| Error::Format {
        path: path.to_path_buf(),
        source,
    })
}

/// Decodes one file into intensities, weights and metadata.
pub fn unpack_data<P: AsRef<Path>>(path: P) -> Result<UnpackedData, Error> {
    unpack_with(&Decoder::default(), path.as_ref())
}

fn decode_all<P: AsRef<Path> + Sync>(
    paths: &[P],
    decoder: &Decoder,
    workers: usize,
) -> Result<Vec<UnpackedData>, Error> {
    let workers = workers.clamp(1, paths.len().max(1));
    if workers == 1 {
        return paths
            .iter()
            .map(|path| unpack_with(decoder, path.as_ref()))
            .collect();
    }

    let (tx, rx) = mpsc::channel();
    thread::scope(|scope| {
        for worker in 0..workers {
            let tx = tx.clone();
            scope.spawn(move || {
                for (index, path) in paths.iter().enumerate().skip(worker).step_by(workers) {
                    if tx.send((index, unpack_with(decoder, path.as_ref()))).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(tx);

    let mut slots: Vec<Option<Result<UnpackedData, Error>>> =
        std::iter::repeat_with(|| None).take(paths.len()).collect();
    for (index, result) in rx {
        slots[index] = Some(result);
    }

    // first failure in input order wins
    slots.into_iter().flatten().collect()
}

fn repeat_samples<T: Clone>(array: Array2<T>, factor: usize) -> Array2<T> {
    if factor == 1 {
        return array;
    }
    let (rows, cols) = array.dim();
    Array2::from_shape_fn((rows, cols * factor), |(r, c)| array[[r, c / factor]].clone())
}

fn views<T>(arrays: &[Array2<T>]) -> Vec<ArrayView2<'_, T>> {
    arrays.iter().map(|a| a.view()).collect()
}

fn join<T: Clone>(parts: &[ArrayView2<T>]) -> Result<Array2<T>, AssembleError> {
    let mut joined = concatenate(Axis(1), parts)?;
    joined.invert_axis(Axis(0));
    Ok(joined.as_standard_layout().into_owned())
}

/// Decodes `paths` and joins them along the time axis.
///
/// Files must agree on channel count, bit depth and RFI mask height. The
/// channel axis of the result is reversed so that row 0 is the lowest
/// frequency. Any failure aborts the whole batch.
pub fn unpack_datafiles<P: AsRef<Path> + Sync>(
    paths: &[P],
    options: &AssembleOptions,
) -> Result<UnpackedBatch, Error> {
    if paths.is_empty() {
        return Err(AssembleError::EmptyBatch.into());
    }

    let mut decoder = Decoder::default();
    decoder.set_fail_level(options.fail_level);

    let parts = decode_all(paths, &decoder, options.workers)?;
    let first = &parts[0];

    for (part, path) in parts.iter().zip(paths).skip(1) {
        let path = path.as_ref().to_path_buf();
        if part.nchan() != first.nchan() {
            return Err(AssembleError::ChannelMismatch {
                path,
                expected: first.nchan(),
                found: part.nchan(),
            }
            .into());
        }
        if part.bit_depth != first.bit_depth {
            return Err(AssembleError::BitDepthMismatch {
                path,
                expected: first.bit_depth.bits(),
                found: part.bit_depth.bits(),
            }
            .into());
        }
        if part.rfi_mask.nrows() != first.rfi_mask.nrows() {
            return Err(AssembleError::RfiMaskMismatch {
                path,
                expected: first.rfi_mask.nrows(),
                found: part.rfi_mask.nrows(),
            }
            .into());
        }
    }

    let binning = match options.binning {
        BinningPolicy::Uniform => {
            for (part, path) in parts.iter().zip(paths) {
                if part.binning != first.binning {
                    return Err(AssembleError::BinningMismatch {
                        path: path.as_ref().to_path_buf(),
                        expected: first.binning,
                        found: part.binning,
                    }
                    .into());
                }
            }
            first.binning
        }
        BinningPolicy::Upsample => {
            let finest = parts.iter().map(|p| p.binning).min().unwrap_or(1);
            for (part, path) in parts.iter().zip(paths) {
                if part.binning % finest != 0 {
                    return Err(AssembleError::IncompatibleBinning {
                        path: path.as_ref().to_path_buf(),
                        finest,
                        found: part.binning,
                    }
                    .into());
                }
            }
            finest
        }
    };

    let mut fpga0s = Vec::with_capacity(parts.len());
    let mut fpga_ns = Vec::with_capacity(parts.len());
    let mut frame0_nanos = Vec::with_capacity(parts.len());
    let mut intensities = Vec::with_capacity(parts.len());
    let mut weights = Vec::with_capacity(parts.len());
    let mut masks = Vec::with_capacity(parts.len());

    for part in parts {
        let factor = (part.binning / binning) as usize;
        if factor > 1 {
            debug!("Upsampling chunk at fpga0 {} by {}", part.fpga0, factor);
        }
        fpga0s.push(part.fpga0);
        fpga_ns.push(part.fpga_n);
        frame0_nanos.push(part.frame0_nano);
        intensities.push(repeat_samples(part.intensity, factor));
        weights.push(repeat_samples(part.weights, factor));
        masks.push(repeat_samples(part.rfi_mask, factor));
    }

    let batch = UnpackedBatch {
        intensity: join(&views(&intensities))?,
        weights: join(&views(&weights))?,
        fpga0s,
        fpga_ns,
        binning,
        rfi_mask: join(&views(&masks))?,
        frame0_nanos,
    };

    info!(
        "Assembled {} files into {} channels x {} samples (binning {})",
        paths.len(),
        batch.nchan(),
        batch.nt(),
        batch.binning
    );

    Ok(batch)
}
