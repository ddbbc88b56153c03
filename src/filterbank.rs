use std::io::{self, BufWriter, Write};

use cfod::utils::instrument::{FREQ_BOTTOM_MHZ, FREQ_TOP_MHZ};
use cfod_macros::SigprocHeader;
use ndarray::ArrayView2;

use crate::byteorder::WriteBytesLe;

/// Sigproc names for CHIME and the CHIME/FRB backend.
pub const CHIME_TELESCOPE_ID: i32 = 20;
pub const CHIME_FRB_MACHINE_ID: i32 = 20;

/// PRESTO and sigproc read at most this many characters of header text.
pub const MAX_HEADER_TEXT: usize = 80;

pub trait SigprocHeader {
    fn write_header(&self, dst: &mut Vec<u8>);
}

/// A header value written as its key followed by the value itself.
pub trait SigprocField {
    fn write_keyed(&self, key: &str, dst: &mut Vec<u8>);
}

macro_rules! impl_sigproc_field {
    ($($t:ty),+) => { $(
        impl SigprocField for $t {
            fn write_keyed(&self, key: &str, dst: &mut Vec<u8>) {
                key.write_le(dst);
                self.write_le(dst);
            }
        }
    )+ }
}

impl_sigproc_field!(i32, f64, String);

#[derive(Debug, Clone, PartialEq, SigprocHeader)]
pub struct FilterbankHeader {
    pub telescope_id: i32,
    pub machine_id: i32,
    pub data_type: i32,
    pub rawdatafile: String,
    pub source_name: String,
    pub barycentric: i32,
    pub pulsarcentric: i32,
    /// Degrees.
    pub az_start: f64,
    pub za_start: f64,
    /// `hhmmss.s`
    pub src_raj: f64,
    /// `ddmmss.s`
    pub src_dej: f64,
    /// MJD.
    pub tstart: f64,
    /// Seconds.
    pub tsamp: f64,
    pub nbits: i32,
    pub nbeams: i32,
    pub ibeam: i32,
    /// Centre of the first (highest) channel in MHz.
    pub fch1: f64,
    /// Negative: channels run from high to low frequency.
    pub foff: f64,
    pub nchans: i32,
    pub nifs: i32,
}

impl FilterbankHeader {
    /// Header for CHIME/FRB data spanning the full band in `nchans`
    /// channels. Pointing and start time are left at zero.
    pub fn chime(rawdatafile: &str, source_name: &str, tsamp: f64, nchans: usize) -> Self {
        let channel_bandwidth = (FREQ_TOP_MHZ - FREQ_BOTTOM_MHZ).abs() / nchans as f64;
        Self {
            telescope_id: CHIME_TELESCOPE_ID,
            machine_id: CHIME_FRB_MACHINE_ID,
            data_type: 1,
            rawdatafile: rawdatafile.chars().take(MAX_HEADER_TEXT).collect(),
            source_name: source_name.to_string(),
            barycentric: 0,
            pulsarcentric: 0,
            az_start: 0.0,
            za_start: 0.0,
            src_raj: 0.0,
            src_dej: 0.0,
            tstart: 0.0,
            tsamp,
            nbits: SampleFormat::F32.nbits() as i32,
            nbeams: 1,
            ibeam: 0,
            fch1: FREQ_TOP_MHZ - channel_bandwidth / 2.0,
            foff: -channel_bandwidth,
            nchans: nchans as i32,
            nifs: 1,
        }
    }
}

/// Sample encoding of the spectra.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    #[default]
    F32,
    U16,
    U8,
}

impl SampleFormat {
    pub fn nbits(self) -> u32 {
        match self {
            Self::F32 => 32,
            Self::U16 => 16,
            Self::U8 => 8,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        self.nbits() as usize / 8
    }

    /// Clips to the representable range and encodes little-endian.
    #[inline]
    fn encode(self, value: f32, dst: &mut Vec<u8>) {
        match self {
            Self::F32 => value.clamp(f32::MIN, f32::MAX).write_le(dst),
            // float-to-int `as` saturates and maps NaN to 0
            Self::U16 => (value as u16).write_le(dst),
            Self::U8 => (value as u8).write_le(dst),
        }
    }
}

impl TryFrom<u32> for SampleFormat {
    type Error = io::Error;

    fn try_from(nbits: u32) -> Result<Self, Self::Error> {
        match nbits {
            32 => Ok(Self::F32),
            16 => Ok(Self::U16),
            8 => Ok(Self::U8),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Filterbank nbits must be 32, 16 or 8. Got {nbits}"),
            )),
        }
    }
}

/// Sigproc filterbank writer.
///
/// Spectra are given as `(nchan, nt)` grids with row 0 the lowest
/// frequency, and written time-major with the highest frequency first.
pub struct FilterbankWriter<W: Write> {
    writer: BufWriter<W>,
    format: SampleFormat,
    nchans: Option<usize>,
    spectra_written: u64,
    buffer: Vec<u8>,
}

impl<W: Write> FilterbankWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            format: SampleFormat::default(),
            nchans: None,
            spectra_written: 0,
            buffer: Vec::new(),
        }
    }

    pub fn configure_format(&mut self, format: SampleFormat) -> io::Result<()> {
        if self.nchans.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Cannot change format after writing the header",
            ));
        }
        self.format = format;
        Ok(())
    }

    /// Writes the header, with `nbits` taken from the configured format.
    pub fn write_header(&mut self, header: &FilterbankHeader) -> io::Result<()> {
        let header = FilterbankHeader {
            nbits: self.format.nbits() as i32,
            ..header.clone()
        };

        self.buffer.clear();
        header.write_header(&mut self.buffer);
        self.writer.write_all(&self.buffer)?;
        self.nchans = Some(header.nchans.max(0) as usize);
        Ok(())
    }

    /// Appends all time samples of `spectra`.
    pub fn write_spectra(&mut self, spectra: ArrayView2<f32>) -> io::Result<()> {
        let Some(nchans) = self.nchans else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Header must be written before spectra",
            ));
        };
        if spectra.nrows() != nchans {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Spectra have {} channels, header declares {}", spectra.nrows(), nchans),
            ));
        }

        self.buffer.clear();
        self.buffer
            .reserve(spectra.len() * self.format.bytes_per_sample());
        for column in spectra.columns() {
            for &value in column.iter().rev() {
                self.format.encode(value, &mut self.buffer);
            }
        }

        self.writer.write_all(&self.buffer)?;
        self.spectra_written += spectra.ncols() as u64;
        Ok(())
    }

    pub fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> io::Result<W> {
        self.writer.into_inner().map_err(|e| e.into_error())
    }

    pub fn stats(&self) -> FilterbankStats {
        FilterbankStats {
            spectra_written: self.spectra_written,
            nchans: self.nchans.unwrap_or(0),
            nbits: self.format.nbits(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterbankStats {
    pub spectra_written: u64,
    pub nchans: usize,
    pub nbits: u32,
}
