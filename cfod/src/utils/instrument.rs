//! CHIME/FRB instrument constants.
//!
//! The L1 intensity stream is produced by a 2048-point FPGA FFT of the
//! 800 MSPS ADC stream (second Nyquist zone, 400-800 MHz), upchannelized by
//! 16 in the X-engine and integrated over 24 frames per sample.

/// ADC sampling frequency in Hz.
pub const ADC_SAMPLING_FREQ_HZ: f64 = 800e6;

/// Samples in the initial FPGA FFT.
pub const FPGA_NUM_SAMP_FFT: usize = 2048;

/// FPGA frequency channels.
pub const FPGA_NUM_FREQ: usize = FPGA_NUM_SAMP_FFT / 2;

/// Bin centre of the highest FPGA channel, in MHz.
pub const FPGA_FREQ0_MHZ: f64 = ADC_SAMPLING_FREQ_HZ / 1e6;

/// FPGA channel spacing in MHz (negative: channels run 800 to 400 MHz).
pub const FPGA_DELTA_FREQ_MHZ: f64 = -ADC_SAMPLING_FREQ_HZ / 2.0 / FPGA_NUM_FREQ as f64 / 1e6;

/// Top of the highest-frequency channel in MHz.
///
/// The FPGA channel around 800 MHz is contaminated by aliasing.
pub const FREQ_TOP_MHZ: f64 = FPGA_FREQ0_MHZ - FPGA_DELTA_FREQ_MHZ / 2.0;

/// Bottom of the lowest-frequency channel in MHz.
pub const FREQ_BOTTOM_MHZ: f64 = FREQ_TOP_MHZ - ADC_SAMPLING_FREQ_HZ / 2.0 / 1e6;

/// Total bandwidth in MHz.
pub const BANDWIDTH_MHZ: f64 = ADC_SAMPLING_FREQ_HZ / 1e6 / 2.0;

pub const L0_UPCHAN_FACTOR: usize = 16;
pub const L0_NUM_FRAMES_SAMPLE: usize = 8 * 3;

/// Output channels of the L1 intensity stream.
pub const NUM_CHANNELS: usize = FPGA_NUM_FREQ * L0_UPCHAN_FACTOR;

/// Width of one L1 channel in MHz.
pub const CHANNEL_BANDWIDTH_MHZ: f64 = ADC_SAMPLING_FREQ_HZ / 2.0 / NUM_CHANNELS as f64 / 1e6;

/// FPGA frame rate in Hz.
pub const FPGA_FREQUENCY_HZ: f64 = ADC_SAMPLING_FREQ_HZ / FPGA_NUM_SAMP_FFT as f64;

/// Time resolution of an unbinned sample in seconds.
pub const SAMPLING_TIME_S: f64 =
    1.0 / FPGA_FREQUENCY_HZ * (L0_UPCHAN_FACTOR * L0_NUM_FRAMES_SAMPLE) as f64;

/// FPGA counts spanned by one unbinned sample.
pub const FPGA_COUNTS_PER_SAMPLE: u64 = (L0_UPCHAN_FACTOR * L0_NUM_FRAMES_SAMPLE) as u64;

/// Nanoseconds per FPGA count.
pub const FPGA_NANO: u64 = 2560;

/// Bin centres of the L1 channels in MHz, ordered 400 to 800 MHz.
pub fn channel_frequencies() -> Vec<f64> {
    (0..NUM_CHANNELS)
        .map(|i| FREQ_BOTTOM_MHZ + CHANNEL_BANDWIDTH_MHZ / 2.0 + i as f64 * CHANNEL_BANDWIDTH_MHZ)
        .collect()
}

#[test]
fn derived_constants() {
    assert_eq!(NUM_CHANNELS, 16384);
    assert_eq!(FPGA_COUNTS_PER_SAMPLE, 384);
    assert!((SAMPLING_TIME_S - 0.98304e-3).abs() < 1e-12);
    assert!((CHANNEL_BANDWIDTH_MHZ - 0.0244140625).abs() < 1e-12);
    assert!((FREQ_TOP_MHZ - 800.1953125).abs() < 1e-9);
    assert!((FREQ_BOTTOM_MHZ - 400.1953125).abs() < 1e-9);

    let freqs = channel_frequencies();
    assert_eq!(freqs.len(), NUM_CHANNELS);
    assert!(freqs[0] > FREQ_BOTTOM_MHZ && freqs[NUM_CHANNELS - 1] < FREQ_TOP_MHZ);
}
