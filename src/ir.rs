//! Impulse Response loading (spec §6 "IR file format", §3 "Impulse Response").
//!
//! The wire format is a raw little-endian `f32` array of
//! `IR_LENGTH/2 + 1` complex bins (alternating real, imaginary) — the
//! precomputed real-FFT of a 4096-sample impulse response. We read the whole
//! file into memory once at startup (spec's "map file → memory as
//! read-only" becomes a plain `Vec` here; the teacher stack has no memory-map
//! crate and this is a few-KB file loaded once, not a hot path).

use std::path::Path;

use realfft::num_complex::Complex32;

use crate::error::SynthError;

/// A loaded, frequency-domain impulse response, shared immutably across
/// every channel's [`crate::convolution::Convolver`] (spec §4.5: "The IR is
/// shared immutably across channels").
#[derive(Debug, Clone)]
pub struct ImpulseResponse {
    /// `ir_length/2 + 1` complex bins.
    pub spectrum: Vec<Complex32>,
    pub ir_length: usize,
}

impl ImpulseResponse {
    /// Parse a raw little-endian float buffer into complex bins.
    pub fn from_bytes(bytes: &[u8], ir_length: usize) -> Result<Self, SynthError> {
        let expected_bins = ir_length / 2 + 1;
        let expected_bytes = expected_bins * 2 * std::mem::size_of::<f32>();
        if bytes.len() != expected_bytes {
            return Err(SynthError::InvalidIr(format!(
                "expected {expected_bytes} bytes ({expected_bins} complex bins), got {}",
                bytes.len()
            )));
        }

        let mut spectrum = Vec::with_capacity(expected_bins);
        for chunk in bytes.chunks_exact(8) {
            let re = f32::from_le_bytes(chunk[0..4].try_into().unwrap());
            let im = f32::from_le_bytes(chunk[4..8].try_into().unwrap());
            spectrum.push(Complex32::new(re, im));
        }

        Ok(Self { spectrum, ir_length })
    }

    /// Load an IR from disk (spec §6 IR file format).
    pub fn load(path: impl AsRef<Path>, ir_length: usize) -> Result<Self, SynthError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes, ir_length)
    }

    /// Build an IR spectrum directly from time-domain taps, for tests and
    /// for synthesizing a unit-impulse IR (spec §8 property 4).
    pub fn from_time_domain(taps: &[f32]) -> Result<Self, SynthError> {
        let ir_length = taps.len();
        let mut planner = realfft::RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(ir_length);
        let mut input = taps.to_vec();
        let mut spectrum = fft.make_output_vec();
        fft.process(&mut input, &mut spectrum)
            .map_err(|e| SynthError::InvalidIr(format!("FFT of time-domain taps failed: {e}")))?;
        Ok(Self { spectrum, ir_length })
    }
}
