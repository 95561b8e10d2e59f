//! Precomputed lookup tables shared by the voice engine (spec §2, §9.B.1-2).
//!
//! Computed once at startup and held behind an `Arc` rather than as process
//! globals, per the "global state → passed context" redesign note in
//! spec §9.

use std::sync::Arc;

/// Table size for the exponential decay and sine curves.
pub const LOOKUP_SIZE: usize = 256;

/// Precomputed exponential-decay and sine curves plus the MIDI note → Hz map.
#[derive(Debug)]
pub struct Tables {
    /// 256-entry exponential decay curve, `0..=255`. `e_lookup[0] == 255`,
    /// decaying toward `0` as the index approaches 255.
    pub e_lookup: [u8; LOOKUP_SIZE],
    /// 256-entry signed sine curve, range `-127..=127`.
    pub sin_lookup: [i8; LOOKUP_SIZE],
    /// MIDI note number (0..128) → frequency in Hz, A4 (note 69) = 440 Hz.
    pub midi2freq: [f32; 128],
}

impl Tables {
    /// Build all three tables and return them behind an `Arc` for cheap
    /// sharing between the voice engine and any test doubles.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            e_lookup: build_exp_lookup(),
            sin_lookup: build_sine_lookup(),
            midi2freq: build_midi_to_freq(),
        })
    }
}

/// `e_lookup[i] = round((exp(-i*EXP_CRUNCH/255) - scale) / (1 - scale) * 255)`,
/// `scale = exp(-EXP_CRUNCH)`, `EXP_CRUNCH = 5.0`.
///
/// The `(x - scale)/(1 - scale)` normalization pins the curve to exactly
/// `255` at `i=0` and `0` at `i=255`, so every ADSR stage actually reaches
/// zero rather than asymptoting to a small nonzero floor.
fn build_exp_lookup() -> [u8; LOOKUP_SIZE] {
    const EXP_CRUNCH: f32 = 5.0;
    let scale = (-EXP_CRUNCH).exp();
    let mut table = [0u8; LOOKUP_SIZE];
    for (i, slot) in table.iter_mut().enumerate() {
        let x = i as f32 / (LOOKUP_SIZE - 1) as f32;
        let raw = (-EXP_CRUNCH * x).exp();
        let normalized = (raw - scale) / (1.0 - scale);
        *slot = (255.0 * normalized).round().clamp(0.0, 255.0) as u8;
    }
    table
}

/// `sin_lookup[i] = round(127 * sin(2*pi*i/256))`, signed 8-bit.
fn build_sine_lookup() -> [i8; LOOKUP_SIZE] {
    let mut table = [0i8; LOOKUP_SIZE];
    for (i, slot) in table.iter_mut().enumerate() {
        let theta = 2.0 * std::f32::consts::PI * (i as f32) / (LOOKUP_SIZE as f32);
        *slot = (127.0 * theta.sin()).round().clamp(-127.0, 127.0) as i8;
    }
    table
}

/// Equal-temperament MIDI note → Hz, A4 (note 69) = 440 Hz.
fn build_midi_to_freq() -> [f32; 128] {
    let mut table = [0.0f32; 128];
    for (note, slot) in table.iter_mut().enumerate() {
        *slot = 440.0 * 2f32.powf((note as f32 - 69.0) / 12.0);
    }
    table
}
