//! Static configuration: the recognized options from spec §6, collected
//! into one struct so the voice engine, generator, and convolution engine
//! can share a single source of truth.

use serde::Deserialize;

use crate::error::SynthError;

/// All statically-knowable configuration for one synth instance.
///
/// Loaded from a TOML file via [`Config::from_toml_str`] or built directly
/// with [`Config::default`]; either way, call [`Config::validate`] before
/// handing it to [`crate::orchestrator::Orchestrator::start`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output sample rate in Hz.
    pub f_samp: u32,
    /// Hardware pulse-generator timer clock, in Hz.
    ///
    /// Period in the voice engine is `f_cpu / (2 * note)`; the coil model's
    /// phase counter advances once per audio sample (spec §4.4), so `f_cpu`
    /// must be expressed in the same domain as `f_samp` for the two halves
    /// to agree on pitch. We default it to `2 * f_samp` — see DESIGN.md's
    /// note on this open question.
    pub f_cpu: u32,
    /// Frame Sink block size.
    pub frames_per_buffer: u32,
    /// Output channel count. Fixed at 2 (stereo) by spec §6.
    pub channels: u32,
    /// Impulse response tap count. Fixed at 4096 by spec §6.
    pub ir_length: usize,
    /// Polyphony count (number of voice/coil slots).
    pub nvoices: usize,
    /// Arpeggiator ring capacity per ARP voice.
    pub max_arp_notes: usize,
    /// Pitch multiplier at full bend: `note *= 1 + (pitch_bend_range - 1) * pb/8192`.
    pub pitch_bend_range: f32,
    /// Grace period, in ms, before an arpeggiated note falls off after release.
    pub arpeggio_linger: i64,
    /// Selects the absolute-width pulse cap formula (spec §4.1) instead of
    /// the proportional one.
    pub absolute_pulse_width: bool,
    /// Enables dynamic ducking; when false, duck is fixed at 255 (no-op).
    pub autoduck: bool,
    /// Stereo pan separation coefficient used by the coil model (spec §4.4).
    pub stereo_separation: f32,
    /// Master output volume scale used by the coil model (spec §4.4).
    pub volume: f32,
    /// Background generator wake period, in microseconds (spec §4.4).
    pub wake_period_us: u64,
    /// Input/output FIFO capacity, in stereo-interleaved floats.
    pub max_fifo_size: usize,
    /// Absolute pulse-width ceiling, in timer ticks (spec §3 invariants).
    pub max_width: u32,
    /// Minimum timer-off time enforced between pulses (spec §3 invariants).
    pub min_off_time: u32,
    /// Below this width the Pulse Sink silences the channel outright.
    pub min_width: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            f_samp: 48_000,
            f_cpu: 96_000,
            frames_per_buffer: 128,
            channels: 2,
            ir_length: 4096,
            nvoices: 8,
            max_arp_notes: 4,
            pitch_bend_range: 2.0,
            arpeggio_linger: 150,
            absolute_pulse_width: false,
            autoduck: true,
            stereo_separation: 0.5,
            volume: 1.0,
            wake_period_us: 500,
            max_fifo_size: 16_384,
            max_width: 4_000,
            min_off_time: 20,
            min_width: 4,
        }
    }
}

impl Config {
    /// Parse a TOML document into a `Config`, filling unspecified fields
    /// with [`Config::default`] values.
    pub fn from_toml_str(s: &str) -> Result<Self, SynthError> {
        toml::from_str(s).map_err(|e| SynthError::Config(format!("invalid config toml: {e}")))
    }

    /// Reject configurations that would violate the invariants in spec §3.
    pub fn validate(&self) -> Result<(), SynthError> {
        if self.ir_length != 4096 {
            return Err(SynthError::Config(format!(
                "ir_length must be 4096, got {}",
                self.ir_length
            )));
        }
        if self.f_samp == 0 {
            return Err(SynthError::Config("f_samp must be nonzero".into()));
        }
        if self.channels != 2 {
            return Err(SynthError::Config("channels must be 2 (stereo)".into()));
        }
        if self.nvoices == 0 {
            return Err(SynthError::Config("nvoices must be nonzero".into()));
        }
        if self.min_width >= self.max_width {
            return Err(SynthError::Config(
                "min_width must be less than max_width".into(),
            ));
        }
        Ok(())
    }
}
