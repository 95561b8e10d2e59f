//! Drum presets, indexed by MIDI program number (spec §3, §9 "arenas over
//! pointers" — a fixed table, not per-voice allocation).

/// One drum voice's envelope and modulation shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrumPreset {
    /// Base pitch, in Hz.
    pub base_note: f32,
    /// Attack time, in ms. Overrides the channel-wide `A` for DRUM voices.
    pub a: i64,
    /// Release time, in ms. Overrides the channel-wide `R` for DRUM voices.
    pub r: i64,
    /// Envelope-to-pitch modulation depth (spec §4.1 DRUM pitch formula).
    pub env_mod: f32,
    /// Noise-to-pitch modulation depth (spec §4.1 DRUM pitch formula).
    pub noise_mod: f32,
}

impl DrumPreset {
    pub const fn new(base_note: f32, a: i64, r: i64, env_mod: f32, noise_mod: f32) -> Self {
        Self {
            base_note,
            a,
            r,
            env_mod,
            noise_mod,
        }
    }
}

/// Build the default drum-program table (128 MIDI program slots).
///
/// Unassigned programs fall back to a generic click so a note-on against an
/// unmapped program still produces audible output rather than silence.
pub fn default_presets() -> Vec<DrumPreset> {
    let generic_click = DrumPreset::new(800.0, 1, 40, 0.6, 0.1);
    let mut presets = vec![generic_click; 128];
    presets[0] = DrumPreset::new(60.0, 2, 180, 0.9, 0.05); // kick
    presets[1] = DrumPreset::new(220.0, 1, 120, 0.7, 0.35); // snare
    presets[2] = DrumPreset::new(900.0, 1, 45, 0.3, 0.6); // closed hat
    presets[3] = DrumPreset::new(900.0, 1, 260, 0.3, 0.6); // open hat
    presets[4] = DrumPreset::new(180.0, 2, 220, 0.8, 0.2); // low tom
    presets
}
