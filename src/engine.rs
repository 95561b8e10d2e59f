//! The voice engine's periodic tick (spec §4.1) — the largest single piece
//! of this crate by design budget.
//!
//! [`SynthCore`] bundles the MIDI-mutable state ([`crate::midi::MidiController`])
//! and the tick-mutable state ([`VoiceEngine`]) behind one `Arc`, replacing
//! the original firmware's process-wide globals with an owned context passed
//! to every call (spec §9 "global state → passed context").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rand::Rng;

use crate::config::Config;
use crate::drum::{self, DrumPreset};
use crate::midi::SynthState;
use crate::pulse_sink::PulseSink;
use crate::tables::Tables;
use crate::voice::{AdsrStage, Channel, Voice};

/// Shared state behind [`crate::midi::MidiController`] and [`VoiceEngine`].
pub struct SynthCore {
    pub(crate) voices: Mutex<Vec<Voice>>,
    pub(crate) synth_state: Mutex<SynthState>,
    pub(crate) tick_was_skipped: AtomicBool,
    pub(crate) tables: Arc<Tables>,
    pub(crate) drum_presets: Vec<DrumPreset>,
    pub(crate) config: Config,
}

impl SynthCore {
    pub fn new(config: Config) -> Arc<Self> {
        let voices = (0..config.nvoices).map(|_| Voice::new()).collect();
        Arc::new(Self {
            voices: Mutex::new(voices),
            synth_state: Mutex::new(SynthState::default()),
            tick_was_skipped: AtomicBool::new(false),
            tables: Tables::new(),
            drum_presets: drum::default_presets(),
            config,
        })
    }

    /// This instance's configuration (immutable after construction).
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A read-only snapshot of one voice's externally-observable state —
    /// for diagnostics and tests, without exposing the voice lock itself.
    pub fn voice_snapshot(&self, index: usize) -> VoiceSnapshot {
        let voices = self.voices.lock().unwrap();
        let v = &voices[index];
        VoiceSnapshot {
            active: v.active,
            adsr_stage: v.adsr_stage,
            arp_current_note: v.arp.as_ref().map(|arp| arp.notes[arp.notes_index]),
        }
    }
}

/// See [`SynthCore::voice_snapshot`].
#[derive(Debug, Clone, Copy)]
pub struct VoiceSnapshot {
    pub active: bool,
    pub adsr_stage: AdsrStage,
    pub arp_current_note: Option<u8>,
}

/// Runs [`SynthCore::voices`] through one tick, per spec §4.1: two passes —
/// compute envelope/pitch, then duck and emit to the [`PulseSink`].
pub struct VoiceEngine {
    core: Arc<SynthCore>,
    /// Reused scratch buffer: `(note_hz, scaled_env)` per voice from pass 1,
    /// avoiding per-tick allocation (spec §9 "no dynamic allocation in the
    /// audio path").
    pass1: Vec<(f32, u8)>,
}

impl VoiceEngine {
    pub fn new(core: Arc<SynthCore>) -> Self {
        let n = core.config.nvoices;
        Self {
            core,
            pass1: vec![(0.0, 0); n],
        }
    }

    /// Run one tick at wall-clock `now` (ms), writing to `sink`.
    ///
    /// Returns `false` without touching `sink` if the voice bank is
    /// currently being edited by [`crate::midi::MidiController`] (spec
    /// §4.1 re-entrancy guard) — the caller should treat that as "try
    /// again very soon".
    pub fn tick(&mut self, now: i64, sink: &dyn PulseSink) -> bool {
        let Ok(mut voices) = self.core.voices.try_lock() else {
            self.core.tick_was_skipped.store(true, Ordering::Release);
            return false;
        };
        let state = self.core.synth_state.lock().unwrap().clone();
        let cfg = &self.core.config;

        let mut total_env: u32 = 0;
        for (i, v) in voices.iter_mut().enumerate() {
            if !v.active {
                self.pass1[i] = (0.0, 0);
                continue;
            }

            if v.channel == Channel::Arp {
                tick_arp_notes(v, now, state.arpeggio_period, cfg.arpeggio_linger);
            }

            let env = match v.channel {
                Channel::Note => tick_note(v),
                Channel::Fx | Channel::Arp => tick_adsr(v, &state, &self.core.tables, now, None),
                Channel::Drum => {
                    let preset = self.core.drum_presets[v.drum_program.unwrap_or(0) as usize];
                    tick_adsr(v, &state, &self.core.tables, now, Some(preset))
                }
            };

            let note = match v.channel {
                Channel::Note | Channel::Fx => self.core.tables.midi2freq[v.midi_note as usize],
                Channel::Arp => pitch_for_arp(v, &self.core.tables),
                Channel::Drum => pitch_for_drum(v, env, &self.core.drum_presets),
            };
            let note = apply_pitch_bend(note, v.midi_pb, cfg.pitch_bend_range);
            let (note, env) = if matches!(v.channel, Channel::Fx | Channel::Arp) {
                apply_tremolo_vibrato(note, env, v.note_down_timestamp, now, &state, &self.core.tables)
            } else {
                (note, env)
            };

            v.period = period_from_note(note, cfg.f_cpu);
            self.pass1[i] = (note, env);
            total_env += env as u32;

            if v.adsr_stage == AdsrStage::Done {
                v.active = false;
            }
        }

        let duck = if cfg.autoduck {
            compute_duck(total_env)
        } else {
            255
        };

        for (i, v) in voices.iter_mut().enumerate() {
            if !v.active {
                sink.set_width(i, 0);
                continue;
            }
            let (_, env) = self.pass1[i];
            let max_width = max_width_for(v.period, state.vol, cfg);
            let pulse_width = pulse_width_for(max_width, env, duck);
            let pulse_width = pulse_width.min(v.period.saturating_sub(cfg.min_off_time));
            v.pulse_width = pulse_width;

            sink.set_period(i, v.period);
            sink.set_width(i, pulse_width);
        }

        true
    }
}

/// NOTE channel: no ADSR, envelope tracks key-down state directly
/// (spec §4.1).
fn tick_note(v: &mut Voice) -> u8 {
    if v.midi_note_down {
        v.adsr_stage = AdsrStage::Sustain;
        ((v.midi_vel as u32) * 2).min(255) as u8
    } else {
        v.active = false;
        v.adsr_stage = AdsrStage::Done;
        0
    }
}

/// Shared ADSR envelope for FX/ARP/DRUM channels (spec §4.1). `drum_preset`
/// is `Some` only for `Channel::Drum`, whose preset overrides the
/// channel-wide attack/release (spec §3).
fn tick_adsr(v: &mut Voice, state: &SynthState, tables: &Tables, now: i64, drum_preset: Option<DrumPreset>) -> u8 {
    let (a, r) = match drum_preset {
        Some(p) => (p.a, p.r),
        None => (state.attack, state.release),
    };
    let d = state.decay;
    let is_drum = drum_preset.is_some();

    advance_adsr_stage(v, a, d, r, now, is_drum);

    let dt = now - v.adsr_timestamp;
    let raw = envelope_value(v.adsr_stage, dt, a, d, r, state.sustain, v.last_env, tables);
    if v.adsr_stage < AdsrStage::Release {
        v.last_env = raw;
    }
    if v.adsr_stage == AdsrStage::Done {
        return 0;
    }
    scale_by_velocity(raw, v.midi_vel)
}

fn scale_by_velocity(raw: u8, vel: u8) -> u8 {
    ((raw as u32 * 2 * vel as u32) / 255).min(255) as u8
}

/// Advance `v.adsr_stage`, honoring note-off-forces-release ahead of the
/// normal duration-based transitions (spec §4.1, §3 invariant: stage is
/// monotonic except via an explicit note-on).
fn advance_adsr_stage(v: &mut Voice, a: i64, d: i64, r: i64, now: i64, is_drum: bool) {
    if v.adsr_stage != AdsrStage::Done && v.adsr_stage != AdsrStage::Release && !v.midi_note_down {
        v.adsr_stage = AdsrStage::Release;
        v.adsr_timestamp = now;
        return;
    }

    let dt = now - v.adsr_timestamp;
    match v.adsr_stage {
        AdsrStage::Attack => {
            if dt > a.max(1) {
                if is_drum {
                    // Drum voices have no decay/sustain distinction: attack
                    // skips straight past both into release.
                    v.adsr_stage = AdsrStage::Release;
                    v.last_env = 255;
                } else {
                    v.adsr_stage = AdsrStage::Decay;
                }
                v.adsr_timestamp = now;
            }
        }
        AdsrStage::Decay => {
            if dt > d.max(1) {
                v.adsr_stage = AdsrStage::Sustain;
                v.adsr_timestamp = now;
            }
        }
        AdsrStage::Sustain => {}
        AdsrStage::Release => {
            if dt > r.max(1) {
                v.adsr_stage = AdsrStage::Done;
                v.active = false;
                if let Some(arp) = v.arp.as_mut() {
                    arp.note_end_timestamps.iter_mut().for_each(|t| *t = 0);
                }
                v.adsr_timestamp = now;
            }
        }
        AdsrStage::Done => {}
    }
}

/// `e_lookup`-driven envelope value for the current ADSR stage (spec §4.1).
/// Release decays from `last_env` (the value latched when release began),
/// rather than from 255, so a note released mid-decay fades from where it
/// actually was.
fn envelope_value(stage: AdsrStage, dt: i64, a: i64, d: i64, r: i64, s: u8, last_env: u8, tables: &Tables) -> u8 {
    let e = |x: i64, span: i64| -> u8 {
        let span = span.max(1);
        let idx = ((x.max(0) * 255) / span).clamp(0, 255) as usize;
        tables.e_lookup[idx]
    };
    match stage {
        AdsrStage::Attack => 255u8.saturating_sub(e(dt, a)),
        AdsrStage::Decay => {
            let decayed = (255 - s) as u32 * e(dt, d) as u32 / 255;
            (decayed + s as u32).min(255) as u8
        }
        AdsrStage::Sustain => s,
        AdsrStage::Release => (last_env as u32 * e(dt, r) as u32 / 255) as u8,
        AdsrStage::Done => 0,
    }
}

/// Re-derive `midiNoteDown` for an ARP voice from its ring of held notes,
/// advance the currently-sounding slot at `arpeggio_period`, and free slots
/// whose linger has expired (spec §4.1 ARP pitch section).
///
/// `note_end_timestamps[slot]` is `0` for an empty slot, `i64::MAX` for a
/// still-held note, or `now + arpeggio_linger` (set at note-off) for one
/// ringing out. Re-derivation compares against `now + arpeggio_linger`
/// rather than the literal `endTimestamp - ARPEGGIO_LINGER > now` from the
/// original firmware, since the latter underflows in unsigned arithmetic;
/// this crate uses signed milliseconds throughout, so the rewritten
/// comparison is exact and overflow-free (see DESIGN.md).
fn tick_arp_notes(v: &mut Voice, now: i64, arpeggio_period: i64, arpeggio_linger: i64) {
    let Some(arp) = v.arp.as_mut() else { return };

    let was_down = v.midi_note_down;
    let now_down = arp
        .note_end_timestamps
        .iter()
        .any(|&t| t == i64::MAX || t > now + arpeggio_linger);
    v.midi_note_down = now_down;

    if was_down && !now_down {
        for t in arp.note_end_timestamps.iter_mut() {
            if *t > now {
                *t = i64::MAX;
            }
        }
    }

    if now - arp.timestamp >= arpeggio_period.max(1) {
        arp.timestamp = now;
        let n = arp.notes.len();
        for step in 1..=n {
            let idx = (arp.notes_index + step) % n;
            if arp.note_end_timestamps[idx] > now {
                arp.notes_index = idx;
                break;
            }
        }
    }

    for t in arp.note_end_timestamps.iter_mut() {
        if *t != 0 && *t != i64::MAX && *t <= now {
            *t = 0;
        }
    }
}

fn pitch_for_arp(v: &Voice, tables: &Tables) -> f32 {
    let Some(arp) = v.arp.as_ref() else { return 0.0 };
    let note = arp.notes[arp.notes_index];
    tables.midi2freq[note as usize]
}

/// DRUM pitch formula (spec §4.1): base pitch modulated by the voice's own
/// envelope and a noise term, both scaled by the triggering preset's depths.
fn pitch_for_drum(v: &Voice, env: u8, presets: &[DrumPreset]) -> f32 {
    let preset = presets[v.drum_program.unwrap_or(0) as usize];
    let env_frac = env as f32 / 255.0;
    let noise = rand::rng().random::<f32>() * 2.0 - 1.0;
    preset.base_note * (1.0 + preset.env_mod * env_frac + preset.noise_mod * noise)
}

/// `note *= 1 + (PITCH_BEND_RANGE - 1) * midiPB/8192` (spec §4.1).
fn apply_pitch_bend(note: f32, pitch_bend: i16, pitch_bend_range: f32) -> f32 {
    note * (1.0 + (pitch_bend_range - 1.0) * pitch_bend as f32 / 8192.0)
}

/// Vibrato (pitch) and tremolo (amplitude) modulation, both delayed-onset
/// sine LFOs driven by [`Tables::sin_lookup`] (spec §4.1). The
/// `8_258_175 = 255*255*127` denominator normalizes the depth/amount/osc
/// triple product to roughly unity at full depth and full bend.
fn apply_tremolo_vibrato(
    note: f32,
    env: u8,
    note_down_timestamp: i64,
    now: i64,
    state: &SynthState,
    tables: &Tables,
) -> (f32, u8) {
    const NORMALIZER: f32 = 8_258_175.0;
    let dt = (now - note_down_timestamp).max(0);

    let tremolo_amount = ((dt * 255) / state.tremolo_delay.max(1)).min(255);
    let tremolo_osc = tables.sin_lookup[(((dt * 255) / state.tremolo_period.max(1)) % 256) as usize];
    let env_factor = 1.0 + (state.tremolo_depth as i64 * tremolo_amount * tremolo_osc as i64) as f32 / NORMALIZER;

    let vibrato_amount = ((dt * 255) / state.vibrato_delay.max(1)).min(255);
    let vibrato_osc = tables.sin_lookup[(((dt * 255) / state.vibrato_period.max(1)) % 256) as usize];
    let note_factor = 1.0 + (state.vibrato_depth as i64 * vibrato_amount * vibrato_osc as i64) as f32 / NORMALIZER;

    let env = (env as f32 * env_factor).round().clamp(0.0, 255.0) as u8;
    (note * note_factor, env)
}

/// `period = f_cpu / (2 * note)` (spec §4.1); silent voices (`note <= 0`)
/// get a zero period, which the coil model treats as permanently low.
fn period_from_note(note: f32, f_cpu: u32) -> u32 {
    if note <= 0.0 {
        return 0;
    }
    (f_cpu as f32 / (2.0 * note)).round().max(0.0) as u32
}

/// Global gain-reduction factor, `0..=255` (spec §4.1):
/// `duck = 65025 / max(totalEnv - 255, 255)`, clamped to `255`.
fn compute_duck(total_env: u32) -> u32 {
    let denom = (total_env as i64 - 255).max(255) as u32;
    (65025 / denom).min(255)
}

/// The per-voice pulse-width ceiling (spec §4.1): either a fraction of the
/// period (proportional mode) or a fraction of the configured absolute
/// ceiling, both scaled by channel volume.
fn max_width_for(period: u32, vol: u8, cfg: &Config) -> u32 {
    let vol = vol as u64;
    if cfg.absolute_pulse_width {
        ((cfg.max_width as u64 * 3 * vol) / (4 * 255)) as u32
    } else {
        let proportional = (period as u64 * 3 * vol) / (4 * 255);
        proportional.min(cfg.max_width as u64) as u32
    }
}

fn pulse_width_for(max_width: u32, env: u8, duck: u32) -> u32 {
    ((max_width as u64 * env as u64 * duck as u64) / 65025) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulse_sink::RecordingPulseSink;

    fn core_with(nvoices: usize) -> Arc<SynthCore> {
        let mut cfg = Config::default();
        cfg.nvoices = nvoices;
        SynthCore::new(cfg)
    }

    #[test]
    fn inactive_voice_emits_zero_width_only() {
        let core = core_with(2);
        let mut engine = VoiceEngine::new(core);
        let sink = RecordingPulseSink::default();
        engine.tick(0, &sink);
        assert_eq!(*sink.widths.lock().unwrap(), vec![(0, 0), (1, 0)]);
        assert!(sink.periods.lock().unwrap().is_empty());
    }

    #[test]
    fn note_voice_sounds_while_held_and_releases_after_note_off() {
        let core = core_with(1);
        {
            let mut voices = core.voices.lock().unwrap();
            voices[0].active = true;
            voices[0].channel = Channel::Note;
            voices[0].midi_note = 69;
            voices[0].midi_vel = 127;
            voices[0].midi_note_down = true;
        }
        let mut engine = VoiceEngine::new(core.clone());
        let sink = RecordingPulseSink::default();
        engine.tick(0, &sink);
        assert!(sink.periods.lock().unwrap()[0].1 > 0);
        assert!(sink.widths.lock().unwrap()[0].1 > 0);

        core.voices.lock().unwrap()[0].midi_note_down = false;
        let sink2 = RecordingPulseSink::default();
        engine.tick(1, &sink2);
        assert!(!core.voices.lock().unwrap()[0].active);
        assert_eq!(sink2.widths.lock().unwrap()[0], (0, 0));
    }

    #[test]
    fn duck_reduces_toward_255_for_small_total_envelope() {
        assert_eq!(compute_duck(0), 255);
        assert_eq!(compute_duck(400), 255);
    }

    #[test]
    fn duck_shrinks_as_total_envelope_grows() {
        let light = compute_duck(400);
        let heavy = compute_duck(255 * 8);
        assert!(heavy < light);
    }

    #[test]
    fn pitch_bend_center_is_identity() {
        assert_eq!(apply_pitch_bend(440.0, 0, 2.0), 440.0);
    }

    #[test]
    fn pitch_bend_up_raises_frequency() {
        let bent = apply_pitch_bend(440.0, 8192, 2.0);
        assert!(bent > 440.0);
    }

    #[test]
    fn period_from_note_matches_worked_example() {
        // f_cpu=96000, 440Hz -> period=109 (spec §8 scenario S5).
        assert_eq!(period_from_note(440.0, 96_000), 109);
    }

    #[test]
    fn arp_note_down_follows_held_slots() {
        let mut v = Voice::new();
        v.channel = Channel::Arp;
        v.arp = Some(crate::voice::ArpState::new(4));
        {
            let arp = v.arp.as_mut().unwrap();
            arp.notes[0] = 60;
            arp.note_end_timestamps[0] = i64::MAX;
        }
        tick_arp_notes(&mut v, 0, 120, 150);
        assert!(v.midi_note_down);

        // once every slot's end timestamp is behind now + linger, it's up
        v.arp.as_mut().unwrap().note_end_timestamps[0] = 10;
        tick_arp_notes(&mut v, 200, 120, 150);
        assert!(!v.midi_note_down);
    }
}
