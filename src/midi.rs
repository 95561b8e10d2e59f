//! MIDI interface consumed by this crate (spec §6) and the channel-wide
//! "global synth state" it feeds (spec §3).
//!
//! The MIDI *parser* is out of scope (spec §1); this module only exposes
//! the five operations a parser would call, plus the state they mutate.

pub use crate::voice::Channel;
use crate::voice::{AdsrStage, ArpState, Voice};

/// Channel-wide ADSR/tremolo/vibrato/arpeggiator parameters (spec §3).
///
/// Shared by every FX/ARP/DRUM voice; DRUM voices override `attack`/`release`
/// with their preset's own `a`/`r` (spec §4.1).
#[derive(Debug, Clone)]
pub struct SynthState {
    pub vol: u8,
    pub attack: i64,
    pub decay: i64,
    pub release: i64,
    pub sustain: u8,
    pub tremolo_period: i64,
    pub tremolo_delay: i64,
    pub tremolo_depth: u8,
    pub vibrato_period: i64,
    pub vibrato_delay: i64,
    pub vibrato_depth: u8,
    pub arpeggio_period: i64,
}

impl Default for SynthState {
    fn default() -> Self {
        Self {
            vol: 255,
            attack: 20,
            decay: 150,
            release: 300,
            sustain: 180,
            tremolo_period: 400,
            tremolo_delay: 600,
            vibrato_depth: 20,
            vibrato_period: 250,
            vibrato_delay: 400,
            tremolo_depth: 20,
            arpeggio_period: 120,
        }
    }
}

/// Apply a MIDI Control Change to [`SynthState`].
///
/// CC assignments here are this crate's own convention (spec §6 does not
/// pin specific CC numbers), loosely following the common synth-parameter
/// CCs: 73 attack, 75 decay, 72 release, 70 sustain/variation, 1 mod wheel
/// → vibrato depth, 92 tremolo depth, 78 arpeggio period.
pub fn apply_control_change(state: &mut SynthState, cc: u8, value: u8) {
    match cc {
        7 => state.vol = value * 2,
        73 => state.attack = value as i64 * 4,
        75 => state.decay = value as i64 * 8,
        72 => state.release = value as i64 * 8,
        70 => state.sustain = value * 2,
        1 => state.vibrato_depth = value,
        92 => state.tremolo_depth = value,
        78 => state.arpeggio_period = value as i64 * 2,
        _ => {}
    }
}

/// MIDI interface consumed by this crate: note-on/off, pitch bend, CC,
/// program change (spec §6).
///
/// Every mutator here holds the voice-bank lock for its full duration; the
/// voice engine's `tick()` uses a non-blocking `try_lock` against the same
/// mutex and skips the current tick on contention (spec §4.1 "re-entrancy
/// guard", spec §5). Callers should check [`MidiController::take_skipped`]
/// after a burst of edits and force a catch-up tick if it returns `true`.
#[derive(Clone)]
pub struct MidiController {
    core: std::sync::Arc<crate::engine::SynthCore>,
}

impl MidiController {
    pub fn new(core: std::sync::Arc<crate::engine::SynthCore>) -> Self {
        Self { core }
    }

    pub fn note_on(&self, channel: Channel, midi_channel: u8, note: u8, velocity: u8, now: i64) {
        let mut voices = self.core.voices.lock().unwrap();
        match channel {
            Channel::Arp => self.note_on_arp(&mut voices, midi_channel, note, now),
            _ => self.note_on_simple(&mut voices, channel, midi_channel, note, velocity, now),
        }
    }

    fn note_on_simple(
        &self,
        voices: &mut [Voice],
        channel: Channel,
        midi_channel: u8,
        note: u8,
        velocity: u8,
        now: i64,
    ) {
        // Reuse an existing slot for this (channel, note); otherwise steal
        // the oldest non-attack/decay voice, or the first inactive slot.
        let slot = voices
            .iter()
            .position(|v| v.matches(midi_channel, note))
            .or_else(|| voices.iter().position(|v| !v.active))
            .unwrap_or_else(|| steal_oldest(voices));

        let v = &mut voices[slot];
        v.active = true;
        v.channel = channel;
        v.midi_channel = midi_channel;
        v.midi_note = note;
        v.midi_vel = velocity;
        v.midi_note_down = true;
        v.adsr_stage = AdsrStage::Attack;
        v.adsr_timestamp = now;
        v.last_env = 0;
        v.note_down_timestamp = now;
        if channel == Channel::Drum {
            v.drum_program = Some(note.min(127));
        }
    }

    fn note_on_arp(&self, voices: &mut [Voice], midi_channel: u8, note: u8, now: i64) {
        let slot = voices
            .iter()
            .position(|v| v.active && v.channel == Channel::Arp && v.midi_channel == midi_channel)
            .unwrap_or_else(|| {
                voices
                    .iter()
                    .position(|v| !v.active)
                    .unwrap_or_else(|| steal_oldest(voices))
            });

        let v = &mut voices[slot];
        if !v.active || v.channel != Channel::Arp {
            v.active = true;
            v.channel = Channel::Arp;
            v.midi_channel = midi_channel;
            v.midi_note_down = true;
            v.adsr_stage = AdsrStage::Attack;
            v.adsr_timestamp = now;
            v.note_down_timestamp = now;
            v.arp = Some(ArpState::new(self.core.config.max_arp_notes));
        }
        let arp = v.arp.get_or_insert_with(|| ArpState::new(self.core.config.max_arp_notes));
        if let Some(empty) = arp.note_end_timestamps.iter().position(|&t| t == 0) {
            arp.notes[empty] = note;
            arp.note_end_timestamps[empty] = i64::MAX; // held until note-off
        }
        v.midi_note_down = true;
    }

    pub fn note_off(&self, channel: Channel, midi_channel: u8, note: u8, now: i64) {
        let mut voices = self.core.voices.lock().unwrap();
        if channel == Channel::Arp {
            // Mark the released slot's end timestamp; `midiNoteDown` itself
            // is re-derived from these timestamps every engine tick
            // (spec §4.1 ARP pitch section), not decided here.
            if let Some(v) = voices
                .iter_mut()
                .find(|v| v.active && v.channel == Channel::Arp && v.midi_channel == midi_channel)
                && let Some(arp) = v.arp.as_mut()
                && let Some(slot) = arp.notes.iter().position(|&n| n == note)
                && arp.note_end_timestamps[slot] == i64::MAX
            {
                arp.note_end_timestamps[slot] = now + self.core.config.arpeggio_linger;
            }
            return;
        }
        if let Some(v) = voices.iter_mut().find(|v| v.matches(midi_channel, note)) {
            v.midi_note_down = false;
        }
    }

    pub fn pitch_bend(&self, midi_channel: u8, value: i16) {
        let mut voices = self.core.voices.lock().unwrap();
        for v in voices.iter_mut().filter(|v| v.midi_channel == midi_channel) {
            v.midi_pb = value;
        }
    }

    pub fn control_change(&self, cc: u8, value: u8) {
        let mut state = self.core.synth_state.lock().unwrap();
        apply_control_change(&mut state, cc, value);
    }

    pub fn program_change(&self, midi_channel: u8, program: u8) {
        let mut voices = self.core.voices.lock().unwrap();
        for v in voices
            .iter_mut()
            .filter(|v| v.midi_channel == midi_channel && v.channel == Channel::Drum)
        {
            v.drum_program = Some(program);
        }
    }

    /// Returns and clears the "a tick was skipped while we held the voice
    /// lock" flag (spec §4.1 re-entrancy guard).
    pub fn take_skipped(&self) -> bool {
        self.core
            .tick_was_skipped
            .swap(false, std::sync::atomic::Ordering::AcqRel)
    }
}

/// Evict the oldest voice that isn't mid-attack/decay, per spec §7
/// VoiceStealing ("evicting the oldest non-A/D voice"). Falls back to slot
/// 0 if every voice is attacking or decaying.
fn steal_oldest(voices: &mut [Voice]) -> usize {
    voices
        .iter()
        .enumerate()
        .filter(|(_, v)| v.adsr_stage != AdsrStage::Attack && v.adsr_stage != AdsrStage::Decay)
        .min_by_key(|(_, v)| v.adsr_timestamp)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::SynthCore;
    use std::sync::Arc;

    fn controller() -> Arc<SynthCore> {
        SynthCore::new(Config::default())
    }

    #[test]
    fn note_on_activates_a_free_slot() {
        let core = controller();
        let midi = MidiController::new(core.clone());
        midi.note_on(Channel::Note, 0, 69, 100, 0);
        let voices = core.voices.lock().unwrap();
        assert!(voices.iter().any(|v| v.active && v.midi_note == 69));
    }

    #[test]
    fn note_off_clears_note_down_without_deactivating() {
        let core = controller();
        let midi = MidiController::new(core.clone());
        midi.note_on(Channel::Note, 0, 69, 100, 0);
        midi.note_off(Channel::Note, 0, 69, 10);
        let voices = core.voices.lock().unwrap();
        let v = voices.iter().find(|v| v.midi_note == 69).unwrap();
        assert!(v.active); // engine tick, not note_off, deactivates
        assert!(!v.midi_note_down);
    }

    #[test]
    fn at_most_one_active_voice_per_channel_note() {
        let core = controller();
        let midi = MidiController::new(core.clone());
        midi.note_on(Channel::Note, 0, 69, 100, 0);
        midi.note_on(Channel::Note, 0, 69, 64, 5); // re-trigger same note
        let voices = core.voices.lock().unwrap();
        let count = voices
            .iter()
            .filter(|v| v.active && v.midi_channel == 0 && v.midi_note == 69)
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn arpeggiator_accumulates_held_notes() {
        let core = controller();
        let midi = MidiController::new(core.clone());
        midi.note_on(Channel::Arp, 1, 60, 100, 0);
        midi.note_on(Channel::Arp, 1, 64, 100, 0);
        midi.note_on(Channel::Arp, 1, 67, 100, 0);
        let voices = core.voices.lock().unwrap();
        let v = voices
            .iter()
            .find(|v| v.active && v.channel == Channel::Arp)
            .unwrap();
        let arp = v.arp.as_ref().unwrap();
        assert_eq!(arp.notes[0..3], [60, 64, 67]);
    }
}
