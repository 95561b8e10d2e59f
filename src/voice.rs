//! Per-voice state (spec §3).
//!
//! Rather than branching on a raw MIDI channel number everywhere, each
//! voice carries a [`Channel`] tag that selects its envelope and modulation
//! rules — the "tagged variant for channel behavior" redesign from spec §9.

/// Which envelope/modulation model a voice follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Plain note-on/off voices: envelope tracks key-down state directly,
    /// no ADSR.
    Note,
    /// ADSR + tremolo/vibrato voices.
    Fx,
    /// Arpeggiator voices: ADSR + tremolo/vibrato plus a ring of held notes.
    Arp,
    /// Drum-synthesis voices: ADSR from the triggering drum preset, pitch
    /// driven by envelope and noise modulation.
    Drum,
}

/// ADSR stage. Monotonically advances except for an explicit note-on
/// (spec §3 invariants, §8 property 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AdsrStage {
    Attack = 0,
    Decay = 1,
    Sustain = 2,
    Release = 3,
    Done = 4,
}

/// Arpeggiator ring state, present only on `Channel::Arp` voices.
#[derive(Debug, Clone)]
pub struct ArpState {
    pub notes: Vec<u8>,
    /// Per-slot "end" timestamp in ms. `0` = empty slot, `i64::MAX` = locked
    /// on (held past key release until manually cleared).
    pub note_end_timestamps: Vec<i64>,
    pub notes_index: usize,
    pub timestamp: i64,
}

impl ArpState {
    pub fn new(capacity: usize) -> Self {
        Self {
            notes: vec![0; capacity],
            note_end_timestamps: vec![0; capacity],
            notes_index: 0,
            timestamp: 0,
        }
    }
}

/// One polyphony slot.
#[derive(Debug, Clone)]
pub struct Voice {
    pub active: bool,
    pub channel: Channel,
    pub midi_channel: u8,
    pub midi_note: u8,
    pub midi_vel: u8,
    /// Pitch bend, centered at 0, range ±8192.
    pub midi_pb: i16,
    pub midi_note_down: bool,

    pub adsr_stage: AdsrStage,
    pub adsr_timestamp: i64,
    pub last_env: u8,

    pub note_down_timestamp: i64,

    pub arp: Option<ArpState>,
    /// Index into the drum preset table, for `Channel::Drum` voices.
    pub drum_program: Option<u8>,

    pub period: u32,
    pub pulse_width: u32,
}

impl Voice {
    pub fn new() -> Self {
        Self {
            active: false,
            channel: Channel::Note,
            midi_channel: 0,
            midi_note: 0,
            midi_vel: 0,
            midi_pb: 0,
            midi_note_down: false,
            adsr_stage: AdsrStage::Done,
            adsr_timestamp: 0,
            last_env: 0,
            note_down_timestamp: 0,
            arp: None,
            drum_program: None,
            period: 0,
            pulse_width: 0,
        }
    }

    /// True iff this slot is occupied by the given (channel, note) pair —
    /// spec §3 invariant: at most one voice per (channel, note) is active.
    pub fn matches(&self, midi_channel: u8, midi_note: u8) -> bool {
        self.active && self.midi_channel == midi_channel && self.midi_note == midi_note
    }
}
