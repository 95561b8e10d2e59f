//! Pulse Sink: the abstract consumer of per-voice `(period, pulseWidth)`
//! writes (spec §4.2, §6).
//!
//! The hardware timer implementation lives outside this crate's scope
//! (spec §1). We provide the emulator implementation, which feeds
//! [`crate::coil::CoilBank`], and a recording test double for unit tests.

use crate::coil::CoilBank;

/// Abstract destination for voice-engine pulse writes.
///
/// Implementations must silence the channel outright whenever a write sets
/// `width` below the configured minimum (spec §4.2) — the emulator does
/// this by simply writing a zero pulse width, since its coil model already
/// treats `pulse_width == 0` as "never high".
pub trait PulseSink {
    fn set_period(&self, channel: usize, period: u32);
    fn set_width(&self, channel: usize, width: u32);
}

/// Pulse sink backed by a [`CoilBank`]: writes become the coil's
/// lock-free atomic state, read back by the audio generator thread.
pub struct EmulatorPulseSink<'a> {
    coils: &'a CoilBank,
    min_width: u32,
}

impl<'a> EmulatorPulseSink<'a> {
    pub fn new(coils: &'a CoilBank, min_width: u32) -> Self {
        Self { coils, min_width }
    }
}

impl PulseSink for EmulatorPulseSink<'_> {
    fn set_period(&self, channel: usize, period: u32) {
        if channel < self.coils.len() {
            self.coils.get(channel).set_period(period);
        }
    }

    fn set_width(&self, channel: usize, width: u32) {
        if channel >= self.coils.len() {
            return;
        }
        let width = if width < self.min_width { 0 } else { width };
        self.coils.get(channel).set_pulse_width(width);
    }
}

/// Recording test double: captures every write for assertions, without any
/// hardware or coil-model side effects.
#[derive(Debug, Default)]
pub struct RecordingPulseSink {
    pub periods: std::sync::Mutex<Vec<(usize, u32)>>,
    pub widths: std::sync::Mutex<Vec<(usize, u32)>>,
}

impl PulseSink for RecordingPulseSink {
    fn set_period(&self, channel: usize, period: u32) {
        self.periods.lock().unwrap().push((channel, period));
    }

    fn set_width(&self, channel: usize, width: u32) {
        self.widths.lock().unwrap().push((channel, width));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emulator_sink_silences_below_min_width() {
        let coils = CoilBank::new(1);
        let sink = EmulatorPulseSink::new(&coils, 10);
        sink.set_period(0, 100);
        sink.set_width(0, 5);
        assert_eq!(coils.get(0).pulse_width(), 0);
    }

    #[test]
    fn emulator_sink_passes_through_above_min_width() {
        let coils = CoilBank::new(1);
        let sink = EmulatorPulseSink::new(&coils, 10);
        sink.set_width(0, 50);
        assert_eq!(coils.get(0).pulse_width(), 50);
    }

    #[test]
    fn emulator_sink_ignores_out_of_range_channel() {
        let coils = CoilBank::new(1);
        let sink = EmulatorPulseSink::new(&coils, 10);
        sink.set_period(5, 100); // no panic
    }

    #[test]
    fn recording_sink_captures_writes_in_order() {
        let sink = RecordingPulseSink::default();
        sink.set_period(0, 109);
        sink.set_width(0, 20);
        assert_eq!(*sink.periods.lock().unwrap(), vec![(0, 109)]);
        assert_eq!(*sink.widths.lock().unwrap(), vec![(0, 20)]);
    }
}
