//! Polyphonic MIDI-driven Tesla coil synthesizer.
//!
//! Two cooperating halves live in this crate:
//!
//! - The **voice engine** ([`engine`]) turns per-voice MIDI state ([`voice`])
//!   plus channel-wide ADSR/tremolo/vibrato/arpeggiator parameters into a
//!   `(period, pulseWidth)` pair per voice, written to a [`pulse_sink`] at a
//!   fixed tick cadence.
//! - The **audio emulator** ([`generator`], [`convolution`], [`frame_sink`])
//!   turns those same `(period, pulseWidth)` pairs into audible stereo
//!   output by synthesizing raw coil pulses and running them through a
//!   partitioned overlap-save convolution against a Tesla coil's impulse
//!   response.
//!
//! [`orchestrator`] wires the two halves together and owns their lifetime.
//!
//! MIDI parsing, USB audio transport, hardware timer peripherals, and
//! platform audio I/O are external collaborators; this crate only consumes
//! the abstracted interfaces described in each module's documentation.

pub mod coil;
pub mod config;
pub mod convolution;
pub mod drum;
pub mod engine;
pub mod error;
pub mod fifo;
pub mod frame_sink;
pub mod generator;
pub mod ir;
pub mod metrics;
pub mod midi;
pub mod orchestrator;
pub mod pulse_sink;
pub mod tables;
pub mod voice;

pub use config::Config;
pub use error::SynthError;
pub use midi::{Channel, MidiController};
pub use orchestrator::Orchestrator;
