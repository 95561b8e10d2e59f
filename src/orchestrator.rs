//! Start/stop wiring for the whole synth (spec §4.7).
//!
//! Owns the voice bank, coil bank, the tick thread, the Audio Generator, and
//! the Frame Sink, the same way `nethercore-zx`'s top-level `main.rs` and
//! `ThreadedAudioOutput` (`audio_thread/output.rs`) own their stream and
//! generation-thread handles — construct once, `start()`/`stop()` any
//! number of times.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::coil::CoilBank;
use crate::config::Config;
use crate::engine::{SynthCore, VoiceEngine};
use crate::error::SynthError;
use crate::fifo;
use crate::frame_sink::{CpalFrameSink, FifoFrameSink};
use crate::generator::Generator;
use crate::ir::ImpulseResponse;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::midi::MidiController;
use crate::pulse_sink::EmulatorPulseSink;

/// Owns every long-lived piece of the synth and wires them together.
///
/// `midi()` exposes the [`MidiController`] so an external MIDI parser (out
/// of scope, spec §1) can feed note-on/off/CC events while the orchestrator
/// is running.
pub struct Orchestrator {
    config: Config,
    core: Arc<SynthCore>,
    midi: MidiController,
    coils: Arc<CoilBank>,
    metrics: Arc<Metrics>,
    epoch: Instant,

    tick_stop: Option<Arc<AtomicBool>>,
    tick_thread: Option<JoinHandle<()>>,
    generator: Option<Generator>,
    frame_sink: Option<CpalFrameSink>,
}

impl Orchestrator {
    pub fn new(config: Config) -> Result<Self, SynthError> {
        config.validate()?;
        let core = SynthCore::new(config.clone());
        let midi = MidiController::new(core.clone());
        let coils = Arc::new(CoilBank::new(config.nvoices));
        Ok(Self {
            config,
            core,
            midi,
            coils,
            metrics: Arc::new(Metrics::new()),
            epoch: Instant::now(),
            tick_stop: None,
            tick_thread: None,
            generator: None,
            frame_sink: None,
        })
    }

    pub fn midi(&self) -> &MidiController {
        &self.midi
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Set a coil's stereo pan, `-1.0` (hard left) to `1.0` (hard right)
    /// (spec §3 Coil `pan`, §4.4 stereo split). Out-of-range `channel` is a
    /// no-op, matching the Pulse Sink's own bounds check.
    pub fn set_pan(&self, channel: usize, pan: f32) {
        if channel < self.coils.len() {
            self.coils.get(channel).set_pan(pan.clamp(-1.0, 1.0));
        }
    }

    /// Milliseconds since this orchestrator was constructed — the shared
    /// clock both the tick thread and any external MIDI caller should pass
    /// as `now` (spec §4.1 "reads current wall-clock milliseconds").
    pub fn now_ms(&self) -> i64 {
        self.epoch.elapsed().as_millis() as i64
    }

    /// Load the impulse response at `ir_path`, spin up the tick thread, the
    /// Audio Generator, and the Frame Sink (spec §4.7 `start()`: "clears
    /// FIFOs, resets convolvers to zero-state, initializes generator
    /// thread, opens Frame Sink"). Calling `start()` while already running
    /// is a no-op.
    pub fn start(&mut self, ir_path: impl AsRef<Path>) -> Result<(), SynthError> {
        if self.generator.is_some() {
            return Ok(());
        }

        let ir = ImpulseResponse::load(ir_path, self.config.ir_length)?;
        let (out_producer, out_consumer) = fifo::channel(self.config.max_fifo_size);
        let generator = Generator::spawn(self.coils.clone(), Arc::new(ir), self.config.clone(), self.metrics.clone(), out_producer);

        let sink = FifoFrameSink::new(out_consumer, self.metrics.clone());
        let frame_sink = CpalFrameSink::start(sink)?;

        let stop = Arc::new(AtomicBool::new(false));
        let tick_thread = spawn_tick_thread(self.core.clone(), self.coils.clone(), self.config.min_width, self.config.wake_period_us, self.epoch, stop.clone());

        self.tick_stop = Some(stop);
        self.tick_thread = Some(tick_thread);
        self.generator = Some(generator);
        self.frame_sink = Some(frame_sink);
        debug!("orchestrator started");
        Ok(())
    }

    /// Signal the tick thread and generator thread to exit, join them, and
    /// close the Frame Sink (spec §4.7 `stop()`). Idempotent; `start()` may
    /// be called again afterward.
    pub fn stop(&mut self) {
        if let Some(stop) = self.tick_stop.take() {
            stop.store(true, Ordering::Relaxed);
        }
        if let Some(handle) = self.tick_thread.take() {
            let _ = handle.join();
        }
        // Generator and CpalFrameSink both stop/close on drop.
        self.generator.take();
        self.frame_sink.take();
        debug!("orchestrator stopped");
    }

    pub fn is_running(&self) -> bool {
        self.generator.is_some()
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_tick_thread(core: Arc<SynthCore>, coils: Arc<CoilBank>, min_width: u32, wake_period_us: u64, epoch: Instant, stop: Arc<AtomicBool>) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("teslacoil-tick".into())
        .spawn(move || {
            let mut engine = VoiceEngine::new(core);
            let sink = EmulatorPulseSink::new(&coils, min_width);
            let wake = Duration::from_micros(wake_period_us.max(1));
            while !stop.load(Ordering::Relaxed) {
                let now = epoch.elapsed().as_millis() as i64;
                engine.tick(now, &sink);
                std::thread::sleep(wake);
            }
        })
        .expect("failed to spawn voice engine tick thread")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_validates_config() {
        let mut cfg = Config::default();
        cfg.ir_length = 1;
        assert!(Orchestrator::new(cfg).is_err());
    }

    #[test]
    fn fresh_orchestrator_is_not_running() {
        let orch = Orchestrator::new(Config::default()).unwrap();
        assert!(!orch.is_running());
    }

    #[test]
    fn now_ms_is_monotonically_nondecreasing() {
        let orch = Orchestrator::new(Config::default()).unwrap();
        let a = orch.now_ms();
        std::thread::sleep(Duration::from_millis(5));
        let b = orch.now_ms();
        assert!(b >= a);
    }

    #[test]
    fn stop_without_start_is_a_harmless_no_op() {
        let mut orch = Orchestrator::new(Config::default()).unwrap();
        orch.stop();
        assert!(!orch.is_running());
    }
}
