//! Audio Generator: the background thread turning coil state into convolved
//! stereo output (spec §4.4, §5, §9 "cooperative cancellation").
//!
//! Structured like `nethercore-zx/src/audio_thread/thread.rs`'s generation
//! thread — a dedicated worker owning its own scratch buffers, woken on a
//! short fixed period, checking an atomic stop flag every wake so shutdown
//! completes within one `wake_period` (spec §5 "the generator checks it at
//! each wake and exits within one wakePeriod"). Unlike the teacher's
//! snapshot-channel design (there is no per-tick "snapshot" to merge here;
//! coil state is read directly through lock-free atomics), this worker polls
//! [`CoilBank`] every wake instead of waiting on an `mpsc` channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::coil::{pan_split, CoilBank, CoilPhase};
use crate::config::Config;
use crate::convolution::Convolver;
use crate::fifo::{self, FifoConsumer, FifoProducer};
use crate::ir::ImpulseResponse;
use crate::metrics::Metrics;

/// Handle to a running generator thread. Dropping it (or calling
/// [`Generator::stop`]) signals the worker to exit and joins it.
pub struct Generator {
    stop: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl Generator {
    /// Spawn the generator thread. `output` is the producer half of the
    /// Frame Sink's output FIFO; the corresponding consumer is handed to the
    /// Frame Sink by the orchestrator.
    pub fn spawn(coils: Arc<CoilBank>, ir: Arc<ImpulseResponse>, config: Config, metrics: Arc<Metrics>, output: FifoProducer) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();
        let thread = std::thread::Builder::new()
            .name("teslacoil-generator".into())
            .spawn(move || {
                let mut worker = GeneratorWorker::new(coils, &ir, config, metrics, output, stop_thread);
                worker.run();
            })
            .expect("failed to spawn audio generator thread");
        Self {
            stop,
            thread: Some(thread),
        }
    }

    /// Signal the worker to exit and join it (spec §4.7 `stop()`).
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

impl Drop for Generator {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

struct GeneratorWorker {
    coils: Arc<CoilBank>,
    phases: Vec<CoilPhase>,
    config: Config,
    metrics: Arc<Metrics>,
    stop: Arc<AtomicBool>,

    /// Decouples "how many raw frames can we generate this wake" from
    /// "convolution wants exactly N/2-sample blocks" (spec §4.4 step 3).
    raw_in_producer: FifoProducer,
    raw_in_consumer: FifoConsumer,
    output: FifoProducer,

    convolver_l: Convolver,
    convolver_r: Convolver,

    last_update: Instant,
    raw_scratch: Vec<f32>,
    left_scratch: Vec<f32>,
    right_scratch: Vec<f32>,
    conv_left_out: Vec<f32>,
    conv_right_out: Vec<f32>,
    mixed_out: Vec<f32>,
}

impl GeneratorWorker {
    fn new(coils: Arc<CoilBank>, ir: &ImpulseResponse, config: Config, metrics: Arc<Metrics>, output: FifoProducer, stop: Arc<AtomicBool>) -> Self {
        let (raw_in_producer, raw_in_consumer) = fifo::channel(config.max_fifo_size);
        let n = config.nvoices;
        Self {
            coils,
            phases: vec![CoilPhase::default(); n],
            config,
            metrics,
            stop,
            raw_in_producer,
            raw_in_consumer,
            output,
            convolver_l: Convolver::new(ir),
            convolver_r: Convolver::new(ir),
            last_update: Instant::now(),
            raw_scratch: Vec::new(),
            left_scratch: Vec::new(),
            right_scratch: Vec::new(),
            conv_left_out: Vec::new(),
            conv_right_out: Vec::new(),
            mixed_out: Vec::new(),
        }
    }

    fn run(&mut self) {
        debug!("audio generator thread started");
        let wake_period = Duration::from_micros(self.config.wake_period_us.max(1));

        while !self.stop.load(Ordering::Relaxed) {
            self.generate_due_frames();
            self.drain_through_convolution();
            std::thread::sleep(wake_period);
        }

        debug!("audio generator thread exiting");
    }

    /// Step 1-2 of spec §4.4: compute how many stereo frames are due since
    /// `last_update`, bounded by input FIFO free space, and generate them.
    fn generate_due_frames(&mut self) {
        let elapsed = self.last_update.elapsed();
        let due_frames = (elapsed.as_secs_f64() * self.config.f_samp as f64) as usize;
        if due_frames == 0 {
            return;
        }

        let free_frames = self.raw_in_producer.free_space() / 2;
        let frames = due_frames.min(free_frames);
        if frames < due_frames {
            self.metrics.record_overrun();
            trace!(dropped = due_frames - frames, "input FIFO backpressure, skipping frames");
        }
        if frames == 0 {
            return;
        }

        self.raw_scratch.clear();
        self.raw_scratch.reserve(frames * 2);
        for _ in 0..frames {
            let (mut l, mut r) = (0.0f32, 0.0f32);
            for (i, phase) in self.phases.iter_mut().enumerate() {
                let coil = self.coils.get(i);
                let sample = phase.advance(coil.period(), coil.pulse_width());
                let (cl, cr) = pan_split(sample, coil.pan(), self.config.stereo_separation);
                l += cl;
                r += cr;
            }
            self.raw_scratch.push(l * self.config.volume);
            self.raw_scratch.push(r * self.config.volume);
        }

        self.raw_in_producer.push_slice(&self.raw_scratch);
        self.last_update += Duration::from_secs_f64(frames as f64 / self.config.f_samp as f64);
        self.metrics.record_frame(frames as u64 * 2);
    }

    /// Step 3 of spec §4.4: drain the raw input FIFO through each channel's
    /// convolver, in frame-aligned blocks, into the output FIFO.
    fn drain_through_convolution(&mut self) {
        let available = self.raw_in_consumer.available();
        if available == 0 {
            return;
        }
        self.raw_scratch.resize(available, 0.0);
        let popped = self.raw_in_consumer.pop_slice(&mut self.raw_scratch);
        self.raw_scratch.truncate(popped);

        let frames = popped / 2;
        self.left_scratch.clear();
        self.right_scratch.clear();
        for frame in self.raw_scratch[..frames * 2].chunks_exact(2) {
            self.left_scratch.push(frame[0]);
            self.right_scratch.push(frame[1]);
        }

        self.conv_left_out.clear();
        self.conv_right_out.clear();
        self.convolver_l.feed(&self.left_scratch, &mut self.conv_left_out);
        self.convolver_r.feed(&self.right_scratch, &mut self.conv_right_out);

        let pairs = self.conv_left_out.len().min(self.conv_right_out.len());
        self.mixed_out.clear();
        self.mixed_out.reserve(pairs * 2);
        for i in 0..pairs {
            self.mixed_out.push(self.conv_left_out[i]);
            self.mixed_out.push(self.conv_right_out[i]);
        }

        let pushed = self.output.push_slice(&self.mixed_out);
        if pushed < self.mixed_out.len() {
            self.metrics.record_overrun();
            warn!(dropped = self.mixed_out.len() - pushed, "output FIFO full, dropping convolved samples");
        }
    }
}
