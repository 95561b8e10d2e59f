//! Telemetry counters for the Audio Generator (spec §7 Underrun/Overrun,
//! §9.B.5).
//!
//! Adapted from `nethercore-zx/src/audio_thread/metrics.rs`'s `AudioMetrics`:
//! the same counters, but as a plain read-only snapshot API instead of a
//! per-second logging struct, since this system has no per-session rollback
//! or crossfade state to report alongside.

use std::sync::atomic::{AtomicU64, Ordering};

/// Generator-thread health counters, each a `Relaxed` atomic so the
/// generator can bump them without synchronizing with readers (spec §5:
/// counters are diagnostics, not control flow).
#[derive(Debug, Default)]
pub struct Metrics {
    frames_generated: AtomicU64,
    samples_generated: AtomicU64,
    /// Output FIFO drained during a Frame Sink callback (spec §7 Underrun).
    underruns: AtomicU64,
    /// Input FIFO full during generation (spec §7 Overrun).
    overruns: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&self, samples: u64) {
        self.frames_generated.fetch_add(1, Ordering::Relaxed);
        self.samples_generated.fetch_add(samples, Ordering::Relaxed);
    }

    pub fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    /// Read a consistent-enough snapshot for logging or diagnostics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_generated: self.frames_generated.load(Ordering::Relaxed),
            samples_generated: self.samples_generated.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time read of [`Metrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub frames_generated: u64,
    pub samples_generated: u64,
    pub underruns: u64,
    pub overruns: u64,
}
