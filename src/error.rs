//! Error types for the (rare) fallible operations in this crate.
//!
//! Per spec §7: construction and `start()` may fail; steady-state tick,
//! generation, and callback paths never return a `Result` — they degrade
//! gracefully (silence, drop, steal) instead.

/// Errors reported by configuration loading and [`crate::orchestrator::Orchestrator::start`].
#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid impulse response file: {0}")]
    InvalidIr(String),

    #[error("no audio output device available")]
    NoOutputDevice,

    #[error("failed to open audio device: {0}")]
    DeviceOpen(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
