//! Frame Sink: the abstract pull callback that drains convolved stereo
//! output onto a real-time thread (spec §4.6, §6).
//!
//! The hardware/platform audio binding is out of this crate's scope for the
//! *device* half (spec §1); for the desktop emulator we provide the `cpal`
//! implementation, built the same way `nethercore-zx/src/audio_thread/output.rs`
//! builds its output stream: one match arm per `cpal::SampleFormat`, batch
//! `pop_slice` instead of per-sample reads, silence-fill any shortfall.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, error};

use crate::error::SynthError;
use crate::fifo::FifoConsumer;
use crate::metrics::Metrics;

/// Abstract destination for convolved stereo frames.
///
/// `fill` must drain up to `out.len()` floats and zero-fill any shortfall —
/// never block, never allocate (spec §4.6).
pub trait FrameSink {
    fn fill(&mut self, out: &mut [f32]);
}

/// Drains a [`FifoConsumer`] directly; used by [`CpalFrameSink`] and by
/// tests that want to exercise the fill contract without real audio I/O.
pub struct FifoFrameSink {
    consumer: FifoConsumer,
    metrics: std::sync::Arc<Metrics>,
}

impl FifoFrameSink {
    pub fn new(consumer: FifoConsumer, metrics: std::sync::Arc<Metrics>) -> Self {
        Self { consumer, metrics }
    }
}

impl FrameSink for FifoFrameSink {
    fn fill(&mut self, out: &mut [f32]) {
        let popped = self.consumer.pop_slice(out);
        if popped < out.len() {
            self.metrics.record_underrun();
            out[popped..].fill(0.0);
        }
    }
}

/// Real-time `cpal` output stream pulling from a [`FifoConsumer`].
pub struct CpalFrameSink {
    _stream: cpal::Stream,
    sample_rate: u32,
}

impl CpalFrameSink {
    /// Open the system's default output device and start streaming from
    /// `consumer` immediately.
    pub fn start(mut sink: FifoFrameSink) -> Result<Self, SynthError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(SynthError::NoOutputDevice)?;
        let supported = device
            .default_output_config()
            .map_err(|e| SynthError::DeviceOpen(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let sample_format = supported.sample_format();
        let stream_config = supported.into();

        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| sink.fill(data),
                |err| error!("audio output stream error: {err}"),
                None,
            ),
            cpal::SampleFormat::I16 => {
                let mut scratch = vec![0.0f32; 4096];
                device.build_output_stream(
                    &stream_config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        if scratch.len() < data.len() {
                            scratch.resize(data.len(), 0.0);
                        }
                        sink.fill(&mut scratch[..data.len()]);
                        for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
                            *dst = (src * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                        }
                    },
                    |err| error!("audio output stream error: {err}"),
                    None,
                )
            }
            cpal::SampleFormat::U16 => {
                let mut scratch = vec![0.0f32; 4096];
                device.build_output_stream(
                    &stream_config,
                    move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                        if scratch.len() < data.len() {
                            scratch.resize(data.len(), 0.0);
                        }
                        sink.fill(&mut scratch[..data.len()]);
                        for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
                            *dst = ((src * i16::MAX as f32) + 32768.0).clamp(0.0, 65535.0) as u16;
                        }
                    },
                    |err| error!("audio output stream error: {err}"),
                    None,
                )
            }
            other => return Err(SynthError::DeviceOpen(format!("unsupported sample format: {other:?}"))),
        }
        .map_err(|e| SynthError::DeviceOpen(e.to_string()))?;

        stream.play().map_err(|e| SynthError::DeviceOpen(e.to_string()))?;
        debug!(sample_rate, ?sample_format, "opened cpal output stream");

        Ok(Self {
            _stream: stream,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
