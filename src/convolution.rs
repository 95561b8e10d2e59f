//! Partitioned overlap-save convolution against a shared frequency-domain
//! impulse response (spec §4.5), one instance per output channel.
//!
//! `realfft` is not part of `nethercore-zx`'s own dependency stack; it's
//! pulled in from the sibling `rubyswolf-freqlab` example, which uses the
//! same crate (`RealFftPlanner`, `RealToComplex`/`ComplexToReal`,
//! `make_output_vec`) for its own real-time spectrum analyzer
//! (`src-tauri/src/audio/spectrum.rs`) — see DESIGN.md.

use std::sync::Arc;

use realfft::{ComplexToReal, RealFftPlanner, RealToComplex, num_complex::Complex32};

use crate::ir::ImpulseResponse;

/// One channel's overlap-save convolver. `N = ir.ir_length`, block size
/// `N/2` (spec §4.5).
pub struct Convolver {
    half: usize,
    ir_spectrum: Arc<Vec<Complex32>>,
    r2c: Arc<dyn RealToComplex<f32>>,
    c2r: Arc<dyn ComplexToReal<f32>>,

    /// Previous block's last `N/2` input samples.
    tail: Vec<f32>,
    /// New input samples accumulated since the last completed block;
    /// always shorter than `half` between calls to [`Convolver::feed`].
    pending: Vec<f32>,

    // Scratch buffers, reused every block (spec §9 "no dynamic allocation
    // in the audio path").
    frame: Vec<f32>,
    spectrum: Vec<Complex32>,
    time_domain: Vec<f32>,
}

impl Convolver {
    pub fn new(ir: &ImpulseResponse) -> Self {
        let n = ir.ir_length;
        let half = n / 2;
        let mut planner = RealFftPlanner::<f32>::new();
        let r2c = planner.plan_fft_forward(n);
        let c2r = planner.plan_fft_inverse(n);
        let frame = r2c.make_input_vec();
        let spectrum = r2c.make_output_vec();
        let time_domain = c2r.make_output_vec();
        Self {
            half,
            ir_spectrum: Arc::new(ir.spectrum.clone()),
            r2c,
            c2r,
            tail: vec![0.0; half],
            pending: Vec::with_capacity(half),
            frame,
            spectrum,
            time_domain,
        }
    }

    /// Reset to zero-state: a fresh convolver started cold (spec §4.7
    /// `start()` "resets convolvers to zero-state").
    pub fn reset(&mut self) {
        self.tail.fill(0.0);
        self.pending.clear();
    }

    /// Feed new input samples, appending any completed blocks' output to
    /// `out`. Input shorter than `N/2` may produce no output at all; the
    /// first block only completes once `N/2` input samples have been fed in
    /// total, since the tail starts zero-padded (spec §4.5 "zero-pad at
    /// start so first block emits immediately once N/2 input samples are
    /// available").
    pub fn feed(&mut self, input: &[f32], out: &mut Vec<f32>) {
        let mut offset = 0;
        while offset < input.len() {
            let need = self.half - self.pending.len();
            let take = need.min(input.len() - offset);
            self.pending.extend_from_slice(&input[offset..offset + take]);
            offset += take;
            if self.pending.len() == self.half {
                self.process_block(out);
            }
        }
    }

    fn process_block(&mut self, out: &mut Vec<f32>) {
        self.frame[..self.half].copy_from_slice(&self.tail);
        self.frame[self.half..].copy_from_slice(&self.pending);

        if self.r2c.process(&mut self.frame, &mut self.spectrum).is_ok() {
            for (bin, ir_bin) in self.spectrum.iter_mut().zip(self.ir_spectrum.iter()) {
                *bin *= ir_bin;
            }
            if self.c2r.process(&mut self.spectrum, &mut self.time_domain).is_ok() {
                let n = self.time_domain.len() as f32;
                out.extend(self.time_domain[self.half..].iter().map(|s| s / n));
            } else {
                out.extend(std::iter::repeat(0.0).take(self.half));
            }
        } else {
            out.extend(std::iter::repeat(0.0).take(self.half));
        }

        self.tail.copy_from_slice(&self.pending);
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_impulse_ir(n: usize) -> ImpulseResponse {
        let mut taps = vec![0.0; n];
        taps[0] = 1.0;
        ImpulseResponse::from_time_domain(&taps).unwrap()
    }

    #[test]
    fn unit_impulse_ir_is_identity_after_latency() {
        // spec §8 property 4: out[n] == in[n - N/2] for n >= N/2.
        let ir = unit_impulse_ir(64);
        let mut conv = Convolver::new(&ir);
        let half = 32;

        let input: Vec<f32> = (0..half).map(|i| i as f32).collect();
        let mut out = Vec::new();
        conv.feed(&input, &mut out);
        assert!(out.is_empty(), "first half-block is pure zero tail, no output yet");

        let input2: Vec<f32> = (half..2 * half).map(|i| i as f32).collect();
        conv.feed(&input2, &mut out);
        assert_eq!(out.len(), half);
        for (i, &sample) in out.iter().enumerate() {
            assert!((sample - input[i]).abs() < 1e-3, "sample {i}: {sample} vs {}", input[i]);
        }
    }

    #[test]
    fn settles_to_zero_after_silence() {
        let ir = unit_impulse_ir(64);
        let mut conv = Convolver::new(&ir);
        let half = 32;
        let mut out = Vec::new();
        conv.feed(&vec![1.0; half], &mut out);
        conv.feed(&vec![0.0; half], &mut out);
        conv.feed(&vec![0.0; half], &mut out);
        let tail = &out[out.len() - half..];
        for &s in tail {
            assert!(s.abs() < 1e-3);
        }
    }

    #[test]
    fn is_linear_in_the_input() {
        // spec §8 property 5: conv(aX + bY) == a*conv(X) + b*conv(Y).
        let ir = unit_impulse_ir(64);
        let half = 32;
        let x: Vec<f32> = (0..half * 2).map(|i| (i as f32 * 0.3).sin()).collect();
        let y: Vec<f32> = (0..half * 2).map(|i| (i as f32 * 0.7).cos()).collect();
        let (a, b) = (2.0f32, -1.5f32);
        let combined: Vec<f32> = x.iter().zip(&y).map(|(xi, yi)| a * xi + b * yi).collect();

        let mut conv_x = Convolver::new(&ir);
        let mut conv_y = Convolver::new(&ir);
        let mut conv_c = Convolver::new(&ir);
        let (mut out_x, mut out_y, mut out_c) = (Vec::new(), Vec::new(), Vec::new());
        conv_x.feed(&x, &mut out_x);
        conv_y.feed(&y, &mut out_y);
        conv_c.feed(&combined, &mut out_c);

        for i in 0..out_c.len() {
            let expected = a * out_x[i] + b * out_y[i];
            assert!((out_c[i] - expected).abs() < 1e-2, "index {i}: {} vs {expected}", out_c[i]);
        }
    }

    #[test]
    fn reset_clears_tail_and_pending() {
        let ir = unit_impulse_ir(64);
        let mut conv = Convolver::new(&ir);
        let mut out = Vec::new();
        conv.feed(&vec![5.0; 40], &mut out);
        conv.reset();
        assert!(conv.tail.iter().all(|&s| s == 0.0));
        assert!(conv.pending.is_empty());
    }
}
