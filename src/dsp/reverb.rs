//! Convolution reverb
//!
//! Reverb is a synthesized stereo impulse response convolved with the signal:
//! - IR sample `i` of length `L` is `noise(i) * (1 - i/L)^decay`
//! - Each channel has its own seeded noise source and a small start offset
//! - Convolution is uniformly partitioned FFT overlap-add, one partition per
//!   render quantum, so the wet path adds no latency
//! - IR power is normalized the way browser convolvers do it, so the wet level
//!   means the same thing for every `(duration, decay)` pair
//!
//! A [`PreparedKernel`] (partitions plus zeroed convolution history) is built
//! on the control side. The render thread only swaps boxes; the retired box
//! is handed back so it is freed off the processing path.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::gain::GainNode;
use super::node::AudioNode;
use crate::engine::{AudioBuffer, ChannelLayout, RENDER_QUANTUM};
use crate::impl_node_common;

// ============================================================================
// Constants
// ============================================================================

/// Samples per convolution partition
pub const PARTITION_SIZE: usize = RENDER_QUANTUM;

/// FFT length per partition (zero-padded to hold the linear convolution)
const FFT_SIZE: usize = PARTITION_SIZE * 2;

/// Per-channel start offset of the IR noise, in seconds
const CHANNEL_OFFSET_SECS: f32 = 0.0005;

/// Seed spacing between channels
const CHANNEL_SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Target power after normalization
const GAIN_CALIBRATION: f32 = 0.00125;

/// Rate the calibration constant was tuned at
const GAIN_CALIBRATION_SAMPLE_RATE: f32 = 44100.0;

/// Floor for the measured IR power
const MIN_POWER: f32 = 0.000125;

/// Shortest IR that will be synthesized, in seconds
pub const MIN_IR_SECS: f32 = 0.01;

/// Longest IR that will be synthesized, in seconds
pub const MAX_IR_SECS: f32 = 10.0;

// ============================================================================
// Impulse Response
// ============================================================================

/// Synthesized stereo impulse response
#[derive(Debug, Clone, PartialEq)]
pub struct ImpulseResponse {
    duration_secs: f32,
    decay: f32,
    buffer: AudioBuffer,
}

impl ImpulseResponse {
    /// Synthesize an exponentially shaped noise burst
    ///
    /// The same `(duration, decay, sample_rate, seed)` always yields the same IR.
    pub fn synthesize(duration_secs: f32, decay: f32, sample_rate: u32, seed: u64) -> Self {
        let duration_secs = duration_secs.clamp(MIN_IR_SECS, MAX_IR_SECS);
        let decay = decay.max(0.0);
        let length = ((duration_secs * sample_rate as f32).round() as usize).max(1);
        let mut buffer = AudioBuffer::with_sample_rate(length, ChannelLayout::Stereo, sample_rate);

        for (ch, channel) in buffer.samples.iter_mut().enumerate() {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(CHANNEL_SEED_STRIDE.wrapping_mul(ch as u64)));
            let offset = ((ch as f32 * CHANNEL_OFFSET_SECS * sample_rate as f32) as usize).min(length);

            for (i, sample) in channel.iter_mut().enumerate().skip(offset) {
                let envelope = (1.0 - i as f32 / length as f32).powf(decay);
                *sample = rng.gen_range(-1.0_f32..1.0) * envelope;
            }
        }

        Self {
            duration_secs,
            decay,
            buffer,
        }
    }

    pub fn duration_secs(&self) -> f32 {
        self.duration_secs
    }

    pub fn decay(&self) -> f32 {
        self.decay
    }

    pub fn sample_rate(&self) -> u32 {
        self.buffer.sample_rate
    }

    /// Length in samples
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        self.buffer.channel(index)
    }

    /// Scale that brings the IR to the calibrated power
    pub fn normalization_scale(&self) -> f32 {
        let total = (self.buffer.num_channels() * self.buffer.len()).max(1);
        let sum_squares: f64 = self
            .buffer
            .samples
            .iter()
            .flatten()
            .map(|&s| (s as f64) * (s as f64))
            .sum();
        let power = ((sum_squares / total as f64).sqrt() as f32).max(MIN_POWER);

        let mut scale = GAIN_CALIBRATION / power;
        if self.buffer.sample_rate > 0 {
            scale *= GAIN_CALIBRATION_SAMPLE_RATE / self.buffer.sample_rate as f32;
        }
        scale
    }
}

// ============================================================================
// Convolution Kernel
// ============================================================================

/// Frequency-domain partitions of a normalized impulse response
pub struct ConvolutionKernel {
    ir: ImpulseResponse,
    /// Per channel, per partition spectra of length `FFT_SIZE`
    partitions: [Vec<Vec<Complex<f32>>>; 2],
}

impl std::fmt::Debug for ConvolutionKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvolutionKernel")
            .field("duration_secs", &self.ir.duration_secs)
            .field("decay", &self.ir.decay)
            .field("partitions", &self.num_partitions())
            .finish()
    }
}

impl ConvolutionKernel {
    /// Normalize and partition an impulse response
    pub fn new(ir: ImpulseResponse) -> Self {
        let scale = ir.normalization_scale();
        let fft = FftPlanner::<f32>::new().plan_fft_forward(FFT_SIZE);

        let partition = |channel: &[f32]| -> Vec<Vec<Complex<f32>>> {
            channel
                .chunks(PARTITION_SIZE)
                .map(|chunk| {
                    let mut spectrum = vec![Complex::new(0.0, 0.0); FFT_SIZE];
                    for (bin, &s) in spectrum.iter_mut().zip(chunk) {
                        bin.re = s * scale;
                    }
                    fft.process(&mut spectrum);
                    spectrum
                })
                .collect()
        };

        let partitions = [partition(ir.channel(0)), partition(ir.channel(1))];
        Self { ir, partitions }
    }

    /// Synthesize and prepare in one step
    pub fn synthesize(duration_secs: f32, decay: f32, sample_rate: u32, seed: u64) -> Self {
        Self::new(ImpulseResponse::synthesize(duration_secs, decay, sample_rate, seed))
    }

    pub fn impulse_response(&self) -> &ImpulseResponse {
        &self.ir
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions[0].len()
    }
}

// ============================================================================
// Convolver
// ============================================================================

/// Per-channel overlap-add state
#[derive(Clone)]
struct ChannelState {
    /// Frequency-domain delay line of past input spectra
    history: Vec<Vec<Complex<f32>>>,
    /// Tail of the previous block's linear convolution
    overlap: Vec<f32>,
}

impl ChannelState {
    fn new(num_partitions: usize) -> Self {
        Self {
            history: vec![vec![Complex::new(0.0, 0.0); FFT_SIZE]; num_partitions.max(1)],
            overlap: vec![0.0; PARTITION_SIZE],
        }
    }

    fn reset(&mut self) {
        for spectrum in &mut self.history {
            spectrum.fill(Complex::new(0.0, 0.0));
        }
        self.overlap.fill(0.0);
    }
}

/// Kernel together with the convolution state sized for it
///
/// Everything the convolver needs for a kernel is allocated here, so a swap
/// on the render thread moves a box and nothing else.
#[derive(Clone)]
pub struct PreparedKernel {
    kernel: Arc<ConvolutionKernel>,
    channels: [ChannelState; 2],
    /// Index of the newest spectrum in each channel's history
    head: usize,
}

impl std::fmt::Debug for PreparedKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedKernel")
            .field("kernel", &self.kernel)
            .field("head", &self.head)
            .finish()
    }
}

impl PreparedKernel {
    pub fn new(kernel: Arc<ConvolutionKernel>) -> Self {
        let partitions = kernel.num_partitions();
        Self {
            kernel,
            channels: [ChannelState::new(partitions), ChannelState::new(partitions)],
            head: 0,
        }
    }

    pub fn kernel(&self) -> &Arc<ConvolutionKernel> {
        &self.kernel
    }

    fn clear(&mut self) {
        for state in &mut self.channels {
            state.reset();
        }
        self.head = 0;
    }
}

/// Stereo partitioned convolver
pub struct ConvolverNode {
    prepared: Box<PreparedKernel>,
    fft_forward: Arc<dyn Fft<f32>>,
    fft_inverse: Arc<dyn Fft<f32>>,
    spectrum: Vec<Complex<f32>>,
    accumulator: Vec<Complex<f32>>,
}

impl ConvolverNode {
    pub fn new(kernel: Arc<ConvolutionKernel>) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        Self {
            prepared: Box::new(PreparedKernel::new(kernel)),
            fft_forward: planner.plan_fft_forward(FFT_SIZE),
            fft_inverse: planner.plan_fft_inverse(FFT_SIZE),
            spectrum: vec![Complex::new(0.0, 0.0); FFT_SIZE],
            accumulator: vec![Complex::new(0.0, 0.0); FFT_SIZE],
        }
    }

    pub fn kernel(&self) -> &Arc<ConvolutionKernel> {
        &self.prepared.kernel
    }

    /// Swap in a prepared kernel and return the previous one
    ///
    /// The old tail is dropped with the returned box. Nothing is allocated
    /// or freed here.
    pub fn swap_kernel(&mut self, prepared: Box<PreparedKernel>) -> Box<PreparedKernel> {
        std::mem::replace(&mut self.prepared, prepared)
    }

    /// Convolve one block in place
    ///
    /// With `wet_audible == false` only the input history is updated, so the
    /// tail is ready when the wet level comes up again.
    pub fn convolve(&mut self, block: &mut AudioBuffer, wet_audible: bool) {
        let frames = block.len().min(PARTITION_SIZE);
        let prepared = &mut *self.prepared;
        let partitions = prepared.kernel.num_partitions().max(1);
        let head = prepared.head;
        let norm = 1.0 / FFT_SIZE as f32;

        for (ch, channel) in block.samples.iter_mut().enumerate().take(2) {
            // Transform the zero-padded input block into the history slot
            self.spectrum.fill(Complex::new(0.0, 0.0));
            for (bin, &s) in self.spectrum.iter_mut().zip(channel.iter().take(frames)) {
                bin.re = s;
            }
            self.fft_forward.process(&mut self.spectrum);
            let state = &mut prepared.channels[ch];
            state.history[head].copy_from_slice(&self.spectrum);

            if !wet_audible {
                state.overlap.fill(0.0);
                channel.fill(0.0);
                continue;
            }

            // Y = sum_k X[n - k] * H[k]
            self.accumulator.fill(Complex::new(0.0, 0.0));
            for (k, h) in prepared.kernel.partitions[ch].iter().enumerate() {
                let x = &state.history[(head + partitions - k) % partitions];
                for ((acc, a), b) in self.accumulator.iter_mut().zip(x).zip(h) {
                    *acc += a * b;
                }
            }
            self.fft_inverse.process(&mut self.accumulator);

            for (i, sample) in channel.iter_mut().enumerate() {
                *sample = if i < frames {
                    self.accumulator[i].re * norm + state.overlap[i]
                } else {
                    0.0
                };
            }
            for (i, tail) in state.overlap.iter_mut().enumerate() {
                *tail = self.accumulator[PARTITION_SIZE + i].re * norm;
            }
        }

        prepared.head = (head + 1) % partitions;
    }

    fn clear(&mut self) {
        self.prepared.clear();
    }
}

// ============================================================================
// Reverb Stage
// ============================================================================

/// Dry path in parallel with convolver and wet gain, summed
pub struct ReverbStage {
    convolver: ConvolverNode,
    wet: GainNode,
    scratch: AudioBuffer,
}

impl ReverbStage {
    pub fn new(kernel: Arc<ConvolutionKernel>, sample_rate: u32) -> Self {
        Self {
            convolver: ConvolverNode::new(kernel),
            wet: GainNode::new(0.0, sample_rate),
            scratch: AudioBuffer::with_sample_rate(PARTITION_SIZE, ChannelLayout::Stereo, sample_rate),
        }
    }

    pub fn convolver(&self) -> &ConvolverNode {
        &self.convolver
    }

    pub fn convolver_mut(&mut self) -> &mut ConvolverNode {
        &mut self.convolver
    }

    /// Wet level gain node
    pub fn wet(&self) -> &GainNode {
        &self.wet
    }

    pub fn wet_mut(&mut self) -> &mut GainNode {
        &mut self.wet
    }
}

impl AudioNode for ReverbStage {
    fn process(&mut self, block: &mut AudioBuffer) {
        let frames = block.len();
        for (dst, src) in self.scratch.samples.iter_mut().zip(&block.samples) {
            dst.resize(frames, 0.0);
            dst.copy_from_slice(src);
        }

        let audible = !self.wet.is_silent();
        self.convolver.convolve(&mut self.scratch, audible);
        if !audible {
            return;
        }
        self.wet.process(&mut self.scratch);
        block.mix_from(&self.scratch);
    }

    fn reset(&mut self) {
        self.convolver.clear();
    }

    impl_node_common!("convolver", "Convolution Reverb");
}

// ============================================================================
// Tests
// ============================================================================
