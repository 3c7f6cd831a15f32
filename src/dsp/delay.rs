//! Delay lines
//!
//! [`DelayLine`] is a circular buffer with fractional (linearly interpolated)
//! reads, shared by the calibration delay and the crossfeed cross path.
//! [`DelayNode`] is the calibration stage: speaker distance compensation plus
//! phase alignment collapsed into one automated delay time.

use super::node::AudioNode;
use super::param::AudioParam;
use crate::engine::AudioBuffer;
use crate::impl_node_common;

// ============================================================================
// Constants
// ============================================================================

/// Maximum calibration delay in seconds
pub const MAX_DELAY_SECS: f32 = 1.0;

// ============================================================================
// Delay Line
// ============================================================================

/// Single-channel circular delay buffer
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    /// Create a delay line able to hold `max_delay_samples` of history
    pub fn new(max_delay_samples: usize) -> Self {
        Self {
            // One extra slot for the interpolation neighbour
            buffer: vec![0.0; max_delay_samples + 2],
            write_pos: 0,
        }
    }

    /// Longest delay this line can produce, in samples
    pub fn max_delay(&self) -> usize {
        self.buffer.len() - 2
    }

    /// Write `input` and read the sample `delay` samples in the past
    ///
    /// Fractional delays are linearly interpolated.
    #[inline]
    pub fn process(&mut self, input: f32, delay: f32) -> f32 {
        let size = self.buffer.len();
        self.buffer[self.write_pos] = input;

        let delay = delay.clamp(0.0, self.max_delay() as f32);
        let whole = delay.floor() as usize;
        let frac = delay - whole as f32;

        let idx_a = (self.write_pos + size - whole) % size;
        let idx_b = (idx_a + size - 1) % size;
        let output = self.buffer[idx_a] * (1.0 - frac) + self.buffer[idx_b] * frac;

        self.write_pos = (self.write_pos + 1) % size;
        output
    }

    /// Clear history
    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

// ============================================================================
// Calibration Delay Node
// ============================================================================

/// Stereo delay with an automated delay time in seconds
#[derive(Debug, Clone)]
pub struct DelayNode {
    delay_time: AudioParam,
    lines: [DelayLine; 2],
    sample_rate: f32,
}

impl DelayNode {
    /// Create a delay node with zero delay
    pub fn new(sample_rate: u32) -> Self {
        let max_samples = (MAX_DELAY_SECS * sample_rate as f32).ceil() as usize;
        Self {
            delay_time: AudioParam::new(0.0, 0.0, MAX_DELAY_SECS, sample_rate),
            lines: [DelayLine::new(max_samples), DelayLine::new(max_samples)],
            sample_rate: sample_rate as f32,
        }
    }

    /// Delay time parameter in seconds
    pub fn delay_time(&self) -> &AudioParam {
        &self.delay_time
    }

    pub fn delay_time_mut(&mut self) -> &mut AudioParam {
        &mut self.delay_time
    }
}

impl AudioNode for DelayNode {
    fn process(&mut self, block: &mut AudioBuffer) {
        let frames = block.len();
        for i in 0..frames {
            let delay = self.delay_time.next_sample() * self.sample_rate;
            for (channel, line) in block.samples.iter_mut().zip(self.lines.iter_mut()) {
                channel[i] = line.process(channel[i], delay);
            }
        }
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.reset();
        }
    }

    impl_node_common!("delay", "Calibration Delay");
}

// ============================================================================
// Tests
// ============================================================================
