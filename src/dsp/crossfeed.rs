//! Crossfeed stage
//!
//! Adds interaural crosstalk for headphone listening. Each output keeps its
//! direct path (L→L, R→R) and receives the opposite channel delayed by
//! 0.3 ms, low-passed at 2.2 kHz and attenuated.

use super::biquad::{BiquadCoeffs, BiquadState, FilterType, LOWPASS_Q};
use super::delay::DelayLine;
use super::node::AudioNode;
use super::param::AudioParam;
use crate::engine::AudioBuffer;
use crate::impl_node_common;

/// Interaural delay of the cross path in seconds
pub const CROSSFEED_DELAY_SECS: f32 = 0.0003;

/// Cross path low-pass cutoff in Hz
pub const CROSSFEED_CUTOFF_HZ: f64 = 2200.0;

/// Cross path gain
pub const CROSSFEED_GAIN: f32 = 0.2;

/// Cross path gain with the HD macro on
pub const CROSSFEED_GAIN_HD: f32 = 0.3;

/// One cross path: delay, low-pass, shared gain
#[derive(Debug, Clone)]
struct CrossPath {
    delay: DelayLine,
    filter: BiquadState,
}

impl CrossPath {
    fn new(delay_samples: usize) -> Self {
        Self {
            delay: DelayLine::new(delay_samples),
            filter: BiquadState::default(),
        }
    }

    #[inline]
    fn process(&mut self, input: f32, delay: f32, coeffs: &BiquadCoeffs) -> f32 {
        let delayed = self.delay.process(input, delay);
        self.filter.process(delayed as f64, coeffs) as f32
    }

    fn reset(&mut self) {
        self.delay.reset();
        self.filter.reset();
    }
}

/// Stereo crossfeed node
#[derive(Debug, Clone)]
pub struct CrossfeedStage {
    gain: AudioParam,
    delay_samples: f32,
    coeffs: BiquadCoeffs,
    /// Feeds the left output from the right input
    right_to_left: CrossPath,
    /// Feeds the right output from the left input
    left_to_right: CrossPath,
}

impl CrossfeedStage {
    pub fn new(sample_rate: u32) -> Self {
        let delay_samples = CROSSFEED_DELAY_SECS * sample_rate as f32;
        let capacity = delay_samples.ceil() as usize + 1;
        Self {
            gain: AudioParam::new(CROSSFEED_GAIN, 0.0, 1.0, sample_rate),
            delay_samples,
            coeffs: BiquadCoeffs::calculate(
                FilterType::LowPass,
                sample_rate as f64,
                CROSSFEED_CUTOFF_HZ,
                0.0,
                LOWPASS_Q,
            ),
            right_to_left: CrossPath::new(capacity),
            left_to_right: CrossPath::new(capacity),
        }
    }

    /// Cross path gain parameter
    pub fn gain(&self) -> &AudioParam {
        &self.gain
    }

    pub fn gain_mut(&mut self) -> &mut AudioParam {
        &mut self.gain
    }
}

impl AudioNode for CrossfeedStage {
    fn process(&mut self, block: &mut AudioBuffer) {
        if block.num_channels() < 2 {
            return;
        }

        let coeffs = self.coeffs;
        let delay = self.delay_samples;
        let (left, right) = block.stereo_mut();
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let g = self.gain.next_sample();
            let (in_l, in_r) = (*l, *r);
            *l = in_l + g * self.right_to_left.process(in_r, delay, &coeffs);
            *r = in_r + g * self.left_to_right.process(in_l, delay, &coeffs);
        }
    }

    fn reset(&mut self) {
        self.right_to_left.reset();
        self.left_to_right.reset();
    }

    impl_node_common!("crossfeed", "Crossfeed");
}
