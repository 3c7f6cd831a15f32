//! Gain node
//!
//! Linear gain stage used for master volume and the reverb wet level.
//! Gain is ramped per sample so volume moves never zipper.

use super::node::AudioNode;
use super::param::AudioParam;
use crate::engine::AudioBuffer;
use crate::impl_node_common;

// ============================================================================
// Constants
// ============================================================================

/// Maximum linear gain (+9.5 dB)
pub const MAX_GAIN: f32 = 3.0;

// ============================================================================
// Gain Node
// ============================================================================

/// Linear gain stage
///
/// # Example
/// ```
/// use sonicstage::dsp::{AudioNode, GainNode};
/// use sonicstage::engine::{AudioBuffer, ChannelLayout};
///
/// let mut gain = GainNode::new(0.5, 48000);
/// let mut block = AudioBuffer::new(128, ChannelLayout::Stereo);
/// block.channel_mut(0).fill(1.0);
/// gain.process(&mut block);
/// assert_eq!(block.channel(0)[0], 0.5);
/// ```
#[derive(Debug, Clone)]
pub struct GainNode {
    gain: AudioParam,
}

impl GainNode {
    /// Create a gain node resting at `gain`
    pub fn new(gain: f32, sample_rate: u32) -> Self {
        Self {
            gain: AudioParam::new(gain, 0.0, MAX_GAIN, sample_rate),
        }
    }

    pub fn gain(&self) -> &AudioParam {
        &self.gain
    }

    pub fn gain_mut(&mut self) -> &mut AudioParam {
        &mut self.gain
    }

    /// True while the output is guaranteed silent for the next block
    pub fn is_silent(&self) -> bool {
        self.gain.is_settled() && self.gain.value() == 0.0
    }
}

impl AudioNode for GainNode {
    fn process(&mut self, block: &mut AudioBuffer) {
        if self.gain.is_settled() {
            let g = self.gain.value();
            if g == 1.0 {
                return;
            }
            for channel in &mut block.samples {
                for sample in channel.iter_mut() {
                    *sample *= g;
                }
            }
            return;
        }

        if block.num_channels() < 2 {
            for channel in &mut block.samples {
                for sample in channel.iter_mut() {
                    *sample *= self.gain.next_sample();
                }
            }
            return;
        }

        // Per-sample ramp, shared across channels
        let (left, right) = block.stereo_mut();
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let g = self.gain.next_sample();
            *l *= g;
            *r *= g;
        }
    }

    fn reset(&mut self) {}

    impl_node_common!("gain", "Gain");
}

// ============================================================================
// Tests
// ============================================================================
