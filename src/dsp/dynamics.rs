//! Dynamics stage
//!
//! Two compressors in series after master gain:
//! - a gentle "feel" compressor (4:1, 40 ms / 250 ms, -18 dB, 12 dB soft knee)
//! - a brickwall limiter (20:1, 1 ms / 100 ms, hard knee) whose threshold
//!   follows the DRC control
//!
//! Detection is stereo-linked peak level; gain is smoothed with one-pole
//! attack/release followers.

use super::node::AudioNode;
use super::param::AudioParam;
use crate::engine::buffer::{db_to_linear, linear_to_db};
use crate::engine::AudioBuffer;
use crate::impl_node_common;

// ============================================================================
// Constants
// ============================================================================

/// Floor for level detection in dB
const DETECTOR_FLOOR_DB: f32 = -120.0;

/// Feel compressor settings
pub const FEEL_THRESHOLD_DB: f32 = -18.0;
pub const FEEL_KNEE_DB: f32 = 12.0;
pub const FEEL_RATIO: f32 = 4.0;
pub const FEEL_ATTACK_SECS: f32 = 0.04;
pub const FEEL_RELEASE_SECS: f32 = 0.25;

/// Limiter settings
pub const LIMITER_RATIO: f32 = 20.0;
pub const LIMITER_ATTACK_SECS: f32 = 0.001;
pub const LIMITER_RELEASE_SECS: f32 = 0.1;
pub const LIMITER_BASE_THRESHOLD_DB: f32 = -0.5;

/// Threshold reduction at full DRC
pub const DRC_THRESHOLD_RANGE_DB: f32 = 12.0;

/// Limiter threshold for a DRC amount in `[0, 1]`
#[inline]
pub fn limiter_threshold_for_drc(drc: f32) -> f32 {
    LIMITER_BASE_THRESHOLD_DB - drc.clamp(0.0, 1.0) * DRC_THRESHOLD_RANGE_DB
}

// ============================================================================
// Compressor
// ============================================================================

/// Static compressor settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressorSettings {
    pub threshold_db: f32,
    pub knee_db: f32,
    pub ratio: f32,
    pub attack_secs: f32,
    pub release_secs: f32,
}

impl CompressorSettings {
    pub fn feel() -> Self {
        Self {
            threshold_db: FEEL_THRESHOLD_DB,
            knee_db: FEEL_KNEE_DB,
            ratio: FEEL_RATIO,
            attack_secs: FEEL_ATTACK_SECS,
            release_secs: FEEL_RELEASE_SECS,
        }
    }

    pub fn brickwall() -> Self {
        Self {
            threshold_db: LIMITER_BASE_THRESHOLD_DB,
            knee_db: 0.0,
            ratio: LIMITER_RATIO,
            attack_secs: LIMITER_ATTACK_SECS,
            release_secs: LIMITER_RELEASE_SECS,
        }
    }
}

/// Feed-forward compressor with an automated threshold
#[derive(Debug, Clone)]
pub struct Compressor {
    label: &'static str,
    threshold_db: AudioParam,
    knee_db: f32,
    ratio: f32,
    attack_coeff: f32,
    release_coeff: f32,
    /// Smoothed linear gain applied to the signal
    gain: f32,
}

impl Compressor {
    pub fn new(label: &'static str, settings: CompressorSettings, sample_rate: u32) -> Self {
        let sr = sample_rate.max(1) as f32;
        let coeff = |secs: f32| {
            let samples = secs * sr;
            if samples > 0.0 {
                (-1.0 / samples).exp()
            } else {
                0.0
            }
        };

        Self {
            label,
            threshold_db: AudioParam::new(settings.threshold_db, -100.0, 0.0, sample_rate),
            knee_db: settings.knee_db.clamp(0.0, 40.0),
            ratio: settings.ratio.max(1.0),
            attack_coeff: coeff(settings.attack_secs),
            release_coeff: coeff(settings.release_secs),
            gain: 1.0,
        }
    }

    /// Threshold parameter in dB
    pub fn threshold(&self) -> &AudioParam {
        &self.threshold_db
    }

    pub fn threshold_mut(&mut self) -> &mut AudioParam {
        &mut self.threshold_db
    }

    /// Current gain reduction in dB (0 or negative)
    pub fn gain_reduction_db(&self) -> f32 {
        linear_to_db(self.gain).min(0.0)
    }

    /// Static gain reduction in dB for an input level
    pub fn compute_gain_reduction_db(&self, input_db: f32) -> f32 {
        let threshold = self.threshold_db.value();
        let ratio = self.ratio;
        let knee = self.knee_db;

        if knee > 0.0 {
            let knee_start = threshold - knee / 2.0;
            let knee_end = threshold + knee / 2.0;

            if input_db <= knee_start {
                0.0
            } else if input_db >= knee_end {
                (threshold + (input_db - threshold) / ratio) - input_db
            } else {
                // Quadratic interpolation across the knee
                let over = input_db - knee_start;
                (1.0 / ratio - 1.0) * over * over / (2.0 * knee)
            }
        } else if input_db <= threshold {
            0.0
        } else {
            (threshold + (input_db - threshold) / ratio) - input_db
        }
    }
}

impl AudioNode for Compressor {
    fn process(&mut self, block: &mut AudioBuffer) {
        let frames = block.len();
        self.threshold_db.advance(frames);

        for i in 0..frames {
            let peak = block
                .samples
                .iter()
                .map(|ch| ch[i].abs())
                .fold(0.0_f32, f32::max);
            let input_db = linear_to_db(peak).max(DETECTOR_FLOOR_DB);
            let target = db_to_linear(self.compute_gain_reduction_db(input_db));

            let coeff = if target < self.gain {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.gain = coeff * self.gain + (1.0 - coeff) * target;

            for channel in &mut block.samples {
                channel[i] *= self.gain;
            }
        }
    }

    fn reset(&mut self) {
        self.gain = 1.0;
    }

    fn node_type(&self) -> &'static str {
        "compressor"
    }

    fn display_name(&self) -> &str {
        self.label
    }
}

// ============================================================================
// Dynamics Stage
// ============================================================================

/// Feel compressor followed by the brickwall limiter
#[derive(Debug, Clone)]
pub struct DynamicsStage {
    compressor: Compressor,
    limiter: Compressor,
}

impl DynamicsStage {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            compressor: Compressor::new("Feel Compressor", CompressorSettings::feel(), sample_rate),
            limiter: Compressor::new("Brickwall Limiter", CompressorSettings::brickwall(), sample_rate),
        }
    }

    pub fn compressor(&self) -> &Compressor {
        &self.compressor
    }

    pub fn limiter(&self) -> &Compressor {
        &self.limiter
    }

    pub fn limiter_mut(&mut self) -> &mut Compressor {
        &mut self.limiter
    }
}

impl AudioNode for DynamicsStage {
    fn process(&mut self, block: &mut AudioBuffer) {
        self.compressor.process(block);
        self.limiter.process(block);
    }

    fn reset(&mut self) {
        self.compressor.reset();
        self.limiter.reset();
    }

    impl_node_common!("dynamics", "Dynamics");
}

// ============================================================================
// Tests
// ============================================================================
