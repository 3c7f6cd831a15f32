//! Spatializer stage
//!
//! Positional panner followed by an air-absorption low-pass.
//!
//! UI coordinates live in `[-2, 2]` per axis and are scaled ×5 into panner
//! space. The listener sits at the origin facing -z with +y up. Panning is
//! equal-power from the source azimuth; distance attenuation is the inverse
//! model with a reference distance wide enough that the whole speaker ring
//! near the listener is attenuation-free.

use serde::{Deserialize, Serialize};

use super::biquad::BiquadFilter;
use super::node::AudioNode;
use super::param::{AudioParam, Automation};
use crate::engine::AudioBuffer;
use crate::impl_node_common;

// ============================================================================
// Constants
// ============================================================================

/// UI coordinate bound per axis
pub const POSITION_LIMIT: f32 = 2.0;

/// UI to panner-space scale
pub const PANNER_SCALE: f32 = 5.0;

/// Inverse distance model reference distance (UI radius 3)
pub const REF_DISTANCE: f32 = 15.0;

/// Inverse distance model rolloff
pub const ROLLOFF_FACTOR: f32 = 1.0;

/// Air absorption cutoff bounds in Hz
pub const AIR_MAX_CUTOFF_HZ: f32 = 20000.0;
pub const AIR_MIN_CUTOFF_HZ: f32 = 3000.0;

/// Air absorption exponent per panner-space unit
const AIR_ABSORPTION_RATE: f32 = 0.15;

// ============================================================================
// Spatial Position
// ============================================================================

/// Source position in UI coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SpatialPosition {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl SpatialPosition {
    /// Create a position, clamping each axis to `[-2, 2]`
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        let clamp = |v: f32| {
            if v.is_nan() {
                0.0
            } else {
                v.clamp(-POSITION_LIMIT, POSITION_LIMIT)
            }
        };
        Self {
            x: clamp(x),
            y: clamp(y),
            z: clamp(z),
        }
    }

    /// Position scaled into panner space
    pub fn to_panner_space(self) -> [f32; 3] {
        [self.x * PANNER_SCALE, self.y * PANNER_SCALE, self.z * PANNER_SCALE]
    }

    /// Distance from the listener in panner space
    pub fn panner_distance(self) -> f32 {
        let [x, y, z] = self.to_panner_space();
        (x * x + y * y + z * z).sqrt()
    }

    /// Air absorption low-pass cutoff for this position
    pub fn air_cutoff_hz(self) -> f32 {
        air_cutoff_hz(self.panner_distance())
    }
}

/// Air absorption cutoff `max(3000, 20000 * e^(-d * 0.15))`
#[inline]
pub fn air_cutoff_hz(distance: f32) -> f32 {
    (AIR_MAX_CUTOFF_HZ * (-distance.max(0.0) * AIR_ABSORPTION_RATE).exp()).max(AIR_MIN_CUTOFF_HZ)
}

/// Inverse distance model gain
#[inline]
pub fn distance_gain(distance: f32) -> f32 {
    let d = distance.max(REF_DISTANCE);
    REF_DISTANCE / (REF_DISTANCE + ROLLOFF_FACTOR * (d - REF_DISTANCE))
}

/// Azimuth in degrees of a panner-space point, 0 ahead, positive to the right
pub fn azimuth_degrees(point: [f32; 3]) -> f32 {
    let [x, _, z] = point;
    // Project onto the horizontal plane (listener up is +y)
    let horizontal = (x * x + z * z).sqrt();
    if horizontal <= f32::EPSILON {
        return 0.0;
    }
    let (x, z) = (x / horizontal, z / horizontal);

    let mut azimuth = x.clamp(-1.0, 1.0).acos().to_degrees();
    // Listener faces -z
    let front_back = -z;
    if front_back < 0.0 {
        azimuth = 360.0 - azimuth;
    }

    // Relative to forward instead of right
    if (0.0..=270.0).contains(&azimuth) {
        90.0 - azimuth
    } else {
        450.0 - azimuth
    }
}

/// Equal-power stereo mixing matrix `[l_from_l, l_from_r, r_from_l, r_from_r]`
pub fn equal_power_matrix(azimuth: f32) -> [f32; 4] {
    let mut azimuth = azimuth.clamp(-180.0, 180.0);
    // Fold rear positions onto the front half
    if azimuth < -90.0 {
        azimuth = -180.0 - azimuth;
    } else if azimuth > 90.0 {
        azimuth = 180.0 - azimuth;
    }

    let x = if azimuth <= 0.0 {
        (azimuth + 90.0) / 90.0
    } else {
        azimuth / 90.0
    };
    // cos(pi/2) is not exactly zero in f32
    let snap = |g: f32| if g.abs() < 1e-6 { 0.0 } else { g };
    let gain_l = snap((x * std::f32::consts::FRAC_PI_2).cos());
    let gain_r = snap((x * std::f32::consts::FRAC_PI_2).sin());

    if azimuth <= 0.0 {
        [1.0, gain_l, 0.0, gain_r]
    } else {
        [gain_l, 0.0, gain_r, 1.0]
    }
}

// ============================================================================
// Spatializer Stage
// ============================================================================

/// Panner plus air absorption
#[derive(Debug, Clone)]
pub struct SpatializerStage {
    /// Panner-space position
    position: [AudioParam; 3],
    /// Mixing matrix applied at the end of the previous block
    matrix: [f32; 4],
    air: BiquadFilter,
}

impl SpatializerStage {
    pub fn new(sample_rate: u32) -> Self {
        let limit = POSITION_LIMIT * PANNER_SCALE;
        let axis = || AudioParam::new(0.0, -limit, limit, sample_rate);
        let mut stage = Self {
            position: [axis(), axis(), axis()],
            matrix: [1.0, 0.0, 0.0, 1.0],
            air: BiquadFilter::low_pass("Air Absorption", AIR_MAX_CUTOFF_HZ, sample_rate),
        };
        stage.matrix = stage.target_matrix();
        stage
    }

    /// Move the source, in UI coordinates
    pub fn set_position(&mut self, position: SpatialPosition, automation: Automation) {
        for (param, value) in self.position.iter_mut().zip(position.to_panner_space()) {
            param.apply(value, automation);
        }
    }

    /// Current panner-space position
    pub fn panner_position(&self) -> [f32; 3] {
        [
            self.position[0].value(),
            self.position[1].value(),
            self.position[2].value(),
        ]
    }

    /// Air absorption low-pass
    pub fn air(&self) -> &BiquadFilter {
        &self.air
    }

    pub fn air_mut(&mut self) -> &mut BiquadFilter {
        &mut self.air
    }

    fn target_matrix(&self) -> [f32; 4] {
        let point = self.panner_position();
        let distance = (point[0] * point[0] + point[1] * point[1] + point[2] * point[2]).sqrt();
        let gain = distance_gain(distance);
        equal_power_matrix(azimuth_degrees(point)).map(|m| m * gain)
    }

    fn pan(&mut self, block: &mut AudioBuffer) {
        let frames = block.len();
        for param in &mut self.position {
            param.advance(frames);
        }

        let start = self.matrix;
        let end = self.target_matrix();
        self.matrix = end;
        if start == [1.0, 0.0, 0.0, 1.0] && end == start {
            return;
        }

        let (left, right) = block.stereo_mut();
        let step = 1.0 / frames.max(1) as f32;
        for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
            // Interpolate across the block so position moves never click
            let t = (i + 1) as f32 * step;
            let m: [f32; 4] = std::array::from_fn(|k| start[k] + (end[k] - start[k]) * t);
            let (in_l, in_r) = (*l, *r);
            *l = m[0] * in_l + m[1] * in_r;
            *r = m[2] * in_l + m[3] * in_r;
        }
    }
}

impl AudioNode for SpatializerStage {
    fn process(&mut self, block: &mut AudioBuffer) {
        if block.num_channels() >= 2 {
            self.pan(block);
        }
        self.air.process(block);
    }

    fn reset(&mut self) {
        self.air.reset();
        self.matrix = self.target_matrix();
    }

    impl_node_common!("panner", "Spatializer");
}

// ============================================================================
// Tests
// ============================================================================
