//! Automated node parameters
//!
//! [`AudioParam`] is a value with an exponential approach to a target, the
//! "set target at time" curve: `v(t) = target + (v0 - target) * e^(-t / tau)`.
//! Realtime sessions ramp every change to avoid zipper noise; offline renders
//! apply fixed values so the first rendered frame already sees the final
//! parameter set.

use serde::{Deserialize, Serialize};

/// Distance from the target below which a ramp is considered finished
const SETTLE_EPSILON: f32 = 1e-6;

/// How a new parameter value reaches the node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum Automation {
    /// Jump to the value immediately
    Fixed,
    /// Approach the value exponentially with the given time constant in seconds
    Ramp { time_constant: f32 },
}

impl Automation {
    /// Ramp with the given time constant
    pub fn ramp(time_constant: f32) -> Self {
        Automation::Ramp { time_constant }
    }
}

/// A single automated parameter
#[derive(Debug, Clone)]
pub struct AudioParam {
    value: f32,
    target: f32,
    min: f32,
    max: f32,
    time_constant: f32,
    sample_rate: f32,
    /// Per-sample decay factor `e^(-1 / (tau * sr))`
    coeff: f32,
}

impl AudioParam {
    /// Create a parameter resting at `default`, clamped to `[min, max]`
    pub fn new(default: f32, min: f32, max: f32, sample_rate: u32) -> Self {
        let value = default.clamp(min, max);
        Self {
            value,
            target: value,
            min,
            max,
            time_constant: 0.0,
            sample_rate: sample_rate.max(1) as f32,
            coeff: 0.0,
        }
    }

    /// Create an unbounded parameter
    pub fn unbounded(default: f32, sample_rate: u32) -> Self {
        Self::new(default, f32::MIN, f32::MAX, sample_rate)
    }

    /// Current value
    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Value the parameter is approaching
    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    /// True when no ramp is in progress
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.value == self.target
    }

    /// Jump to `value` immediately
    pub fn set_value(&mut self, value: f32) {
        let value = self.sanitize(value);
        self.value = value;
        self.target = value;
    }

    /// Start an exponential approach to `target`
    ///
    /// A non-positive time constant behaves like [`set_value`](Self::set_value).
    pub fn set_target(&mut self, target: f32, time_constant: f32) {
        if time_constant.is_nan() || time_constant <= 0.0 {
            self.set_value(target);
            return;
        }
        self.target = self.sanitize(target);
        if time_constant != self.time_constant {
            self.time_constant = time_constant;
            self.coeff = (-1.0 / (time_constant * self.sample_rate)).exp();
        }
    }

    /// Apply a change according to its automation mode
    pub fn apply(&mut self, value: f32, automation: Automation) {
        match automation {
            Automation::Fixed => self.set_value(value),
            Automation::Ramp { time_constant } => self.set_target(value, time_constant),
        }
    }

    /// Advance by one sample and return the new value
    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        if self.value != self.target {
            self.value = self.target + (self.value - self.target) * self.coeff;
            self.snap();
        }
        self.value
    }

    /// Advance by `frames` samples at once and return the new value
    ///
    /// Used by nodes that update coefficients once per block.
    pub fn advance(&mut self, frames: usize) -> f32 {
        if self.value != self.target && frames > 0 {
            let decay = (-(frames as f32) / (self.time_constant * self.sample_rate)).exp();
            self.value = self.target + (self.value - self.target) * decay;
            self.snap();
        }
        self.value
    }

    fn snap(&mut self) {
        if (self.value - self.target).abs() <= SETTLE_EPSILON * self.target.abs().max(1.0) {
            self.value = self.target;
        }
    }

    fn sanitize(&self, value: f32) -> f32 {
        if value.is_nan() {
            self.target
        } else {
            value.clamp(self.min, self.max)
        }
    }
}
