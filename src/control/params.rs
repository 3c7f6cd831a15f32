//! Parameter set
//!
//! The user-facing control state. Every numeric field is clamped to its
//! range on write, so a stored `ParameterSet` is always valid to apply.

use serde::{Deserialize, Serialize};

/// Inclusive numeric range of a parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

impl ParamRange {
    const fn new(min: f32, max: f32, default: f32) -> Self {
        Self { min, max, default }
    }

    /// Clamp a value into the range; NaN maps to the default
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            self.default
        } else {
            value.clamp(self.min, self.max)
        }
    }
}

pub const VOLUME: ParamRange = ParamRange::new(0.0, 3.0, 1.0);
pub const BASS: ParamRange = ParamRange::new(-10.0, 15.0, 0.0);
pub const TREBLE: ParamRange = ParamRange::new(-10.0, 15.0, 0.0);
pub const VOCAL_CLARITY: ParamRange = ParamRange::new(0.0, 15.0, 5.0);
pub const REVERB_LEVEL: ParamRange = ParamRange::new(0.0, 1.0, 0.0);
pub const HEIGHT_LEVEL: ParamRange = ParamRange::new(0.0, 1.0, 0.0);
pub const LFE_CROSSOVER_HZ: ParamRange = ParamRange::new(40.0, 250.0, 80.0);
pub const SPEAKER_DELAY_MS: ParamRange = ParamRange::new(0.0, 200.0, 0.0);
pub const PHASE_ALIGNMENT_MS: ParamRange = ParamRange::new(-20.0, 20.0, 0.0);
pub const DRC: ParamRange = ParamRange::new(0.0, 1.0, 0.0);

/// Complete user control state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParameterSet {
    pub volume: f32,
    pub bass: f32,
    pub treble: f32,
    pub vocal_clarity: f32,
    pub reverb_level: f32,
    pub height_level: f32,
    pub lfe_crossover_hz: f32,
    pub speaker_delay_ms: f32,
    pub phase_alignment_ms: f32,
    pub drc: f32,
    pub theater_mode: bool,
    pub hd_mode: bool,
    pub preset_name: Option<String>,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            volume: VOLUME.default,
            bass: BASS.default,
            treble: TREBLE.default,
            vocal_clarity: VOCAL_CLARITY.default,
            reverb_level: REVERB_LEVEL.default,
            height_level: HEIGHT_LEVEL.default,
            lfe_crossover_hz: LFE_CROSSOVER_HZ.default,
            speaker_delay_ms: SPEAKER_DELAY_MS.default,
            phase_alignment_ms: PHASE_ALIGNMENT_MS.default,
            drc: DRC.default,
            theater_mode: false,
            hd_mode: false,
            preset_name: None,
        }
    }
}

impl ParameterSet {
    /// Copy with every numeric field clamped into range
    ///
    /// Sets that arrive from outside (deserialized or built by hand) go
    /// through this before they reach a graph.
    pub fn clamped(&self) -> Self {
        Self {
            volume: VOLUME.clamp(self.volume),
            bass: BASS.clamp(self.bass),
            treble: TREBLE.clamp(self.treble),
            vocal_clarity: VOCAL_CLARITY.clamp(self.vocal_clarity),
            reverb_level: REVERB_LEVEL.clamp(self.reverb_level),
            height_level: HEIGHT_LEVEL.clamp(self.height_level),
            lfe_crossover_hz: LFE_CROSSOVER_HZ.clamp(self.lfe_crossover_hz),
            speaker_delay_ms: SPEAKER_DELAY_MS.clamp(self.speaker_delay_ms),
            phase_alignment_ms: PHASE_ALIGNMENT_MS.clamp(self.phase_alignment_ms),
            drc: DRC.clamp(self.drc),
            theater_mode: self.theater_mode,
            hd_mode: self.hd_mode,
            preset_name: self.preset_name.clone(),
        }
    }

    pub fn set_volume(&mut self, value: f32) {
        self.volume = VOLUME.clamp(value);
    }

    pub fn set_bass(&mut self, value: f32) {
        self.bass = BASS.clamp(value);
    }

    pub fn set_treble(&mut self, value: f32) {
        self.treble = TREBLE.clamp(value);
    }

    pub fn set_vocal_clarity(&mut self, value: f32) {
        self.vocal_clarity = VOCAL_CLARITY.clamp(value);
    }

    pub fn set_reverb_level(&mut self, value: f32) {
        self.reverb_level = REVERB_LEVEL.clamp(value);
    }

    pub fn set_height_level(&mut self, value: f32) {
        self.height_level = HEIGHT_LEVEL.clamp(value);
    }

    pub fn set_lfe_crossover(&mut self, hz: f32) {
        self.lfe_crossover_hz = LFE_CROSSOVER_HZ.clamp(hz);
    }

    pub fn set_speaker_calibration(&mut self, delay_ms: f32, phase_ms: f32) {
        self.speaker_delay_ms = SPEAKER_DELAY_MS.clamp(delay_ms);
        self.phase_alignment_ms = PHASE_ALIGNMENT_MS.clamp(phase_ms);
    }

    pub fn set_drc(&mut self, value: f32) {
        self.drc = DRC.clamp(value);
    }

    /// Load from JSON; the result is clamped
    pub fn from_json_str(json: &str) -> crate::error::Result<Self> {
        let params: ParameterSet = serde_json::from_str(json)?;
        Ok(params.clamped())
    }
}
