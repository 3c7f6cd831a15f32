//! Preset library
//!
//! Named bundles applied over the current parameter state. Tone controls
//! (bass, treble, vocal clarity) are always reset to neutral first and the
//! preset's values layered on top, so switching presets never accumulates.

use serde::{Deserialize, Serialize};

use super::params::{ParameterSet, BASS, TREBLE, VOCAL_CLARITY};
use crate::error::{Result, SonicError};

/// Impulse response shape a preset asks for
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverbSpec {
    pub duration_secs: f32,
    pub decay: f32,
}

impl ReverbSpec {
    pub const fn new(duration_secs: f32, decay: f32) -> Self {
        Self {
            duration_secs,
            decay,
        }
    }
}

/// A named parameter bundle
///
/// `None` fields leave the current value alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub name: String,
    pub bass: f32,
    pub treble: f32,
    pub vocal_clarity: f32,
    pub reverb_level: Option<f32>,
    pub height_level: Option<f32>,
    pub drc: Option<f32>,
    pub theater_mode: Option<bool>,
    pub hd_mode: Option<bool>,
    pub reverb: Option<ReverbSpec>,
}

impl Preset {
    fn neutral(name: &str) -> Self {
        Self {
            name: name.to_string(),
            bass: BASS.default,
            treble: TREBLE.default,
            vocal_clarity: VOCAL_CLARITY.default,
            reverb_level: None,
            height_level: None,
            drc: None,
            theater_mode: None,
            hd_mode: None,
            reverb: None,
        }
    }

    /// Apply this preset to `params`
    pub fn apply_to(&self, params: &mut ParameterSet) {
        params.set_bass(BASS.default);
        params.set_treble(TREBLE.default);
        params.set_vocal_clarity(VOCAL_CLARITY.default);

        params.set_bass(self.bass);
        params.set_treble(self.treble);
        params.set_vocal_clarity(self.vocal_clarity);
        if let Some(level) = self.reverb_level {
            params.set_reverb_level(level);
        }
        if let Some(level) = self.height_level {
            params.set_height_level(level);
        }
        if let Some(drc) = self.drc {
            params.set_drc(drc);
        }
        if let Some(on) = self.theater_mode {
            params.theater_mode = on;
        }
        if let Some(on) = self.hd_mode {
            params.hd_mode = on;
        }
        params.preset_name = Some(self.name.clone());
    }
}

/// Built-in presets
#[derive(Debug, Clone)]
pub struct PresetLibrary {
    presets: Vec<Preset>,
}

impl Default for PresetLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PresetLibrary {
    pub fn builtin() -> Self {
        let presets = vec![
            Preset {
                reverb_level: Some(0.0),
                height_level: Some(0.0),
                drc: Some(0.0),
                theater_mode: Some(false),
                hd_mode: Some(false),
                ..Preset::neutral("Pure Direct")
            },
            Preset {
                bass: 6.0,
                treble: 3.0,
                vocal_clarity: 7.0,
                reverb_level: Some(0.15),
                height_level: Some(0.6),
                theater_mode: Some(true),
                reverb: Some(ReverbSpec::new(2.5, 2.5)),
                ..Preset::neutral("IMAX Enhanced")
            },
            Preset {
                bass: 2.0,
                treble: 1.5,
                vocal_clarity: 6.0,
                reverb_level: Some(0.35),
                height_level: Some(0.4),
                theater_mode: Some(false),
                reverb: Some(ReverbSpec::new(3.5, 2.0)),
                ..Preset::neutral("Concert Auditorium")
            },
            Preset {
                bass: 5.0,
                treble: 2.0,
                vocal_clarity: 8.0,
                reverb_level: Some(0.2),
                height_level: Some(0.8),
                theater_mode: Some(true),
                hd_mode: Some(true),
                reverb: Some(ReverbSpec::new(2.0, 3.0)),
                ..Preset::neutral("Dolby Cinema")
            },
            Preset {
                bass: -4.0,
                treble: -2.0,
                vocal_clarity: 9.0,
                reverb_level: Some(0.0),
                drc: Some(0.8),
                theater_mode: Some(false),
                ..Preset::neutral("Night Mode")
            },
            Preset {
                reverb_level: Some(0.05),
                height_level: Some(0.0),
                drc: Some(0.0),
                theater_mode: Some(false),
                hd_mode: Some(true),
                reverb: Some(ReverbSpec::new(0.8, 4.0)),
                ..Preset::neutral("Studio Reference")
            },
        ];
        Self { presets }
    }

    /// Preset names in library order
    pub fn names(&self) -> Vec<&str> {
        self.presets.iter().map(|p| p.name.as_str()).collect()
    }

    /// Look up a preset by exact name
    pub fn get(&self, name: &str) -> Result<&Preset> {
        self.presets
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| SonicError::UnknownPreset {
                name: name.to_string(),
            })
    }

    /// Impulse response for a parameter set's active preset, if it defines one
    pub fn reverb_for(&self, params: &ParameterSet) -> Option<ReverbSpec> {
        params
            .preset_name
            .as_deref()
            .and_then(|name| self.get(name).ok())
            .and_then(|preset| preset.reverb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_all_presets_present() {
        let library = PresetLibrary::builtin();
        assert_eq!(
            library.names(),
            vec![
                "Pure Direct",
                "IMAX Enhanced",
                "Concert Auditorium",
                "Dolby Cinema",
                "Night Mode",
                "Studio Reference"
            ]
        );
    }

    #[test]
    fn test_unknown_preset() {
        let library = PresetLibrary::builtin();
        let err = library.get("Stadium").unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_PRESET");
    }

    #[test]
    fn test_apply_is_idempotent() {
        let library = PresetLibrary::builtin();
        let preset = library.get("IMAX Enhanced").unwrap();

        let mut once = ParameterSet::default();
        once.set_bass(12.0);
        preset.apply_to(&mut once);

        let mut twice = once.clone();
        preset.apply_to(&mut twice);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_switching_does_not_drift() {
        let library = PresetLibrary::builtin();
        let mut params = ParameterSet::default();
        for _ in 0..5 {
            library.get("Night Mode").unwrap().apply_to(&mut params);
            library.get("Concert Auditorium").unwrap().apply_to(&mut params);
        }
        assert_eq!(params.bass, 2.0);
        assert_eq!(params.treble, 1.5);
        assert_eq!(params.vocal_clarity, 6.0);
        assert_eq!(params.preset_name.as_deref(), Some("Concert Auditorium"));
    }

    #[test]
    fn test_pure_direct_resets_tone_and_macros() {
        let library = PresetLibrary::builtin();
        let mut params = ParameterSet::default();
        library.get("Dolby Cinema").unwrap().apply_to(&mut params);
        library.get("Pure Direct").unwrap().apply_to(&mut params);

        assert_eq!(params.bass, 0.0);
        assert_eq!(params.vocal_clarity, 5.0);
        assert_eq!(params.reverb_level, 0.0);
        assert!(!params.theater_mode);
        assert!(!params.hd_mode);
    }

    #[test]
    fn test_volume_untouched_by_presets() {
        let library = PresetLibrary::builtin();
        let mut params = ParameterSet::default();
        params.set_volume(1.8);
        library.get("Night Mode").unwrap().apply_to(&mut params);
        assert_eq!(params.volume, 1.8);
    }

    #[test]
    fn test_reverb_for_active_preset() {
        let library = PresetLibrary::builtin();
        let mut params = ParameterSet::default();
        assert_eq!(library.reverb_for(&params), None);

        library.get("Concert Auditorium").unwrap().apply_to(&mut params);
        assert_eq!(library.reverb_for(&params), Some(ReverbSpec::new(3.5, 2.0)));
    }
}
