//! Engine configuration
//!
//! Analyser settings, the fallback reverb and render reporting. Everything
//! has a default; JSON documents may set any subset of fields.

use serde::{Deserialize, Serialize};

use crate::control::presets::ReverbSpec;
use crate::dsp::analyser::AnalyserSettings;
use crate::engine::wav::BitDepth;
use crate::error::{Result, SonicError};

/// Lowest supported session rate in Hz
pub const MIN_SAMPLE_RATE: u32 = 8000;

/// Highest supported session rate in Hz
pub const MAX_SAMPLE_RATE: u32 = 192_000;

/// Engine-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Analyser FFT window length (power of two, 32 to 32768)
    pub fft_size: usize,
    pub analyser_smoothing: f32,
    pub analyser_min_db: f32,
    pub analyser_max_db: f32,
    /// Impulse response used when no preset asks for one
    pub default_reverb: ReverbSpec,
    /// Noise seed for impulse response synthesis
    pub reverb_seed: u64,
    /// Render quanta between offline progress reports
    pub progress_interval_blocks: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let analyser = AnalyserSettings::default();
        Self {
            fft_size: analyser.fft_size,
            analyser_smoothing: analyser.smoothing,
            analyser_min_db: analyser.min_db,
            analyser_max_db: analyser.max_db,
            default_reverb: ReverbSpec::new(2.0, 2.0),
            reverb_seed: 0x5EED_0F_CAFE,
            progress_interval_blocks: 64,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field
    pub fn validate(&self) -> Result<()> {
        self.analyser_settings().validate()?;
        let reverb = self.default_reverb;
        if reverb.duration_secs.is_nan() || reverb.duration_secs <= 0.0 || reverb.decay < 0.0 {
            return Err(SonicError::unsupported(format!(
                "default reverb {:?}",
                reverb
            )));
        }
        if self.progress_interval_blocks == 0 {
            return Err(SonicError::unsupported("progress_interval_blocks must be at least 1"));
        }
        Ok(())
    }

    /// Analyser settings derived from this configuration
    pub fn analyser_settings(&self) -> AnalyserSettings {
        AnalyserSettings {
            fft_size: self.fft_size,
            smoothing: self.analyser_smoothing,
            min_db: self.analyser_min_db,
            max_db: self.analyser_max_db,
        }
    }
}

/// Check a session or render rate
pub fn validate_sample_rate(sample_rate: u32) -> Result<()> {
    if (MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
        Ok(())
    } else {
        Err(SonicError::unsupported(format!(
            "sample rate {} Hz (expected {}..={})",
            sample_rate, MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
        )))
    }
}

/// Check a rate and bit depth pair
pub fn validate_output(sample_rate: u32, bit_depth: u16) -> Result<BitDepth> {
    validate_sample_rate(sample_rate)?;
    BitDepth::try_from(bit_depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.analyser_settings().bin_count(), 1024);
    }

    #[test]
    fn test_partial_json() {
        let config = EngineConfig::from_json_str(r#"{"fft_size": 512}"#).unwrap();
        assert_eq!(config.fft_size, 512);
        assert_eq!(config.analyser_smoothing, 0.8);
        assert_eq!(config.default_reverb, ReverbSpec::new(2.0, 2.0));
    }

    #[test]
    fn test_invalid_fft_rejected() {
        let err = EngineConfig::from_json_str(r#"{"fft_size": 1000}"#).unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_CONFIGURATION");
    }

    #[test]
    fn test_malformed_json() {
        let err = EngineConfig::from_json_str("{fft_size").unwrap_err();
        assert_eq!(err.error_code(), "SERIALIZATION_ERROR");
    }

    #[test_case(8000, 16, true ; "lowest rate")]
    #[test_case(192_000, 32, true ; "highest rate")]
    #[test_case(44100, 24, true ; "cd rate")]
    #[test_case(4000, 16, false ; "rate too low")]
    #[test_case(384_000, 16, false ; "rate too high")]
    #[test_case(48000, 8, false ; "eight bit")]
    fn test_validate_output(rate: u32, bits: u16, ok: bool) {
        assert_eq!(validate_output(rate, bits).is_ok(), ok);
    }
}
