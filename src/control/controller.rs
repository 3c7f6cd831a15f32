//! Parameter controller
//!
//! Maps UI values to DSP targets. The controller owns the current
//! [`ParameterSet`] and spatial position, computes the effective value of
//! every automated node parameter (user values plus the theater/HD macro
//! baselines), and emits [`GraphCommand`]s for whatever changed since the
//! last sync.
//!
//! Realtime sessions get exponential ramps; offline renders get fixed values.

use tracing::debug;

use super::params::ParameterSet;
use super::presets::{Preset, ReverbSpec};
use crate::dsp::crossfeed::{CROSSFEED_GAIN, CROSSFEED_GAIN_HD};
use crate::dsp::dynamics::limiter_threshold_for_drc;
use crate::dsp::param::Automation;
use crate::dsp::spatializer::SpatialPosition;
use crate::graph::command::{GraphCommand, ParamTarget, POSITION_TIME_CONSTANT};

// ============================================================================
// Macro Offsets
// ============================================================================

/// Cinema roll-off shelf gain under theater mode
pub const THEATER_CINEMA_DB: f32 = -1.5;
/// Bass offset under theater mode
pub const THEATER_BASS_DB: f32 = 4.0;
/// Vocal presence offset under theater mode
pub const THEATER_VOCAL_DB: f32 = 3.0;

/// HD sub shelf gain (60 Hz)
pub const HD_SUB_DB: f32 = 4.0;
/// HD mid dip gain (500 Hz)
pub const HD_MID_DB: f32 = -3.0;
/// HD air shelf gain (12 kHz)
pub const HD_AIR_DB: f32 = 6.0;

/// Vocal clarity value with no presence boost
const VOCAL_NEUTRAL: f32 = 5.0;
/// Presence gain per vocal clarity step
const VOCAL_DB_PER_STEP: f32 = 2.0;
/// Height peaking gain at full height level
const HEIGHT_MAX_DB: f32 = 6.0;

// ============================================================================
// DSP Targets
// ============================================================================

/// Effective value of every automated graph parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DspTargets {
    values: [f32; ParamTarget::ALL.len()],
}

impl DspTargets {
    /// Compute targets for a parameter set and source position
    pub fn compute(params: &ParameterSet, position: SpatialPosition) -> Self {
        let p = params.clamped();
        let theater = p.theater_mode;
        let hd = p.hd_mode;
        let macro_db = |on: bool, db: f32| if on { db } else { 0.0 };

        let mut values = [0.0; ParamTarget::ALL.len()];
        for (slot, target) in values.iter_mut().zip(ParamTarget::ALL) {
            *slot = match target {
                ParamTarget::VocalGain => {
                    (p.vocal_clarity - VOCAL_NEUTRAL) * VOCAL_DB_PER_STEP
                        + macro_db(theater, THEATER_VOCAL_DB)
                }
                ParamTarget::BassGain => p.bass + macro_db(theater, THEATER_BASS_DB),
                ParamTarget::TrebleGain => p.treble,
                ParamTarget::CinemaGain => macro_db(theater, THEATER_CINEMA_DB),
                ParamTarget::HeightGain => p.height_level * HEIGHT_MAX_DB,
                ParamTarget::LfeFrequency => p.lfe_crossover_hz,
                ParamTarget::HdSubGain => macro_db(hd, HD_SUB_DB),
                ParamTarget::HdMidGain => macro_db(hd, HD_MID_DB),
                ParamTarget::HdAirGain => macro_db(hd, HD_AIR_DB),
                ParamTarget::ReverbWet => p.reverb_level,
                ParamTarget::DelayTime => {
                    ((p.speaker_delay_ms + p.phase_alignment_ms) / 1000.0).max(0.0)
                }
                ParamTarget::AirCutoff => position.air_cutoff_hz(),
                ParamTarget::CrossfeedGain => {
                    if hd {
                        CROSSFEED_GAIN_HD
                    } else {
                        CROSSFEED_GAIN
                    }
                }
                ParamTarget::MasterGain => p.volume,
                ParamTarget::LimiterThreshold => limiter_threshold_for_drc(p.drc),
            };
        }
        Self { values }
    }

    /// Effective value of one target
    pub fn get(&self, target: ParamTarget) -> f32 {
        // ALL is in declaration order
        self.values[target as usize]
    }

    /// Iterate `(target, value)` pairs in chain order
    pub fn iter(&self) -> impl Iterator<Item = (ParamTarget, f32)> + '_ {
        ParamTarget::ALL.into_iter().zip(self.values.iter().copied())
    }
}

// ============================================================================
// Controller
// ============================================================================

/// How changes reach the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    /// Exponential ramps with per-parameter time constants
    Realtime,
    /// Values jump immediately
    Offline,
}

impl ControlMode {
    fn automation(self, time_constant: f32) -> Automation {
        match self {
            ControlMode::Realtime => Automation::ramp(time_constant),
            ControlMode::Offline => Automation::Fixed,
        }
    }
}

/// Owns the control state and turns changes into graph commands
#[derive(Debug, Clone)]
pub struct ParameterController {
    params: ParameterSet,
    position: SpatialPosition,
    mode: ControlMode,
    /// Targets last sent to the graph
    synced: Option<DspTargets>,
}

impl ParameterController {
    pub fn new(params: ParameterSet, mode: ControlMode) -> Self {
        Self {
            params: params.clamped(),
            position: SpatialPosition::default(),
            mode,
            synced: None,
        }
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn position(&self) -> SpatialPosition {
        self.position
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    /// Current effective targets
    pub fn targets(&self) -> DspTargets {
        DspTargets::compute(&self.params, self.position)
    }

    /// Mutate the parameter set and return commands for what moved
    pub fn update(&mut self, change: impl FnOnce(&mut ParameterSet)) -> Vec<GraphCommand> {
        change(&mut self.params);
        self.params = self.params.clamped();
        self.sync()
    }

    /// Apply a preset atomically
    ///
    /// Returns the commands and the impulse response the preset asks for.
    pub fn apply_preset(&mut self, preset: &Preset) -> (Vec<GraphCommand>, Option<ReverbSpec>) {
        debug!(preset = %preset.name, "Applying preset");
        let commands = self.update(|params| preset.apply_to(params));
        (commands, preset.reverb)
    }

    /// Move the source
    pub fn set_position(&mut self, position: SpatialPosition) -> Vec<GraphCommand> {
        self.position = position;
        let mut commands = vec![GraphCommand::SetPosition {
            position,
            automation: self.mode.automation(POSITION_TIME_CONSTANT),
        }];
        commands.extend(self.sync());
        commands
    }

    /// Commands that bring a freshly built graph to the full current state
    pub fn full_sync(&mut self) -> Vec<GraphCommand> {
        self.synced = None;
        let mut commands = vec![GraphCommand::SetPosition {
            position: self.position,
            automation: Automation::Fixed,
        }];
        commands.extend(self.sync_with(|_| Automation::Fixed));
        commands
    }

    /// Forget what the graph has seen; the next change resends everything
    pub fn invalidate(&mut self) {
        self.synced = None;
    }

    fn sync(&mut self) -> Vec<GraphCommand> {
        let mode = self.mode;
        self.sync_with(|target| mode.automation(target.time_constant()))
    }

    fn sync_with(&mut self, automation: impl Fn(ParamTarget) -> Automation) -> Vec<GraphCommand> {
        let targets = self.targets();
        let previous = self.synced;
        let commands: Vec<GraphCommand> = targets
            .iter()
            .filter(|&(target, value)| previous.map_or(true, |p| p.get(target) != value))
            .map(|(target, value)| GraphCommand::SetParam {
                target,
                value,
                automation: automation(target),
            })
            .collect();

        if !commands.is_empty() {
            debug!(changed = commands.len(), "Parameter targets updated");
        }
        self.synced = Some(targets);
        commands
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::presets::PresetLibrary;

    fn target_value(commands: &[GraphCommand], wanted: ParamTarget) -> Option<f32> {
        commands.iter().find_map(|c| match c {
            GraphCommand::SetParam { target, value, .. } if *target == wanted => Some(*value),
            _ => None,
        })
    }

    #[test]
    fn test_default_targets_are_flat() {
        let targets = DspTargets::compute(&ParameterSet::default(), SpatialPosition::default());
        for target in [
            ParamTarget::VocalGain,
            ParamTarget::BassGain,
            ParamTarget::TrebleGain,
            ParamTarget::CinemaGain,
            ParamTarget::HeightGain,
            ParamTarget::HdSubGain,
            ParamTarget::HdMidGain,
            ParamTarget::HdAirGain,
        ] {
            assert_eq!(targets.get(target), 0.0, "{:?} should be flat", target);
        }
        assert_eq!(targets.get(ParamTarget::MasterGain), 1.0);
        assert_eq!(targets.get(ParamTarget::LimiterThreshold), -0.5);
        assert_eq!(targets.get(ParamTarget::AirCutoff), 20000.0);
    }

    #[test]
    fn test_mappings() {
        let params = ParameterSet {
            vocal_clarity: 10.0,
            height_level: 0.5,
            drc: 1.0,
            speaker_delay_ms: 30.0,
            phase_alignment_ms: -10.0,
            reverb_level: 0.4,
            ..Default::default()
        };
        let targets = DspTargets::compute(&params, SpatialPosition::default());
        assert_eq!(targets.get(ParamTarget::VocalGain), 10.0);
        assert_eq!(targets.get(ParamTarget::HeightGain), 3.0);
        assert_eq!(targets.get(ParamTarget::LimiterThreshold), -12.5);
        assert!((targets.get(ParamTarget::DelayTime) - 0.02).abs() < 1e-6);
        assert_eq!(targets.get(ParamTarget::ReverbWet), 0.4);
    }

    #[test]
    fn test_negative_calibration_delay_clamps_to_zero() {
        let params = ParameterSet {
            phase_alignment_ms: -20.0,
            ..Default::default()
        };
        let targets = DspTargets::compute(&params, SpatialPosition::default());
        assert_eq!(targets.get(ParamTarget::DelayTime), 0.0);
    }

    #[test]
    fn test_theater_then_bass_is_baseline_not_lock() {
        let mut controller = ParameterController::new(ParameterSet::default(), ControlMode::Realtime);
        controller.update(|p| p.theater_mode = true);
        let commands = controller.update(|p| p.set_bass(2.0));

        assert_eq!(target_value(&commands, ParamTarget::BassGain), Some(6.0));
        assert_eq!(controller.targets().get(ParamTarget::BassGain), 6.0);
        assert_eq!(controller.targets().get(ParamTarget::CinemaGain), -1.5);
        assert_eq!(controller.targets().get(ParamTarget::VocalGain), 3.0);

        controller.update(|p| p.theater_mode = false);
        assert_eq!(controller.targets().get(ParamTarget::BassGain), 2.0);
        assert_eq!(controller.targets().get(ParamTarget::CinemaGain), 0.0);
    }

    #[test]
    fn test_hd_macro() {
        let mut controller = ParameterController::new(ParameterSet::default(), ControlMode::Realtime);
        controller.update(|p| p.hd_mode = true);
        let targets = controller.targets();
        assert_eq!(targets.get(ParamTarget::HdSubGain), 4.0);
        assert_eq!(targets.get(ParamTarget::HdMidGain), -3.0);
        assert_eq!(targets.get(ParamTarget::HdAirGain), 6.0);
        assert_eq!(targets.get(ParamTarget::CrossfeedGain), CROSSFEED_GAIN_HD);
    }

    #[test]
    fn test_only_changes_are_sent() {
        let mut controller = ParameterController::new(ParameterSet::default(), ControlMode::Realtime);
        let first = controller.full_sync();
        assert_eq!(first.len(), ParamTarget::ALL.len() + 1);

        let commands = controller.update(|p| p.set_volume(1.8));
        assert_eq!(commands.len(), 1);
        match &commands[0] {
            GraphCommand::SetParam {
                target,
                value,
                automation,
            } => {
                assert_eq!(*target, ParamTarget::MasterGain);
                assert_eq!(*value, 1.8);
                assert_eq!(*automation, Automation::ramp(0.05));
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert!(controller.update(|p| p.set_volume(1.8)).is_empty());
    }

    #[test]
    fn test_offline_mode_uses_fixed_values() {
        let mut controller = ParameterController::new(ParameterSet::default(), ControlMode::Offline);
        controller.full_sync();
        let commands = controller.update(|p| p.set_treble(4.0));
        assert!(commands.iter().all(|c| matches!(
            c,
            GraphCommand::SetParam {
                automation: Automation::Fixed,
                ..
            }
        )));
    }

    #[test]
    fn test_position_moves_air_cutoff() {
        let mut controller = ParameterController::new(ParameterSet::default(), ControlMode::Realtime);
        controller.full_sync();
        let commands = controller.set_position(SpatialPosition::new(2.0, 0.0, 0.0));

        assert!(matches!(commands[0], GraphCommand::SetPosition { .. }));
        let cutoff = target_value(&commands, ParamTarget::AirCutoff).unwrap();
        assert!((cutoff - 20000.0 * (-1.5_f32).exp()).abs() < 0.5);
    }

    #[test]
    fn test_preset_returns_reverb_spec() {
        let library = PresetLibrary::builtin();
        let mut controller = ParameterController::new(ParameterSet::default(), ControlMode::Realtime);
        let (_, reverb) = controller.apply_preset(library.get("IMAX Enhanced").unwrap());
        assert_eq!(reverb, Some(ReverbSpec::new(2.5, 2.5)));
        assert_eq!(controller.params().preset_name.as_deref(), Some("IMAX Enhanced"));
    }
}
