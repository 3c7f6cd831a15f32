//! Graph commands
//!
//! Everything the control side can change on a built graph. Realtime
//! sessions ship commands over a bounded channel drained at the start of each
//! render quantum; offline renders apply them directly before rendering.

use crate::dsp::param::Automation;
use crate::dsp::reverb::PreparedKernel;
use crate::dsp::spatializer::SpatialPosition;

/// An automated node parameter of the canonical graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamTarget {
    VocalGain,
    BassGain,
    TrebleGain,
    CinemaGain,
    HeightGain,
    LfeFrequency,
    HdSubGain,
    HdMidGain,
    HdAirGain,
    ReverbWet,
    DelayTime,
    AirCutoff,
    CrossfeedGain,
    MasterGain,
    LimiterThreshold,
}

impl ParamTarget {
    /// Every target, in chain order
    pub const ALL: [ParamTarget; 15] = [
        ParamTarget::VocalGain,
        ParamTarget::BassGain,
        ParamTarget::TrebleGain,
        ParamTarget::CinemaGain,
        ParamTarget::HeightGain,
        ParamTarget::LfeFrequency,
        ParamTarget::HdSubGain,
        ParamTarget::HdMidGain,
        ParamTarget::HdAirGain,
        ParamTarget::ReverbWet,
        ParamTarget::DelayTime,
        ParamTarget::AirCutoff,
        ParamTarget::CrossfeedGain,
        ParamTarget::MasterGain,
        ParamTarget::LimiterThreshold,
    ];

    /// Ramp time constant in seconds for realtime changes
    pub fn time_constant(self) -> f32 {
        match self {
            ParamTarget::MasterGain | ParamTarget::DelayTime => 0.05,
            ParamTarget::ReverbWet => 0.5,
            ParamTarget::AirCutoff => 0.2,
            ParamTarget::VocalGain
            | ParamTarget::BassGain
            | ParamTarget::TrebleGain
            | ParamTarget::CinemaGain
            | ParamTarget::HeightGain
            | ParamTarget::LfeFrequency
            | ParamTarget::HdSubGain
            | ParamTarget::HdMidGain
            | ParamTarget::HdAirGain
            | ParamTarget::CrossfeedGain
            | ParamTarget::LimiterThreshold => 0.1,
        }
    }
}

/// Ramp time constant for panner position moves
pub const POSITION_TIME_CONSTANT: f32 = 0.1;

/// A change to apply to a built graph
#[derive(Debug, Clone)]
pub enum GraphCommand {
    /// Move one automated parameter
    SetParam {
        target: ParamTarget,
        value: f32,
        automation: Automation,
    },
    /// Move the source in the spatializer
    SetPosition {
        position: SpatialPosition,
        automation: Automation,
    },
    /// Swap the reverb impulse response
    ///
    /// Arrives fully allocated; the graph hands the replaced one back.
    SetImpulseResponse(Box<PreparedKernel>),
}
