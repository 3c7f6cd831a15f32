//! DSP node library
//!
//! Every processing stage of the signal graph. All nodes implement the
//! `AudioNode` trait and own their automated parameters.

pub mod analyser;
pub mod biquad;
pub mod crossfeed;
pub mod delay;
pub mod dynamics;
pub mod gain;
mod node;
pub mod param;
pub mod reverb;
pub mod spatializer;

pub use analyser::{AnalyserNode, AnalyserReader, AnalyserSettings};
pub use biquad::{BiquadFilter, FilterType};
pub use crossfeed::CrossfeedStage;
pub use delay::{DelayLine, DelayNode};
pub use dynamics::{Compressor, DynamicsStage};
pub use gain::GainNode;
pub use node::AudioNode;
pub use param::{AudioParam, Automation};
pub use reverb::{ConvolutionKernel, ImpulseResponse, PreparedKernel, ReverbStage};
pub use spatializer::{SpatialPosition, SpatializerStage};
