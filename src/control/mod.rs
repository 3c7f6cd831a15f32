//! Control Module
//!
//! User-facing control state and its mapping onto the signal graph:
//! - Parameter set with range clamping
//! - Preset library
//! - Parameter controller (UI values to DSP targets)

pub mod controller;
pub mod params;
pub mod presets;

pub use controller::{ControlMode, DspTargets, ParameterController};
pub use params::{ParamRange, ParameterSet};
pub use presets::{Preset, PresetLibrary, ReverbSpec};
