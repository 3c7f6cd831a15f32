//! SonicStage - Spatial Playback DSP Engine
//!
//! SonicStage builds a configurable signal graph for media playback and an
//! equivalent offline path that renders the processed mix to a WAV image.
//!
//! # Architecture
//!
//! - `control`: user parameters, presets and their mapping to DSP targets
//! - `graph`: one chain topology built on a realtime or an offline context
//! - `dsp`: the processing nodes (filters, convolution reverb, spatializer,
//!   crossfeed, dynamics, analyser)
//! - `engine`: session lifecycle, realtime pull renderer, WAV I/O
//! - `render`: isolated offline renders
//!
//! # Example
//! ```
//! use sonicstage::{Engine, ParameterSet};
//! use sonicstage::engine::{generate_stereo_test_tone, BitDepth, WavEncoder};
//!
//! let tone = generate_stereo_test_tone(440.0, 660.0, 0.1, 48000);
//! let blob = WavEncoder::new(BitDepth::Sixteen).encode(&tone).unwrap();
//!
//! let engine = Engine::default();
//! let wav = engine
//!     .render_offline(&blob, &ParameterSet::default(), 48000, 16, |_| {})
//!     .unwrap();
//! assert_eq!(&wav[0..4], b"RIFF");
//! ```

pub mod config;
pub mod control;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod graph;
pub mod render;

pub use config::EngineConfig;
pub use control::{ParameterSet, PresetLibrary};
pub use engine::{Engine, ParamUpdate, RealtimeRenderer, SessionInfo};
pub use error::{Result, SonicError};
pub use graph::SourceHandle;
pub use render::RenderJob;
