//! Audio Engine Module
//!
//! Core engine surface including:
//! - Audio buffer management
//! - Source decoding and resampling
//! - WAV container encoding
//! - Session lifecycle and the realtime renderer

pub mod buffer;
pub mod io;
pub mod session;
pub mod wav;

pub use buffer::{AudioBuffer, ChannelLayout, DEFAULT_SAMPLE_RATE, RENDER_QUANTUM};
pub use io::{decode_wav_bytes, generate_stereo_test_tone, generate_test_tone, resample};
pub use session::{Engine, ParamUpdate, RealtimeRenderer, SessionInfo, SessionState};
pub use wav::{BitDepth, WavEncoder};
