//! Offline rendering
//!
//! Renders a whole source through an isolated copy of the playback chain
//! and returns a WAV image. Each job decodes its own source, builds its own
//! graph and shares nothing with live sessions or other jobs.
//!
//! Steps: decode, size the context to `ceil(frames * target / source)`,
//! build the chain, apply the full parameter set as fixed values, render to
//! completion, encode.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::config::{validate_output, EngineConfig};
use crate::control::controller::{ControlMode, ParameterController};
use crate::control::params::ParameterSet;
use crate::control::presets::{PresetLibrary, ReverbSpec};
use crate::dsp::reverb::ConvolutionKernel;
use crate::dsp::spatializer::SpatialPosition;
use crate::engine::buffer::{AudioBuffer, ChannelLayout, RENDER_QUANTUM};
use crate::engine::io::{decode_wav_bytes, resampled_len};
use crate::engine::wav::{BitDepth, WavEncoder};
use crate::error::Result;
use crate::graph::builder::build_graph;
use crate::graph::context::{OfflineContext, ProcessingContext, SourceHandle};

/// One offline render request
#[derive(Debug, Clone)]
pub struct RenderJob {
    /// Source WAV image
    pub source: Vec<u8>,
    pub params: ParameterSet,
    pub position: SpatialPosition,
    /// Impulse response shape; resolved from the preset when unset
    pub reverb: Option<ReverbSpec>,
    pub sample_rate: u32,
    pub bit_depth: BitDepth,
}

impl RenderJob {
    pub fn new(source: Vec<u8>, params: ParameterSet, sample_rate: u32, bit_depth: BitDepth) -> Self {
        Self {
            source,
            params,
            position: SpatialPosition::default(),
            reverb: None,
            sample_rate,
            bit_depth,
        }
    }

    /// Place the source in the spatializer for this render
    pub fn with_position(mut self, position: SpatialPosition) -> Self {
        self.position = position;
        self
    }

    /// Use this impulse response shape instead of the preset's
    pub fn with_reverb(mut self, reverb: ReverbSpec) -> Self {
        self.reverb = Some(reverb);
        self
    }

    /// Impulse response shape this job renders with
    ///
    /// An explicit shape wins, then the named preset's, then the configured
    /// default.
    pub fn reverb_spec(&self, config: &EngineConfig, library: &PresetLibrary) -> ReverbSpec {
        self.reverb
            .or_else(|| library.reverb_for(&self.params))
            .unwrap_or(config.default_reverb)
    }

    /// Render to a WAV image
    ///
    /// `on_progress` receives non-decreasing values in `[0, 1]`, ending with 1.
    ///
    /// # Errors
    /// * `DecodeFailure` - the source is not decodable; nothing is rendered
    /// * `UnsupportedConfiguration` - rate or depth out of range
    pub fn run(
        &self,
        config: &EngineConfig,
        library: &PresetLibrary,
        mut on_progress: impl FnMut(f32),
    ) -> Result<Vec<u8>> {
        validate_output(self.sample_rate, self.bit_depth.bits())?;
        let started = Instant::now();

        let decoded = decode_wav_bytes(&self.source)?;
        let source_rate = decoded.sample_rate;
        let frames = resampled_len(decoded.len(), source_rate, self.sample_rate);
        let source = SourceHandle::new(decoded)?;
        let out_layout = ChannelLayout::from_count(source.num_channels()).unwrap_or_default();

        info!(
            source_rate,
            target_rate = self.sample_rate,
            bit_depth = self.bit_depth.bits(),
            frames,
            "Starting offline render"
        );

        let ctx = OfflineContext::new(self.sample_rate, frames);
        let reverb = self.reverb_spec(config, library);
        let kernel = Arc::new(ConvolutionKernel::synthesize(
            reverb.duration_secs,
            reverb.decay,
            self.sample_rate,
            config.reverb_seed,
        ));
        let mut graph = build_graph(&ctx, &source, kernel)?;

        let mut controller = ParameterController::new(self.params.clone(), ControlMode::Offline);
        controller.set_position(self.position);
        for command in controller.full_sync() {
            graph.apply(command);
        }

        let mut rendered = AudioBuffer::with_sample_rate(ctx.length(), ChannelLayout::Stereo, self.sample_rate);
        let mut block = AudioBuffer::with_sample_rate(RENDER_QUANTUM, ChannelLayout::Stereo, self.sample_rate);
        let total_blocks = ctx.length().div_ceil(RENDER_QUANTUM).max(1);
        let interval = config.progress_interval_blocks.max(1);

        on_progress(0.0);
        for (index, start) in (0..ctx.length()).step_by(RENDER_QUANTUM).enumerate() {
            graph.render_quantum(&mut block);
            let count = RENDER_QUANTUM.min(ctx.length() - start);
            for (dst, src) in rendered.samples.iter_mut().zip(&block.samples) {
                dst[start..start + count].copy_from_slice(&src[..count]);
            }
            if (index + 1) % interval == 0 {
                on_progress((index + 1) as f32 / total_blocks as f32);
            }
        }
        on_progress(1.0);

        let output = match out_layout {
            ChannelLayout::Mono => downmix(&rendered),
            ChannelLayout::Stereo => rendered,
        };
        let bytes = WavEncoder::new(self.bit_depth).encode(&output)?;

        drop(graph);
        debug!(session = %ctx.session_id(), "Offline graph disposed");
        info!(
            bytes = bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Offline render complete"
        );
        Ok(bytes)
    }
}

/// Average the channels of a stereo render
fn downmix(stereo: &AudioBuffer) -> AudioBuffer {
    let mut mono = AudioBuffer::with_sample_rate(stereo.len(), ChannelLayout::Mono, stereo.sample_rate);
    let (left, right) = (stereo.channel(0), stereo.channel(1));
    for ((m, l), r) in mono.channel_mut(0).iter_mut().zip(left).zip(right) {
        *m = 0.5 * (l + r);
    }
    mono
}

/// Render `source` with `params` and return a WAV image
///
/// Convenience wrapper around [`RenderJob`].
pub fn render_offline(
    source: &[u8],
    params: &ParameterSet,
    sample_rate: u32,
    bit_depth: u16,
    config: &EngineConfig,
    library: &PresetLibrary,
    on_progress: impl FnMut(f32),
) -> Result<Vec<u8>> {
    let bit_depth = validate_output(sample_rate, bit_depth)?;
    RenderJob::new(source.to_vec(), params.clone(), sample_rate, bit_depth).run(config, library, on_progress)
}

// ============================================================================
// Tests
// ============================================================================
