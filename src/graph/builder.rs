//! Graph builder
//!
//! One function builds the playback chain on any [`ProcessingContext`]:
//!
//! ```text
//! source → vocal presence → bass → treble → cinema roll-off → height presence
//!        → LFE shelf → HD sub → HD mid → HD air
//!        → reverb (dry ‖ convolver → wet) → calibration delay → spatializer
//!        → crossfeed → master gain → compressor → limiter → tap
//! ```
//!
//! Every filter starts flat. The HD filters are always built and stay flat
//! while the HD macro is off.

use std::sync::Arc;

use tracing::debug;

use super::command::{GraphCommand, ParamTarget};
use super::context::{ContextKind, ProcessingContext, SourceHandle, SourceNode};
use crate::control::params::{LFE_CROSSOVER_HZ, VOLUME};
use crate::dsp::biquad::BiquadFilter;
use crate::dsp::crossfeed::CrossfeedStage;
use crate::dsp::delay::DelayNode;
use crate::dsp::dynamics::DynamicsStage;
use crate::dsp::gain::GainNode;
use crate::dsp::param::AudioParam;
use crate::dsp::reverb::{ConvolutionKernel, PreparedKernel, ReverbStage};
use crate::dsp::spatializer::SpatializerStage;
use crate::dsp::AudioNode;
use crate::engine::buffer::{AudioBuffer, ChannelLayout, RENDER_QUANTUM};
use crate::error::Result;

// ============================================================================
// Filter Corners
// ============================================================================

pub const VOCAL_PRESENCE_HZ: f32 = 2500.0;
pub const BASS_SHELF_HZ: f32 = 120.0;
pub const TREBLE_SHELF_HZ: f32 = 8000.0;
pub const CINEMA_ROLLOFF_HZ: f32 = 10000.0;
pub const HEIGHT_PRESENCE_HZ: f32 = 7000.0;
pub const HD_SUB_HZ: f32 = 60.0;
pub const HD_MID_HZ: f32 = 500.0;
pub const HD_AIR_HZ: f32 = 12000.0;

/// Number of processing nodes between source and tap
pub const CHAIN_LEN: usize = 15;

// ============================================================================
// Graph Nodes
// ============================================================================

/// Every processing node of the chain, in signal order
pub struct GraphNodes {
    pub vocal: BiquadFilter,
    pub bass: BiquadFilter,
    pub treble: BiquadFilter,
    pub cinema: BiquadFilter,
    pub height: BiquadFilter,
    pub lfe: BiquadFilter,
    pub hd_sub: BiquadFilter,
    pub hd_mid: BiquadFilter,
    pub hd_air: BiquadFilter,
    pub reverb: ReverbStage,
    pub delay: DelayNode,
    pub spatializer: SpatializerStage,
    pub crossfeed: CrossfeedStage,
    pub master: GainNode,
    pub dynamics: DynamicsStage,
}

impl GraphNodes {
    fn create<C: ProcessingContext + ?Sized>(ctx: &C, kernel: Arc<ConvolutionKernel>) -> Self {
        Self {
            vocal: ctx.create_peaking("Vocal Presence", VOCAL_PRESENCE_HZ),
            bass: ctx.create_low_shelf("Bass", BASS_SHELF_HZ),
            treble: ctx.create_high_shelf("Treble", TREBLE_SHELF_HZ),
            cinema: ctx.create_high_shelf("Cinema Roll-off", CINEMA_ROLLOFF_HZ),
            height: ctx.create_peaking("Height Presence", HEIGHT_PRESENCE_HZ),
            lfe: ctx.create_low_shelf("LFE", LFE_CROSSOVER_HZ.default),
            hd_sub: ctx.create_low_shelf("HD Sub", HD_SUB_HZ),
            hd_mid: ctx.create_peaking("HD Mid", HD_MID_HZ),
            hd_air: ctx.create_high_shelf("HD Air", HD_AIR_HZ),
            reverb: ctx.create_reverb(kernel),
            delay: ctx.create_delay(),
            spatializer: ctx.create_spatializer(),
            crossfeed: ctx.create_crossfeed(),
            master: ctx.create_gain(VOLUME.default),
            dynamics: ctx.create_dynamics(),
        }
    }

    /// Nodes in processing order
    pub fn chain(&self) -> [&dyn AudioNode; CHAIN_LEN] {
        [
            &self.vocal,
            &self.bass,
            &self.treble,
            &self.cinema,
            &self.height,
            &self.lfe,
            &self.hd_sub,
            &self.hd_mid,
            &self.hd_air,
            &self.reverb,
            &self.delay,
            &self.spatializer,
            &self.crossfeed,
            &self.master,
            &self.dynamics,
        ]
    }

    pub fn chain_mut(&mut self) -> [&mut dyn AudioNode; CHAIN_LEN] {
        [
            &mut self.vocal,
            &mut self.bass,
            &mut self.treble,
            &mut self.cinema,
            &mut self.height,
            &mut self.lfe,
            &mut self.hd_sub,
            &mut self.hd_mid,
            &mut self.hd_air,
            &mut self.reverb,
            &mut self.delay,
            &mut self.spatializer,
            &mut self.crossfeed,
            &mut self.master,
            &mut self.dynamics,
        ]
    }

    /// The automated parameter behind a target
    pub fn param(&self, target: ParamTarget) -> &AudioParam {
        match target {
            ParamTarget::VocalGain => self.vocal.gain(),
            ParamTarget::BassGain => self.bass.gain(),
            ParamTarget::TrebleGain => self.treble.gain(),
            ParamTarget::CinemaGain => self.cinema.gain(),
            ParamTarget::HeightGain => self.height.gain(),
            ParamTarget::LfeFrequency => self.lfe.frequency(),
            ParamTarget::HdSubGain => self.hd_sub.gain(),
            ParamTarget::HdMidGain => self.hd_mid.gain(),
            ParamTarget::HdAirGain => self.hd_air.gain(),
            ParamTarget::ReverbWet => self.reverb.wet().gain(),
            ParamTarget::DelayTime => self.delay.delay_time(),
            ParamTarget::AirCutoff => self.spatializer.air().frequency(),
            ParamTarget::CrossfeedGain => self.crossfeed.gain(),
            ParamTarget::MasterGain => self.master.gain(),
            ParamTarget::LimiterThreshold => self.dynamics.limiter().threshold(),
        }
    }

    pub fn param_mut(&mut self, target: ParamTarget) -> &mut AudioParam {
        match target {
            ParamTarget::VocalGain => self.vocal.gain_mut(),
            ParamTarget::BassGain => self.bass.gain_mut(),
            ParamTarget::TrebleGain => self.treble.gain_mut(),
            ParamTarget::CinemaGain => self.cinema.gain_mut(),
            ParamTarget::HeightGain => self.height.gain_mut(),
            ParamTarget::LfeFrequency => self.lfe.frequency_mut(),
            ParamTarget::HdSubGain => self.hd_sub.gain_mut(),
            ParamTarget::HdMidGain => self.hd_mid.gain_mut(),
            ParamTarget::HdAirGain => self.hd_air.gain_mut(),
            ParamTarget::ReverbWet => self.reverb.wet_mut().gain_mut(),
            ParamTarget::DelayTime => self.delay.delay_time_mut(),
            ParamTarget::AirCutoff => self.spatializer.air_mut().frequency_mut(),
            ParamTarget::CrossfeedGain => self.crossfeed.gain_mut(),
            ParamTarget::MasterGain => self.master.gain_mut(),
            ParamTarget::LimiterThreshold => self.dynamics.limiter_mut().threshold_mut(),
        }
    }
}

// ============================================================================
// Signal Graph
// ============================================================================

/// A built chain: bound source, processing nodes and an output tap
pub struct SignalGraph<T: AudioNode> {
    kind: ContextKind,
    sample_rate: u32,
    source: SourceNode,
    nodes: GraphNodes,
    tap: T,
}

impl<T: AudioNode> SignalGraph<T> {
    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn source(&self) -> &SourceNode {
        &self.source
    }

    pub fn nodes(&self) -> &GraphNodes {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut GraphNodes {
        &mut self.nodes
    }

    pub fn tap(&self) -> &T {
        &self.tap
    }

    /// Node types from source to the last processing node
    ///
    /// The tap is excluded; it is the only node that differs by backend.
    pub fn topology(&self) -> Vec<&'static str> {
        std::iter::once(self.source.node_type())
            .chain(self.nodes.chain().iter().map(|node| node.node_type()))
            .collect()
    }

    /// Display names in the same order as [`topology`](Self::topology)
    pub fn node_names(&self) -> Vec<&str> {
        std::iter::once(self.source.display_name())
            .chain(self.nodes.chain().into_iter().map(|node| node.display_name()))
            .collect()
    }

    /// Apply one command
    ///
    /// Returns the impulse response a `SetImpulseResponse` replaced, so the
    /// caller decides where it is freed.
    pub fn apply(&mut self, command: GraphCommand) -> Option<Box<PreparedKernel>> {
        match command {
            GraphCommand::SetParam {
                target,
                value,
                automation,
            } => {
                self.nodes.param_mut(target).apply(value, automation);
                None
            }
            GraphCommand::SetPosition {
                position,
                automation,
            } => {
                self.nodes.spatializer.set_position(position, automation);
                None
            }
            GraphCommand::SetImpulseResponse(prepared) => {
                Some(self.nodes.reverb.convolver_mut().swap_kernel(prepared))
            }
        }
    }

    /// Render one quantum into `block`
    ///
    /// `block` is resized to a stereo quantum at the graph rate.
    pub fn render_quantum(&mut self, block: &mut AudioBuffer) {
        if block.num_channels() != 2 || block.len() != RENDER_QUANTUM {
            *block = AudioBuffer::with_sample_rate(RENDER_QUANTUM, ChannelLayout::Stereo, self.sample_rate);
        }
        block.sample_rate = self.sample_rate;

        self.source.process(block);
        for node in self.nodes.chain_mut() {
            node.process(block);
        }
        self.tap.process(block);
    }

    /// True once the source is exhausted
    pub fn is_finished(&self) -> bool {
        self.source.is_finished()
    }

    /// Clear filter and delay state of every node
    pub fn reset(&mut self) {
        for node in self.nodes.chain_mut() {
            node.reset();
        }
        self.tap.reset();
    }
}

/// Build the playback chain for `source` on `ctx`
///
/// # Errors
/// * `BindingConflict` - the source is owned by another session
/// * `UnsupportedConfiguration` - the context's tap could not be created
pub fn build_graph<C: ProcessingContext>(
    ctx: &C,
    source: &SourceHandle,
    kernel: Arc<ConvolutionKernel>,
) -> Result<SignalGraph<C::Tap>> {
    let tap = ctx.create_tap()?;
    let source_node = ctx.bind_source(source)?;
    let nodes = GraphNodes::create(ctx, kernel);

    debug!(
        kind = ?ctx.kind(),
        sample_rate = ctx.sample_rate(),
        session = %ctx.session_id(),
        source = %source.id(),
        "Built signal graph"
    );

    Ok(SignalGraph {
        kind: ctx.kind(),
        sample_rate: ctx.sample_rate(),
        source: source_node,
        nodes,
        tap,
    })
}

// ============================================================================
// Tests
// ============================================================================
