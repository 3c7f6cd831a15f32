//! Processing contexts and playback sources
//!
//! A [`ProcessingContext`] is the node creation capability the graph builder
//! is generic over. The realtime backend ends its chain in an analyser; the
//! offline backend ends in a null tap. Everything else is created the same
//! way on both, which is what keeps their topologies identical.
//!
//! A [`SourceHandle`] is decoded playback audio plus a binding slot. At most
//! one session may own a source at a time; the binding is released when the
//! graph holding the bound [`SourceNode`] is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dsp::analyser::{AnalyserNode, AnalyserSettings};
use crate::dsp::biquad::BiquadFilter;
use crate::dsp::crossfeed::CrossfeedStage;
use crate::dsp::delay::DelayNode;
use crate::dsp::dynamics::DynamicsStage;
use crate::dsp::gain::GainNode;
use crate::dsp::reverb::{ConvolutionKernel, ReverbStage};
use crate::dsp::spatializer::SpatializerStage;
use crate::dsp::AudioNode;
use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::engine::io::{decode_wav_bytes, resample};
use crate::error::{Result, SonicError};
use crate::impl_node_common;

// ============================================================================
// Source Handle
// ============================================================================

type BindingSlot = Arc<Mutex<Option<Uuid>>>;

/// Decoded playback source
///
/// Clones share the same audio, binding and playback position.
#[derive(Debug, Clone)]
pub struct SourceHandle {
    id: Uuid,
    audio: Arc<AudioBuffer>,
    binding: BindingSlot,
    /// Playback position in seconds, stored as `f64` bits
    position: Arc<AtomicU64>,
}

impl SourceHandle {
    /// Wrap decoded audio
    ///
    /// # Errors
    /// * `InvalidAudio` - the buffer has no frames or a zero sample rate
    /// * `UnsupportedConfiguration` - more than two channels
    pub fn new(audio: AudioBuffer) -> Result<Self> {
        if ChannelLayout::from_count(audio.num_channels()).is_none() {
            return Err(SonicError::unsupported(format!(
                "{}-channel source (only mono/stereo supported)",
                audio.num_channels()
            )));
        }
        if audio.is_empty() || audio.sample_rate == 0 {
            return Err(SonicError::InvalidAudio {
                reason: "source has no frames".to_string(),
            });
        }

        Ok(Self {
            id: Uuid::new_v4(),
            audio: Arc::new(audio),
            binding: Arc::new(Mutex::new(None)),
            position: Arc::new(AtomicU64::new(0.0_f64.to_bits())),
        })
    }

    /// Decode an in-memory WAV image
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self> {
        Self::new(decode_wav_bytes(bytes)?)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Decoded audio at the file's own rate
    pub fn audio(&self) -> &AudioBuffer {
        &self.audio
    }

    pub fn num_channels(&self) -> usize {
        self.audio.num_channels()
    }

    pub fn duration_secs(&self) -> f64 {
        self.audio.duration_secs()
    }

    /// Session currently owning this source
    pub fn bound_to(&self) -> Option<Uuid> {
        *self.binding.lock()
    }

    /// Playback position in seconds
    pub fn position_secs(&self) -> f64 {
        f64::from_bits(self.position.load(Ordering::Relaxed))
    }

    /// Move the playback position; takes effect on the next bind
    pub fn seek(&self, secs: f64) {
        let secs = secs.clamp(0.0, self.duration_secs());
        self.position.store(secs.to_bits(), Ordering::Relaxed);
    }

    /// Release the binding if `session` holds it
    pub fn release(&self, session: Uuid) {
        let mut slot = self.binding.lock();
        if *slot == Some(session) {
            *slot = None;
            debug!(source = %self.id, session = %session, "Source released");
        }
    }

    /// Bind to `session` and create a source node running at `sample_rate`
    ///
    /// Rebinding to the session that already owns the source is allowed.
    ///
    /// # Errors
    /// * `BindingConflict` - another session owns the source
    pub fn bind(&self, session: Uuid, sample_rate: u32) -> Result<SourceNode> {
        {
            let mut slot = self.binding.lock();
            match *slot {
                Some(owner) if owner != session => {
                    warn!(source = %self.id, owner = %owner, "Source already bound");
                    return Err(SonicError::BindingConflict {
                        source_id: self.id.to_string(),
                        bound_to: owner.to_string(),
                    });
                }
                _ => *slot = Some(session),
            }
        }

        let audio = if self.audio.sample_rate == sample_rate {
            Arc::clone(&self.audio)
        } else {
            Arc::new(resample(&self.audio, sample_rate))
        };
        let cursor = (self.position_secs() * sample_rate as f64).round() as usize;

        Ok(SourceNode {
            audio,
            cursor: cursor.min(self.audio_len_at(sample_rate)),
            sample_rate,
            session,
            binding: Arc::clone(&self.binding),
            position: Arc::clone(&self.position),
        })
    }

    fn audio_len_at(&self, sample_rate: u32) -> usize {
        crate::engine::io::resampled_len(self.audio.len(), self.audio.sample_rate, sample_rate)
    }
}

// ============================================================================
// Source Node
// ============================================================================

/// Graph head reading a bound source
///
/// Mono sources are duplicated onto both channels; past the end the node
/// produces silence. Dropping the node releases the source binding.
#[derive(Debug)]
pub struct SourceNode {
    audio: Arc<AudioBuffer>,
    cursor: usize,
    sample_rate: u32,
    session: Uuid,
    binding: BindingSlot,
    position: Arc<AtomicU64>,
}

impl SourceNode {
    /// True once every source frame has been read
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.audio.len()
    }

    /// Frames at the processing rate
    pub fn len(&self) -> usize {
        self.audio.len()
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_empty()
    }

    /// Session this node is bound for
    pub fn session(&self) -> Uuid {
        self.session
    }
}

impl AudioNode for SourceNode {
    fn process(&mut self, block: &mut AudioBuffer) {
        let start = self.cursor.min(self.audio.len());
        let available = (self.audio.len() - start).min(block.len());
        let source_channels = self.audio.num_channels();

        for (ch, out) in block.samples.iter_mut().enumerate() {
            // Mono feeds every output channel
            let src = &self.audio.samples[ch.min(source_channels - 1)];
            out[..available].copy_from_slice(&src[start..start + available]);
            out[available..].fill(0.0);
        }

        self.cursor = start + available;
        let secs = self.cursor as f64 / self.sample_rate as f64;
        self.position.store(secs.to_bits(), Ordering::Relaxed);
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }

    impl_node_common!("source", "Playback Source");
}

impl Drop for SourceNode {
    fn drop(&mut self) {
        let mut slot = self.binding.lock();
        if *slot == Some(self.session) {
            *slot = None;
        }
    }
}

// ============================================================================
// Null Tap
// ============================================================================

/// Pass-through end of chain for contexts without analysis
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTap;

impl AudioNode for NullTap {
    fn process(&mut self, _block: &mut AudioBuffer) {}

    fn reset(&mut self) {}

    impl_node_common!("destination", "Destination");
}

// ============================================================================
// Processing Context
// ============================================================================

/// Which backend a context renders on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Realtime,
    Offline,
}

/// Node creation capability shared by the realtime and offline backends
pub trait ProcessingContext {
    /// Last node of the chain
    type Tap: AudioNode;

    fn sample_rate(&self) -> u32;

    fn kind(&self) -> ContextKind;

    /// Id sources are bound under
    fn session_id(&self) -> Uuid;

    fn create_tap(&self) -> Result<Self::Tap>;

    fn bind_source(&self, source: &SourceHandle) -> Result<SourceNode> {
        source.bind(self.session_id(), self.sample_rate())
    }

    fn create_peaking(&self, label: &'static str, frequency: f32) -> BiquadFilter {
        BiquadFilter::peaking(label, frequency, self.sample_rate())
    }

    fn create_low_shelf(&self, label: &'static str, frequency: f32) -> BiquadFilter {
        BiquadFilter::low_shelf(label, frequency, self.sample_rate())
    }

    fn create_high_shelf(&self, label: &'static str, frequency: f32) -> BiquadFilter {
        BiquadFilter::high_shelf(label, frequency, self.sample_rate())
    }

    fn create_reverb(&self, kernel: Arc<ConvolutionKernel>) -> ReverbStage {
        ReverbStage::new(kernel, self.sample_rate())
    }

    fn create_delay(&self) -> DelayNode {
        DelayNode::new(self.sample_rate())
    }

    fn create_spatializer(&self) -> SpatializerStage {
        SpatializerStage::new(self.sample_rate())
    }

    fn create_crossfeed(&self) -> CrossfeedStage {
        CrossfeedStage::new(self.sample_rate())
    }

    fn create_gain(&self, gain: f32) -> GainNode {
        GainNode::new(gain, self.sample_rate())
    }

    fn create_dynamics(&self) -> DynamicsStage {
        DynamicsStage::new(self.sample_rate())
    }
}

/// Context of a live playback session
#[derive(Debug, Clone)]
pub struct RealtimeContext {
    session_id: Uuid,
    sample_rate: u32,
    analyser: AnalyserSettings,
}

impl RealtimeContext {
    pub fn new(sample_rate: u32, analyser: AnalyserSettings) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            sample_rate,
            analyser,
        }
    }
}

impl ProcessingContext for RealtimeContext {
    type Tap = AnalyserNode;

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn kind(&self) -> ContextKind {
        ContextKind::Realtime
    }

    fn session_id(&self) -> Uuid {
        self.session_id
    }

    fn create_tap(&self) -> Result<AnalyserNode> {
        AnalyserNode::new(self.analyser)
    }
}

/// Context of one offline render, sized to its output length
#[derive(Debug, Clone)]
pub struct OfflineContext {
    session_id: Uuid,
    sample_rate: u32,
    length: usize,
}

impl OfflineContext {
    pub fn new(sample_rate: u32, length: usize) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            sample_rate,
            length,
        }
    }

    /// Frames this context renders
    pub fn length(&self) -> usize {
        self.length
    }
}

impl ProcessingContext for OfflineContext {
    type Tap = NullTap;

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn kind(&self) -> ContextKind {
        ContextKind::Offline
    }

    fn session_id(&self) -> Uuid {
        self.session_id
    }

    fn create_tap(&self) -> Result<NullTap> {
        Ok(NullTap)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::generate_test_tone;
    use crate::engine::RENDER_QUANTUM;

    #[test]
    fn test_source_rejects_empty_audio() {
        let empty = AudioBuffer::with_sample_rate(0, ChannelLayout::Stereo, 48000);
        assert!(matches!(
            SourceHandle::new(empty),
            Err(SonicError::InvalidAudio { .. })
        ));
    }

    #[test]
    fn test_binding_conflict_between_sessions() {
        let source = SourceHandle::new(generate_test_tone(440.0, 0.1, 48000)).unwrap();
        let first = RealtimeContext::new(48000, AnalyserSettings::default());
        let second = RealtimeContext::new(48000, AnalyserSettings::default());

        let node = first.bind_source(&source).unwrap();
        let err = second.bind_source(&source).unwrap_err();
        assert_eq!(err.error_code(), "BINDING_CONFLICT");
        assert!(err.is_recoverable());

        drop(node);
        assert_eq!(source.bound_to(), None);
        assert!(second.bind_source(&source).is_ok());
    }

    #[test]
    fn test_release_only_by_owner() {
        let source = SourceHandle::new(generate_test_tone(440.0, 0.1, 48000)).unwrap();
        let ctx = OfflineContext::new(48000, 4800);
        let _node = ctx.bind_source(&source).unwrap();

        source.release(Uuid::new_v4());
        assert_eq!(source.bound_to(), Some(ctx.session_id()));
        source.release(ctx.session_id());
        assert_eq!(source.bound_to(), None);
    }

    #[test]
    fn test_mono_source_is_upmixed() {
        let source = SourceHandle::new(generate_test_tone(440.0, 0.1, 48000)).unwrap();
        let ctx = OfflineContext::new(48000, 4800);
        let mut node = ctx.bind_source(&source).unwrap();

        let mut block = AudioBuffer::new(RENDER_QUANTUM, ChannelLayout::Stereo);
        node.process(&mut block);
        assert_eq!(block.channel(0), block.channel(1));
        assert_eq!(block.channel(0), &source.audio().channel(0)[..RENDER_QUANTUM]);
    }

    #[test]
    fn test_source_pads_with_silence_and_tracks_position() {
        let mut audio = AudioBuffer::with_sample_rate(200, ChannelLayout::Stereo, 48000);
        audio.channel_mut(0).fill(0.5);
        audio.channel_mut(1).fill(-0.5);
        let source = SourceHandle::new(audio).unwrap();
        let ctx = OfflineContext::new(48000, 200);
        let mut node = ctx.bind_source(&source).unwrap();

        let mut block = AudioBuffer::new(RENDER_QUANTUM, ChannelLayout::Stereo);
        node.process(&mut block);
        assert!(!node.is_finished());
        node.process(&mut block);
        assert!(node.is_finished());
        assert_eq!(block.channel(0)[71], 0.5);
        assert_eq!(block.channel(1)[71], -0.5);
        assert!(block.channel(0)[72..].iter().all(|&s| s == 0.0));
        assert!((source.position_secs() - 200.0 / 48000.0).abs() < 1e-9);
    }

    #[test]
    fn test_bind_resamples_to_context_rate() {
        let source = SourceHandle::new(generate_test_tone(440.0, 0.5, 44100)).unwrap();
        let ctx = OfflineContext::new(48000, 24000);
        let node = ctx.bind_source(&source).unwrap();
        assert_eq!(node.len(), 24000);
    }

    #[test]
    fn test_bind_resumes_from_position() {
        let source = SourceHandle::new(generate_test_tone(440.0, 1.0, 48000)).unwrap();
        source.seek(0.5);
        let ctx = OfflineContext::new(48000, 48000);
        let mut node = ctx.bind_source(&source).unwrap();

        let mut block = AudioBuffer::new(RENDER_QUANTUM, ChannelLayout::Stereo);
        node.process(&mut block);
        assert_eq!(block.channel(0)[0], source.audio().channel(0)[24000]);
    }
}
