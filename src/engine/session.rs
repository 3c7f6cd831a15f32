//! Engine session lifecycle
//!
//! [`Engine`] owns at most one live playback session. A session is a bound
//! source, a realtime signal graph and the command channel feeding it. The
//! graph itself lives behind a slot shared with [`RealtimeRenderer`], which
//! the host's audio callback drives.
//!
//! Lifecycle:
//! - `Idle`: no session; setters are no-ops reporting `NotInitialized`
//! - `Active`: setters turn into graph commands, applied at the next quantum
//! - `Rebuilding`: the old graph is gone and the new one not yet built;
//!   setters update the parameter set and are applied in full once the new
//!   graph comes up
//!
//! A rebuild always tears the previous session down completely (graph
//! disposed, source binding released) before the next one is built.
//!
//! The render side never allocates or frees for a command: commands travel
//! over a bounded channel, impulse responses arrive fully prepared and the
//! replaced ones travel back to the control side to be dropped there.

use std::fmt;
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{validate_output, EngineConfig};
use crate::control::controller::{ControlMode, ParameterController};
use crate::control::params::ParameterSet;
use crate::control::presets::{PresetLibrary, ReverbSpec};
use crate::dsp::analyser::{AnalyserNode, AnalyserReader};
use crate::dsp::reverb::{ConvolutionKernel, PreparedKernel};
use crate::dsp::spatializer::SpatialPosition;
use crate::engine::buffer::{AudioBuffer, ChannelLayout, RENDER_QUANTUM};
use crate::engine::wav::BitDepth;
use crate::error::{Result, SonicError};
use crate::graph::builder::{build_graph, SignalGraph};
use crate::graph::command::GraphCommand;
use crate::graph::context::{ProcessingContext, RealtimeContext, SourceHandle};
use crate::render::RenderJob;

// ============================================================================
// Public Types
// ============================================================================

/// Outcome of a setter call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamUpdate {
    /// Sent to the live graph
    Applied,
    /// Stored; applied when the rebuild in progress completes
    Queued,
    /// No session; nothing changed
    NotInitialized,
}

/// Description of the live session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub source_id: Uuid,
    pub sample_rate: u32,
    pub bit_depth: BitDepth,
    /// Channels of the source (the graph itself is always stereo)
    pub source_channels: usize,
    pub duration_secs: f64,
}

/// Coarse lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Active,
    Rebuilding,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Active => write!(f, "Active"),
            SessionState::Rebuilding => write!(f, "Rebuilding"),
        }
    }
}

// ============================================================================
// Internal State
// ============================================================================

/// Commands buffered between two render quanta
const COMMAND_CAPACITY: usize = 256;

/// Replaced impulse responses awaiting release on the control side
const RETIRED_CAPACITY: usize = 8;

/// Graph plus the render-side ends of its channels
struct LiveGraph {
    graph: SignalGraph<AnalyserNode>,
    commands: Receiver<GraphCommand>,
    retired: Sender<Box<PreparedKernel>>,
}

impl LiveGraph {
    /// Apply every queued command, oldest first
    fn drain(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
        }
    }

    fn apply(&mut self, command: GraphCommand) {
        if let Some(old) = self.graph.apply(command) {
            // Freed in place only if the control side stopped collecting
            let _ = self.retired.try_send(old);
        }
    }
}

type GraphSlot = Arc<Mutex<Option<LiveGraph>>>;

struct Session {
    info: SessionInfo,
    source: SourceHandle,
    commands: Sender<GraphCommand>,
    retired: Receiver<Box<PreparedKernel>>,
    analyser: AnalyserReader,
}

impl Session {
    fn dispatch(&self, slot: &GraphSlot, commands: Vec<GraphCommand>) {
        self.collect_retired();
        for command in commands {
            match self.commands.try_send(command) {
                Ok(()) => {}
                Err(TrySendError::Full(command)) => {
                    // Nobody is pulling quanta; apply the backlog from here
                    debug!(session = %self.info.session_id, "Command queue full; applying on control side");
                    match slot.lock().as_mut() {
                        Some(live) => {
                            live.drain();
                            live.apply(command);
                        }
                        None => {
                            warn!(session = %self.info.session_id, "Graph is gone; dropping commands");
                            break;
                        }
                    }
                }
                Err(TrySendError::Disconnected(_)) => {
                    warn!(session = %self.info.session_id, "Graph is gone; dropping commands");
                    break;
                }
            }
        }
    }

    /// Drop impulse responses the render side has swapped out
    fn collect_retired(&self) {
        while let Ok(old) = self.retired.try_recv() {
            debug!(duration = old.kernel().impulse_response().duration_secs(), "Released impulse response");
        }
    }
}

enum Lifecycle {
    Idle,
    Active(Session),
    Rebuilding {
        source: SourceHandle,
        previous: SessionInfo,
    },
}

struct EngineState {
    lifecycle: Lifecycle,
    controller: ParameterController,
    /// Impulse response shape of the current reverb
    reverb: ReverbSpec,
}

struct EngineInner {
    config: EngineConfig,
    library: PresetLibrary,
    state: Mutex<EngineState>,
    slot: GraphSlot,
}

// ============================================================================
// Engine
// ============================================================================

/// Playback engine
///
/// Cheap to clone; clones control the same session.
///
/// # Example
/// ```
/// use sonicstage::engine::{generate_stereo_test_tone, Engine, ParamUpdate};
/// use sonicstage::graph::SourceHandle;
///
/// let engine = Engine::default();
/// assert_eq!(engine.set_volume(1.5), ParamUpdate::NotInitialized);
///
/// let source = SourceHandle::new(generate_stereo_test_tone(440.0, 660.0, 0.1, 48000)).unwrap();
/// engine.init(source, 48000, 16).unwrap();
/// assert_eq!(engine.set_volume(1.5), ParamUpdate::Applied);
/// engine.close();
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::from_config(EngineConfig::default())
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state())
            .field("session", &self.session_info())
            .finish()
    }
}

impl Engine {
    /// Create an engine with a validated configuration
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    fn from_config(config: EngineConfig) -> Self {
        let reverb = config.default_reverb;
        Self {
            inner: Arc::new(EngineInner {
                config,
                library: PresetLibrary::builtin(),
                state: Mutex::new(EngineState {
                    lifecycle: Lifecycle::Idle,
                    controller: ParameterController::new(ParameterSet::default(), ControlMode::Realtime),
                    reverb,
                }),
                slot: Arc::new(Mutex::new(None)),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn presets(&self) -> &PresetLibrary {
        &self.inner.library
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start a session on `source`
    ///
    /// Any existing session is torn down first.
    ///
    /// # Errors
    /// * `UnsupportedConfiguration` - rate outside 8-192 kHz or depth not 16/24/32
    /// * `BindingConflict` - `source` is bound to another engine's session
    pub fn init(&self, source: SourceHandle, sample_rate: u32, bit_depth: u16) -> Result<SessionInfo> {
        let bit_depth = validate_output(sample_rate, bit_depth)?;
        let mut state = self.inner.state.lock();
        self.teardown(&mut state);
        self.start_session(&mut state, source, sample_rate, bit_depth)
    }

    /// Tear down the session, if any
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        if self.teardown(&mut state).is_some() {
            info!("Engine closed");
        }
    }

    /// Rebuild the session at a new rate and depth
    ///
    /// The configuration is validated before the current session is touched.
    pub fn rebuild(&self, sample_rate: u32, bit_depth: u16) -> Result<SessionInfo> {
        validate_output(sample_rate, bit_depth)?;
        self.begin_rebuild()?;
        self.finish_rebuild(sample_rate, bit_depth)
    }

    /// Tear down the live session and enter the rebuild window
    ///
    /// # Errors
    /// * `NotInitialized` - there is no session to rebuild
    pub fn begin_rebuild(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        match state.lifecycle {
            Lifecycle::Idle => return Err(SonicError::NotInitialized),
            Lifecycle::Rebuilding { .. } => return Ok(()),
            Lifecycle::Active(_) => {}
        }

        if let Some((source, previous)) = self.teardown(&mut state) {
            info!(session = %previous.session_id, "Rebuild started");
            state.lifecycle = Lifecycle::Rebuilding { source, previous };
        }
        Ok(())
    }

    /// Build the new session and apply everything set during the window
    ///
    /// On failure the engine stays in the rebuild window so the call can be
    /// retried with another configuration.
    pub fn finish_rebuild(&self, sample_rate: u32, bit_depth: u16) -> Result<SessionInfo> {
        let bit_depth = validate_output(sample_rate, bit_depth)?;
        let mut state = self.inner.state.lock();

        let (source, previous) = match std::mem::replace(&mut state.lifecycle, Lifecycle::Idle) {
            Lifecycle::Rebuilding { source, previous } => (source, previous),
            Lifecycle::Idle => return Err(SonicError::NotInitialized),
            active @ Lifecycle::Active(_) => {
                state.lifecycle = active;
                return Err(SonicError::unsupported("no rebuild in progress"));
            }
        };

        match self.start_session(&mut state, source.clone(), sample_rate, bit_depth) {
            Ok(info) => {
                info!(
                    previous = %previous.session_id,
                    session = %info.session_id,
                    "Rebuild complete"
                );
                Ok(info)
            }
            Err(err) => {
                warn!(error = %err, "Rebuild failed");
                state.lifecycle = Lifecycle::Rebuilding { source, previous };
                Err(err)
            }
        }
    }

    pub fn state(&self) -> SessionState {
        match self.inner.state.lock().lifecycle {
            Lifecycle::Idle => SessionState::Idle,
            Lifecycle::Active(_) => SessionState::Active,
            Lifecycle::Rebuilding { .. } => SessionState::Rebuilding,
        }
    }

    /// Live session, if any
    pub fn session_info(&self) -> Option<SessionInfo> {
        match &self.inner.state.lock().lifecycle {
            Lifecycle::Active(session) => Some(session.info.clone()),
            Lifecycle::Idle | Lifecycle::Rebuilding { .. } => None,
        }
    }

    /// Snapshot of the current parameter set
    pub fn parameters(&self) -> ParameterSet {
        self.inner.state.lock().controller.params().clone()
    }

    /// Current source position in the spatializer
    pub fn spatial_position(&self) -> SpatialPosition {
        self.inner.state.lock().controller.position()
    }

    /// Impulse response shape the playback chain uses
    ///
    /// Follows the last preset that named one; presets without a reverb keep
    /// the previous shape.
    pub fn reverb_spec(&self) -> ReverbSpec {
        self.inner.state.lock().reverb
    }

    /// Renderer the host audio callback pulls from
    pub fn renderer(&self) -> RealtimeRenderer {
        RealtimeRenderer::new(Arc::clone(&self.inner.slot))
    }

    fn start_session(
        &self,
        state: &mut EngineState,
        source: SourceHandle,
        sample_rate: u32,
        bit_depth: BitDepth,
    ) -> Result<SessionInfo> {
        let config = &self.inner.config;
        let ctx = RealtimeContext::new(sample_rate, config.analyser_settings());
        let kernel = Arc::new(ConvolutionKernel::synthesize(
            state.reverb.duration_secs,
            state.reverb.decay,
            sample_rate,
            config.reverb_seed,
        ));
        let mut graph = build_graph(&ctx, &source, kernel)?;

        // Not live yet, so the full state lands before the first quantum
        for command in state.controller.full_sync() {
            graph.apply(command);
        }
        let analyser = graph.tap().reader();
        let (command_tx, command_rx) = bounded(COMMAND_CAPACITY);
        let (retired_tx, retired_rx) = bounded(RETIRED_CAPACITY);
        *self.inner.slot.lock() = Some(LiveGraph {
            graph,
            commands: command_rx,
            retired: retired_tx,
        });

        let info = SessionInfo {
            session_id: ctx.session_id(),
            source_id: source.id(),
            sample_rate,
            bit_depth,
            source_channels: source.num_channels(),
            duration_secs: source.duration_secs(),
        };
        info!(
            session = %info.session_id,
            source = %info.source_id,
            sample_rate,
            bit_depth = bit_depth.bits(),
            "Session started"
        );

        state.lifecycle = Lifecycle::Active(Session {
            info: info.clone(),
            source,
            commands: command_tx,
            retired: retired_rx,
            analyser,
        });
        Ok(info)
    }

    /// Dispose the live graph and release the source
    ///
    /// Returns the source and last session info when there was one.
    fn teardown(&self, state: &mut EngineState) -> Option<(SourceHandle, SessionInfo)> {
        match std::mem::replace(&mut state.lifecycle, Lifecycle::Idle) {
            Lifecycle::Idle => None,
            Lifecycle::Rebuilding { source, previous } => Some((source, previous)),
            Lifecycle::Active(session) => {
                // Waits for a quantum in progress; the renderer outputs silence afterwards
                let live = self.inner.slot.lock().take();
                drop(live);
                session.source.release(session.info.session_id);
                info!(session = %session.info.session_id, "Session torn down");
                Some((session.source, session.info))
            }
        }
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    fn update(&self, name: &'static str, change: impl FnOnce(&mut ParameterSet)) -> ParamUpdate {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if matches!(state.lifecycle, Lifecycle::Idle) {
            debug!(param = name, "No session; update ignored");
            return ParamUpdate::NotInitialized;
        }

        let commands = state.controller.update(change);
        match &state.lifecycle {
            Lifecycle::Active(session) => {
                debug!(param = name, commands = commands.len(), "Parameter dispatched");
                session.dispatch(&self.inner.slot, commands);
                ParamUpdate::Applied
            }
            Lifecycle::Rebuilding { .. } | Lifecycle::Idle => {
                debug!(param = name, "Parameter queued for rebuild");
                ParamUpdate::Queued
            }
        }
    }

    /// Master gain multiplier, `[0, 3]`
    pub fn set_volume(&self, volume: f32) -> ParamUpdate {
        self.update("volume", |p| p.set_volume(volume))
    }

    /// Bass shelf in dB, `[-10, 15]`
    pub fn set_bass(&self, db: f32) -> ParamUpdate {
        self.update("bass", |p| p.set_bass(db))
    }

    /// Treble shelf in dB, `[-10, 15]`
    pub fn set_treble(&self, db: f32) -> ParamUpdate {
        self.update("treble", |p| p.set_treble(db))
    }

    /// Vocal clarity, `[0, 15]` with 5 neutral
    pub fn set_vocal_clarity(&self, value: f32) -> ParamUpdate {
        self.update("vocal_clarity", |p| p.set_vocal_clarity(value))
    }

    /// Reverb wet level, `[0, 1]`
    pub fn set_reverb(&self, level: f32) -> ParamUpdate {
        self.update("reverb_level", |p| p.set_reverb_level(level))
    }

    /// Dynamic range compression amount, `[0, 1]`
    pub fn set_drc(&self, amount: f32) -> ParamUpdate {
        self.update("drc", |p| p.set_drc(amount))
    }

    pub fn set_height_level(&self, level: f32) -> ParamUpdate {
        self.update("height_level", |p| p.set_height_level(level))
    }

    pub fn set_lfe_crossover(&self, hz: f32) -> ParamUpdate {
        self.update("lfe_crossover_hz", |p| p.set_lfe_crossover(hz))
    }

    /// Speaker delay `[0, 200]` ms and phase alignment `[-20, 20]` ms
    pub fn set_speaker_calibration(&self, delay_ms: f32, phase_ms: f32) -> ParamUpdate {
        self.update("speaker_calibration", |p| p.set_speaker_calibration(delay_ms, phase_ms))
    }

    pub fn set_theater_mode(&self, on: bool) -> ParamUpdate {
        self.update("theater_mode", |p| p.theater_mode = on)
    }

    pub fn set_hd_mode(&self, on: bool) -> ParamUpdate {
        self.update("hd_mode", |p| p.hd_mode = on)
    }

    /// Apply a named preset
    ///
    /// # Errors
    /// * `UnknownPreset` - no preset with that name
    pub fn apply_preset(&self, name: &str) -> Result<ParamUpdate> {
        let preset = self.inner.library.get(name)?;
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if matches!(state.lifecycle, Lifecycle::Idle) {
            debug!(preset = name, "No session; preset ignored");
            return Ok(ParamUpdate::NotInitialized);
        }

        let (commands, reverb) = state.controller.apply_preset(preset);
        let new_reverb = reverb.filter(|spec| *spec != state.reverb);
        if let Some(spec) = new_reverb {
            state.reverb = spec;
        }

        match &state.lifecycle {
            Lifecycle::Active(session) => {
                session.dispatch(&self.inner.slot, commands);
                if let Some(spec) = new_reverb {
                    let kernel = ConvolutionKernel::synthesize(
                        spec.duration_secs,
                        spec.decay,
                        session.info.sample_rate,
                        self.inner.config.reverb_seed,
                    );
                    let prepared = Box::new(PreparedKernel::new(Arc::new(kernel)));
                    debug!(duration = spec.duration_secs, decay = spec.decay, "Impulse response regenerated");
                    session.dispatch(&self.inner.slot, vec![GraphCommand::SetImpulseResponse(prepared)]);
                }
                Ok(ParamUpdate::Applied)
            }
            Lifecycle::Rebuilding { .. } | Lifecycle::Idle => Ok(ParamUpdate::Queued),
        }
    }

    /// Move the source; each axis is clamped to `[-2, 2]`
    pub fn set_spatial_position(&self, x: f32, y: f32, z: f32) -> ParamUpdate {
        let position = SpatialPosition::new(x, y, z);
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if matches!(state.lifecycle, Lifecycle::Idle) {
            return ParamUpdate::NotInitialized;
        }

        let commands = state.controller.set_position(position);
        match &state.lifecycle {
            Lifecycle::Active(session) => {
                session.dispatch(&self.inner.slot, commands);
                ParamUpdate::Applied
            }
            Lifecycle::Rebuilding { .. } | Lifecycle::Idle => ParamUpdate::Queued,
        }
    }

    /// Latest analyser bins, `fft_size / 2` bytes
    ///
    /// All zeros without a live session.
    pub fn get_analyser_data(&self) -> Vec<u8> {
        match &self.inner.state.lock().lifecycle {
            Lifecycle::Active(session) => session.analyser.byte_frequency_data(),
            Lifecycle::Idle | Lifecycle::Rebuilding { .. } => {
                vec![0; self.inner.config.analyser_settings().bin_count()]
            }
        }
    }

    // ========================================================================
    // Offline Rendering
    // ========================================================================

    /// Render `source` offline with `params`
    ///
    /// The render shares no state with the live session, but it takes the
    /// engine's current impulse response shape and spatial position so the
    /// export sounds like playback. See [`RenderJob`].
    pub fn render_offline(
        &self,
        source: &[u8],
        params: &ParameterSet,
        sample_rate: u32,
        bit_depth: u16,
        on_progress: impl FnMut(f32),
    ) -> Result<Vec<u8>> {
        self.offline_job(source, params, sample_rate, bit_depth)?
            .run(&self.inner.config, &self.inner.library, on_progress)
    }

    /// Offline job carrying the engine's reverb and position
    pub fn offline_job(
        &self,
        source: &[u8],
        params: &ParameterSet,
        sample_rate: u32,
        bit_depth: u16,
    ) -> Result<RenderJob> {
        let bit_depth = validate_output(sample_rate, bit_depth)?;
        let (reverb, position) = {
            let state = self.inner.state.lock();
            (state.reverb, state.controller.position())
        };
        Ok(RenderJob::new(source.to_vec(), params.clone(), sample_rate, bit_depth)
            .with_reverb(reverb)
            .with_position(position))
    }
}

// ============================================================================
// Async Bridge
// ============================================================================

#[cfg(feature = "async-bridge")]
impl Engine {
    /// [`rebuild`](Self::rebuild) on the blocking pool
    pub async fn rebuild_async(&self, sample_rate: u32, bit_depth: u16) -> Result<SessionInfo> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.rebuild(sample_rate, bit_depth))
            .await
            .map_err(|e| SonicError::Io(std::io::Error::other(e)))?
    }

    /// [`render_offline`](Self::render_offline) on the blocking pool
    pub async fn render_offline_async(
        &self,
        source: Vec<u8>,
        params: ParameterSet,
        sample_rate: u32,
        bit_depth: u16,
    ) -> Result<Vec<u8>> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || {
            engine.render_offline(&source, &params, sample_rate, bit_depth, |_| {})
        })
        .await
        .map_err(|e| SonicError::Io(std::io::Error::other(e)))?
    }
}

// ============================================================================
// Realtime Renderer
// ============================================================================

/// Pull-side of a live session
///
/// Renders in whole quanta and buffers the remainder, so callers may ask for
/// any block size. Outputs silence while no graph is live or while the
/// control side holds the graph (teardown in progress).
pub struct RealtimeRenderer {
    slot: GraphSlot,
    quantum: AudioBuffer,
    /// Frames of `quantum` already handed out
    consumed: usize,
}

impl RealtimeRenderer {
    fn new(slot: GraphSlot) -> Self {
        Self {
            slot,
            quantum: AudioBuffer::new(RENDER_QUANTUM, ChannelLayout::Stereo),
            consumed: RENDER_QUANTUM,
        }
    }

    /// Fill `out` with the next frames
    ///
    /// Mono outputs receive `(L + R) / 2`; channels past the second are zeroed.
    pub fn render(&mut self, out: &mut AudioBuffer) {
        let frames = out.len();
        let mut written = 0;

        while written < frames {
            if self.consumed >= RENDER_QUANTUM {
                if !self.render_quantum() {
                    for channel in &mut out.samples {
                        channel[written..].fill(0.0);
                    }
                    return;
                }
                self.consumed = 0;
            }

            let count = (RENDER_QUANTUM - self.consumed).min(frames - written);
            let src = self.consumed..self.consumed + count;
            let dst = written..written + count;
            match out.num_channels() {
                0 => {}
                1 => {
                    let (left, right) = (&self.quantum.samples[0][src.clone()], &self.quantum.samples[1][src]);
                    for ((o, l), r) in out.samples[0][dst].iter_mut().zip(left).zip(right) {
                        *o = 0.5 * (l + r);
                    }
                }
                _ => {
                    for (ch, channel) in out.samples.iter_mut().enumerate() {
                        if ch < 2 {
                            channel[dst.clone()].copy_from_slice(&self.quantum.samples[ch][src.clone()]);
                        } else {
                            channel[dst.clone()].fill(0.0);
                        }
                    }
                }
            }

            self.consumed += count;
            written += count;
        }
    }

    /// Render one quantum; false when no graph is available
    fn render_quantum(&mut self) -> bool {
        let Some(mut slot) = self.slot.try_lock() else {
            return false;
        };
        match slot.as_mut() {
            Some(live) => {
                live.drain();
                live.graph.render_quantum(&mut self.quantum);
                true
            }
            None => false,
        }
    }

    /// True while a session graph is live
    pub fn is_live(&self) -> bool {
        self.slot.try_lock().map(|slot| slot.is_some()).unwrap_or(false)
    }
}

// ============================================================================
// Tests
// ============================================================================
