//! Engine Integration Tests
//!
//! Session lifecycle, parameter control and analyser reads through the
//! public API.

use sonicstage::control::controller::DspTargets;
use sonicstage::control::ReverbSpec;
use sonicstage::dsp::SpatialPosition;
use sonicstage::engine::buffer::calculate_peak;
use sonicstage::engine::{
    generate_stereo_test_tone, AudioBuffer, BitDepth, ChannelLayout, SessionState, WavEncoder,
};
use sonicstage::graph::ParamTarget;
use sonicstage::{Engine, EngineConfig, ParamUpdate, ParameterSet, RenderJob, SourceHandle};
use pretty_assertions::assert_eq;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn create_source(duration_secs: f32) -> SourceHandle {
    SourceHandle::new(generate_stereo_test_tone(440.0, 660.0, duration_secs, 48000)).unwrap()
}

fn u16_at(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn u32_at(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

// === Parameter Control ===

#[test]
fn test_setter_inputs_are_clamped() {
    init_tracing();
    let engine = Engine::default();
    engine.init(create_source(0.2), 48000, 16).unwrap();

    engine.set_bass(100.0);
    let clamped = engine.parameters();
    engine.set_bass(15.0);
    assert_eq!(clamped, engine.parameters(), "set_bass(100) must equal set_bass(15)");

    engine.set_volume(-1.0);
    engine.set_drc(4.0);
    engine.set_lfe_crossover(1000.0);
    engine.set_speaker_calibration(500.0, -90.0);
    let params = engine.parameters();
    assert_eq!(params.volume, 0.0);
    assert_eq!(params.drc, 1.0);
    assert_eq!(params.lfe_crossover_hz, 250.0);
    assert_eq!(params.speaker_delay_ms, 200.0);
    assert_eq!(params.phase_alignment_ms, -20.0);
}

#[test]
fn test_theater_mode_then_bass() {
    let engine = Engine::default();
    engine.init(create_source(0.2), 48000, 16).unwrap();

    assert_eq!(engine.set_theater_mode(true), ParamUpdate::Applied);
    assert_eq!(engine.set_bass(2.0), ParamUpdate::Applied);

    let targets = DspTargets::compute(&engine.parameters(), engine.spatial_position());
    assert_eq!(targets.get(ParamTarget::BassGain), 6.0, "Effective bass should be 6 dB");
}

#[test]
fn test_apply_preset_is_idempotent() {
    let engine = Engine::default();
    engine.init(create_source(0.2), 48000, 16).unwrap();

    for name in engine.presets().names() {
        engine.apply_preset(name).unwrap();
        let once = engine.parameters();
        engine.apply_preset(name).unwrap();
        assert_eq!(once, engine.parameters(), "{} applied twice drifted", name);
    }
}

#[test]
fn test_setters_are_noops_without_session() {
    let engine = Engine::default();
    assert_eq!(engine.set_treble(4.0), ParamUpdate::NotInitialized);
    assert_eq!(engine.set_hd_mode(true), ParamUpdate::NotInitialized);
    assert_eq!(engine.set_reverb(0.5), ParamUpdate::NotInitialized);
    assert_eq!(engine.parameters(), ParameterSet::default());
    assert!(engine.session_info().is_none());
}

#[test]
fn test_spatial_position_is_clamped() {
    let engine = Engine::default();
    engine.init(create_source(0.2), 48000, 16).unwrap();
    engine.set_spatial_position(5.0, -9.0, 0.5);
    assert_eq!(engine.spatial_position(), SpatialPosition::new(2.0, -2.0, 0.5));
}

// === Rebuild ===

#[test]
fn test_setter_during_rebuild_is_queued() {
    init_tracing();
    let engine = Engine::default();
    let source = create_source(0.5);
    engine.init(source.clone(), 48000, 16).unwrap();
    let mut renderer = engine.renderer();

    engine.begin_rebuild().unwrap();
    assert_eq!(engine.state(), SessionState::Rebuilding);

    // The old graph is gone: nothing renders and nothing errors
    assert_eq!(engine.set_volume(0.0), ParamUpdate::Queued);
    assert_eq!(engine.apply_preset("Night Mode").unwrap(), ParamUpdate::Queued);
    let mut out = AudioBuffer::new(512, ChannelLayout::Stereo);
    renderer.render(&mut out);
    assert!(out.samples.iter().flatten().all(|&s| s == 0.0));

    let info = engine.finish_rebuild(44100, 24).unwrap();
    assert_eq!(info.bit_depth, BitDepth::TwentyFour);
    assert_eq!(engine.parameters().volume, 0.0);
    assert_eq!(engine.parameters().preset_name.as_deref(), Some("Night Mode"));

    // Volume 0 was applied as a fixed value before the first quantum
    let mut out = AudioBuffer::with_sample_rate(512, ChannelLayout::Stereo, 44100);
    renderer.render(&mut out);
    assert!(out.samples.iter().flatten().all(|&s| s == 0.0));
}

#[test]
fn test_rebuild_releases_and_rebinds_source() {
    let engine = Engine::default();
    let source = create_source(0.2);
    let first = engine.init(source.clone(), 48000, 16).unwrap();

    let second = engine.rebuild(96000, 32).unwrap();
    assert_ne!(first.session_id, second.session_id);
    assert_eq!(source.bound_to(), Some(second.session_id));
    assert_eq!(engine.session_info(), Some(second));
}

#[test]
fn test_invalid_rebuild_keeps_session() {
    let engine = Engine::default();
    let info = engine.init(create_source(0.2), 48000, 16).unwrap();

    let err = engine.rebuild(48000, 12).unwrap_err();
    assert_eq!(err.error_code(), "UNSUPPORTED_CONFIGURATION");
    assert_eq!(engine.session_info(), Some(info));
}

#[test]
fn test_binding_conflict_between_engines() {
    let source = create_source(0.2);
    let a = Engine::default();
    let b = Engine::default();
    a.init(source.clone(), 48000, 16).unwrap();

    let err = b.init(source, 48000, 16).unwrap_err();
    assert_eq!(err.error_code(), "BINDING_CONFLICT");
    assert!(err.is_recoverable());
    assert!(!err.recovery_suggestions().is_empty());
}

// === Analyser ===

#[test]
fn test_analyser_output_length_and_range() {
    let engine = Engine::new(EngineConfig {
        fft_size: 1024,
        ..Default::default()
    })
    .unwrap();
    engine.init(create_source(0.5), 48000, 16).unwrap();

    let mut renderer = engine.renderer();
    let mut out = AudioBuffer::new(4096, ChannelLayout::Stereo);
    renderer.render(&mut out);

    let data = engine.get_analyser_data();
    assert_eq!(data.len(), 512);
    assert!(data.iter().any(|&b| b > 0), "Tone should register in the analyser");
}

#[test]
fn test_volume_boost_is_caught_by_limiter() {
    let engine = Engine::default();
    engine.init(create_source(1.0), 48000, 16).unwrap();
    engine.set_volume(3.0);

    let mut renderer = engine.renderer();
    let mut out = AudioBuffer::new(48000, ChannelLayout::Stereo);
    renderer.render(&mut out);

    // Let the ramp and attack settle, then look at the second half
    let mut tail = AudioBuffer::new(24000, ChannelLayout::Stereo);
    for (dst, src) in tail.samples.iter_mut().zip(&out.samples) {
        dst.copy_from_slice(&src[24000..]);
    }
    assert!(tail.is_finite());
    assert!(calculate_peak(&tail) < 1.0, "peak {} dB", calculate_peak(&tail));
}

// === Offline Parity ===

fn tone_blob(duration_secs: f32) -> Vec<u8> {
    let tone = generate_stereo_test_tone(440.0, 660.0, duration_secs, 48000);
    WavEncoder::new(BitDepth::Sixteen).encode(&tone).unwrap()
}

#[test]
fn test_offline_reverb_follows_live_after_preset_switch() {
    init_tracing();
    let engine = Engine::default();
    engine.init(create_source(0.2), 48000, 16).unwrap();

    engine.apply_preset("IMAX Enhanced").unwrap();
    engine.apply_preset("Night Mode").unwrap();
    engine.set_reverb(0.5);
    let live = engine.reverb_spec();
    assert_eq!(live, ReverbSpec::new(2.5, 2.5), "Night Mode keeps the previous impulse response");

    let blob = tone_blob(0.2);
    let params = engine.parameters();
    let job = engine.offline_job(&blob, &params, 48000, 16).unwrap();
    assert_eq!(job.reverb_spec(engine.config(), engine.presets()), live);

    let rendered = engine.render_offline(&blob, &params, 48000, 16, |_| {}).unwrap();
    let expected = RenderJob::new(blob.clone(), params.clone(), 48000, BitDepth::Sixteen)
        .with_reverb(live)
        .run(engine.config(), engine.presets(), |_| {})
        .unwrap();
    let default_ir = RenderJob::new(blob, params, 48000, BitDepth::Sixteen)
        .with_reverb(engine.config().default_reverb)
        .run(engine.config(), engine.presets(), |_| {})
        .unwrap();
    assert_eq!(rendered, expected);
    assert_ne!(rendered, default_ir);
}

#[test]
fn test_offline_render_uses_live_position() {
    let engine = Engine::default();
    engine.init(create_source(0.2), 48000, 16).unwrap();
    engine.set_spatial_position(2.0, 0.0, 0.0);

    let blob = tone_blob(0.2);
    let params = engine.parameters();
    let rendered = engine.render_offline(&blob, &params, 48000, 16, |_| {}).unwrap();

    let centered = RenderJob::new(blob.clone(), params.clone(), 48000, BitDepth::Sixteen)
        .with_reverb(engine.reverb_spec())
        .run(engine.config(), engine.presets(), |_| {})
        .unwrap();
    let moved = RenderJob::new(blob, params, 48000, BitDepth::Sixteen)
        .with_reverb(engine.reverb_spec())
        .with_position(SpatialPosition::new(2.0, 0.0, 0.0))
        .run(engine.config(), engine.presets(), |_| {})
        .unwrap();
    assert_ne!(rendered, centered);
    assert_eq!(rendered, moved);
}

// === Scenario ===

#[test]
fn test_init_preset_render_scenario() {
    init_tracing();
    let tone = generate_stereo_test_tone(440.0, 660.0, 0.25, 48000);
    let frames = tone.len();
    let blob = WavEncoder::new(BitDepth::Sixteen).encode(&tone).unwrap();

    let engine = Engine::default();
    engine.init(SourceHandle::from_wav_bytes(&blob).unwrap(), 48000, 16).unwrap();
    assert_eq!(engine.set_volume(1.8), ParamUpdate::Applied);
    assert_eq!(engine.set_bass(0.0), ParamUpdate::Applied);
    assert_eq!(engine.apply_preset("Pure Direct").unwrap(), ParamUpdate::Applied);

    let wav = engine
        .render_offline(&blob, &engine.parameters(), 48000, 16, |_| {})
        .unwrap();

    assert_eq!(&wav[0..4], b"RIFF");
    assert_eq!(&wav[8..12], b"WAVE");
    assert_eq!(u16_at(&wav, 22), 2, "channels");
    assert_eq!(u32_at(&wav, 24), 48000, "sample rate");
    assert_eq!(u16_at(&wav, 34), 16, "bits per sample");
    assert_eq!(u32_at(&wav, 40) as usize, frames * 2 * 2, "data size");
    assert_eq!(wav.len(), 44 + frames * 4);
}
