//! Source decoding and sample-rate conversion
//!
//! Source blobs arrive as in-memory WAV images. They are decoded to planar
//! 32-bit float with `hound`, then resampled to the processing rate when it
//! differs from the file rate (linear interpolation).

use std::io::Cursor;

use hound::{SampleFormat, WavReader};

use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::error::{Result, SonicError};

/// Decode an in-memory WAV image into a planar float buffer
///
/// # Errors
/// * `DecodeFailure` - the bytes are not a readable WAV stream, or contain no frames
/// * `UnsupportedConfiguration` - more than two channels
pub fn decode_wav_bytes(bytes: &[u8]) -> Result<AudioBuffer> {
    let reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let layout = ChannelLayout::from_count(channels).ok_or_else(|| {
        SonicError::unsupported(format!(
            "{}-channel audio (only mono/stereo supported)",
            channels
        ))
    })?;

    let interleaved = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
    if interleaved.len() < channels {
        return Err(SonicError::DecodeFailure {
            reason: "source contains no audio frames".to_string(),
            source: None,
        });
    }

    AudioBuffer::from_interleaved(&interleaved, layout, spec.sample_rate)
}

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let samples = match (sample_format, bits_per_sample) {
        (SampleFormat::Float, _) => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, 8) => reader
            .samples::<i8>()
            .map(|s| s.map(|v| v as f32 / 128.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8_388_608.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2_147_483_648.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, bits) => {
            return Err(SonicError::DecodeFailure {
                reason: format!("{}-bit integer audio", bits),
                source: None,
            })
        }
    };
    Ok(samples)
}

/// Number of frames a buffer of `source_frames` occupies at another rate
#[inline]
pub fn resampled_len(source_frames: usize, source_rate: u32, target_rate: u32) -> usize {
    if source_rate == target_rate {
        return source_frames;
    }
    let (frames, source, target) = (source_frames as u64, source_rate.max(1) as u64, target_rate as u64);
    ((frames * target).div_ceil(source)) as usize
}

/// Resample a buffer to `target_rate`
///
/// Returns a clone when the rates already match.
pub fn resample(buffer: &AudioBuffer, target_rate: u32) -> AudioBuffer {
    if buffer.sample_rate == target_rate || buffer.sample_rate == 0 {
        let mut out = buffer.clone();
        out.sample_rate = target_rate;
        return out;
    }

    let ratio = target_rate as f64 / buffer.sample_rate as f64;
    let target_len = resampled_len(buffer.len(), buffer.sample_rate, target_rate);
    AudioBuffer {
        samples: buffer
            .samples
            .iter()
            .map(|channel| resample_linear(channel, ratio, target_len))
            .collect(),
        sample_rate: target_rate,
    }
}

/// Linear interpolation resampling
///
/// TODO: replace with a windowed sinc kernel; linear interpolation aliases on downsampling.
fn resample_linear(samples: &[f32], ratio: f64, target_len: usize) -> Vec<f32> {
    if samples.is_empty() {
        return vec![0.0; target_len];
    }

    let source_len = samples.len();
    let mut output = Vec::with_capacity(target_len);

    for i in 0..target_len {
        let src_pos = i as f64 / ratio;
        let src_idx = src_pos.floor() as usize;
        let frac = (src_pos - src_idx as f64) as f32;

        let sample = if src_idx + 1 < source_len {
            samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac
        } else if src_idx < source_len {
            samples[src_idx]
        } else {
            samples[source_len - 1]
        };

        output.push(sample);
    }

    output
}

/// Generate a mono sine test tone
pub fn generate_test_tone(frequency: f32, duration_secs: f32, sample_rate: u32) -> AudioBuffer {
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let mut buffer = AudioBuffer::with_sample_rate(num_samples, ChannelLayout::Mono, sample_rate);

    let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;
    for (i, sample) in buffer.samples[0].iter_mut().enumerate() {
        *sample = (angular_freq * i as f32).sin();
    }

    buffer
}

/// Generate a stereo test tone with different frequencies per channel
pub fn generate_stereo_test_tone(
    freq_left: f32,
    freq_right: f32,
    duration_secs: f32,
    sample_rate: u32,
) -> AudioBuffer {
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let mut buffer = AudioBuffer::with_sample_rate(num_samples, ChannelLayout::Stereo, sample_rate);

    let angular_freq_l = 2.0 * std::f32::consts::PI * freq_left / sample_rate as f32;
    let angular_freq_r = 2.0 * std::f32::consts::PI * freq_right / sample_rate as f32;

    for (i, sample) in buffer.samples[0].iter_mut().enumerate() {
        *sample = (angular_freq_l * i as f32).sin();
    }
    for (i, sample) in buffer.samples[1].iter_mut().enumerate() {
        *sample = (angular_freq_r * i as f32).sin();
    }

    buffer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::wav::{BitDepth, WavEncoder};

    #[test]
    fn test_decode_round_trip_stereo_16bit() {
        let tone = generate_stereo_test_tone(440.0, 880.0, 0.1, 44100);
        let bytes = WavEncoder::new(BitDepth::Sixteen).encode(&tone).unwrap();

        let decoded = decode_wav_bytes(&bytes).unwrap();
        assert_eq!(decoded.sample_rate, 44100);
        assert_eq!(decoded.num_channels(), 2);
        assert_eq!(decoded.len(), tone.len());
        for (a, b) in decoded.channel(1).iter().zip(tone.channel(1)) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_decode_garbage_is_decode_failure() {
        let err = decode_wav_bytes(b"definitely not a wav file").unwrap_err();
        assert_eq!(err.error_code(), "DECODE_FAILURE");
    }

    #[test]
    fn test_decode_empty_data_is_decode_failure() {
        let empty = AudioBuffer::with_sample_rate(0, ChannelLayout::Mono, 48000);
        let bytes = WavEncoder::new(BitDepth::Sixteen).encode(&empty).unwrap();
        let err = decode_wav_bytes(&bytes).unwrap_err();
        assert!(matches!(err, SonicError::DecodeFailure { .. }));
    }

    #[test]
    fn test_resampled_len() {
        assert_eq!(resampled_len(44100, 44100, 48000), 48000);
        assert_eq!(resampled_len(100, 48000, 48000), 100);
        assert_eq!(resampled_len(3, 1, 2), 6);
        assert_eq!(resampled_len(441, 44100, 48000), 480);
    }

    #[test]
    fn test_resample_linear_upsample() {
        let resampled = resample_linear(&[0.0, 1.0, 0.0], 2.0, 6);
        assert_eq!(resampled.len(), 6);
        // Source position 0.5 interpolates halfway
        assert!((resampled[1] - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_resample_buffer_changes_rate_and_length() {
        let tone = generate_test_tone(440.0, 0.5, 44100);
        let resampled = resample(&tone, 48000);
        assert_eq!(resampled.sample_rate, 48000);
        assert_eq!(resampled.len(), resampled_len(tone.len(), 44100, 48000));
        assert!((resampled.duration_secs() - tone.duration_secs()).abs() < 1e-4);
    }

    #[test]
    fn test_generate_test_tone() {
        let buffer = generate_test_tone(440.0, 1.0, 48000);
        assert_eq!(buffer.len(), 48000);
        assert_eq!(buffer.num_channels(), 1);
        let half_cycle = (48000.0 / 440.0 / 2.0) as usize;
        assert!(buffer.samples[0][half_cycle].abs() < 0.1);
    }
}
