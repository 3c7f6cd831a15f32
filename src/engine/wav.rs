//! WAV container encoder
//!
//! Emits the canonical 44-byte-header RIFF/WAVE layout with interleaved
//! little-endian samples. The header is written by hand so the byte layout
//! is identical at every bit depth (no WAVE_FORMAT_EXTENSIBLE for 24-bit).
//!
//! 16 and 24-bit output is PCM (format tag 1). 32-bit output is IEEE float
//! (tag 3) but keeps the 16-byte `fmt ` chunk: no `cbSize` field and no
//! `fact` chunk, which the non-PCM WAVEFORMATEX layout would strictly call
//! for. Common readers (hound, libsndfile, browsers) accept this short form,
//! and it keeps the data chunk at offset 44 for every depth.

use serde::{Deserialize, Serialize};

use crate::engine::buffer::AudioBuffer;
use crate::error::{Result, SonicError};

/// Size of the RIFF + fmt + data chunk headers
pub const WAV_HEADER_LEN: usize = 44;

/// WAVE_FORMAT_PCM
const FORMAT_PCM: u16 = 1;
/// WAVE_FORMAT_IEEE_FLOAT
const FORMAT_IEEE_FLOAT: u16 = 3;

/// Output bit depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum BitDepth {
    /// Signed 16-bit integer PCM
    #[default]
    Sixteen,
    /// Signed 24-bit integer PCM, packed in 3 bytes
    TwentyFour,
    /// IEEE-754 float32, unscaled
    ThirtyTwoFloat,
}

impl BitDepth {
    /// Bits per sample
    pub fn bits(self) -> u16 {
        match self {
            BitDepth::Sixteen => 16,
            BitDepth::TwentyFour => 24,
            BitDepth::ThirtyTwoFloat => 32,
        }
    }

    /// Bytes per sample
    pub fn bytes_per_sample(self) -> usize {
        self.bits() as usize / 8
    }

    fn format_tag(self) -> u16 {
        match self {
            BitDepth::ThirtyTwoFloat => FORMAT_IEEE_FLOAT,
            _ => FORMAT_PCM,
        }
    }
}

impl TryFrom<u16> for BitDepth {
    type Error = SonicError;

    fn try_from(bits: u16) -> Result<Self> {
        match bits {
            16 => Ok(BitDepth::Sixteen),
            24 => Ok(BitDepth::TwentyFour),
            32 => Ok(BitDepth::ThirtyTwoFloat),
            other => Err(SonicError::unsupported(format!(
                "{}-bit output (only 16, 24, 32 supported)",
                other
            ))),
        }
    }
}

impl From<BitDepth> for u16 {
    fn from(depth: BitDepth) -> Self {
        depth.bits()
    }
}

/// Quantize one sample to signed 16-bit
///
/// Negative values scale by 0x8000, positive by 0x7FFF, so both -1.0 and
/// 1.0 map onto the extremes of the integer range.
#[inline]
pub fn quantize_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Quantize one sample to signed 24-bit (returned in an i32)
#[inline]
pub fn quantize_i24(sample: f32) -> i32 {
    let s = sample.clamp(-1.0, 1.0) as f64;
    if s < 0.0 {
        (s * 8_388_608.0) as i32
    } else {
        (s * 8_388_607.0) as i32
    }
}

/// Encodes float buffers into WAV byte containers
#[derive(Debug, Clone, Copy, Default)]
pub struct WavEncoder {
    bit_depth: BitDepth,
}

impl WavEncoder {
    /// Create an encoder for the given bit depth
    pub fn new(bit_depth: BitDepth) -> Self {
        Self { bit_depth }
    }

    /// The configured bit depth
    pub fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }

    /// Encode a planar buffer into a complete WAV file image
    pub fn encode(&self, buffer: &AudioBuffer) -> Result<Vec<u8>> {
        let channels = buffer.num_channels();
        if channels == 0 || channels > u16::MAX as usize {
            return Err(SonicError::InvalidAudio {
                reason: format!("cannot encode {} channels", channels),
            });
        }

        let frames = buffer.len();
        let bytes_per_sample = self.bit_depth.bytes_per_sample();
        let data_len = frames * channels * bytes_per_sample;
        if data_len > (u32::MAX as usize - 36) {
            return Err(SonicError::InvalidAudio {
                reason: format!("{} bytes of audio exceeds the RIFF size limit", data_len),
            });
        }

        let mut out = Vec::with_capacity(WAV_HEADER_LEN + data_len);
        self.write_header(&mut out, channels as u16, buffer.sample_rate, data_len as u32);

        for frame in 0..frames {
            for channel in &buffer.samples {
                let sample = channel[frame];
                match self.bit_depth {
                    BitDepth::Sixteen => out.extend_from_slice(&quantize_i16(sample).to_le_bytes()),
                    BitDepth::TwentyFour => {
                        let v = quantize_i24(sample);
                        out.extend_from_slice(&[
                            (v & 0xFF) as u8,
                            ((v >> 8) & 0xFF) as u8,
                            ((v >> 16) & 0xFF) as u8,
                        ]);
                    }
                    BitDepth::ThirtyTwoFloat => out.extend_from_slice(&sample.to_le_bytes()),
                }
            }
        }

        Ok(out)
    }

    fn write_header(&self, out: &mut Vec<u8>, channels: u16, sample_rate: u32, data_len: u32) {
        let bits = self.bit_depth.bits();
        let block_align = channels * (bits / 8);
        let byte_rate = sample_rate * block_align as u32;

        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");

        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&self.bit_depth.format_tag().to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&byte_rate.to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&bits.to_le_bytes());

        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::ChannelLayout;
    use std::io::Cursor;
    use test_case::test_case;

    fn u16_at(bytes: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([bytes[at], bytes[at + 1]])
    }

    fn u32_at(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    fn ramp_buffer(frames: usize, sample_rate: u32) -> AudioBuffer {
        let mut buffer = AudioBuffer::with_sample_rate(frames, ChannelLayout::Stereo, sample_rate);
        let (left, right) = buffer.stereo_mut();
        for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
            let t = i as f32 / frames as f32;
            *l = t * 2.0 - 1.0;
            *r = (t * 17.0).sin() * 0.8;
        }
        buffer
    }

    #[test_case(BitDepth::Sixteen, 1, 2 ; "sixteen bit")]
    #[test_case(BitDepth::TwentyFour, 1, 3 ; "twenty four bit")]
    #[test_case(BitDepth::ThirtyTwoFloat, 3, 4 ; "float bit")]
    fn test_header_layout(depth: BitDepth, format_tag: u16, bytes_per_sample: u32) {
        let buffer = ramp_buffer(100, 44100);
        let bytes = WavEncoder::new(depth).encode(&buffer).unwrap();

        let data_len = 100 * 2 * bytes_per_sample;
        assert_eq!(bytes.len(), WAV_HEADER_LEN + data_len as usize);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(u32_at(&bytes, 4), 36 + data_len);
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(u32_at(&bytes, 16), 16);
        assert_eq!(u16_at(&bytes, 20), format_tag);
        assert_eq!(u16_at(&bytes, 22), 2);
        assert_eq!(u32_at(&bytes, 24), 44100);
        assert_eq!(u32_at(&bytes, 28), 44100 * 2 * bytes_per_sample);
        assert_eq!(u16_at(&bytes, 32), (2 * bytes_per_sample) as u16);
        assert_eq!(u16_at(&bytes, 34), depth.bits());
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(u32_at(&bytes, 40), data_len);
    }

    #[test]
    fn test_quantize_i16_extremes() {
        assert_eq!(quantize_i16(1.0), 32767);
        assert_eq!(quantize_i16(-1.0), -32768);
        assert_eq!(quantize_i16(2.5), 32767);
        assert_eq!(quantize_i16(-7.0), -32768);
        assert_eq!(quantize_i16(0.0), 0);
    }

    #[test]
    fn test_quantize_i24_extremes() {
        assert_eq!(quantize_i24(1.0), 8_388_607);
        assert_eq!(quantize_i24(-1.0), -8_388_608);
        assert_eq!(quantize_i24(0.5), 4_194_303);
    }

    #[test]
    fn test_24bit_packs_three_bytes() {
        let mut buffer = AudioBuffer::with_sample_rate(1, ChannelLayout::Mono, 48000);
        buffer.channel_mut(0)[0] = -1.0;
        let bytes = WavEncoder::new(BitDepth::TwentyFour).encode(&buffer).unwrap();
        // -8388608 = 0x800000
        assert_eq!(&bytes[44..47], &[0x00, 0x00, 0x80]);
    }

    #[test]
    fn test_32bit_round_trip_is_bit_exact() {
        let buffer = ramp_buffer(257, 48000);
        let bytes = WavEncoder::new(BitDepth::ThirtyTwoFloat).encode(&buffer).unwrap();

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let decoded: Vec<f32> = reader.into_samples::<f32>().map(|s| s.unwrap()).collect();
        let original = buffer.to_interleaved();

        assert_eq!(decoded.len(), original.len());
        for (a, b) in decoded.iter().zip(&original) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_16bit_round_trip_within_one_lsb() {
        let buffer = ramp_buffer(500, 48000);
        let bytes = WavEncoder::new(BitDepth::Sixteen).encode(&buffer).unwrap();

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().bits_per_sample, 16);
        let decoded: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();

        for (q, s) in decoded.iter().zip(buffer.to_interleaved()) {
            let back = if *q < 0 {
                *q as f32 / 32768.0
            } else {
                *q as f32 / 32767.0
            };
            assert!((back - s).abs() <= 1.0 / 32767.0 + 1e-6, "{} vs {}", back, s);
        }
    }

    #[test]
    fn test_24bit_round_trip_within_one_lsb() {
        let buffer = ramp_buffer(500, 48000);
        let bytes = WavEncoder::new(BitDepth::TwentyFour).encode(&buffer).unwrap();

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().bits_per_sample, 24);
        let decoded: Vec<i32> = reader.into_samples::<i32>().map(|s| s.unwrap()).collect();

        for (q, s) in decoded.iter().zip(buffer.to_interleaved()) {
            let back = if *q < 0 {
                *q as f32 / 8_388_608.0
            } else {
                *q as f32 / 8_388_607.0
            };
            assert!((back - s).abs() <= 1.0 / 8_388_607.0 + 1e-6);
        }
    }

    #[test]
    fn test_float_header_uses_short_fmt_chunk() {
        let buffer = ramp_buffer(64, 48000);
        let bytes = WavEncoder::new(BitDepth::ThirtyTwoFloat).encode(&buffer).unwrap();

        assert_eq!(u32_at(&bytes, 16), 16, "fmt chunk has no cbSize");
        assert_eq!(u16_at(&bytes, 20), FORMAT_IEEE_FLOAT);
        assert_eq!(&bytes[36..40], b"data", "no fact chunk before data");
        assert_eq!(bytes.len(), WAV_HEADER_LEN + 64 * 2 * 4);

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_format, hound::SampleFormat::Float);
        assert_eq!(reader.spec().bits_per_sample, 32);
        assert_eq!(reader.duration(), 64);
    }

    #[test]
    fn test_bit_depth_conversion() {
        assert_eq!(BitDepth::try_from(24).unwrap(), BitDepth::TwentyFour);
        assert!(BitDepth::try_from(8).is_err());
        assert_eq!(u16::from(BitDepth::ThirtyTwoFloat), 32);
    }

    #[test]
    fn test_empty_buffer_encodes_header_only() {
        let buffer = AudioBuffer::with_sample_rate(0, ChannelLayout::Stereo, 48000);
        let bytes = WavEncoder::new(BitDepth::Sixteen).encode(&buffer).unwrap();
        assert_eq!(bytes.len(), WAV_HEADER_LEN);
        assert_eq!(u32_at(&bytes, 40), 0);
    }
}
