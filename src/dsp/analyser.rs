//! Frequency analyser
//!
//! Pass-through node at the end of the realtime chain. It keeps the most
//! recent `fft_size` samples (mono downmix), and every half window runs a
//! Blackman-windowed FFT, smooths magnitudes over time and maps them from
//! `[min_db, max_db]` onto `0..=255`.
//!
//! Results are published through atomics behind a sequence counter, so
//! readers on any thread get one whole completed analysis without locking
//! the render path.

use std::hint;
use std::sync::atomic::{fence, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use super::node::AudioNode;
use crate::engine::AudioBuffer;
use crate::error::{Result, SonicError};
use crate::impl_node_common;

/// Smallest supported FFT size
pub const MIN_FFT_SIZE: usize = 32;

/// Largest supported FFT size
pub const MAX_FFT_SIZE: usize = 32768;

// ============================================================================
// Settings
// ============================================================================

/// Analyser configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyserSettings {
    /// FFT window length (power of two)
    pub fft_size: usize,
    /// Temporal smoothing in `[0, 1)`
    pub smoothing: f32,
    /// Level mapped to byte 0
    pub min_db: f32,
    /// Level mapped to byte 255
    pub max_db: f32,
}

impl Default for AnalyserSettings {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing: 0.8,
            min_db: -100.0,
            max_db: -30.0,
        }
    }
}

impl AnalyserSettings {
    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if !self.fft_size.is_power_of_two()
            || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&self.fft_size)
        {
            return Err(SonicError::unsupported(format!(
                "fft_size {} (expected a power of two in {}..={})",
                self.fft_size, MIN_FFT_SIZE, MAX_FFT_SIZE
            )));
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(SonicError::unsupported(format!(
                "analyser smoothing {} (expected 0 <= s < 1)",
                self.smoothing
            )));
        }
        if self.min_db >= self.max_db {
            return Err(SonicError::unsupported(format!(
                "analyser range {}..{} dB is empty",
                self.min_db, self.max_db
            )));
        }
        Ok(())
    }

    /// Number of frequency bins published
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Published bins guarded by a sequence counter
///
/// Single writer. The counter is odd while a write is in progress.
#[derive(Debug)]
struct Published {
    sequence: AtomicU64,
    bins: Box<[AtomicU8]>,
}

impl Published {
    fn begin_write(&self) -> u64 {
        let seq = self.sequence.fetch_add(1, Ordering::Acquire);
        fence(Ordering::Release);
        seq
    }

    fn end_write(&self, seq: u64) {
        self.sequence.store(seq.wrapping_add(2), Ordering::Release);
    }
}

/// Lock-free view of the latest analysis
#[derive(Debug, Clone)]
pub struct AnalyserReader {
    shared: Arc<Published>,
}

impl AnalyserReader {
    fn new(bin_count: usize) -> Self {
        Self {
            shared: Arc::new(Published {
                sequence: AtomicU64::new(0),
                bins: (0..bin_count).map(|_| AtomicU8::new(0)).collect(),
            }),
        }
    }

    /// Byte magnitudes of the last completed analysis
    ///
    /// Never mixes bins from two analyses; retries while one is being
    /// published.
    pub fn byte_frequency_data(&self) -> Vec<u8> {
        let shared = &*self.shared;
        let mut out = vec![0; shared.bins.len()];
        loop {
            let before = shared.sequence.load(Ordering::Acquire);
            if before % 2 == 1 {
                hint::spin_loop();
                continue;
            }
            for (dst, bin) in out.iter_mut().zip(shared.bins.iter()) {
                *dst = bin.load(Ordering::Relaxed);
            }
            fence(Ordering::Acquire);
            if shared.sequence.load(Ordering::Relaxed) == before {
                return out;
            }
        }
    }

    pub fn bin_count(&self) -> usize {
        self.shared.bins.len()
    }
}

// ============================================================================
// Analyser Node
// ============================================================================

pub struct AnalyserNode {
    settings: AnalyserSettings,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    /// Circular history of mono samples
    history: Vec<f32>,
    write_pos: usize,
    /// Samples received since the last analysis
    pending: usize,
    spectrum: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    reader: AnalyserReader,
}

impl AnalyserNode {
    /// Create an analyser; settings are validated
    pub fn new(settings: AnalyserSettings) -> Result<Self> {
        settings.validate()?;
        let n = settings.fft_size;

        // Blackman window (alpha = 0.16)
        let window = (0..n)
            .map(|i| {
                let x = 2.0 * std::f32::consts::PI * i as f32 / n as f32;
                0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
            })
            .collect();

        Ok(Self {
            settings,
            fft: FftPlanner::<f32>::new().plan_fft_forward(n),
            window,
            history: vec![0.0; n],
            write_pos: 0,
            pending: 0,
            spectrum: vec![Complex::new(0.0, 0.0); n],
            smoothed: vec![0.0; n / 2],
            reader: AnalyserReader::new(n / 2),
        })
    }

    pub fn settings(&self) -> &AnalyserSettings {
        &self.settings
    }

    /// Handle for reading results from other threads
    pub fn reader(&self) -> AnalyserReader {
        self.reader.clone()
    }

    fn analyze(&mut self) {
        let n = self.settings.fft_size;
        for (i, bin) in self.spectrum.iter_mut().enumerate() {
            // Oldest sample first
            let sample = self.history[(self.write_pos + i) % n];
            *bin = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.spectrum);

        let tau = self.settings.smoothing;
        let range = self.settings.max_db - self.settings.min_db;
        let scale = 1.0 / n as f32;
        let shared = &*self.reader.shared;
        let seq = shared.begin_write();

        for (k, (smoothed, out)) in self.smoothed.iter_mut().zip(shared.bins.iter()).enumerate() {
            let magnitude = self.spectrum[k].norm() * scale;
            *smoothed = tau * *smoothed + (1.0 - tau) * magnitude;
            if !smoothed.is_finite() {
                *smoothed = 0.0;
            }

            let db = if *smoothed > 0.0 {
                20.0 * smoothed.log10()
            } else {
                f32::NEG_INFINITY
            };
            let scaled = (255.0 / range * (db - self.settings.min_db)).floor();
            out.store(scaled.clamp(0.0, 255.0) as u8, Ordering::Relaxed);
        }
        shared.end_write(seq);
    }
}

impl AudioNode for AnalyserNode {
    fn process(&mut self, block: &mut AudioBuffer) {
        let n = self.settings.fft_size;
        let channels = block.num_channels().max(1) as f32;
        let hop = (n / 2).max(1);

        for i in 0..block.len() {
            let mono = block.samples.iter().map(|ch| ch[i]).sum::<f32>() / channels;
            self.history[self.write_pos] = mono;
            self.write_pos = (self.write_pos + 1) % n;
            self.pending += 1;
            if self.pending >= hop {
                self.pending = 0;
                self.analyze();
            }
        }
    }

    fn reset(&mut self) {
        self.history.fill(0.0);
        self.smoothed.fill(0.0);
        self.write_pos = 0;
        self.pending = 0;
    }

    impl_node_common!("analyser", "Analyser");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ChannelLayout, RENDER_QUANTUM};
    use test_case::test_case;

    fn feed_sine(node: &mut AnalyserNode, freq: f32, sr: u32, blocks: usize) {
        for n in 0..blocks {
            let mut block = AudioBuffer::with_sample_rate(RENDER_QUANTUM, ChannelLayout::Stereo, sr);
            for ch in &mut block.samples {
                for (i, s) in ch.iter_mut().enumerate() {
                    let t = (n * RENDER_QUANTUM + i) as f32 / sr as f32;
                    *s = 0.5 * (2.0 * std::f32::consts::PI * freq * t).sin();
                }
            }
            node.process(&mut block);
        }
    }

    #[test_case(32 ; "smallest")]
    #[test_case(2048 ; "default")]
    #[test_case(32768 ; "largest")]
    fn test_output_length_is_half_fft(fft_size: usize) {
        let node = AnalyserNode::new(AnalyserSettings {
            fft_size,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(node.reader().byte_frequency_data().len(), fft_size / 2);
    }

    #[test_case(1000 ; "not power of two")]
    #[test_case(16 ; "too small")]
    #[test_case(65536 ; "too large")]
    fn test_invalid_fft_size_rejected(fft_size: usize) {
        let result = AnalyserNode::new(AnalyserSettings {
            fft_size,
            ..Default::default()
        });
        assert!(matches!(result, Err(SonicError::UnsupportedConfiguration { .. })));
    }

    #[test]
    fn test_silence_reads_zero() {
        let mut node = AnalyserNode::new(AnalyserSettings::default()).unwrap();
        let mut block = AudioBuffer::new(RENDER_QUANTUM, ChannelLayout::Stereo);
        for _ in 0..32 {
            node.process(&mut block);
        }
        assert!(node.reader().byte_frequency_data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_tone_peaks_at_its_bin() {
        let sr = 48000;
        let mut node = AnalyserNode::new(AnalyserSettings::default()).unwrap();
        feed_sine(&mut node, 3000.0, sr, 200);

        let data = node.reader().byte_frequency_data();
        let peak_bin = data
            .iter()
            .enumerate()
            .max_by_key(|&(_, &v)| v)
            .map(|(i, _)| i)
            .unwrap();
        // 3000 Hz / (48000 / 2048) = bin 128
        assert!((peak_bin as i64 - 128).abs() <= 1, "peak at bin {}", peak_bin);
        assert!(data[peak_bin] > 200);
    }

    #[test]
    fn test_pass_through_is_unchanged() {
        let mut node = AnalyserNode::new(AnalyserSettings::default()).unwrap();
        let mut block = AudioBuffer::new(RENDER_QUANTUM, ChannelLayout::Stereo);
        block.channel_mut(0).fill(0.3);
        let original = block.clone();
        node.process(&mut block);
        assert_eq!(block, original);
    }

    #[test]
    fn test_reader_shares_results() {
        let mut node = AnalyserNode::new(AnalyserSettings {
            fft_size: 256,
            ..Default::default()
        })
        .unwrap();
        let reader = node.reader();
        feed_sine(&mut node, 1000.0, 48000, 8);
        assert!(reader.byte_frequency_data().iter().any(|&b| b > 0));
    }

    #[test]
    fn test_reads_never_mix_two_analyses() {
        let reader = AnalyserReader::new(512);
        let writer = reader.clone();

        let publisher = std::thread::spawn(move || {
            for round in 0..20_000u32 {
                let value = if round % 2 == 0 { 0 } else { 255 };
                let seq = writer.shared.begin_write();
                for bin in writer.shared.bins.iter() {
                    bin.store(value, Ordering::Relaxed);
                }
                writer.shared.end_write(seq);
            }
        });

        while !publisher.is_finished() {
            let data = reader.byte_frequency_data();
            assert!(data.iter().all(|&b| b == data[0]), "snapshot mixed two analyses");
        }
        publisher.join().unwrap();
        assert!(reader.byte_frequency_data().iter().all(|&b| b == 255));
    }
}
