//! Biquad filter node
//!
//! Second-order IIR sections used for every tone-shaping stage of the chain
//! (vocal presence, bass/treble shelves, cinema roll-off, height, LFE, the HD
//! macro filters) and for the low-pass stages of the spatializer and
//! crossfeed. Frequency and gain are automated; coefficients are recomputed
//! once per block when either has moved.

use std::f64::consts::PI;

use super::node::AudioNode;
use super::param::AudioParam;
use crate::engine::AudioBuffer;

/// Q for shelving filters (shelf slope S = 1)
pub const SHELF_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Q for peaking filters
pub const PEAKING_Q: f64 = 1.0;

/// Q for low-pass filters (Butterworth)
pub const LOWPASS_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Gain below which a peaking or shelving filter is treated as flat
const FLAT_GAIN_DB: f32 = 1e-4;

/// Filter response type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    /// Bell curve boost/cut
    Peaking,
    /// Boost/cut below frequency
    LowShelf,
    /// Boost/cut above frequency
    HighShelf,
    /// Remove above frequency
    LowPass,
}

impl FilterType {
    /// Whether the gain parameter affects this response
    fn uses_gain(self) -> bool {
        !matches!(self, FilterType::LowPass)
    }
}

/// Biquad filter coefficients
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    /// Calculate biquad coefficients using Audio EQ Cookbook formulas
    pub fn calculate(
        filter_type: FilterType,
        sample_rate: f64,
        frequency: f64,
        gain_db: f64,
        q: f64,
    ) -> Self {
        let freq = frequency.clamp(10.0, sample_rate / 2.0 - 1.0);
        let q = q.clamp(0.1, 10.0);

        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);
        let a = 10.0_f64.powf(gain_db / 40.0);

        let (b0, b1, b2, a0, a1, a2) = match filter_type {
            FilterType::Peaking => (
                1.0 + alpha * a,
                -2.0 * cos_w0,
                1.0 - alpha * a,
                1.0 + alpha / a,
                -2.0 * cos_w0,
                1.0 - alpha / a,
            ),
            FilterType::LowShelf => {
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                    (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
            FilterType::HighShelf => {
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                    (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
            FilterType::LowPass => (
                (1.0 - cos_w0) / 2.0,
                1.0 - cos_w0,
                (1.0 - cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
        };

        BiquadCoeffs {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Magnitude response in dB at `frequency`
    pub fn magnitude_db(&self, frequency: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * frequency / sample_rate;
        let (c1, s1) = (w.cos(), w.sin());
        let (c2, s2) = ((2.0 * w).cos(), (2.0 * w).sin());

        let num_re = self.b0 + self.b1 * c1 + self.b2 * c2;
        let num_im = -(self.b1 * s1 + self.b2 * s2);
        let den_re = 1.0 + self.a1 * c1 + self.a2 * c2;
        let den_im = -(self.a1 * s1 + self.a2 * s2);

        let num = (num_re * num_re + num_im * num_im).sqrt();
        let den = (den_re * den_re + den_im * den_im).sqrt();
        20.0 * (num / den).log10()
    }
}

/// Biquad filter state for one channel
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    /// Process a single sample (Direct Form I)
    #[inline]
    pub fn process(&mut self, input: f64, coeffs: &BiquadCoeffs) -> f64 {
        let output = coeffs.b0 * input + coeffs.b1 * self.x1 + coeffs.b2 * self.x2
            - coeffs.a1 * self.y1
            - coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Stereo biquad filter node with automated frequency and gain
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    label: &'static str,
    kind: FilterType,
    sample_rate: f64,
    q: f64,
    frequency: AudioParam,
    gain_db: AudioParam,
    coeffs: BiquadCoeffs,
    /// Frequency and gain the current coefficients were computed from
    coeff_key: (f32, f32),
    states: [BiquadState; 2],
    bypassed: bool,
}

impl BiquadFilter {
    /// Create a filter
    pub fn new(
        label: &'static str,
        kind: FilterType,
        frequency: f32,
        gain_db: f32,
        q: f64,
        sample_rate: u32,
    ) -> Self {
        let nyquist = sample_rate as f32 / 2.0;
        let mut filter = Self {
            label,
            kind,
            sample_rate: sample_rate as f64,
            q,
            frequency: AudioParam::new(frequency, 10.0, nyquist.max(10.0), sample_rate),
            gain_db: AudioParam::new(gain_db, -40.0, 40.0, sample_rate),
            coeffs: BiquadCoeffs::default(),
            coeff_key: (f32::NAN, f32::NAN),
            states: [BiquadState::default(); 2],
            bypassed: false,
        };
        filter.update_coeffs();
        filter
    }

    /// Create a flat peaking filter
    pub fn peaking(label: &'static str, frequency: f32, sample_rate: u32) -> Self {
        Self::new(label, FilterType::Peaking, frequency, 0.0, PEAKING_Q, sample_rate)
    }

    /// Create a flat low-shelf filter
    pub fn low_shelf(label: &'static str, frequency: f32, sample_rate: u32) -> Self {
        Self::new(label, FilterType::LowShelf, frequency, 0.0, SHELF_Q, sample_rate)
    }

    /// Create a flat high-shelf filter
    pub fn high_shelf(label: &'static str, frequency: f32, sample_rate: u32) -> Self {
        Self::new(label, FilterType::HighShelf, frequency, 0.0, SHELF_Q, sample_rate)
    }

    /// Create a low-pass filter
    pub fn low_pass(label: &'static str, frequency: f32, sample_rate: u32) -> Self {
        Self::new(label, FilterType::LowPass, frequency, 0.0, LOWPASS_Q, sample_rate)
    }

    pub fn filter_type(&self) -> FilterType {
        self.kind
    }

    /// Corner or center frequency parameter
    pub fn frequency(&self) -> &AudioParam {
        &self.frequency
    }

    pub fn frequency_mut(&mut self) -> &mut AudioParam {
        &mut self.frequency
    }

    /// Gain parameter in dB
    pub fn gain(&self) -> &AudioParam {
        &self.gain_db
    }

    pub fn gain_mut(&mut self) -> &mut AudioParam {
        &mut self.gain_db
    }

    /// Current coefficients
    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    /// Magnitude response in dB for the current parameter values
    pub fn magnitude_db(&self, frequency: f64) -> f64 {
        BiquadCoeffs::calculate(
            self.kind,
            self.sample_rate,
            self.frequency.value() as f64,
            self.gain_db.value() as f64,
            self.q,
        )
        .magnitude_db(frequency, self.sample_rate)
    }

    fn update_coeffs(&mut self) {
        let key = (self.frequency.value(), self.gain_db.value());
        if key == self.coeff_key {
            return;
        }
        self.coeffs = BiquadCoeffs::calculate(
            self.kind,
            self.sample_rate,
            key.0 as f64,
            key.1 as f64,
            self.q,
        );
        self.coeff_key = key;
    }

    fn is_flat(&self) -> bool {
        self.kind.uses_gain() && self.gain_db.is_settled() && self.gain_db.value().abs() < FLAT_GAIN_DB
    }
}

impl AudioNode for BiquadFilter {
    fn process(&mut self, block: &mut AudioBuffer) {
        let frames = block.len();
        self.frequency.advance(frames);
        self.gain_db.advance(frames);

        if self.is_flat() {
            self.bypassed = true;
            return;
        }
        if self.bypassed {
            // History from before the bypass would click on re-entry
            self.reset();
            self.bypassed = false;
        }

        self.update_coeffs();
        let coeffs = self.coeffs;
        for (channel, state) in block.samples.iter_mut().zip(self.states.iter_mut()) {
            for sample in channel.iter_mut() {
                *sample = state.process(*sample as f64, &coeffs) as f32;
            }
        }
    }

    fn reset(&mut self) {
        for state in &mut self.states {
            state.reset();
        }
    }

    fn node_type(&self) -> &'static str {
        match self.kind {
            FilterType::Peaking => "peaking",
            FilterType::LowShelf => "lowshelf",
            FilterType::HighShelf => "highshelf",
            FilterType::LowPass => "lowpass",
        }
    }

    fn display_name(&self) -> &str {
        self.label
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ChannelLayout, RENDER_QUANTUM};
    use std::f64::consts::PI;

    const SR: u32 = 48000;

    fn create_sine_buffer(frequency: f64, sample_rate: u32, num_samples: usize) -> AudioBuffer {
        let mut buffer = AudioBuffer::with_sample_rate(num_samples, ChannelLayout::Stereo, sample_rate);
        for ch in 0..2 {
            for (i, s) in buffer.samples[ch].iter_mut().enumerate() {
                *s = (2.0 * PI * frequency * i as f64 / sample_rate as f64).sin() as f32 * 0.5;
            }
        }
        buffer
    }

    fn calculate_rms(samples: &[f32]) -> f64 {
        let sum: f64 = samples.iter().map(|&s| (s as f64).powi(2)).sum();
        (sum / samples.len() as f64).sqrt()
    }

    /// Run a tone through the filter block by block and return the gain in dB
    fn measure_gain_db(filter: &mut BiquadFilter, frequency: f64) -> f64 {
        let input = create_sine_buffer(frequency, SR, SR as usize / 2);
        let mut output = Vec::with_capacity(input.len());
        for start in (0..input.len()).step_by(RENDER_QUANTUM) {
            let end = (start + RENDER_QUANTUM).min(input.len());
            let mut block = AudioBuffer {
                samples: input.samples.iter().map(|c| c[start..end].to_vec()).collect(),
                sample_rate: SR,
            };
            filter.process(&mut block);
            output.extend_from_slice(&block.samples[0]);
        }
        // Skip the transient
        let skip = output.len() / 4;
        20.0 * (calculate_rms(&output[skip..]) / calculate_rms(&input.samples[0][skip..])).log10()
    }

    #[test]
    fn test_peaking_boost_at_center() {
        let coeffs = BiquadCoeffs::calculate(FilterType::Peaking, 48000.0, 1000.0, 6.0, 1.0);
        assert!((coeffs.magnitude_db(1000.0, 48000.0) - 6.0).abs() < 0.01);
    }

    #[test]
    fn test_low_shelf_response() {
        let coeffs = BiquadCoeffs::calculate(FilterType::LowShelf, 48000.0, 120.0, 6.0, SHELF_Q);
        assert!((coeffs.magnitude_db(20.0, 48000.0) - 6.0).abs() < 0.3);
        assert!(coeffs.magnitude_db(5000.0, 48000.0).abs() < 0.1);
    }

    #[test]
    fn test_high_shelf_response() {
        let coeffs = BiquadCoeffs::calculate(FilterType::HighShelf, 48000.0, 8000.0, -6.0, SHELF_Q);
        assert!((coeffs.magnitude_db(20000.0, 48000.0) + 6.0).abs() < 0.5);
        assert!(coeffs.magnitude_db(100.0, 48000.0).abs() < 0.1);
    }

    #[test]
    fn test_low_pass_attenuates_highs() {
        let coeffs = BiquadCoeffs::calculate(FilterType::LowPass, 48000.0, 2200.0, 0.0, LOWPASS_Q);
        assert!((coeffs.magnitude_db(2200.0, 48000.0) + 3.01).abs() < 0.1);
        assert!(coeffs.magnitude_db(12000.0, 48000.0) < -20.0);
    }

    #[test]
    fn test_flat_filter_is_transparent() {
        let mut filter = BiquadFilter::peaking("Vocal Presence", 2500.0, SR);
        let mut buffer = create_sine_buffer(2500.0, SR, RENDER_QUANTUM);
        let original = buffer.clone();
        filter.process(&mut buffer);
        assert_eq!(buffer, original, "0 dB filter should bypass");
    }

    #[test]
    fn test_processed_gain_matches_response() {
        let mut filter = BiquadFilter::peaking("Vocal Presence", 2500.0, SR);
        filter.gain_mut().set_value(6.0);
        let gain = measure_gain_db(&mut filter, 2500.0);
        assert!((gain - 6.0).abs() < 0.2, "Expected +6 dB, got {:.2}", gain);
    }

    #[test]
    fn test_gain_ramp_moves_gradually() {
        let mut filter = BiquadFilter::low_shelf("Bass", 120.0, SR);
        filter.gain_mut().set_target(12.0, 0.1);

        let mut block = create_sine_buffer(60.0, SR, RENDER_QUANTUM);
        filter.process(&mut block);

        let gain = filter.gain().value();
        assert!(gain > 0.0 && gain < 1.0, "Gain should only begin to move, got {}", gain);
    }

    #[test]
    fn test_frequency_clamped_below_nyquist() {
        let filter = BiquadFilter::high_shelf("HD Air", 12000.0, 8000);
        assert!(filter.frequency().value() <= 4000.0);
        assert!(filter.coeffs().b0.is_finite());
    }

    #[test]
    fn test_reset_clears_state() {
        let mut filter = BiquadFilter::low_pass("Air Absorption", 1000.0, SR);
        let mut buffer = create_sine_buffer(500.0, SR, RENDER_QUANTUM);
        filter.process(&mut buffer);
        filter.reset();

        let mut silence = AudioBuffer::with_sample_rate(RENDER_QUANTUM, ChannelLayout::Stereo, SR);
        filter.process(&mut silence);
        assert!(silence.samples.iter().flatten().all(|&s| s == 0.0));
    }

    #[test]
    fn test_node_identity() {
        let filter = BiquadFilter::high_shelf("Treble", 8000.0, SR);
        assert_eq!(filter.node_type(), "highshelf");
        assert_eq!(filter.display_name(), "Treble");
    }
}
