use rustfft::num_complex::Complex;

use super::config::{AnalysisConfig, WindowKind};
use super::error::{AnalysisError, Result};
use super::SampleFrame;

/// Magnitude spectrum of one frame.
///
/// Holds all N bins; bin `i` sits at `i * sample_rate_hz / N`. Only bins `0..=N/2` carry
/// information for real input, see [`SpectralTransform::meaningful`].
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralTransform {
    magnitudes: Vec<f32>,
    sample_rate_hz: u32,
}

impl SpectralTransform {
    pub fn new(magnitudes: Vec<f32>, sample_rate_hz: u32) -> Self {
        Self {
            magnitudes,
            sample_rate_hz,
        }
    }

    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    /// Bins from DC up to and including Nyquist.
    pub fn meaningful(&self) -> &[f32] {
        if self.magnitudes.is_empty() {
            return &[];
        }
        &self.magnitudes[..=self.magnitudes.len() / 2]
    }

    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn bin_width(&self) -> f32 {
        if self.magnitudes.is_empty() {
            return 0.0;
        }
        self.sample_rate_hz as f32 / self.magnitudes.len() as f32
    }

    pub fn frequency_of(&self, bin: usize) -> f32 {
        bin as f32 * self.bin_width()
    }

    /// Strongest meaningful bin, if any.
    pub fn peak_bin(&self) -> Option<usize> {
        self.meaningful()
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
    }
}

/// Radix-2 Cooley-Tukey transform with a precomputed window and twiddle table.
///
/// The tables are built for the configured frame size. Frames of another power-of-two
/// length are still accepted; their tables are computed on the spot.
pub struct TransformEngine {
    size: usize,
    window_kind: WindowKind,
    window: Vec<f32>,
    twiddles: Vec<Complex<f32>>,
}

impl TransformEngine {
    pub fn new(size: usize, window_kind: WindowKind) -> Result<Self> {
        if size == 0 || !size.is_power_of_two() {
            return Err(AnalysisError::InvalidFrameLength { len: size });
        }

        Ok(Self {
            size,
            window_kind,
            window: window_coefficients(window_kind, size),
            twiddles: twiddle_factors(size),
        })
    }

    pub fn from_config(config: &AnalysisConfig) -> Result<Self> {
        Self::new(config.fft_size, config.window)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn window_kind(&self) -> WindowKind {
        self.window_kind
    }

    pub fn transform(&self, frame: &SampleFrame) -> Result<SpectralTransform> {
        let len = frame.len();
        if len == 0 || !len.is_power_of_two() {
            return Err(AnalysisError::InvalidFrameLength { len });
        }
        if frame.sample_rate_hz() == 0 {
            return Err(AnalysisError::InvalidSampleRate);
        }

        let mut buffer = if len == self.size {
            windowed(frame.samples(), &self.window)
        } else {
            windowed(frame.samples(), &window_coefficients(self.window_kind, len))
        };

        if len == self.size {
            fft_in_place(&mut buffer, &self.twiddles);
        } else {
            fft_in_place(&mut buffer, &twiddle_factors(len));
        }

        let magnitudes = buffer
            .iter()
            .map(|c| (c.re * c.re + c.im * c.im).sqrt())
            .collect();

        Ok(SpectralTransform::new(magnitudes, frame.sample_rate_hz()))
    }
}

fn windowed(samples: &[f32], window: &[f32]) -> Vec<Complex<f32>> {
    samples
        .iter()
        .zip(window.iter())
        .map(|(&x, &w)| Complex::new(x * w, 0.0))
        .collect()
}

fn window_coefficients(kind: WindowKind, size: usize) -> Vec<f32> {
    match kind {
        WindowKind::Rectangular => vec![1.0; size],
        // A one-sample Hann window would divide by zero
        WindowKind::Hann if size <= 1 => vec![1.0; size],
        WindowKind::Hann => (0..size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32;
                0.5 * (1.0 - phase.cos())
            })
            .collect(),
    }
}

/// `e^{-2πik/N}` for `k` in `0..N/2`, computed in f64 to keep the table accurate.
fn twiddle_factors(size: usize) -> Vec<Complex<f32>> {
    (0..size / 2)
        .map(|k| {
            let angle = -2.0 * std::f64::consts::PI * k as f64 / size as f64;
            Complex::new(angle.cos() as f32, angle.sin() as f32)
        })
        .collect()
}

/// In-place forward FFT. `buffer.len()` must be a power of two and `twiddles` the table
/// for that length.
fn fft_in_place(buffer: &mut [Complex<f32>], twiddles: &[Complex<f32>]) {
    let n = buffer.len();
    if n <= 1 {
        return;
    }

    let bits = n.trailing_zeros();
    for i in 0..n {
        let j = i.reverse_bits() >> (usize::BITS - bits);
        if j > i {
            buffer.swap(i, j);
        }
    }

    let mut span = 2;
    while span <= n {
        let half = span / 2;
        let stride = n / span;
        for start in (0..n).step_by(span) {
            for k in 0..half {
                let even = buffer[start + k];
                let odd = buffer[start + k + half] * twiddles[k * stride];
                buffer[start + k] = even + odd;
                buffer[start + k + half] = even - odd;
            }
        }
        span <<= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_support::sine_frame;
    use rustfft::FftPlanner;

    fn rectangular(size: usize) -> TransformEngine {
        TransformEngine::new(size, WindowKind::Rectangular).unwrap()
    }

    #[test]
    fn test_power_of_two_invariant() {
        let engine = TransformEngine::new(2048, WindowKind::Hann).unwrap();

        for len in [3usize, 2049, 0, 1000] {
            let frame = SampleFrame::new(vec![0.1; len], 44100);
            assert!(matches!(
                engine.transform(&frame),
                Err(AnalysisError::InvalidFrameLength { len: l }) if l == len
            ));
        }

        let frame = SampleFrame::new(vec![0.1; 2048], 44100);
        assert_eq!(engine.transform(&frame).unwrap().len(), 2048);
    }

    #[test]
    fn test_rejects_non_power_of_two_plan() {
        assert!(TransformEngine::new(1000, WindowKind::Hann).is_err());
        assert!(TransformEngine::new(0, WindowKind::Hann).is_err());
    }

    #[test]
    fn test_zero_sample_rate_is_rejected() {
        let engine = rectangular(8);
        let frame = SampleFrame::new(vec![0.0; 8], 0);
        assert!(matches!(
            engine.transform(&frame),
            Err(AnalysisError::InvalidSampleRate)
        ));
    }

    #[test]
    fn test_single_sample_is_identity() {
        let engine = TransformEngine::new(1, WindowKind::Hann).unwrap();
        let frame = SampleFrame::new(vec![-0.75], 8000);
        let spectrum = engine.transform(&frame).unwrap();
        assert_eq!(spectrum.magnitudes(), &[0.75]);
    }

    #[test]
    fn test_matches_reference_fft() {
        let size = 256;
        let engine = rectangular(size);
        let samples: Vec<f32> = (0..size)
            .map(|i| ((i * 7919) % 97) as f32 / 97.0 - 0.5)
            .collect();

        let mut reference: Vec<Complex<f32>> =
            samples.iter().map(|&x| Complex::new(x, 0.0)).collect();
        FftPlanner::new().plan_fft_forward(size).process(&mut reference);

        let spectrum = engine
            .transform(&SampleFrame::new(samples, 44100))
            .unwrap();
        for (ours, theirs) in spectrum.magnitudes().iter().zip(reference.iter()) {
            assert!((ours - theirs.norm()).abs() < 1e-3, "{} vs {}", ours, theirs.norm());
        }
    }

    #[test]
    fn test_other_power_of_two_sizes_use_fresh_tables() {
        let engine = rectangular(2048);
        let frame = SampleFrame::new(vec![0.5; 64], 8000);
        let spectrum = engine.transform(&frame).unwrap();

        assert_eq!(spectrum.len(), 64);
        assert!((spectrum.magnitudes()[0] - 32.0).abs() < 1e-4);
        assert!(spectrum.magnitudes()[1..].iter().all(|&m| m < 1e-4));
    }

    #[test]
    fn test_silence_and_constant_frames_stay_finite() {
        for kind in [WindowKind::Hann, WindowKind::Rectangular] {
            let engine = TransformEngine::new(1024, kind).unwrap();

            let silent = engine.transform(&SampleFrame::new(vec![0.0; 1024], 44100)).unwrap();
            assert!(silent.magnitudes().iter().all(|&m| m == 0.0));

            let constant = engine.transform(&SampleFrame::new(vec![0.3; 1024], 44100)).unwrap();
            assert!(constant.magnitudes().iter().all(|m| m.is_finite()));
        }
    }

    #[test]
    fn test_sine_peak_within_one_bin() {
        let engine = TransformEngine::new(2048, WindowKind::Hann).unwrap();

        for frequency in [110.0, 440.0, 1234.5, 5000.0, 15000.0] {
            let spectrum = engine
                .transform(&sine_frame(frequency, 0.5, 2048, 44100))
                .unwrap();
            let peak = spectrum.peak_bin().unwrap();
            let peak_hz = spectrum.frequency_of(peak);
            assert!(
                (peak_hz - frequency).abs() <= spectrum.bin_width(),
                "peak at {} Hz for a {} Hz sine",
                peak_hz,
                frequency
            );
        }
    }

    #[test]
    fn test_meaningful_bins_stop_at_nyquist() {
        let engine = rectangular(16);
        let spectrum = engine.transform(&SampleFrame::new(vec![0.0; 16], 16000)).unwrap();
        assert_eq!(spectrum.meaningful().len(), 9);
        assert_eq!(spectrum.frequency_of(8), 8000.0);
        assert_eq!(spectrum.bin_width(), 1000.0);
    }
}
