use super::analysis_interface::TimbreFeatures;
use super::config::AnalysisConfig;
use super::fft::SpectralTransform;

/// Derives timbre descriptors from a magnitude spectrum.
///
/// All descriptors are computed over the meaningful bins (DC through Nyquist) and use the
/// plain magnitude sum as "energy", so centroid, rolloff and harmonic ratio share one scale.
pub struct TimbreExtractor {
    rolloff_fraction: f32,
    harmonic_count: usize,
    harmonic_tolerance_bins: usize,
    fallback_fundamental_hz: Option<f32>,
    flatness_epsilon: f32,
}

impl TimbreExtractor {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            rolloff_fraction: config.rolloff_fraction,
            harmonic_count: config.harmonic_count,
            harmonic_tolerance_bins: config.harmonic_tolerance_bins,
            fallback_fundamental_hz: config.fallback_fundamental_hz,
            flatness_epsilon: config.flatness_epsilon,
        }
    }

    /// Extract timbre features.
    ///
    /// `fundamental_hz` is the pitch measured for the same tick. When it is missing (silent
    /// or unvoiced frame) the configured fallback is used; without a fallback the harmonic
    /// ratio is 0.
    pub fn extract(
        &self,
        transform: &SpectralTransform,
        sample_rate_hz: u32,
        fundamental_hz: Option<f32>,
    ) -> TimbreFeatures {
        let spectrum = transform.meaningful();
        if spectrum.is_empty() || sample_rate_hz == 0 {
            return TimbreFeatures::default();
        }

        let bin_width = sample_rate_hz as f32 / transform.len() as f32;
        let total_energy: f32 = spectrum.iter().sum();
        if !(total_energy > 0.0 && total_energy.is_finite()) {
            return TimbreFeatures::default();
        }

        let usable = |f: &f32| f.is_finite() && *f > 0.0;
        let fundamental = fundamental_hz
            .filter(usable)
            .or(self.fallback_fundamental_hz.filter(usable));

        TimbreFeatures {
            spectral_centroid: self.calculate_spectral_centroid(spectrum, bin_width, total_energy),
            spectral_flatness: self.calculate_spectral_flatness(spectrum, total_energy),
            spectral_rolloff: self.calculate_spectral_rolloff(spectrum, bin_width, total_energy),
            harmonic_ratio: fundamental
                .map(|f0| self.calculate_harmonic_ratio(spectrum, bin_width, total_energy, f0))
                .unwrap_or(0.0),
        }
    }

    fn calculate_spectral_centroid(&self, spectrum: &[f32], bin_width: f32, total_energy: f32) -> f32 {
        let weighted_sum: f32 = spectrum
            .iter()
            .enumerate()
            .map(|(i, &magnitude)| i as f32 * bin_width * magnitude)
            .sum();

        weighted_sum / total_energy
    }

    // Epsilon is added to every bin so empty bins pull the geometric mean down instead of
    // being skipped.
    fn calculate_spectral_flatness(&self, spectrum: &[f32], total_energy: f32) -> f32 {
        let n = spectrum.len() as f64;
        let epsilon = self.flatness_epsilon as f64;

        let log_mean = spectrum
            .iter()
            .map(|&m| (m as f64 + epsilon).ln())
            .sum::<f64>()
            / n;
        let geometric_mean = log_mean.exp();
        let arithmetic_mean = (total_energy as f64 + epsilon * n) / n;

        ((geometric_mean / arithmetic_mean) as f32).clamp(0.0, 1.0)
    }

    fn calculate_spectral_rolloff(&self, spectrum: &[f32], bin_width: f32, total_energy: f32) -> f32 {
        let threshold = total_energy * self.rolloff_fraction;
        let mut cumulative_energy = 0.0;

        for (i, &magnitude) in spectrum.iter().enumerate() {
            cumulative_energy += magnitude;
            if cumulative_energy >= threshold {
                return i as f32 * bin_width;
            }
        }

        // Rounding can leave the sum a hair short of the threshold
        (spectrum.len() - 1) as f32 * bin_width
    }

    fn calculate_harmonic_ratio(
        &self,
        spectrum: &[f32],
        bin_width: f32,
        total_energy: f32,
        fundamental_hz: f32,
    ) -> f32 {
        let last_bin = spectrum.len() - 1;
        let tolerance = self.harmonic_tolerance_bins;
        let mut counted = vec![false; spectrum.len()];

        for harmonic in 1..=self.harmonic_count {
            let center = (harmonic as f32 * fundamental_hz / bin_width).round() as usize;
            if center.saturating_sub(tolerance) > last_bin {
                break;
            }
            let start = center.saturating_sub(tolerance);
            let end = center.saturating_add(tolerance).min(last_bin);
            for flag in &mut counted[start..=end] {
                *flag = true;
            }
        }

        let harmonic_energy: f32 = spectrum
            .iter()
            .zip(counted.iter())
            .filter(|(_, &counted)| counted)
            .map(|(&magnitude, _)| magnitude)
            .sum();

        (harmonic_energy / total_energy).clamp(0.0, 1.0)
    }
}
