use log::warn;

use super::analysis_interface::ToneMetrics;
use super::config::AnalysisConfig;
use super::error::{AnalysisError, Result};
use super::SampleFrame;

/// Time-domain analysis: loudness, silence, pitch, clarity and SNR.
///
/// Pitch comes from the normalized autocorrelation of the DC-removed frame. The height of
/// the chosen autocorrelation peak doubles as the periodicity estimate behind both clarity
/// and SNR, so a noisy frame reads as unclear and noisy in the same tick.
pub struct ToneAnalyzer {
    silence_rms_threshold: f32,
    volume_floor_db: f32,
    min_pitch_hz: f32,
    max_pitch_hz: f32,
    pitch_peak_fraction: f32,
    noise_floor_rms: f32,
    snr_limit_db: f32,
}

struct PitchEstimate {
    frequency_hz: f32,
    periodicity: f32, // 0.0-1.0
}

impl ToneAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            silence_rms_threshold: config.silence_rms_threshold,
            volume_floor_db: config.volume_floor_db,
            min_pitch_hz: config.min_pitch_hz,
            max_pitch_hz: config.max_pitch_hz,
            pitch_peak_fraction: config.pitch_peak_fraction,
            noise_floor_rms: config.noise_floor_rms,
            snr_limit_db: config.snr_limit_db,
        }
    }

    pub fn analyze(&self, frame: &SampleFrame) -> Result<ToneMetrics> {
        if frame.is_empty() {
            return Err(AnalysisError::InvalidFrameLength { len: 0 });
        }
        if frame.sample_rate_hz() == 0 {
            return Err(AnalysisError::InvalidSampleRate);
        }

        let samples = frame.samples();
        let mean = samples.iter().map(|&x| x as f64).sum::<f64>() / samples.len() as f64;
        let centered: Vec<f32> = samples.iter().map(|&x| (x as f64 - mean) as f32).collect();

        let power = (centered.iter().map(|&x| x as f64 * x as f64).sum::<f64>()
            / centered.len() as f64) as f32;
        if !power.is_finite() {
            // NaN or out-of-range samples carry no usable measurement
            warn!("Frame with non-finite energy, reporting it as silence");
            return Ok(ToneMetrics {
                pitch_hz: 0.0,
                volume: 0.0,
                clarity: 0.0,
                is_silence: true,
                snr_db: 0.0,
            });
        }
        let rms = power.sqrt();
        let is_silence = rms < self.silence_rms_threshold;

        let estimate = if is_silence {
            None
        } else {
            self.detect_pitch(&centered, frame.sample_rate_hz())
        };
        let (pitch_hz, periodicity) = estimate
            .map(|e| (e.frequency_hz, e.periodicity))
            .unwrap_or((0.0, 0.0));

        Ok(ToneMetrics {
            pitch_hz,
            volume: self.volume_from_rms(rms),
            clarity: (periodicity * 100.0).clamp(0.0, 100.0),
            is_silence,
            snr_db: self.estimate_snr(power, periodicity),
        })
    }

    /// Maps RMS to 0-100 on a dBFS scale: `volume_floor_db` and below is 0, full scale is 100.
    fn volume_from_rms(&self, rms: f32) -> f32 {
        if rms <= 0.0 {
            return 0.0;
        }
        let db = 20.0 * rms.log10();
        ((db - self.volume_floor_db) / -self.volume_floor_db * 100.0).clamp(0.0, 100.0)
    }

    /// The aperiodic share of the power is treated as noise, never below the fixed floor.
    fn estimate_snr(&self, power: f32, periodicity: f32) -> f32 {
        let noise_floor_power = self.noise_floor_rms * self.noise_floor_rms;
        let noise_power = ((1.0 - periodicity) * power).max(noise_floor_power);
        let snr = 10.0 * (power.max(f32::MIN_POSITIVE) / noise_power).log10();
        snr.clamp(-self.snr_limit_db, self.snr_limit_db)
    }

    fn detect_pitch(&self, samples: &[f32], sample_rate: u32) -> Option<PitchEstimate> {
        let n = samples.len();
        let min_lag = ((sample_rate as f32 / self.max_pitch_hz).floor() as usize).max(1);
        let max_lag = ((sample_rate as f32 / self.min_pitch_hz).ceil() as usize).min(n / 2);
        if min_lag >= max_lag {
            return None;
        }

        let nccf = normalized_autocorrelation(samples, min_lag - 1, max_lag + 1);
        let at = |lag: usize| nccf[lag - (min_lag - 1)];

        let global_max = (min_lag..=max_lag).map(at).fold(f32::MIN, f32::max);
        if global_max <= 0.0 {
            return None;
        }

        // The first strong local peak is the fundamental; later peaks at multiples of the
        // period are sub-octaves.
        let threshold = global_max * self.pitch_peak_fraction;
        let best_lag = (min_lag..=max_lag)
            .find(|&lag| {
                let r = at(lag);
                r >= threshold && r >= at(lag - 1) && r >= at(lag + 1)
            })
            .or_else(|| (min_lag..=max_lag).max_by(|&a, &b| at(a).total_cmp(&at(b))))?;

        let (left, peak, right) = (at(best_lag - 1), at(best_lag), at(best_lag + 1));
        let curvature = left - 2.0 * peak + right;
        let shift = if curvature.abs() > f32::EPSILON {
            (0.5 * (left - right) / curvature).clamp(-0.5, 0.5)
        } else {
            0.0
        };
        let refined_peak = peak - 0.25 * (left - right) * shift;

        Some(PitchEstimate {
            frequency_hz: sample_rate as f32 / (best_lag as f32 + shift),
            periodicity: refined_peak.clamp(0.0, 1.0),
        })
    }
}

/// Normalized cross-correlation of the frame with itself for lags `first..=last`.
///
/// Each lag is normalized by the energy of the two overlapping segments, so a perfectly
/// periodic signal scores 1.0 at its period regardless of amplitude.
fn normalized_autocorrelation(samples: &[f32], first: usize, last: usize) -> Vec<f32> {
    let n = samples.len();

    let mut prefix_energy = Vec::with_capacity(n + 1);
    prefix_energy.push(0.0f64);
    for &x in samples {
        let previous = prefix_energy[prefix_energy.len() - 1];
        prefix_energy.push(previous + (x as f64) * (x as f64));
    }

    (first..=last)
        .map(|lag| {
            if lag >= n {
                return 0.0;
            }
            let cross: f64 = samples[..n - lag]
                .iter()
                .zip(&samples[lag..])
                .map(|(&a, &b)| a as f64 * b as f64)
                .sum();
            let head_energy = prefix_energy[n - lag];
            let tail_energy = prefix_energy[n] - prefix_energy[lag];
            let denominator = (head_energy * tail_energy).sqrt();
            if denominator > 0.0 {
                (cross / denominator) as f32
            } else {
                0.0
            }
        })
        .collect()
}
