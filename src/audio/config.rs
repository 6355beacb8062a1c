use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::error::{AnalysisError, Result};

/// SNR cutoff below which a voiced tick is flagged as low quality.
///
/// Consumers derive the same flag from `snr < 10 && !isSilence`, so the value must not drift.
pub const LOW_QUALITY_SNR_DB: f32 = 10.0;

/// Window applied to a frame before the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    /// No windowing; the transform sees the raw samples.
    Rectangular,
    Hann,
}

/// Every threshold and size the engine uses.
///
/// Created once when a session starts and threaded through the analyzers. Values can be
/// loaded from and saved to JSON so a deployment can tune them without rebuilding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    // Framing
    pub fft_size: usize,
    pub sample_rate: u32,
    pub capture_interval_ms: u64,
    pub window: WindowKind,

    // Loudness and silence
    pub silence_rms_threshold: f32,
    pub volume_floor_db: f32,

    // Pitch search
    pub min_pitch_hz: f32,
    pub max_pitch_hz: f32,
    pub pitch_peak_fraction: f32,

    // Signal-to-noise
    pub noise_floor_rms: f32,
    pub snr_limit_db: f32,
    pub snr_quality_threshold_db: f32,

    // Timbre
    pub analyze_timbre: bool,
    pub rolloff_fraction: f32,
    pub harmonic_count: usize,
    pub harmonic_tolerance_bins: usize,
    pub fallback_fundamental_hz: Option<f32>,
    pub flatness_epsilon: f32,

    // Streaming
    pub tick_budget_ms: u64,
    pub frame_queue_capacity: usize,
    pub event_queue_capacity: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            sample_rate: 44100,
            capture_interval_ms: 100,
            window: WindowKind::Hann,

            silence_rms_threshold: 0.01, // about -40 dBFS
            volume_floor_db: -60.0,

            // Covers bass through soprano with some headroom
            min_pitch_hz: 60.0,
            max_pitch_hz: 1200.0,
            pitch_peak_fraction: 0.9,

            noise_floor_rms: 1e-4,
            snr_limit_db: 100.0,
            snr_quality_threshold_db: LOW_QUALITY_SNR_DB,

            analyze_timbre: true,
            rolloff_fraction: 0.85,
            harmonic_count: 5,
            harmonic_tolerance_bins: 2,
            fallback_fundamental_hz: None,
            flatness_epsilon: 1e-10,

            tick_budget_ms: 100,
            frame_queue_capacity: 8,
            event_queue_capacity: 64,
        }
    }
}

impl AnalysisConfig {
    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: AnalysisConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.fft_size == 0 || !self.fft_size.is_power_of_two() {
            return Err(AnalysisError::InvalidConfig(format!(
                "fft_size {} is not a power of two",
                self.fft_size
            )));
        }
        if self.sample_rate == 0 {
            return Err(AnalysisError::InvalidSampleRate);
        }
        if self.capture_interval_ms == 0 {
            return Err(AnalysisError::InvalidConfig(
                "capture_interval_ms must be greater than zero".into(),
            ));
        }
        if !(self.min_pitch_hz > 0.0 && self.min_pitch_hz < self.max_pitch_hz) {
            return Err(AnalysisError::InvalidConfig(format!(
                "pitch range {}..{} Hz is empty",
                self.min_pitch_hz, self.max_pitch_hz
            )));
        }
        if !(0.0..=1.0).contains(&self.pitch_peak_fraction) {
            return Err(AnalysisError::InvalidConfig(
                "pitch_peak_fraction must be within 0..=1".into(),
            ));
        }
        if !(self.rolloff_fraction > 0.0 && self.rolloff_fraction <= 1.0) {
            return Err(AnalysisError::InvalidConfig(
                "rolloff_fraction must be within (0, 1]".into(),
            ));
        }
        if !(self.volume_floor_db < 0.0 && self.volume_floor_db.is_finite()) {
            return Err(AnalysisError::InvalidConfig(
                "volume_floor_db must be finite and negative".into(),
            ));
        }
        if !(self.noise_floor_rms > 0.0 && self.noise_floor_rms.is_finite())
            || !(self.flatness_epsilon > 0.0 && self.flatness_epsilon.is_finite())
        {
            return Err(AnalysisError::InvalidConfig(
                "noise_floor_rms and flatness_epsilon must be positive".into(),
            ));
        }
        if !(self.silence_rms_threshold >= 0.0 && self.silence_rms_threshold.is_finite()) {
            return Err(AnalysisError::InvalidConfig(format!(
                "silence_rms_threshold {} must be finite and not negative",
                self.silence_rms_threshold
            )));
        }
        if !(self.snr_limit_db > 0.0 && self.snr_limit_db.is_finite()) {
            return Err(AnalysisError::InvalidConfig(format!(
                "snr_limit_db {} must be finite and positive",
                self.snr_limit_db
            )));
        }
        if !self.snr_quality_threshold_db.is_finite() {
            return Err(AnalysisError::InvalidConfig(
                "snr_quality_threshold_db must be finite".into(),
            ));
        }
        if let Some(fallback) = self.fallback_fundamental_hz {
            if !(fallback > 0.0 && fallback.is_finite()) {
                return Err(AnalysisError::InvalidConfig(format!(
                    "fallback_fundamental_hz {} must be finite and positive",
                    fallback
                )));
            }
        }
        if self.harmonic_tolerance_bins > self.fft_size / 2 {
            return Err(AnalysisError::InvalidConfig(format!(
                "harmonic_tolerance_bins {} exceeds the {} spectrum bins",
                self.harmonic_tolerance_bins,
                self.fft_size / 2
            )));
        }
        if self.frame_queue_capacity == 0 || self.event_queue_capacity == 0 {
            return Err(AnalysisError::InvalidConfig(
                "queue capacities must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Number of new samples between consecutive frames at the given rate.
    pub fn hop_size(&self, sample_rate: u32) -> usize {
        ((sample_rate as u64 * self.capture_interval_ms) / 1000).max(1) as usize
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }

    /// Longest a tick may take before its result is considered stale.
    pub fn tick_budget(&self) -> Duration {
        Duration::from_millis(self.tick_budget_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.snr_quality_threshold_db, 10.0);
        assert_eq!(config.hop_size(44100), 4410);
        assert_eq!(config.hop_size(48000), 4800);
    }

    #[test]
    fn test_rejects_non_power_of_two_frames() {
        let config = AnalysisConfig {
            fft_size: 2000,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AnalysisError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_inverted_pitch_range() {
        let config = AnalysisConfig {
            min_pitch_hz: 800.0,
            max_pitch_hz: 200.0,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_sample_rate() {
        let config = AnalysisConfig {
            sample_rate: 0,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AnalysisError::InvalidSampleRate)
        ));
    }

    #[test]
    fn test_rejects_values_that_break_tick_math() {
        let cases = [
            AnalysisConfig { snr_limit_db: -1.0, ..AnalysisConfig::default() },
            AnalysisConfig { snr_limit_db: 0.0, ..AnalysisConfig::default() },
            AnalysisConfig { snr_limit_db: f32::NAN, ..AnalysisConfig::default() },
            AnalysisConfig { snr_limit_db: f32::INFINITY, ..AnalysisConfig::default() },
            AnalysisConfig { silence_rms_threshold: -0.01, ..AnalysisConfig::default() },
            AnalysisConfig { silence_rms_threshold: f32::NAN, ..AnalysisConfig::default() },
            AnalysisConfig { fallback_fundamental_hz: Some(0.0), ..AnalysisConfig::default() },
            AnalysisConfig { fallback_fundamental_hz: Some(-110.0), ..AnalysisConfig::default() },
            AnalysisConfig { fallback_fundamental_hz: Some(f32::NAN), ..AnalysisConfig::default() },
            AnalysisConfig { harmonic_tolerance_bins: usize::MAX, ..AnalysisConfig::default() },
            AnalysisConfig { harmonic_tolerance_bins: 1025, ..AnalysisConfig::default() },
            AnalysisConfig { volume_floor_db: f32::NAN, ..AnalysisConfig::default() },
            AnalysisConfig { noise_floor_rms: f32::INFINITY, ..AnalysisConfig::default() },
            AnalysisConfig { snr_quality_threshold_db: f32::NAN, ..AnalysisConfig::default() },
        ];

        for config in cases {
            assert!(
                matches!(config.validate(), Err(AnalysisError::InvalidConfig(_))),
                "accepted {:?}",
                config
            );
        }
    }

    #[test]
    fn test_accepts_edge_values_that_are_still_usable() {
        let config = AnalysisConfig {
            silence_rms_threshold: 0.0,
            fallback_fundamental_hz: Some(110.0),
            harmonic_tolerance_bins: 1024,
            snr_limit_db: 1.0,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{ "fft_size": 4096, "window": "rectangular" }"#).unwrap();
        assert_eq!(config.fft_size, 4096);
        assert_eq!(config.window, WindowKind::Rectangular);
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.fallback_fundamental_hz, None);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.json");

        let config = AnalysisConfig {
            silence_rms_threshold: 0.02,
            fallback_fundamental_hz: Some(220.0),
            ..AnalysisConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = AnalysisConfig::load(&path).unwrap();
        assert_eq!(loaded.silence_rms_threshold, 0.02);
        assert_eq!(loaded.fallback_fundamental_hz, Some(220.0));
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "fft_size": 1000 }"#).unwrap();
        assert!(AnalysisConfig::load(&path).is_err());
    }
}
