use serde::{Deserialize, Serialize};

use super::analysis_interface::AnalysisResult;
use super::processor::StreamEvent;

/// Running statistics over a session's published events.
///
/// Pitch statistics only cover voiced ticks (not silent, pitch found); the loudness and
/// clarity means cover every analysed tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSummary {
    pub analysed_ticks: usize,
    pub voiced_ticks: usize,
    pub silent_ticks: usize,
    pub low_quality_ticks: usize,
    pub failed_ticks: usize,

    pub min_pitch_hz: Option<f32>,
    pub max_pitch_hz: Option<f32>,
    pub mean_pitch_hz: Option<f32>,

    pub mean_volume: f32,
    pub mean_clarity: f32,
    pub mean_snr_db: f32,

    #[serde(skip)]
    pitch_sum: f64,
    #[serde(skip)]
    volume_sum: f64,
    #[serde(skip)]
    clarity_sum: f64,
    #[serde(skip)]
    snr_sum: f64,
}

impl SessionSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Analysis(result) => self.record(result),
            StreamEvent::TickFailed { .. } => self.failed_ticks += 1,
            StreamEvent::SourceLost(_) | StreamEvent::Ended => {}
        }
    }

    pub fn record(&mut self, result: &AnalysisResult) {
        let tone = &result.tone;
        self.analysed_ticks += 1;

        if tone.is_silence {
            self.silent_ticks += 1;
        } else if tone.pitch_hz > 0.0 {
            self.voiced_ticks += 1;
            self.pitch_sum += tone.pitch_hz as f64;
            self.min_pitch_hz = Some(self.min_pitch_hz.map_or(tone.pitch_hz, |m| m.min(tone.pitch_hz)));
            self.max_pitch_hz = Some(self.max_pitch_hz.map_or(tone.pitch_hz, |m| m.max(tone.pitch_hz)));
            self.mean_pitch_hz = Some((self.pitch_sum / self.voiced_ticks as f64) as f32);
        }
        if result.low_quality {
            self.low_quality_ticks += 1;
        }

        self.volume_sum += tone.volume as f64;
        self.clarity_sum += tone.clarity as f64;
        self.snr_sum += tone.snr_db as f64;

        let n = self.analysed_ticks as f64;
        self.mean_volume = (self.volume_sum / n) as f32;
        self.mean_clarity = (self.clarity_sum / n) as f32;
        self.mean_snr_db = (self.snr_sum / n) as f32;
    }

    /// Share of analysed ticks that were voiced, 0.0-1.0.
    pub fn voiced_fraction(&self) -> f32 {
        if self.analysed_ticks == 0 {
            return 0.0;
        }
        self.voiced_ticks as f32 / self.analysed_ticks as f32
    }
}
