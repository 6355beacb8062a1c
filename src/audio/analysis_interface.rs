use serde::{Deserialize, Serialize};

/// Time-domain metrics for one tick.
///
/// # Ranges
/// - `pitch_hz`: 0.0 when silent or unvoiced, otherwise the dominant period in Hz
/// - `volume`: 0.0 to 100.0
/// - `clarity`: 0.0 to 100.0 (periodicity strength)
/// - `snr_db`: may be negative
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToneMetrics {
    #[serde(rename = "pitch")]
    pub pitch_hz: f32,
    pub volume: f32,
    pub clarity: f32,
    pub is_silence: bool,
    #[serde(rename = "snr")]
    pub snr_db: f32,
}

/// Spectral descriptors for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimbreFeatures {
    pub spectral_centroid: f32,  // Hz
    pub spectral_flatness: f32,  // 0.0-1.0
    pub spectral_rolloff: f32,   // Hz
    pub harmonic_ratio: f32,     // 0.0-1.0
}

/// Nearest equal-tempered note for a pitch, referenced to A4 = 440 Hz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchNote {
    pub name: String,
    pub octave: i32,
    pub midi: i32,
    /// Deviation from the note, -50.0 to +50.0
    pub cents: f32,
}

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

impl PitchNote {
    pub fn from_frequency(frequency_hz: f32) -> Option<Self> {
        if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
            return None;
        }

        let midi_exact = 69.0 + 12.0 * (frequency_hz / 440.0).log2();
        let midi = midi_exact.round() as i32;

        Some(Self {
            name: NOTE_NAMES[midi.rem_euclid(12) as usize].to_string(),
            octave: midi.div_euclid(12) - 1,
            midi,
            cents: (midi_exact - midi as f32) * 100.0,
        })
    }
}

impl std::fmt::Display for PitchNote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{} ({:+.0}c)", self.name, self.octave, self.cents)
    }
}

/// What the engine publishes for each successful tick.
///
/// Serializes to the consumer contract:
/// `{ tick, pitch, volume, clarity, isSilence, snr, lowQuality, timbre?, note? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub tick: u64,
    #[serde(flatten)]
    pub tone: ToneMetrics,
    pub low_quality: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timbre: Option<TimbreFeatures>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<PitchNote>,
}

impl AnalysisResult {
    pub fn new(
        tick: u64,
        tone: ToneMetrics,
        timbre: Option<TimbreFeatures>,
        snr_quality_threshold_db: f32,
    ) -> Self {
        let note = if tone.is_silence {
            None
        } else {
            PitchNote::from_frequency(tone.pitch_hz)
        };

        Self {
            tick,
            tone,
            low_quality: is_low_quality(tone.snr_db, tone.is_silence, snr_quality_threshold_db),
            timbre,
            note,
        }
    }
}

/// The quality gate: a voiced tick whose SNR is under the threshold.
pub fn is_low_quality(snr_db: f32, is_silence: bool, threshold_db: f32) -> bool {
    snr_db < threshold_db && !is_silence
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::config::LOW_QUALITY_SNR_DB;

    fn tone(pitch_hz: f32, is_silence: bool, snr_db: f32) -> ToneMetrics {
        ToneMetrics {
            pitch_hz,
            volume: 50.0,
            clarity: 80.0,
            is_silence,
            snr_db,
        }
    }

    #[test]
    fn test_quality_gate() {
        assert!(is_low_quality(9.99, false, LOW_QUALITY_SNR_DB));
        assert!(!is_low_quality(10.0, false, LOW_QUALITY_SNR_DB));
        // Silence is never flagged, however poor the SNR
        assert!(!is_low_quality(-40.0, true, LOW_QUALITY_SNR_DB));
    }

    #[test]
    fn test_note_for_concert_a() {
        let note = PitchNote::from_frequency(440.0).unwrap();
        assert_eq!(note.name, "A");
        assert_eq!(note.octave, 4);
        assert_eq!(note.midi, 69);
        assert!(note.cents.abs() < 0.01);
    }

    #[test]
    fn test_note_cents_deviation() {
        // Middle C is 261.63 Hz; a fifth of a semitone sharp reads +20 cents
        let note = PitchNote::from_frequency(261.63).unwrap();
        assert_eq!(note.name, "C");
        assert_eq!(note.octave, 4);

        let sharp = PitchNote::from_frequency(261.63 * 2f32.powf(0.2 / 12.0)).unwrap();
        assert_eq!(sharp.name, "C");
        assert!((sharp.cents - 20.0).abs() < 0.5);
    }

    #[test]
    fn test_no_note_for_zero_pitch() {
        assert!(PitchNote::from_frequency(0.0).is_none());
        assert!(PitchNote::from_frequency(f32::NAN).is_none());
    }

    #[test]
    fn test_result_omits_note_when_silent() {
        let result = AnalysisResult::new(3, tone(0.0, true, -20.0), None, LOW_QUALITY_SNR_DB);
        assert!(result.note.is_none());
        assert!(!result.low_quality);
    }

    #[test]
    fn test_result_serializes_to_consumer_shape() {
        let timbre = TimbreFeatures {
            spectral_centroid: 450.0,
            spectral_flatness: 0.01,
            spectral_rolloff: 500.0,
            harmonic_ratio: 0.9,
        };
        let result = AnalysisResult::new(7, tone(440.0, false, 5.0), Some(timbre), LOW_QUALITY_SNR_DB);
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["tick"], 7);
        assert_eq!(value["pitch"], 440.0);
        assert_eq!(value["isSilence"], false);
        assert_eq!(value["snr"], 5.0);
        assert_eq!(value["lowQuality"], true);
        assert_eq!(value["timbre"]["spectralCentroid"], 450.0);
        assert!(value["timbre"]["harmonicRatio"].is_number());
        assert_eq!(value["note"]["name"], "A");
    }

    #[test]
    fn test_result_without_timbre_omits_field() {
        let result = AnalysisResult::new(0, tone(220.0, false, 30.0), None, LOW_QUALITY_SNR_DB);
        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("timbre"));

        let parsed: AnalysisResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, result);
    }
}
