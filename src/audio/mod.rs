pub mod analysis_interface;
pub mod capture;
pub mod config;
pub mod error;
pub mod fft;
pub mod processor;
pub mod source;
pub mod spectral;
pub mod summary;
pub mod tone;
pub mod wav_source;

#[cfg(test)]
pub(crate) mod test_support;

pub use analysis_interface::{is_low_quality, AnalysisResult, PitchNote, TimbreFeatures, ToneMetrics};
pub use capture::MicrophoneSource;
pub use config::{AnalysisConfig, WindowKind, LOW_QUALITY_SNR_DB};
pub use error::{AnalysisError, Result};
pub use fft::{SpectralTransform, TransformEngine};
pub use processor::{ProcessorState, StreamEvent, StreamProcessor};
pub use source::{channel_source, ChannelSource, FrameAssembler, FrameFeeder, FrameSource, FrameStream, SourceEvent};
pub use spectral::TimbreExtractor;
pub use summary::SessionSummary;
pub use tone::ToneAnalyzer;
pub use wav_source::WavFileSource;

/// One analysis window of mono samples.
///
/// Built by a frame source once per tick and moved into the analysis worker; it is never
/// modified after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleFrame {
    samples: Vec<f32>,
    sample_rate_hz: u32,
}

impl SampleFrame {
    pub fn new(samples: Vec<f32>, sample_rate_hz: u32) -> Self {
        Self {
            samples,
            sample_rate_hz,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Length of the frame in seconds, 0.0 for a zero sample rate.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate_hz == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate_hz as f32
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}
