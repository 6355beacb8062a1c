use std::time::Duration;
use thiserror::Error;

/// Errors raised by the analysis engine.
///
/// Per-tick errors (`InvalidFrameLength`, `InvalidSampleRate`, `ComputationOverrun`,
/// `TickPanicked`) only affect the frame that produced them. `DeviceUnavailable` ends the session and the
/// consumer has to call `start()` again.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("invalid frame length {len}: must be a non-zero power of two")]
    InvalidFrameLength { len: usize },

    #[error("invalid sample rate: must be greater than zero")]
    InvalidSampleRate,

    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("tick {tick} took {elapsed:?}, longer than the {budget:?} frame interval")]
    ComputationOverrun {
        tick: u64,
        elapsed: Duration,
        budget: Duration,
    },

    #[error("tick {tick} panicked: {message}")]
    TickPanicked { tick: u64, message: String },

    #[error("processor already started")]
    AlreadyStarted,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

impl AnalysisError {
    /// Whether the error only invalidates the current tick.
    pub fn is_per_tick(&self) -> bool {
        matches!(
            self,
            AnalysisError::InvalidFrameLength { .. }
                | AnalysisError::InvalidSampleRate
                | AnalysisError::ComputationOverrun { .. }
                | AnalysisError::TickPanicked { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
