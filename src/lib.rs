//! Real-time vocal analysis: pitch, loudness, clarity, SNR and timbre from streamed audio.

pub mod audio;
