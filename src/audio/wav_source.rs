use hound::{SampleFormat, WavReader};
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::thread;

use super::config::AnalysisConfig;
use super::error::{AnalysisError, Result};
use super::source::{FrameAssembler, FrameSource, FrameStream, SourceEvent};
use super::SampleFrame;

/// Replays a WAV file as if it were being captured.
///
/// The file is decoded up front, mixed to mono and framed with the same hop as live
/// capture. With `realtime` set, frames are delivered at the capture interval; otherwise
/// as fast as the processor accepts them. The stream ends with the file.
pub struct WavFileSource {
    path: PathBuf,
    realtime: bool,
}

impl WavFileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            realtime: false,
        }
    }

    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Decode a WAV file to mono `f32` samples in -1.0..1.0. Returns the samples and the rate.
pub fn read_mono_samples<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, u32)> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1) as u32)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let mono = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok((mono, spec.sample_rate))
}

/// Frame a whole sample buffer the way live capture would.
pub fn frames_from_samples(samples: &[f32], sample_rate: u32, config: &AnalysisConfig) -> Vec<SampleFrame> {
    FrameAssembler::from_config(config, sample_rate).push(samples)
}

impl FrameSource for WavFileSource {
    fn acquire(&mut self, config: &AnalysisConfig) -> Result<FrameStream> {
        let (samples, sample_rate) = read_mono_samples(&self.path).map_err(|e| {
            AnalysisError::DeviceUnavailable(format!("cannot open {}: {}", self.path.display(), e))
        })?;
        if sample_rate == 0 {
            return Err(AnalysisError::InvalidSampleRate);
        }

        let frames = frames_from_samples(&samples, sample_rate, config);
        info!(
            "Loaded {} ({} Hz, {} samples, {} frames)",
            self.path.display(),
            sample_rate,
            samples.len(),
            frames.len()
        );

        let (sender, receiver) = crossbeam_channel::bounded(config.frame_queue_capacity);
        let pace = self.realtime.then(|| config.capture_interval());

        thread::Builder::new()
            .name("wav-source".into())
            .spawn(move || {
                for frame in frames {
                    if sender.send(SourceEvent::Frame(frame)).is_err() {
                        debug!("Processor released the WAV stream early");
                        return;
                    }
                    if let Some(interval) = pace {
                        thread::sleep(interval);
                    }
                }
            })?;

        Ok(FrameStream::new(receiver))
    }

    fn describe(&self) -> String {
        format!("WAV file {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_support::sine_samples;
    use hound::{WavSpec, WavWriter};

    fn write_wav(path: &Path, channels: u16, samples: &[f32]) {
        let spec = WavSpec {
            channels,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample((s * 32767.0) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_reads_int_wav_as_unit_floats() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 1, &sine_samples(440.0, 0.5, 1600, 16000));

        let (samples, rate) = read_mono_samples(&path).unwrap();
        assert_eq!(rate, 16000);
        assert_eq!(samples.len(), 1600);
        let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!((peak - 0.5).abs() < 0.01, "peak {}", peak);
    }

    #[test]
    fn test_stereo_is_mixed_to_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        // Left at 0.5, right at -0.5: the mix cancels out
        let interleaved: Vec<f32> = (0..200).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        write_wav(&path, 2, &interleaved);

        let (samples, _) = read_mono_samples(&path).unwrap();
        assert_eq!(samples.len(), 100);
        assert!(samples.iter().all(|s| s.abs() < 1e-3));
    }

    #[test]
    fn test_missing_file_is_device_unavailable() {
        let mut source = WavFileSource::new("/definitely/not/here.wav");
        assert!(matches!(
            source.acquire(&AnalysisConfig::default()),
            Err(AnalysisError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn test_stream_delivers_frames_then_ends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        // One second at 16 kHz: frames at 2048, 3648, ... every 1600 samples
        write_wav(&path, 1, &sine_samples(220.0, 0.5, 16000, 16000));

        let config = AnalysisConfig::default();
        let stream = WavFileSource::new(&path).acquire(&config).unwrap();

        let mut count = 0;
        while let Ok(event) = stream.frames().recv() {
            match event {
                SourceEvent::Frame(frame) => {
                    assert_eq!(frame.len(), 2048);
                    assert_eq!(frame.sample_rate_hz(), 16000);
                    count += 1;
                }
                SourceEvent::Lost(reason) => panic!("unexpected loss: {}", reason),
            }
        }
        assert_eq!(count, 9);
    }
}
