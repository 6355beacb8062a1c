use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use crossbeam_channel::{Sender, TrySendError};
use log::{info, warn};

use super::config::AnalysisConfig;
use super::error::{AnalysisError, Result};
use super::source::{FrameAssembler, FrameSource, FrameStream, SourceEvent};

/// Live capture from the default (or a named) input device.
///
/// The cpal stream is created on the calling thread and handed back inside the
/// [`FrameStream`], so it is released when the processor stops.
pub struct MicrophoneSource {
    device_name: Option<String>,
}

impl MicrophoneSource {
    pub fn new() -> Self {
        Self { device_name: None }
    }

    /// Capture from the input device whose name contains `name`.
    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
        }
    }

    /// Names of the input devices on the default host.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| AnalysisError::DeviceUnavailable(e.to_string()))?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    fn find_device(&self) -> Result<Device> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host
                .default_input_device()
                .ok_or_else(|| AnalysisError::DeviceUnavailable("no input device available".into())),
            Some(wanted) => host
                .input_devices()
                .map_err(|e| AnalysisError::DeviceUnavailable(e.to_string()))?
                .find(|d| d.name().map(|n| n.contains(wanted.as_str())).unwrap_or(false))
                .ok_or_else(|| {
                    AnalysisError::DeviceUnavailable(format!("no input device matching '{}'", wanted))
                }),
        }
    }

    fn create_input_stream(
        device: &Device,
        config: &StreamConfig,
        mut assembler: FrameAssembler,
        sender: Sender<SourceEvent>,
    ) -> Result<Stream> {
        let channels = config.channels as usize;
        info!(
            "Creating input stream with {} channels at {} Hz",
            channels, config.sample_rate.0
        );

        let error_sender = sender.clone();
        let stream = device
            .build_input_stream(
                config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono_data: Vec<f32> = if channels == 1 {
                        data.to_vec()
                    } else {
                        data.chunks(channels)
                            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                            .collect()
                    };

                    // The audio callback must never block
                    for frame in assembler.push(&mono_data) {
                        match sender.try_send(SourceEvent::Frame(frame)) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => warn!("Analysis is behind, dropping captured frame"),
                            Err(TrySendError::Disconnected(_)) => return,
                        }
                    }
                },
                move |err| {
                    warn!("Audio stream error: {}", err);
                    let _ = error_sender.try_send(SourceEvent::Lost(err.to_string()));
                },
                None,
            )
            .map_err(|e| AnalysisError::DeviceUnavailable(e.to_string()))?;

        Ok(stream)
    }
}

impl Default for MicrophoneSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for MicrophoneSource {
    fn acquire(&mut self, config: &AnalysisConfig) -> Result<FrameStream> {
        let device = self.find_device()?;
        let supported = device
            .default_input_config()
            .map_err(|e| AnalysisError::DeviceUnavailable(format!("failed to get default input config: {}", e)))?;

        info!("Using audio device: {}", device.name().unwrap_or_else(|_| "Unknown".to_string()));
        info!("Audio config: {:?}", supported);

        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(AnalysisError::DeviceUnavailable(format!(
                "unsupported sample format {:?}",
                supported.sample_format()
            )));
        }

        let sample_rate = supported.sample_rate().0;
        if sample_rate != config.sample_rate {
            info!(
                "Device runs at {} Hz, analysing at the device rate instead of {} Hz",
                sample_rate, config.sample_rate
            );
        }

        let (sender, receiver) = crossbeam_channel::bounded(config.frame_queue_capacity);
        let assembler = FrameAssembler::from_config(config, sample_rate);
        let stream = Self::create_input_stream(&device, &supported.into(), assembler, sender)?;
        stream
            .play()
            .map_err(|e| AnalysisError::DeviceUnavailable(e.to_string()))?;

        Ok(FrameStream::with_handle(receiver, Box::new(stream)))
    }

    fn describe(&self) -> String {
        match &self.device_name {
            Some(name) => format!("microphone '{}'", name),
            None => "default microphone".to_string(),
        }
    }
}
