use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::warn;
use std::any::Any;

use super::config::AnalysisConfig;
use super::error::{AnalysisError, Result};
use super::SampleFrame;

/// What a frame source delivers to the processor.
#[derive(Debug)]
pub enum SourceEvent {
    Frame(SampleFrame),
    /// The device went away; the session cannot continue.
    Lost(String),
}

/// An acquired stream: the frame receiver plus whatever keeps the device open.
///
/// Dropping the stream releases the device.
pub struct FrameStream {
    frames: Receiver<SourceEvent>,
    _handle: Option<Box<dyn Any>>,
}

impl FrameStream {
    pub fn new(frames: Receiver<SourceEvent>) -> Self {
        Self {
            frames,
            _handle: None,
        }
    }

    /// Keep `handle` alive for as long as the stream is.
    pub fn with_handle(frames: Receiver<SourceEvent>, handle: Box<dyn Any>) -> Self {
        Self {
            frames,
            _handle: Some(handle),
        }
    }

    pub fn frames(&self) -> &Receiver<SourceEvent> {
        &self.frames
    }
}

/// External collaborator that captures audio and hands it over frame by frame.
pub trait FrameSource {
    /// Open the underlying device or file and start delivering frames.
    ///
    /// # Errors
    /// Returns `DeviceUnavailable` when the source cannot be opened.
    fn acquire(&mut self, config: &AnalysisConfig) -> Result<FrameStream>;

    /// Human readable description for logging.
    fn describe(&self) -> String;
}

/// Cuts a continuous sample stream into overlapping frames.
///
/// Emits one `frame_size` window every `hop` new samples, once enough audio has arrived.
pub struct FrameAssembler {
    frame_size: usize,
    hop: usize,
    sample_rate_hz: u32,
    buffer: Vec<f32>,
    since_last: usize,
}

impl FrameAssembler {
    pub fn new(frame_size: usize, hop: usize, sample_rate_hz: u32) -> Self {
        Self {
            frame_size,
            hop: hop.max(1),
            sample_rate_hz,
            buffer: Vec::with_capacity(frame_size * 2),
            since_last: 0,
        }
    }

    pub fn from_config(config: &AnalysisConfig, sample_rate_hz: u32) -> Self {
        Self::new(config.fft_size, config.hop_size(sample_rate_hz), sample_rate_hz)
    }

    /// Append `samples` and return every frame completed by them.
    ///
    /// The buffer is trimmed once per call, so the cost is linear in the input plus the
    /// frames emitted. The callback path relies on that.
    pub fn push(&mut self, samples: &[f32]) -> Vec<SampleFrame> {
        let mut frames = Vec::new();
        let already_buffered = self.buffer.len();
        self.buffer.extend_from_slice(samples);

        for end in already_buffered + 1..=self.buffer.len() {
            self.since_last += 1;
            if end >= self.frame_size && self.since_last >= self.hop {
                let window = &self.buffer[end - self.frame_size..end];
                frames.push(SampleFrame::new(window.to_vec(), self.sample_rate_hz));
                self.since_last = 0;
            }
        }

        if self.buffer.len() > self.frame_size {
            let excess = self.buffer.len() - self.frame_size;
            self.buffer.drain(..excess);
        }

        frames
    }
}

/// Source fed by the embedding application through a [`FrameFeeder`].
pub struct ChannelSource {
    frames: Option<Receiver<SourceEvent>>,
}

/// Sending half of a [`ChannelSource`].
#[derive(Clone)]
pub struct FrameFeeder {
    sender: Sender<SourceEvent>,
}

/// Create a connected feeder/source pair holding at most `capacity` pending frames.
pub fn channel_source(capacity: usize) -> (FrameFeeder, ChannelSource) {
    let (sender, receiver) = crossbeam_channel::bounded(capacity);
    (
        FrameFeeder { sender },
        ChannelSource {
            frames: Some(receiver),
        },
    )
}

impl FrameFeeder {
    /// Hand a frame to the processor, waiting while the queue is full.
    ///
    /// Returns `false` once the processor has released the stream.
    pub fn send(&self, frame: SampleFrame) -> bool {
        self.sender.send(SourceEvent::Frame(frame)).is_ok()
    }

    /// Hand a frame over without waiting; a full queue drops the frame.
    pub fn try_send(&self, frame: SampleFrame) -> bool {
        match self.sender.try_send(SourceEvent::Frame(frame)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Frame queue full, dropping frame");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Report that the capture device was lost.
    pub fn lose_device(&self, reason: impl Into<String>) {
        let _ = self.sender.send(SourceEvent::Lost(reason.into()));
    }
}

impl FrameSource for ChannelSource {
    fn acquire(&mut self, _config: &AnalysisConfig) -> Result<FrameStream> {
        self.frames
            .take()
            .map(FrameStream::new)
            .ok_or_else(|| AnalysisError::DeviceUnavailable("channel source already acquired".into()))
    }

    fn describe(&self) -> String {
        "in-process channel".to_string()
    }
}
