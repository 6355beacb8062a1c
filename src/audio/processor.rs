use crossbeam_channel::{select, Receiver, SendTimeoutError, Sender};
use log::{debug, error, info, warn};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::analysis_interface::AnalysisResult;
use super::config::AnalysisConfig;
use super::error::{AnalysisError, Result};
use super::fft::TransformEngine;
use super::source::{FrameSource, FrameStream, SourceEvent};
use super::spectral::TimbreExtractor;
use super::tone::ToneAnalyzer;
use super::SampleFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Idle,
    /// Stream acquired, waiting for the first frame.
    Armed,
    Running,
    Stopped,
}

/// Everything the processor tells its consumer.
#[derive(Debug)]
pub enum StreamEvent {
    Analysis(AnalysisResult),
    /// The frame for `tick` could not be analysed; no result is published for it.
    TickFailed { tick: u64, error: AnalysisError },
    /// The source was lost. The processor has stopped; call `start` again to re-arm.
    SourceLost(AnalysisError),
    /// The source ran out of frames. The processor has stopped.
    Ended,
}

/// The per-tick computation: tone first, then the spectrum with the tick's pitch.
pub(crate) struct TickPipeline {
    tone: ToneAnalyzer,
    timbre: Option<(TransformEngine, TimbreExtractor)>,
    snr_quality_threshold_db: f32,
    budget: Duration,
}

impl TickPipeline {
    pub(crate) fn new(config: &AnalysisConfig) -> Result<Self> {
        let timbre = if config.analyze_timbre {
            Some((TransformEngine::from_config(config)?, TimbreExtractor::new(config)))
        } else {
            None
        };

        Ok(Self {
            tone: ToneAnalyzer::new(config),
            timbre,
            snr_quality_threshold_db: config.snr_quality_threshold_db,
            budget: config.tick_budget(),
        })
    }

    pub(crate) fn run(&self, tick: u64, frame: SampleFrame) -> Result<AnalysisResult> {
        let started = Instant::now();

        let tone = self.tone.analyze(&frame)?;
        let timbre = match &self.timbre {
            Some((engine, extractor)) => {
                let spectrum = engine.transform(&frame)?;
                let pitch = (!tone.is_silence && tone.pitch_hz > 0.0).then_some(tone.pitch_hz);
                Some(extractor.extract(&spectrum, frame.sample_rate_hz(), pitch))
            }
            None => None,
        };

        let elapsed = started.elapsed();
        if elapsed > self.budget {
            return Err(AnalysisError::ComputationOverrun {
                tick,
                elapsed,
                budget: self.budget,
            });
        }

        debug!(
            "tick {}: pitch={:.1}Hz volume={:.1} clarity={:.1} snr={:.1}dB silence={} ({:?})",
            tick, tone.pitch_hz, tone.volume, tone.clarity, tone.snr_db, tone.is_silence, elapsed
        );

        Ok(AnalysisResult::new(tick, tone, timbre, self.snr_quality_threshold_db))
    }
}

struct Session {
    stream: FrameStream,
    stop: Sender<()>,
    worker: JoinHandle<u64>,
}

/// Runs the analysis for one frame source at a time.
///
/// `start` acquires the source and spawns a worker thread; every frame the source delivers
/// becomes one tick on that thread, and its outcome is published on the event channel in
/// arrival order. The consumer thread never runs analysis itself.
///
/// ```rust,no_run
/// use vocal_analyzer::audio::{AnalysisConfig, MicrophoneSource, StreamEvent, StreamProcessor};
///
/// # fn main() -> vocal_analyzer::audio::Result<()> {
/// let mut processor = StreamProcessor::new(AnalysisConfig::default())?;
/// processor.start(&mut MicrophoneSource::new())?;
///
/// for event in processor.events().iter().take(50) {
///     if let StreamEvent::Analysis(result) = event {
///         println!("{:.1} Hz, volume {:.0}", result.tone.pitch_hz, result.tone.volume);
///     }
/// }
/// processor.stop();
/// # Ok(())
/// # }
/// ```
pub struct StreamProcessor {
    config: AnalysisConfig,
    state: Arc<Mutex<ProcessorState>>,
    event_sender: Sender<StreamEvent>,
    event_receiver: Receiver<StreamEvent>,
    session: Option<Session>,
    next_tick: u64,
}

impl StreamProcessor {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        let (event_sender, event_receiver) = crossbeam_channel::bounded(config.event_queue_capacity);

        Ok(Self {
            config,
            state: Arc::new(Mutex::new(ProcessorState::Idle)),
            event_sender,
            event_receiver,
            session: None,
            next_tick: 0,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn state(&self) -> ProcessorState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Receiver for published events. Clones share one queue.
    pub fn events(&self) -> Receiver<StreamEvent> {
        self.event_receiver.clone()
    }

    /// Acquire `source` and begin analysing its frames.
    ///
    /// Allowed from `Idle` or `Stopped`. Tick numbers continue from the previous session.
    ///
    /// # Errors
    /// `AlreadyStarted` while a session is active; `DeviceUnavailable` (or any other error
    /// the source reports) if acquisition fails, in which case the state is unchanged.
    pub fn start(&mut self, source: &mut dyn FrameSource) -> Result<()> {
        if matches!(self.state(), ProcessorState::Armed | ProcessorState::Running) {
            return Err(AnalysisError::AlreadyStarted);
        }
        self.reap_session();

        let pipeline = TickPipeline::new(&self.config)?;
        let stream = source.acquire(&self.config).map_err(|e| {
            error!("Failed to acquire {}: {}", source.describe(), e);
            e
        })?;

        let (stop, control) = crossbeam_channel::bounded(1);
        let worker = Worker {
            frames: stream.frames().clone(),
            control,
            events: self.event_sender.clone(),
            state: Arc::clone(&self.state),
            pipeline,
            publish_timeout: self.config.capture_interval(),
            next_tick: self.next_tick,
        };

        set_state(&self.state, ProcessorState::Armed);
        let handle = match thread::Builder::new()
            .name("vocal-analysis".into())
            .spawn(move || worker.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                set_state(&self.state, ProcessorState::Stopped);
                return Err(e.into());
            }
        };

        info!("Processor armed on {}", source.describe());
        self.session = Some(Session {
            stream,
            stop,
            worker: handle,
        });
        Ok(())
    }

    /// Stop analysing and release the source.
    ///
    /// A tick already in progress finishes first and its result is dropped. Nothing is
    /// published after this returns.
    pub fn stop(&mut self) {
        if self.session.is_none() {
            return;
        }
        self.reap_session();
        set_state(&self.state, ProcessorState::Stopped);
        info!("Processor stopped after {} ticks", self.next_tick);
    }

    fn reap_session(&mut self) {
        if let Some(session) = self.session.take() {
            // The worker may already have exited on its own
            let _ = session.stop.try_send(());
            match session.worker.join() {
                Ok(next_tick) => self.next_tick = next_tick,
                Err(_) => error!("Analysis worker panicked"),
            }
            drop(session.stream);
        }
    }
}

impl Drop for StreamProcessor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn set_state(state: &Mutex<ProcessorState>, new_state: ProcessorState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = new_state;
}

struct Worker {
    frames: Receiver<SourceEvent>,
    control: Receiver<()>,
    events: Sender<StreamEvent>,
    state: Arc<Mutex<ProcessorState>>,
    pipeline: TickPipeline,
    publish_timeout: Duration,
    next_tick: u64,
}

impl Worker {
    /// Returns the next unused tick number.
    fn run(mut self) -> u64 {
        loop {
            let event = select! {
                recv(self.control) -> _ => break,
                recv(self.frames) -> event => event,
            };

            match event {
                Err(_) => {
                    info!("Frame source ended");
                    set_state(&self.state, ProcessorState::Stopped);
                    self.publish(StreamEvent::Ended);
                    break;
                }
                Ok(SourceEvent::Lost(reason)) => {
                    error!("Frame source lost: {}", reason);
                    set_state(&self.state, ProcessorState::Stopped);
                    self.publish(StreamEvent::SourceLost(AnalysisError::DeviceUnavailable(reason)));
                    break;
                }
                Ok(SourceEvent::Frame(frame)) => {
                    set_state(&self.state, ProcessorState::Running);
                    let tick = self.next_tick;
                    self.next_tick += 1;

                    // A panicking tick is reported like any other failed tick
                    let pipeline = &self.pipeline;
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| pipeline.run(tick, frame)))
                        .unwrap_or_else(|payload| {
                            Err(AnalysisError::TickPanicked {
                                tick,
                                message: panic_message(payload.as_ref()),
                            })
                        });

                    if !self.control.is_empty() {
                        debug!("Dropping tick {} computed after stop", tick);
                        break;
                    }

                    match outcome {
                        Ok(result) => self.publish(StreamEvent::Analysis(result)),
                        Err(error) => {
                            warn!("Skipping tick {}: {}", tick, error);
                            self.publish(StreamEvent::TickFailed { tick, error });
                        }
                    }
                }
            }
        }

        self.next_tick
    }

    fn publish(&self, event: StreamEvent) {
        match self.events.send_timeout(event, self.publish_timeout) {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                warn!("Consumer is not draining events, dropping one");
            }
            Err(SendTimeoutError::Disconnected(_)) => {}
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
