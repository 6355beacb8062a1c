use anyhow::Result;
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use log::{info, warn};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use vocal_analyzer::audio::{
    AnalysisConfig, AnalysisResult, MicrophoneSource, SessionSummary, StreamEvent, StreamProcessor,
};

#[derive(Parser)]
#[command(name = "vocal-monitor")]
#[command(about = "Live vocal analysis from the microphone")]
struct Args {
    /// JSON analysis configuration
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Input device to use (substring of its name); the default input when omitted
    #[arg(long, short)]
    device: Option<String>,

    /// How long to listen, in seconds
    #[arg(long, default_value = "10")]
    seconds: u64,

    /// Analysis frame size in samples (power of two)
    #[arg(long)]
    fft_size: Option<usize>,

    /// Print every result as a JSON line
    #[arg(long)]
    json: bool,

    /// List input devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.list_devices {
        for name in MicrophoneSource::list_devices()? {
            println!("{}", name);
        }
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    if let Some(fft_size) = args.fft_size {
        config.fft_size = fft_size;
    }

    let mut source = match args.device {
        Some(name) => MicrophoneSource::with_device(name),
        None => MicrophoneSource::new(),
    };

    let mut processor = StreamProcessor::new(config)?;
    let events = processor.events();
    processor.start(&mut source)?;
    info!("Listening for {} seconds", args.seconds);

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let mut summary = SessionSummary::new();
    let mut session_error = None;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        let event = match events.recv_timeout(remaining) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
        };
        summary.record_event(&event);

        match event {
            StreamEvent::Analysis(result) => {
                if args.json {
                    println!("{}", serde_json::to_string(&result)?);
                } else {
                    println!("{}", format_result(&result));
                }
            }
            StreamEvent::TickFailed { tick, error } => warn!("Tick {} failed: {}", tick, error),
            StreamEvent::SourceLost(error) => {
                session_error = Some(error);
                break;
            }
            StreamEvent::Ended => break,
        }
    }

    processor.stop();

    info!("=== SESSION SUMMARY ===");
    info!("Analysed ticks: {} ({} failed)", summary.analysed_ticks, summary.failed_ticks);
    info!("Voiced: {:.0}%", summary.voiced_fraction() * 100.0);
    if let (Some(min), Some(max)) = (summary.min_pitch_hz, summary.max_pitch_hz) {
        info!("Pitch range: {:.1} - {:.1} Hz", min, max);
    }
    info!("Mean volume: {:.1}, mean clarity: {:.1}", summary.mean_volume, summary.mean_clarity);
    if args.json {
        println!("{}", serde_json::to_string(&summary)?);
    }

    match session_error {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}

fn format_result(result: &AnalysisResult) -> String {
    let tone = &result.tone;
    if tone.is_silence {
        return format!("#{:<5} (silence)  volume {:5.1}", result.tick, tone.volume);
    }

    let note = result
        .note
        .as_ref()
        .map(|n| n.to_string())
        .unwrap_or_else(|| "-".to_string());
    let quality = if result.low_quality { "  [low quality]" } else { "" };

    format!(
        "#{:<5} {:7.1} Hz  {:<12} volume {:5.1}  clarity {:5.1}  snr {:6.1} dB{}",
        result.tick, tone.pitch_hz, note, tone.volume, tone.clarity, tone.snr_db, quality
    )
}
