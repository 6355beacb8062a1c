use anyhow::{bail, Result};
use clap::Parser;
use log::{info, warn};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use vocal_analyzer::audio::{
    AnalysisConfig, AnalysisResult, SessionSummary, StreamEvent, StreamProcessor, WavFileSource,
};

#[derive(Parser)]
#[command(name = "vocal-analyze")]
#[command(about = "Analyse a recorded WAV file and write a JSON report")]
struct Args {
    /// WAV file to analyse
    audio_file: PathBuf,

    /// Output JSON file path
    #[arg(long, short, default_value = "vocal_analysis.json")]
    output: PathBuf,

    /// JSON analysis configuration
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Include every tick's result in the report
    #[arg(long)]
    frame_by_frame: bool,

    /// Replay at capture speed instead of as fast as possible
    #[arg(long)]
    realtime: bool,
}

#[derive(Debug, Serialize)]
struct FailedTick {
    tick: u64,
    error: String,
}

#[derive(Debug, Serialize)]
struct AnalysisReport {
    file: String,
    config: AnalysisConfig,
    summary: SessionSummary,
    failed: Vec<FailedTick>,
    #[serde(skip_serializing_if = "Option::is_none")]
    results: Option<Vec<AnalysisResult>>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };

    info!("Analysing {}", args.audio_file.display());
    let mut source = WavFileSource::new(&args.audio_file).realtime(args.realtime);
    let mut processor = StreamProcessor::new(config.clone())?;
    let events = processor.events();
    processor.start(&mut source)?;

    let mut summary = SessionSummary::new();
    let mut failed = Vec::new();
    let mut results = Vec::new();

    for event in events.iter() {
        summary.record_event(&event);
        match event {
            StreamEvent::Analysis(result) => {
                if args.frame_by_frame {
                    results.push(result);
                }
            }
            StreamEvent::TickFailed { tick, error } => {
                warn!("Tick {} failed: {}", tick, error);
                failed.push(FailedTick {
                    tick,
                    error: error.to_string(),
                });
            }
            StreamEvent::SourceLost(error) => bail!("analysis aborted: {}", error),
            StreamEvent::Ended => break,
        }
    }
    processor.stop();

    info!("=== ANALYSIS RESULTS ===");
    info!("Ticks analysed: {} ({} failed)", summary.analysed_ticks, summary.failed_ticks);
    info!("Voiced ticks: {} / silent: {}", summary.voiced_ticks, summary.silent_ticks);
    if let Some(mean) = summary.mean_pitch_hz {
        info!("Mean pitch: {:.1} Hz", mean);
    }
    info!("Low quality ticks: {}", summary.low_quality_ticks);

    let report = AnalysisReport {
        file: args.audio_file.display().to_string(),
        config,
        summary,
        failed,
        results: args.frame_by_frame.then_some(results),
    };

    let writer = BufWriter::new(File::create(&args.output)?);
    serde_json::to_writer_pretty(writer, &report)?;
    info!("Report written to {}", args.output.display());

    Ok(())
}
