//! Voice analysis of a WAV file.

use crate::wav::read_wav;
use clap::Args;
use hotmic_analysis::{AnalysisPipeline, AnalysisSettings, AnalysisSignal, FrameFeatures, VoicingState};
use hotmic_config::SessionConfig;
use std::path::PathBuf;

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Input WAV file (multi-channel files are mixed to mono)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Take analysis settings from this session file
    #[arg(long)]
    session: Option<PathBuf>,

    /// FFT size
    #[arg(long)]
    fft_size: Option<usize>,

    /// Hop size in samples
    #[arg(long)]
    hop_size: Option<usize>,

    /// Print every Nth frame
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    every: u64,

    /// Write every frame to a JSON file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

struct FrameRecord {
    time_secs: f64,
    features: FrameFeatures,
}

pub fn run(args: AnalyzeArgs) -> anyhow::Result<()> {
    let mut settings = match &args.session {
        Some(path) => SessionConfig::load(path)?.analysis,
        None => AnalysisSettings::default(),
    };
    if let Some(fft_size) = args.fft_size {
        settings.fft_size = fft_size;
    }
    if let Some(hop_size) = args.hop_size {
        settings.hop_size = hop_size;
    }

    let audio = read_wav(&args.input)?;
    let samples = audio.mono();
    let sample_rate = audio.sample_rate as f32;
    println!(
        "Analyzing {} ({:.2}s at {} Hz, FFT {}, hop {})",
        args.input.display(),
        audio.duration_secs(),
        audio.sample_rate,
        settings.fft_size,
        settings.hop_size
    );

    let mut pipeline = AnalysisPipeline::new(settings, sample_rate)?;
    let mut records = Vec::new();
    pipeline.push(&samples, |frame| {
        records.push(FrameRecord {
            time_secs: frame.sample_time as f64 / f64::from(sample_rate),
            features: frame.features,
        });
    });

    if records.is_empty() {
        println!("File is shorter than one frame ({} samples).", settings.fft_size);
        return Ok(());
    }

    println!();
    println!(
        "{:>8}  {:8}  {:>7}  {:>5}  {:>6}  {:>6}  {:>6}  {:>6}  {:>6}  {:>8}  {:>7}  {:>5}  {:>6}",
        "time", "voicing", "pitch", "conf", "f1", "f2", "f3", "hnr", "cpp", "centroid", "slope", "rate", "rms"
    );
    for record in records.iter().step_by(args.every as usize) {
        let f = &record.features;
        println!(
            "{:>8.3}  {:8}  {:>7.1}  {:>5.2}  {:>6.0}  {:>6.0}  {:>6.0}  {:>6.1}  {:>6.1}  {:>8.0}  {:>7.2}  {:>5.1}  {:>6.1}",
            record.time_secs,
            voicing_label(f.voicing()),
            f.get(AnalysisSignal::Pitch),
            f.get(AnalysisSignal::PitchConfidence),
            f.get(AnalysisSignal::Formant1),
            f.get(AnalysisSignal::Formant2),
            f.get(AnalysisSignal::Formant3),
            f.get(AnalysisSignal::Hnr),
            f.get(AnalysisSignal::Cpp),
            f.get(AnalysisSignal::SpectralCentroid),
            f.get(AnalysisSignal::SpectralSlope),
            f.get(AnalysisSignal::SpeakingRate),
            f.get(AnalysisSignal::RmsDb),
        );
    }

    print_summary(&records);

    if let Some(path) = &args.output {
        let frames: Vec<serde_json::Value> = records
            .iter()
            .map(|r| {
                let mut signals = serde_json::Map::new();
                for signal in AnalysisSignal::ALL {
                    signals.insert(signal.name().to_string(), serde_json::json!(r.features.get(signal)));
                }
                serde_json::json!({
                    "time": r.time_secs,
                    "signals": signals,
                    "harmonics_db": r.features.harmonics_db,
                })
            })
            .collect();
        let json = serde_json::json!({
            "input": args.input.display().to_string(),
            "sample_rate": audio.sample_rate,
            "fft_size": settings.fft_size,
            "hop_size": settings.hop_size,
            "frames": frames,
        });
        std::fs::write(path, serde_json::to_string_pretty(&json)?)?;
        println!("\nFrames written to {}", path.display());
    }

    Ok(())
}

fn voicing_label(state: VoicingState) -> &'static str {
    match state {
        VoicingState::Silence => "silence",
        VoicingState::Unvoiced => "unvoiced",
        VoicingState::Voiced => "voiced",
    }
}

fn print_summary(records: &[FrameRecord]) {
    let voiced: Vec<&FrameFeatures> = records
        .iter()
        .map(|r| &r.features)
        .filter(|f| f.voicing() == VoicingState::Voiced)
        .collect();

    println!();
    println!("Summary:");
    println!(
        "  Frames: {} ({} voiced, {:.0}%)",
        records.len(),
        voiced.len(),
        100.0 * voiced.len() as f64 / records.len() as f64
    );

    let mut pitches: Vec<f32> = voiced.iter().filter_map(|f| f.pitch_hz()).collect();
    if !pitches.is_empty() {
        pitches.sort_unstable_by(f32::total_cmp);
        println!("  Median pitch: {:.1} Hz", pitches[pitches.len() / 2]);
    }

    for (label, signal) in [
        ("F1", AnalysisSignal::Formant1),
        ("F2", AnalysisSignal::Formant2),
        ("F3", AnalysisSignal::Formant3),
    ] {
        let found: Vec<f32> = voiced.iter().map(|f| f.get(signal)).filter(|&v| v > 0.0).collect();
        if !found.is_empty() {
            let mean = found.iter().sum::<f32>() / found.len() as f32;
            println!("  Mean {label}: {mean:.0} Hz");
        }
    }

    if let Some(last) = records.last() {
        println!(
            "  Speaking rate: {:.1} syllables/s",
            last.features.get(AnalysisSignal::SpeakingRate)
        );
    }
}
