//! Offline rendering of a session over a WAV file.

use super::level_summary;
use crate::wav::{read_wav, write_wav_stereo};
use clap::Args;
use hotmic_config::{QualityMode, SessionConfig, build_engine};
use hotmic_core::PluginRegistry;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

#[derive(Args)]
pub struct RenderArgs {
    /// Session file (TOML)
    #[arg(value_name = "SESSION")]
    session: PathBuf,

    /// Input WAV file; file channel N feeds capture device N
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output WAV file (stereo mix)
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Override the session's quality mode (low_latency, balanced, high_quality)
    #[arg(long, value_parser = parse_quality)]
    quality: Option<QualityMode>,

    /// Output bit depth (16, 24, or 32)
    #[arg(long, default_value = "32")]
    bit_depth: u16,
}

fn parse_quality(s: &str) -> Result<QualityMode, String> {
    [QualityMode::LowLatency, QualityMode::Balanced, QualityMode::HighQuality]
        .into_iter()
        .find(|q| q.name() == s)
        .ok_or_else(|| format!("unknown quality mode '{s}'"))
}

pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    let mut session = SessionConfig::load(&args.session)?;
    if let Some(quality) = args.quality {
        session.quality = quality;
    }

    println!("Reading {}...", args.input.display());
    let audio = read_wav(&args.input)?;
    println!(
        "  {} channel(s), {} samples, {} Hz, {:.2}s",
        audio.channels.len(),
        audio.frames(),
        audio.sample_rate,
        audio.duration_secs()
    );
    if audio.sample_rate != session.sample_rate {
        tracing::info!(
            session = session.sample_rate,
            file = audio.sample_rate,
            "running at the file's sample rate"
        );
        session.sample_rate = audio.sample_rate;
    }

    let (mut engine, mut processor) = build_engine(&session, &PluginRegistry::new())?;
    let block = session.effective_block_size();
    println!(
        "Rendering session '{}' ({} channels, block {})...",
        session.name,
        engine.channel_count(),
        block
    );

    let frames = audio.frames();
    let mut left = vec![0.0; frames];
    let mut right = vec![0.0; frames];

    let pb = ProgressBar::new(frames as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("##-"),
    );

    let mut start = 0;
    while start < frames {
        let end = (start + block).min(frames);
        let inputs: Vec<&[f32]> = audio.channels.iter().map(|c| &c[start..end]).collect();
        processor.process(&inputs, &mut left[start..end], &mut right[start..end]);
        engine.maintain();
        pb.set_position(end as u64);
        start = end;
    }
    pb.finish_with_message("done");

    println!("\nStats:");
    println!("  Input:  {}", level_summary(&audio.mono()));
    println!("  Left:   {}", level_summary(&left));
    println!("  Right:  {}", level_summary(&right));
    println!("  Latency: {} samples", engine.latency_samples());

    for channel in 0..engine.channel_count() {
        let Some(graph) = engine.graph(channel) else {
            continue;
        };
        for slot in graph.chain().snapshot().slots() {
            if slot.fault_count() > 0 || slot.contended_count() > 0 {
                println!(
                    "  Channel {channel} plugin {} ({}): {} faulted block(s), {} skipped",
                    slot.instance_id(),
                    slot.plugin_id(),
                    slot.fault_count(),
                    slot.contended_count()
                );
            }
        }
    }

    println!("\nWriting {}...", args.output.display());
    write_wav_stereo(&args.output, &left, &right, audio.sample_rate, args.bit_depth)?;
    println!("Done!");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quality() {
        assert_eq!(parse_quality("low_latency"), Ok(QualityMode::LowLatency));
        assert_eq!(parse_quality("high_quality"), Ok(QualityMode::HighQuality));
        assert!(parse_quality("turbo").is_err());
    }
}
