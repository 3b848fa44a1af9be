//! WAV reading and writing.

use anyhow::Context;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

/// Decoded audio, one vector per file channel.
#[derive(Debug, Clone)]
pub struct WavAudio {
    /// Deinterleaved samples in `-1.0..=1.0`.
    pub channels: Vec<Vec<f32>>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl WavAudio {
    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Length in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / f64::from(self.sample_rate.max(1))
    }

    /// Average of all channels.
    pub fn mono(&self) -> Vec<f32> {
        let n = self.channels.len().max(1) as f32;
        (0..self.frames())
            .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() / n)
            .collect()
    }
}

/// Read a WAV file. Integer formats are scaled to `-1.0..=1.0`.
pub fn read_wav(path: &Path) -> anyhow::Result<WavAudio> {
    let reader = WavReader::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let spec = reader.spec();
    let channel_count = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("failed to decode {}", path.display()))?,
        SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("failed to decode {}", path.display()))?
        }
    };

    let mut channels = vec![Vec::with_capacity(interleaved.len() / channel_count); channel_count];
    for frame in interleaved.chunks_exact(channel_count) {
        for (channel, &sample) in channels.iter_mut().zip(frame) {
            channel.push(sample);
        }
    }

    Ok(WavAudio {
        channels,
        sample_rate: spec.sample_rate,
    })
}

/// Write a stereo WAV file. 32 bits writes float, 16 or 24 writes PCM.
pub fn write_wav_stereo(
    path: &Path,
    left: &[f32],
    right: &[f32],
    sample_rate: u32,
    bits_per_sample: u16,
) -> anyhow::Result<()> {
    anyhow::ensure!(
        matches!(bits_per_sample, 16 | 24 | 32),
        "unsupported bit depth {bits_per_sample} (use 16, 24 or 32)"
    );
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample,
        sample_format: if bits_per_sample == 32 {
            SampleFormat::Float
        } else {
            SampleFormat::Int
        },
    };
    let mut writer =
        WavWriter::create(path, spec).with_context(|| format!("failed to create {}", path.display()))?;

    if bits_per_sample == 32 {
        for (&l, &r) in left.iter().zip(right) {
            writer.write_sample(l)?;
            writer.write_sample(r)?;
        }
    } else {
        let max_val = (1i32 << (bits_per_sample - 1)) as f32;
        for (&l, &r) in left.iter().zip(right) {
            writer.write_sample((l * max_val).clamp(-max_val, max_val - 1.0) as i32)?;
            writer.write_sample((r * max_val).clamp(-max_val, max_val - 1.0) as i32)?;
        }
    }

    writer.finalize()?;
    Ok(())
}
