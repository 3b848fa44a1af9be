//! Per-block cross-channel buffers.
//!
//! [`BusBuffers`] is owned by the audio processor and lent to every plugin via
//! [`ProcessContext`](crate::ProcessContext). All storage is allocated up
//! front for the maximum channel count and block size; nothing here allocates
//! during a block.

use crate::plugin::OutputMode;

/// Buffers that carry signal between channels within one block.
#[derive(Debug)]
pub struct BusBuffers {
    block_size: usize,
    frames: usize,
    channel_outputs: Vec<Vec<f32>>,
    copy_taps: Vec<Vec<f32>>,
    copy_written: Vec<bool>,
    output_left: Vec<f32>,
    output_right: Vec<f32>,
}

impl BusBuffers {
    /// Allocate buffers for `max_channels` channels of `block_size` samples.
    pub fn new(max_channels: usize, block_size: usize) -> Self {
        Self {
            block_size,
            frames: block_size,
            channel_outputs: vec![vec![0.0; block_size]; max_channels],
            copy_taps: vec![vec![0.0; block_size]; max_channels],
            copy_written: vec![false; max_channels],
            output_left: vec![0.0; block_size],
            output_right: vec![0.0; block_size],
        }
    }

    /// Number of channels the buffers were sized for.
    pub fn capacity(&self) -> usize {
        self.channel_outputs.len()
    }

    /// Maximum block size.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Samples in the current block.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Start a block of `frames` samples: clears the output mix and copy taps.
    ///
    /// Channel outputs keep the previous block's data until overwritten, so a
    /// channel processed out of dependency order (cycle fallback) reads the
    /// last published block instead of garbage.
    pub fn begin_block(&mut self, frames: usize) {
        self.frames = frames.min(self.block_size);
        self.output_left.fill(0.0);
        self.output_right.fill(0.0);
        self.copy_written.fill(false);
    }

    /// Post-fader output published by `channel` this block (or the last block
    /// it was processed in).
    #[inline]
    pub fn channel_output(&self, channel: usize) -> Option<&[f32]> {
        self.channel_outputs
            .get(channel)
            .map(|buf| &buf[..self.frames])
    }

    /// Publish `block * gain` as `channel`'s output. `gain = 0` publishes silence.
    pub fn publish_channel_output(&mut self, channel: usize, block: &[f32], gain: f32) {
        let frames = self.frames;
        if let Some(out) = self.channel_outputs.get_mut(channel) {
            for (o, &s) in out[..frames].iter_mut().zip(block) {
                *o = s * gain;
            }
        }
    }

    /// Clear every channel output (used after an engine restart).
    pub fn clear_channel_outputs(&mut self) {
        for out in &mut self.channel_outputs {
            out.fill(0.0);
        }
    }

    /// Write a copy tap destined for `target`.
    ///
    /// Several copy plugins targeting the same channel are summed.
    pub fn write_copy(&mut self, target: usize, block: &[f32]) {
        let frames = self.frames;
        let (Some(tap), Some(written)) = (
            self.copy_taps.get_mut(target),
            self.copy_written.get_mut(target),
        ) else {
            return;
        };
        if *written {
            for (t, &s) in tap[..frames].iter_mut().zip(block) {
                *t += s;
            }
        } else {
            let n = frames.min(block.len());
            tap[..n].copy_from_slice(&block[..n]);
            tap[n..frames].fill(0.0);
            *written = true;
        }
    }

    /// Copy tap for `channel`, if a copy plugin wrote one this block.
    #[inline]
    pub fn copy_tap(&self, channel: usize) -> Option<&[f32]> {
        match self.copy_written.get(channel) {
            Some(true) => Some(&self.copy_taps[channel][..self.frames]),
            _ => None,
        }
    }

    /// Accumulate `block * gain` into the stereo output mix.
    pub fn mix_output(&mut self, block: &[f32], gain: f32, mode: OutputMode) {
        let frames = self.frames;
        if matches!(mode, OutputMode::Left | OutputMode::Both) {
            for (o, &s) in self.output_left[..frames].iter_mut().zip(block) {
                *o += s * gain;
            }
        }
        if matches!(mode, OutputMode::Right | OutputMode::Both) {
            for (o, &s) in self.output_right[..frames].iter_mut().zip(block) {
                *o += s * gain;
            }
        }
    }

    /// The stereo output mix for the current block.
    pub fn output(&self) -> (&[f32], &[f32]) {
        (
            &self.output_left[..self.frames],
            &self.output_right[..self.frames],
        )
    }
}
