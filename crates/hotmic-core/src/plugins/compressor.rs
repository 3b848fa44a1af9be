//! Soft-knee feed-forward compressor.

use super::envelope::EnvelopeFollower;
use crate::math::{AtomicF32, db_to_linear, linear_to_db};
use crate::param_info::{ParamDescriptor, ParameterInfo};
use crate::plugin::{Plugin, PluginCommand, PluginError, ProcessContext};

use std::sync::Arc;

/// Compressor.
///
/// | Index | Name | Range | Default |
/// |-------|------|-------|---------|
/// | 0 | Threshold | -60.0–0.0 dB | -18.0 |
/// | 1 | Ratio | 1.0–20.0 | 4.0 |
/// | 2 | Attack | 0.1–100.0 ms | 10.0 |
/// | 3 | Release | 10.0–1000.0 ms | 100.0 |
/// | 4 | Knee | 0.0–12.0 dB | 6.0 |
/// | 5 | Makeup | 0.0–24.0 dB | 0.0 |
#[derive(Debug)]
pub struct Compressor {
    threshold_db: f32,
    ratio: f32,
    attack_ms: f32,
    release_ms: f32,
    knee_db: f32,
    makeup_db: f32,
    envelope: EnvelopeFollower,
    gain_reduction: Arc<AtomicF32>,
    block_size: usize,
}

impl Compressor {
    /// A 4:1 compressor at -18 dB.
    pub fn new() -> Self {
        Self {
            threshold_db: -18.0,
            ratio: 4.0,
            attack_ms: 10.0,
            release_ms: 100.0,
            knee_db: 6.0,
            makeup_db: 0.0,
            envelope: EnvelopeFollower::new(48000.0, 10.0, 100.0),
            gain_reduction: Arc::new(AtomicF32::new(0.0)),
            block_size: 0,
        }
    }

    /// Gain reduction of the last processed sample in dB (`<= 0`), readable
    /// from any thread.
    pub fn gain_reduction_meter(&self) -> Arc<AtomicF32> {
        Arc::clone(&self.gain_reduction)
    }

    #[inline]
    fn gain_db(&self, level_db: f32) -> f32 {
        let overshoot = level_db - self.threshold_db;
        let half_knee = self.knee_db / 2.0;
        let slope = 1.0 - 1.0 / self.ratio;
        if overshoot <= -half_knee {
            0.0
        } else if overshoot > half_knee || self.knee_db <= 0.0 {
            -overshoot * slope
        } else {
            let k = (overshoot + half_knee) / self.knee_db;
            -(k * k * overshoot * slope)
        }
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterInfo for Compressor {
    fn param_count(&self) -> usize {
        6
    }

    fn param_info(&self, index: usize) -> Option<ParamDescriptor> {
        match index {
            0 => Some(ParamDescriptor::gain_db("Threshold", "Thresh", -60.0, 0.0, -18.0)),
            1 => Some(ParamDescriptor::ratio("Ratio", 1.0, 20.0, 4.0)),
            2 => Some(ParamDescriptor::time_ms("Attack", "Att", 0.1, 100.0, 10.0)),
            3 => Some(ParamDescriptor::time_ms("Release", "Rel", 10.0, 1000.0, 100.0)),
            4 => Some(ParamDescriptor::gain_db("Knee", "Knee", 0.0, 12.0, 6.0)),
            5 => Some(ParamDescriptor::gain_db("Makeup", "Makeup", 0.0, 24.0, 0.0)),
            _ => None,
        }
    }

    fn get_param(&self, index: usize) -> f32 {
        match index {
            0 => self.threshold_db,
            1 => self.ratio,
            2 => self.attack_ms,
            3 => self.release_ms,
            4 => self.knee_db,
            5 => self.makeup_db,
            _ => 0.0,
        }
    }

    fn set_param(&mut self, index: usize, value: f32) {
        match index {
            0 => self.threshold_db = value.clamp(-60.0, 0.0),
            1 => self.ratio = value.clamp(1.0, 20.0),
            2 => {
                self.attack_ms = value.clamp(0.1, 100.0);
                self.envelope.set_attack_ms(self.attack_ms);
            }
            3 => {
                self.release_ms = value.clamp(10.0, 1000.0);
                self.envelope.set_release_ms(self.release_ms);
            }
            4 => self.knee_db = value.clamp(0.0, 12.0),
            5 => self.makeup_db = value.clamp(0.0, 24.0),
            _ => {}
        }
    }
}

impl Plugin for Compressor {
    fn plugin_id(&self) -> &'static str {
        "compressor"
    }

    fn name(&self) -> &'static str {
        "Compressor"
    }

    fn initialize(&mut self, sample_rate: f32, block_size: usize) {
        self.envelope.set_sample_rate(sample_rate);
        self.block_size = block_size;
    }

    fn process(
        &mut self,
        buffer: &mut [f32],
        _ctx: &mut ProcessContext<'_>,
    ) -> Result<(), PluginError> {
        if self.block_size == 0 {
            return Err(PluginError::NotInitialized);
        }
        if buffer.len() > self.block_size {
            return Err(PluginError::BlockTooLarge {
                got: buffer.len(),
                max: self.block_size,
            });
        }
        let makeup = db_to_linear(self.makeup_db);
        let mut reduction = 0.0;
        for s in buffer.iter_mut() {
            let level = self.envelope.process(*s);
            reduction = self.gain_db(linear_to_db(level));
            *s *= db_to_linear(reduction) * makeup;
        }
        self.gain_reduction.store(reduction);
        Ok(())
    }

    fn handle_command(&mut self, command: PluginCommand) -> bool {
        if command == PluginCommand::ResetState {
            self.reset();
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.envelope.reset();
        self.gain_reduction.store(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::BusBuffers;

    #[test]
    fn test_below_threshold_is_unity() {
        let c = Compressor::new();
        assert_eq!(c.gain_db(-40.0), 0.0);
    }

    #[test]
    fn test_above_knee_applies_ratio() {
        let c = Compressor::new();
        // 12 dB over at 4:1 -> 9 dB reduction
        assert!((c.gain_db(-6.0) + 9.0).abs() < 1e-4);
    }

    #[test]
    fn test_hard_knee() {
        let mut c = Compressor::new();
        c.set_param(4, 0.0);
        assert!((c.gain_db(-14.0) + 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_loud_block_reduced() {
        let mut c = Compressor::new();
        c.initialize(48000.0, 1024);
        let mut buses = BusBuffers::new(1, 1024);
        let mut ctx = ProcessContext::new(48000.0, 0, &mut buses);
        let mut block = [0.9; 1024];
        c.process(&mut block, &mut ctx).unwrap();
        assert!(block[1023] < 0.9);
        assert!(c.gain_reduction_meter().load() < 0.0);
    }
}
