//! Trim gain with polarity invert.

use crate::math::db_to_linear;
use crate::param_info::{ParamDescriptor, ParameterInfo};
use crate::plugin::{Plugin, PluginCommand, PluginError, ProcessContext};

/// Static gain stage.
///
/// | Index | Name | Range | Default |
/// |-------|------|-------|---------|
/// | 0 | Gain | -60.0–24.0 dB | 0.0 |
/// | 1 | Invert | off/on | off |
#[derive(Debug, Clone)]
pub struct GainPlugin {
    gain_db: f32,
    invert: bool,
    linear: f32,
    block_size: usize,
}

impl GainPlugin {
    /// Unity gain, polarity normal.
    pub fn new() -> Self {
        Self {
            gain_db: 0.0,
            invert: false,
            linear: 1.0,
            block_size: 0,
        }
    }

    fn update(&mut self) {
        let g = db_to_linear(self.gain_db);
        self.linear = if self.invert { -g } else { g };
    }
}

impl Default for GainPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterInfo for GainPlugin {
    fn param_count(&self) -> usize {
        2
    }

    fn param_info(&self, index: usize) -> Option<ParamDescriptor> {
        match index {
            0 => Some(ParamDescriptor::gain_db("Gain", "Gain", -60.0, 24.0, 0.0)),
            1 => Some(ParamDescriptor::toggle("Invert", false)),
            _ => None,
        }
    }

    fn get_param(&self, index: usize) -> f32 {
        match index {
            0 => self.gain_db,
            1 if self.invert => 1.0,
            _ => 0.0,
        }
    }

    fn set_param(&mut self, index: usize, value: f32) {
        match index {
            0 => self.gain_db = value.clamp(-60.0, 24.0),
            1 => self.invert = value >= 0.5,
            _ => return,
        }
        self.update();
    }
}

impl Plugin for GainPlugin {
    fn plugin_id(&self) -> &'static str {
        "gain"
    }

    fn name(&self) -> &'static str {
        "Gain"
    }

    fn initialize(&mut self, _sample_rate: f32, block_size: usize) {
        self.block_size = block_size;
    }

    fn process(
        &mut self,
        buffer: &mut [f32],
        _ctx: &mut ProcessContext<'_>,
    ) -> Result<(), PluginError> {
        if buffer.len() > self.block_size && self.block_size > 0 {
            return Err(PluginError::BlockTooLarge {
                got: buffer.len(),
                max: self.block_size,
            });
        }
        for s in buffer.iter_mut() {
            *s *= self.linear;
        }
        Ok(())
    }

    fn handle_command(&mut self, command: PluginCommand) -> bool {
        matches!(command, PluginCommand::ResetState)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::BusBuffers;

    #[test]
    fn test_gain_and_invert() {
        let mut gain = GainPlugin::new();
        gain.initialize(48000.0, 4);
        gain.set_param(0, -6.0206);
        gain.set_param(1, 1.0);
        let mut buses = BusBuffers::new(1, 4);
        let mut ctx = ProcessContext::new(48000.0, 0, &mut buses);
        let mut buffer = [1.0; 4];
        gain.process(&mut buffer, &mut ctx).unwrap();
        assert!((buffer[0] + 0.5).abs() < 1e-3);
        assert_eq!(gain.get_param(1), 1.0);
    }

    #[test]
    fn test_params_clamped() {
        let mut gain = GainPlugin::new();
        gain.set_param(0, 100.0);
        assert_eq!(gain.get_param(0), 24.0);
    }
}
