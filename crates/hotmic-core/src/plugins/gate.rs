//! Noise gate with noise-floor learning.

use super::envelope::EnvelopeFollower;
use crate::math::{db_to_linear, linear_to_db};
use crate::param_info::{ParamDescriptor, ParameterInfo};
use crate::plugin::{Plugin, PluginCommand, PluginError, ProcessContext};

/// Headroom added above the learned noise floor when setting the threshold.
pub const LEARN_MARGIN_DB: f32 = 6.0;

const THRESHOLD_MIN: f32 = -80.0;
const THRESHOLD_MAX: f32 = 0.0;

/// Noise gate.
///
/// [`PluginCommand::ToggleNoiseLearn`] starts learning: the gate passes audio
/// and tracks the loudest envelope level it sees. The second toggle stops
/// learning and sets the threshold [`LEARN_MARGIN_DB`] above that floor.
///
/// | Index | Name | Range | Default |
/// |-------|------|-------|---------|
/// | 0 | Threshold | -80.0–0.0 dB | -50.0 |
/// | 1 | Attack | 0.1–50.0 ms | 1.0 |
/// | 2 | Release | 10.0–1000.0 ms | 100.0 |
/// | 3 | Hold | 0.0–500.0 ms | 50.0 |
#[derive(Debug, Clone)]
pub struct NoiseGate {
    threshold_db: f32,
    attack_ms: f32,
    release_ms: f32,
    hold_ms: f32,
    detector: EnvelopeFollower,
    gain: f32,
    attack_step: f32,
    release_step: f32,
    hold_samples: u32,
    hold_counter: u32,
    learning: bool,
    learned_floor: f32,
    sample_rate: f32,
    block_size: usize,
}

impl NoiseGate {
    /// A closed gate at -50 dB.
    pub fn new() -> Self {
        let mut gate = Self {
            threshold_db: -50.0,
            attack_ms: 1.0,
            release_ms: 100.0,
            hold_ms: 50.0,
            detector: EnvelopeFollower::new(48000.0, 0.1, 20.0),
            gain: 0.0,
            attack_step: 0.0,
            release_step: 0.0,
            hold_samples: 0,
            hold_counter: 0,
            learning: false,
            learned_floor: 0.0,
            sample_rate: 48000.0,
            block_size: 0,
        };
        gate.recalculate();
        gate
    }

    /// Whether noise learning is running.
    pub fn is_learning(&self) -> bool {
        self.learning
    }

    /// Current threshold in dB.
    pub fn threshold_db(&self) -> f32 {
        self.threshold_db
    }

    fn recalculate(&mut self) {
        let per_ms = self.sample_rate / 1000.0;
        self.attack_step = 1.0 / (self.attack_ms * per_ms).max(1.0);
        self.release_step = 1.0 / (self.release_ms * per_ms).max(1.0);
        self.hold_samples = (self.hold_ms * per_ms) as u32;
    }

    fn toggle_learn(&mut self) {
        if self.learning {
            self.learning = false;
            let floor_db = linear_to_db(self.learned_floor);
            self.threshold_db = (floor_db + LEARN_MARGIN_DB).clamp(THRESHOLD_MIN, THRESHOLD_MAX);
        } else {
            self.learning = true;
            self.learned_floor = 0.0;
        }
    }
}

impl Default for NoiseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterInfo for NoiseGate {
    fn param_count(&self) -> usize {
        4
    }

    fn param_info(&self, index: usize) -> Option<ParamDescriptor> {
        match index {
            0 => Some(ParamDescriptor::gain_db(
                "Threshold",
                "Thresh",
                THRESHOLD_MIN,
                THRESHOLD_MAX,
                -50.0,
            )),
            1 => Some(ParamDescriptor::time_ms("Attack", "Att", 0.1, 50.0, 1.0)),
            2 => Some(ParamDescriptor::time_ms("Release", "Rel", 10.0, 1000.0, 100.0)),
            3 => Some(ParamDescriptor::time_ms("Hold", "Hold", 0.0, 500.0, 50.0)),
            _ => None,
        }
    }

    fn get_param(&self, index: usize) -> f32 {
        match index {
            0 => self.threshold_db,
            1 => self.attack_ms,
            2 => self.release_ms,
            3 => self.hold_ms,
            _ => 0.0,
        }
    }

    fn set_param(&mut self, index: usize, value: f32) {
        match index {
            0 => self.threshold_db = value.clamp(THRESHOLD_MIN, THRESHOLD_MAX),
            1 => self.attack_ms = value.clamp(0.1, 50.0),
            2 => self.release_ms = value.clamp(10.0, 1000.0),
            3 => self.hold_ms = value.clamp(0.0, 500.0),
            _ => return,
        }
        self.recalculate();
    }
}

impl Plugin for NoiseGate {
    fn plugin_id(&self) -> &'static str {
        "noise_gate"
    }

    fn name(&self) -> &'static str {
        "Noise Gate"
    }

    fn initialize(&mut self, sample_rate: f32, block_size: usize) {
        self.sample_rate = sample_rate;
        self.block_size = block_size;
        self.detector.set_sample_rate(sample_rate);
        self.recalculate();
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

        let threshold = db_to_linear(self.threshold_db);
        for s in buffer.iter_mut() {
            let level = self.detector.process(*s);
            if self.learning {
                self.learned_floor = self.learned_floor.max(level);
                continue;
            }
            if level > threshold {
                self.hold_counter = self.hold_samples;
                self.gain = (self.gain + self.attack_step).min(1.0);
            } else if self.hold_counter > 0 {
                self.hold_counter -= 1;
            } else {
                self.gain = (self.gain - self.release_step).max(0.0);
            }
            *s *= self.gain;
        }
        Ok(())
    }

    fn state(&self) -> Vec<u8> {
        self.learned_floor.to_le_bytes().to_vec()
    }

    fn set_state(&mut self, state: &[u8]) -> Result<(), PluginError> {
        if state.is_empty() {
            return Ok(());
        }
        let bytes: [u8; 4] = state
            .try_into()
            .map_err(|_| PluginError::InvalidState(format!("expected 4 bytes, got {}", state.len())))?;
        self.learned_floor = f32::from_le_bytes(bytes);
        Ok(())
    }

    fn handle_command(&mut self, command: PluginCommand) -> bool {
        match command {
            PluginCommand::ToggleNoiseLearn => {
                self.toggle_learn();
                true
            }
            PluginCommand::ResetState => {
                self.reset();
                true
            }
            _ => false,
        }
    }

    fn reset(&mut self) {
        self.detector.reset();
        self.gain = 0.0;
        self.hold_counter = 0;
    }
}
