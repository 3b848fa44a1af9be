//! The plugin interface hosted by channel chains.
//!
//! A [`Plugin`] processes one mono block in place per callback. Plugins that
//! take part in channel routing advertise it through capability accessors
//! ([`Plugin::as_input`], [`Plugin::as_output`], [`Plugin::as_routing`]).
//! Those accessors are queried once when the plugin is registered in a chain
//! and the answers are stored on the slot as [`PluginCapabilities`]; the audio
//! thread never type-tests a plugin.

use std::sync::Arc;

use thiserror::Error;

use crate::param_info::ParameterInfo;
use crate::routing::{BusBuffers, RoutingPorts};

/// Errors a plugin reports from [`Plugin::process`] or [`Plugin::set_state`].
///
/// Variants used on the audio thread carry only `'static` data so that
/// reporting a fault never allocates.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PluginError {
    /// `process` was called before `initialize`.
    #[error("plugin used before initialize")]
    NotInitialized,

    /// The block is larger than the block size the plugin was initialized with.
    #[error("block of {got} samples exceeds initialized block size {max}")]
    BlockTooLarge {
        /// Samples in the offending block.
        got: usize,
        /// Block size passed to `initialize`.
        max: usize,
    },

    /// Processing failed for a plugin-specific reason.
    #[error("processing failed: {0}")]
    Failed(&'static str),

    /// A state blob could not be restored.
    #[error("invalid plugin state: {0}")]
    InvalidState(String),
}

/// Discrete commands delivered to a plugin through the parameter queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PluginCommand {
    /// No command. Used for non-command changes.
    #[default]
    None,
    /// Start or stop learning the noise floor.
    ToggleNoiseLearn,
    /// Clear internal DSP state (envelopes, delay lines).
    ResetState,
    /// Plugin-defined command code.
    Custom(u32),
}

/// How a plugin feeds its channel's signal, ordered by precedence.
///
/// When several input plugins end up in one channel, the one with the highest
/// kind is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InputKind {
    /// Hardware capture device.
    Device,
    /// Another channel's post-fader output.
    Bus,
    /// A copy tap written by a copy-to-channel plugin.
    CopyTap,
}

impl InputKind {
    /// Bus and copy inputs are pinned at chain position 0.
    pub fn is_pinned(self) -> bool {
        matches!(self, InputKind::Bus | InputKind::CopyTap)
    }
}

/// Which side of the stereo output mix an output send writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Left channel only.
    Left,
    /// Right channel only.
    Right,
    /// Both channels.
    Both,
}

impl OutputMode {
    /// Decode from a choice parameter value.
    pub fn from_index(index: f32) -> Self {
        match index.round() as i32 {
            0 => OutputMode::Left,
            1 => OutputMode::Right,
            _ => OutputMode::Both,
        }
    }

    /// Encode as a choice parameter value.
    pub fn index(self) -> f32 {
        match self {
            OutputMode::Left => 0.0,
            OutputMode::Right => 1.0,
            OutputMode::Both => 2.0,
        }
    }
}

/// A plugin that sources the channel's signal.
pub trait ChannelInputCapable {
    /// The kind of input this plugin provides.
    fn input_kind(&self) -> InputKind;
}

/// A plugin that sends the channel to the shared output mix.
pub trait ChannelOutputCapable {
    /// Current output mode.
    fn output_mode(&self) -> OutputMode;
}

/// A plugin whose processing depends on, or feeds, another channel.
///
/// The k-th parameter flagged [`ParamFlags::ROUTING`](crate::ParamFlags)
/// mirrors port k, so the control side can read channel references without
/// locking the plugin.
pub trait RoutingDependencyCapable {
    /// Shared channel references. The plugin reads them every block; the
    /// control side reads them to build the routing order and rewrites them
    /// when channels are removed.
    fn routing_ports(&self) -> Arc<RoutingPorts>;
}

/// Per-block context handed to [`Plugin::process`].
pub struct ProcessContext<'a> {
    /// Engine sample rate.
    pub sample_rate: f32,
    /// Sample position of the first sample in the block.
    pub sample_time: i64,
    /// Index of the channel being processed.
    pub channel: usize,
    /// Channel input gain (linear), applied by input plugins.
    pub input_gain: f32,
    /// Channel output gain (linear), applied by output sends.
    pub output_gain: f32,
    /// `false` when the channel is muted or silenced by another channel's solo.
    pub output_enabled: bool,
    /// Capture device blocks for this callback, indexed by device.
    pub device_inputs: &'a [&'a [f32]],
    /// Cross-channel buffers for this block.
    pub buses: &'a mut BusBuffers,
}

impl<'a> ProcessContext<'a> {
    /// A context with unity gains and no device input.
    pub fn new(sample_rate: f32, channel: usize, buses: &'a mut BusBuffers) -> Self {
        Self {
            sample_rate,
            sample_time: 0,
            channel,
            input_gain: 1.0,
            output_gain: 1.0,
            output_enabled: true,
            device_inputs: &[],
            buses,
        }
    }
}

/// A hosted audio processor.
///
/// Object safe so chains can hold `Box<dyn Plugin>`. Parameter access comes
/// from the [`ParameterInfo`] supertrait.
///
/// # Real-time contract
///
/// [`process`](Plugin::process), [`handle_command`](Plugin::handle_command)
/// and [`ParameterInfo::set_param`] run on the audio thread and must not
/// allocate, lock or block. Everything else runs on the control thread.
pub trait Plugin: ParameterInfo + Send {
    /// Stable registry identifier (e.g. `"compressor"`).
    fn plugin_id(&self) -> &'static str;

    /// Human-readable name.
    fn name(&self) -> &'static str {
        self.plugin_id()
    }

    /// Prepare for processing. Called before the first block and again on
    /// every engine restart.
    fn initialize(&mut self, sample_rate: f32, block_size: usize);

    /// Process one block in place.
    ///
    /// # Errors
    ///
    /// A returned error bypasses this plugin for the block; the chain restores
    /// the block to what it was before the call.
    fn process(
        &mut self,
        buffer: &mut [f32],
        ctx: &mut ProcessContext<'_>,
    ) -> Result<(), PluginError>;

    /// Processing latency in samples.
    fn latency_samples(&self) -> usize {
        0
    }

    /// Opaque state blob beyond the parameter values.
    fn state(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Restore a blob produced by [`state`](Plugin::state).
    fn set_state(&mut self, _state: &[u8]) -> Result<(), PluginError> {
        Ok(())
    }

    /// Handle a queued command. Returns `false` if the command is not supported.
    fn handle_command(&mut self, _command: PluginCommand) -> bool {
        false
    }

    /// Clear DSP state without changing parameters.
    fn reset(&mut self) {}

    /// Release resources. Called exactly once, off the audio thread, after the
    /// plugin has left every chain snapshot the audio thread could be reading.
    fn dispose(&mut self) {}

    /// Input capability, if any.
    fn as_input(&self) -> Option<&dyn ChannelInputCapable> {
        None
    }

    /// Output capability, if any.
    fn as_output(&self) -> Option<&dyn ChannelOutputCapable> {
        None
    }

    /// Routing-dependency capability, if any.
    fn as_routing(&self) -> Option<&dyn RoutingDependencyCapable> {
        None
    }
}

/// Capabilities captured from a plugin at registration time.
#[derive(Debug, Clone, Default)]
pub struct PluginCapabilities {
    /// Input kind, for input plugins.
    pub input: Option<InputKind>,
    /// `true` for output sends.
    pub output_send: bool,
    /// Shared channel references, for routing plugins.
    pub routing: Option<Arc<RoutingPorts>>,
}

impl PluginCapabilities {
    /// Query every capability accessor once.
    pub fn of(plugin: &dyn Plugin) -> Self {
        Self {
            input: plugin.as_input().map(ChannelInputCapable::input_kind),
            output_send: plugin.as_output().is_some(),
            routing: plugin.as_routing().map(RoutingDependencyCapable::routing_ports),
        }
    }

    /// Bus and copy inputs cannot be moved from position 0 or removed by the user.
    pub fn is_pinned(&self) -> bool {
        self.input.is_some_and(InputKind::is_pinned)
    }

    /// Any input plugin. Inputs always occupy position 0.
    pub fn is_input(&self) -> bool {
        self.input.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_kind_precedence() {
        assert!(InputKind::CopyTap > InputKind::Bus);
        assert!(InputKind::Bus > InputKind::Device);
        let kinds = [InputKind::Bus, InputKind::Device, InputKind::CopyTap];
        assert_eq!(kinds.iter().max(), Some(&InputKind::CopyTap));
    }

    #[test]
    fn test_pinned_kinds() {
        assert!(!InputKind::Device.is_pinned());
        assert!(InputKind::Bus.is_pinned());
        assert!(InputKind::CopyTap.is_pinned());
    }

    #[test]
    fn test_output_mode_index() {
        for mode in [OutputMode::Left, OutputMode::Right, OutputMode::Both] {
            assert_eq!(OutputMode::from_index(mode.index()), mode);
        }
        assert_eq!(OutputMode::from_index(7.0), OutputMode::Both);
    }

    #[test]
    fn test_plugin_error_display() {
        let err = PluginError::BlockTooLarge { got: 512, max: 256 };
        assert_eq!(
            err.to_string(),
            "block of 512 samples exceeds initialized block size 256"
        );
        assert_eq!(
            PluginError::Failed("denormal storm").to_string(),
            "processing failed: denormal storm"
        );
    }
}
