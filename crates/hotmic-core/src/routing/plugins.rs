//! Built-in routing plugins.
//!
//! | Plugin | Id | Capability | Dependency |
//! |--------|----|------------|------------|
//! | [`InputSource`] | `input_source` | input (device) | none |
//! | [`BusInput`] | `bus_input` / `copy_input` | input (bus / copy tap), routing | channel reads source |
//! | [`CopyToChannel`] | `copy_to_channel` | routing | target reads channel |
//! | [`ChannelMerge`] | `merge` | routing | channel reads every source |
//! | [`OutputSend`] | `output_send` | output | none |

use std::sync::Arc;

use crate::param_info::{ParamDescriptor, ParamFlags, ParamUnit, ParameterInfo};
use crate::plugin::{
    ChannelInputCapable, ChannelOutputCapable, InputKind, OutputMode, Plugin, PluginError,
    ProcessContext, RoutingDependencyCapable,
};

use super::ports::{MAX_ROUTING_PORTS, RoutingPorts, RoutingRole};

fn check_block(block_size: usize, len: usize) -> Result<(), PluginError> {
    if block_size == 0 {
        Err(PluginError::NotInitialized)
    } else if len > block_size {
        Err(PluginError::BlockTooLarge {
            got: len,
            max: block_size,
        })
    } else {
        Ok(())
    }
}

fn channel_value(ch: Option<usize>) -> f32 {
    ch.map_or(-1.0, |c| c as f32)
}

fn channel_from_value(value: f32) -> Option<usize> {
    let v = value.round();
    if v < 0.0 { None } else { Some(v as usize) }
}

// ---------------------------------------------------------------------------
// InputSource
// ---------------------------------------------------------------------------

/// Reads a capture device into the channel, applying the channel input gain.
#[derive(Debug)]
pub struct InputSource {
    device: usize,
    block_size: usize,
}

impl InputSource {
    /// Read from capture device `device`.
    pub fn new(device: usize) -> Self {
        Self {
            device,
            block_size: 0,
        }
    }

    /// Current device index.
    pub fn device(&self) -> usize {
        self.device
    }
}

impl ParameterInfo for InputSource {
    fn param_count(&self) -> usize {
        1
    }

    fn param_info(&self, index: usize) -> Option<ParamDescriptor> {
        match index {
            0 => Some(ParamDescriptor {
                name: "Device",
                short_name: "Dev",
                unit: ParamUnit::Choice,
                min: 0.0,
                max: 63.0,
                default: 0.0,
                step: 1.0,
                flags: ParamFlags::STEPPED,
            }),
            _ => None,
        }
    }

    fn get_param(&self, index: usize) -> f32 {
        if index == 0 { self.device as f32 } else { 0.0 }
    }

    fn set_param(&mut self, index: usize, value: f32) {
        if index == 0 {
            self.device = value.round().clamp(0.0, 63.0) as usize;
        }
    }
}

impl ChannelInputCapable for InputSource {
    fn input_kind(&self) -> InputKind {
        InputKind::Device
    }
}

impl Plugin for InputSource {
    fn plugin_id(&self) -> &'static str {
        "input_source"
    }

    fn name(&self) -> &'static str {
        "Input"
    }

    fn initialize(&mut self, _sample_rate: f32, block_size: usize) {
        self.block_size = block_size;
    }

    fn process(
        &mut self,
        buffer: &mut [f32],
        ctx: &mut ProcessContext<'_>,
    ) -> Result<(), PluginError> {
        check_block(self.block_size, buffer.len())?;
        match ctx.device_inputs.get(self.device) {
            Some(input) => {
                let n = buffer.len().min(input.len());
                for (o, &s) in buffer[..n].iter_mut().zip(&input[..n]) {
                    *o = s * ctx.input_gain;
                }
                buffer[n..].fill(0.0);
            }
            None => buffer.fill(0.0),
        }
        Ok(())
    }

    fn as_input(&self) -> Option<&dyn ChannelInputCapable> {
        Some(self)
    }
}

// ---------------------------------------------------------------------------
// BusInput
// ---------------------------------------------------------------------------

/// Feeds the channel from another channel.
///
/// In [`InputKind::Bus`] mode the plugin reads the source channel's post-fader
/// output. In [`InputKind::CopyTap`] mode it reads the copy tap written for
/// this channel by a [`CopyToChannel`] on the source.
#[derive(Debug)]
pub struct BusInput {
    kind: InputKind,
    ports: Arc<RoutingPorts>,
    block_size: usize,
}

impl BusInput {
    /// Read `source`'s post-fader output.
    pub fn bus(source: Option<usize>) -> Self {
        Self::with_kind(InputKind::Bus, source)
    }

    /// Read the copy tap fed by `source`.
    pub fn copy_tap(source: Option<usize>) -> Self {
        Self::with_kind(InputKind::CopyTap, source)
    }

    fn with_kind(kind: InputKind, source: Option<usize>) -> Self {
        Self {
            kind,
            ports: Arc::new(RoutingPorts::new(RoutingRole::ReadsFrom, &[source])),
            block_size: 0,
        }
    }

    /// Source channel.
    pub fn source(&self) -> Option<usize> {
        self.ports.get(0)
    }
}

impl ParameterInfo for BusInput {
    fn param_count(&self) -> usize {
        1
    }

    fn param_info(&self, index: usize) -> Option<ParamDescriptor> {
        match index {
            0 => Some(ParamDescriptor::channel("Source", "Src", -1.0)),
            _ => None,
        }
    }

    fn get_param(&self, index: usize) -> f32 {
        if index == 0 {
            channel_value(self.ports.get(0))
        } else {
            0.0
        }
    }

    fn set_param(&mut self, index: usize, value: f32) {
        if index == 0 {
            self.ports.set(0, channel_from_value(value));
        }
    }
}

impl ChannelInputCapable for BusInput {
    fn input_kind(&self) -> InputKind {
        self.kind
    }
}

impl RoutingDependencyCapable for BusInput {
    fn routing_ports(&self) -> Arc<RoutingPorts> {
        Arc::clone(&self.ports)
    }
}

impl Plugin for BusInput {
    fn plugin_id(&self) -> &'static str {
        match self.kind {
            InputKind::CopyTap => "copy_input",
            _ => "bus_input",
        }
    }

    fn name(&self) -> &'static str {
        match self.kind {
            InputKind::CopyTap => "Copy Input",
            _ => "Bus Input",
        }
    }

    fn initialize(&mut self, _sample_rate: f32, block_size: usize) {
        self.block_size = block_size;
    }

    fn process(
        &mut self,
        buffer: &mut [f32],
        ctx: &mut ProcessContext<'_>,
    ) -> Result<(), PluginError> {
        check_block(self.block_size, buffer.len())?;
        let source = self.ports.get(0).filter(|&s| s != ctx.channel);
        let feed = match (self.kind, source) {
            (_, None) => None,
            (InputKind::CopyTap, Some(_)) => ctx.buses.copy_tap(ctx.channel),
            (_, Some(src)) => ctx.buses.channel_output(src),
        };
        match feed {
            Some(feed) => {
                let n = buffer.len().min(feed.len());
                for (o, &s) in buffer[..n].iter_mut().zip(&feed[..n]) {
                    *o = s * ctx.input_gain;
                }
                buffer[n..].fill(0.0);
            }
            None => buffer.fill(0.0),
        }
        Ok(())
    }

    fn as_input(&self) -> Option<&dyn ChannelInputCapable> {
        Some(self)
    }

    fn as_routing(&self) -> Option<&dyn RoutingDependencyCapable> {
        Some(self)
    }
}

// ---------------------------------------------------------------------------
// CopyToChannel
// ---------------------------------------------------------------------------

/// Copies the signal at its chain position to a target channel's copy tap.
///
/// The signal passes through unchanged.
#[derive(Debug)]
pub struct CopyToChannel {
    ports: Arc<RoutingPorts>,
    block_size: usize,
}

impl CopyToChannel {
    /// Copy into `target`.
    pub fn new(target: Option<usize>) -> Self {
        Self {
            ports: Arc::new(RoutingPorts::new(RoutingRole::FeedsInto, &[target])),
            block_size: 0,
        }
    }

    /// Target channel.
    pub fn target(&self) -> Option<usize> {
        self.ports.get(0)
    }
}

impl ParameterInfo for CopyToChannel {
    fn param_count(&self) -> usize {
        1
    }

    fn param_info(&self, index: usize) -> Option<ParamDescriptor> {
        match index {
            0 => Some(ParamDescriptor::channel("Target", "Dst", -1.0)),
            _ => None,
        }
    }

    fn get_param(&self, index: usize) -> f32 {
        if index == 0 {
            channel_value(self.ports.get(0))
        } else {
            0.0
        }
    }

    fn set_param(&mut self, index: usize, value: f32) {
        if index == 0 {
            self.ports.set(0, channel_from_value(value));
        }
    }
}

impl RoutingDependencyCapable for CopyToChannel {
    fn routing_ports(&self) -> Arc<RoutingPorts> {
        Arc::clone(&self.ports)
    }
}

impl Plugin for CopyToChannel {
    fn plugin_id(&self) -> &'static str {
        "copy_to_channel"
    }

    fn name(&self) -> &'static str {
        "Copy To Channel"
    }

    fn initialize(&mut self, _sample_rate: f32, block_size: usize) {
        self.block_size = block_size;
    }

    fn process(
        &mut self,
        buffer: &mut [f32],
        ctx: &mut ProcessContext<'_>,
    ) -> Result<(), PluginError> {
        check_block(self.block_size, buffer.len())?;
        if let Some(target) = self.ports.get(0).filter(|&t| t != ctx.channel) {
            ctx.buses.write_copy(target, buffer);
        }
        Ok(())
    }

    fn as_routing(&self) -> Option<&dyn RoutingDependencyCapable> {
        Some(self)
    }
}

// ---------------------------------------------------------------------------
// ChannelMerge
// ---------------------------------------------------------------------------

/// Sums up to [`MAX_ROUTING_PORTS`] other channels' outputs into this channel.
#[derive(Debug)]
pub struct ChannelMerge {
    ports: Arc<RoutingPorts>,
    block_size: usize,
}

const MERGE_PARAM_NAMES: [&str; MAX_ROUTING_PORTS] = [
    "Source 1", "Source 2", "Source 3", "Source 4", "Source 5", "Source 6", "Source 7",
    "Source 8",
];

impl ChannelMerge {
    /// Merge the listed sources (extra entries beyond the port count are ignored).
    pub fn new(sources: &[usize]) -> Self {
        let initial: Vec<Option<usize>> = sources.iter().copied().map(Some).collect();
        Self {
            ports: Arc::new(RoutingPorts::new(RoutingRole::ReadsFrom, &initial)),
            block_size: 0,
        }
    }

    /// Current sources.
    pub fn sources(&self) -> Vec<usize> {
        self.ports.channels()
    }
}

impl ParameterInfo for ChannelMerge {
    fn param_count(&self) -> usize {
        MAX_ROUTING_PORTS
    }

    fn param_info(&self, index: usize) -> Option<ParamDescriptor> {
        MERGE_PARAM_NAMES
            .get(index)
            .map(|&name| ParamDescriptor::channel(name, name, -1.0))
    }

    fn get_param(&self, index: usize) -> f32 {
        channel_value(self.ports.get(index))
    }

    fn set_param(&mut self, index: usize, value: f32) {
        self.ports.set(index, channel_from_value(value));
    }
}

impl RoutingDependencyCapable for ChannelMerge {
    fn routing_ports(&self) -> Arc<RoutingPorts> {
        Arc::clone(&self.ports)
    }
}

impl Plugin for ChannelMerge {
    fn plugin_id(&self) -> &'static str {
        "merge"
    }

    fn name(&self) -> &'static str {
        "Merge"
    }

    fn initialize(&mut self, _sample_rate: f32, block_size: usize) {
        self.block_size = block_size;
    }

    fn process(
        &mut self,
        buffer: &mut [f32],
        ctx: &mut ProcessContext<'_>,
    ) -> Result<(), PluginError> {
        check_block(self.block_size, buffer.len())?;
        for port in 0..MAX_ROUTING_PORTS {
            let Some(src) = self.ports.get(port).filter(|&s| s != ctx.channel) else {
                continue;
            };
            if let Some(feed) = ctx.buses.channel_output(src) {
                for (o, &s) in buffer.iter_mut().zip(feed) {
                    *o += s;
                }
            }
        }
        Ok(())
    }

    fn as_routing(&self) -> Option<&dyn RoutingDependencyCapable> {
        Some(self)
    }
}

// ---------------------------------------------------------------------------
// OutputSend
// ---------------------------------------------------------------------------

/// Sends the channel to the shared output mix at the channel output gain.
///
/// Only one output send across all channels is active at a time; the engine
/// bypasses the others.
#[derive(Debug)]
pub struct OutputSend {
    mode: OutputMode,
    block_size: usize,
}

impl OutputSend {
    /// Send with the given mode.
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            block_size: 0,
        }
    }
}

impl Default for OutputSend {
    fn default() -> Self {
        Self::new(OutputMode::Both)
    }
}

impl ParameterInfo for OutputSend {
    fn param_count(&self) -> usize {
        1
    }

    fn param_info(&self, index: usize) -> Option<ParamDescriptor> {
        match index {
            0 => Some(ParamDescriptor::choice("Mode", 3, 2)),
            _ => None,
        }
    }

    fn get_param(&self, index: usize) -> f32 {
        if index == 0 { self.mode.index() } else { 0.0 }
    }

    fn set_param(&mut self, index: usize, value: f32) {
        if index == 0 {
            self.mode = OutputMode::from_index(value);
        }
    }
}

impl ChannelOutputCapable for OutputSend {
    fn output_mode(&self) -> OutputMode {
        self.mode
    }
}

impl Plugin for OutputSend {
    fn plugin_id(&self) -> &'static str {
        "output_send"
    }

    fn name(&self) -> &'static str {
        "Output"
    }

    fn initialize(&mut self, _sample_rate: f32, block_size: usize) {
        self.block_size = block_size;
    }

    fn process(
        &mut self,
        buffer: &mut [f32],
        ctx: &mut ProcessContext<'_>,
    ) -> Result<(), PluginError> {
        check_block(self.block_size, buffer.len())?;
        if ctx.output_enabled {
            ctx.buses.mix_output(buffer, ctx.output_gain, self.mode);
        }
        Ok(())
    }

    fn as_output(&self) -> Option<&dyn ChannelOutputCapable> {
        Some(self)
    }
}
