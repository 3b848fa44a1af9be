//! Channels, routing and the control/audio split.
//!
//! [`Engine::new`] returns two halves. The [`Engine`] stays on the control
//! thread and owns every channel's [`PluginGraph`], the parameter sender and
//! the routing order. The [`AudioProcessor`] moves into the audio callback.
//! They share only atomics, `ArcSwap` snapshots and the parameter queue.
//!
//! ```rust
//! use hotmic_core::OutputMode;
//! use hotmic_core::engine::{Engine, EngineSettings};
//! use hotmic_core::routing::{InputSource, OutputSend};
//!
//! let (mut engine, mut processor) = Engine::new(EngineSettings::default().with_block_size(64));
//! let mic = engine.add_channel("Mic").unwrap();
//! engine.insert_plugin(mic, Box::new(InputSource::new(0)), 0).unwrap();
//! engine.insert_plugin(mic, Box::new(OutputSend::new(OutputMode::Both)), 1).unwrap();
//! engine.maintain();
//!
//! let input = vec![0.5_f32; 64];
//! let (mut left, mut right) = (vec![0.0; 64], vec![0.0; 64]);
//! processor.process(&[&input], &mut left, &mut right);
//! assert_eq!(left[10], 0.5);
//! assert_eq!(right[10], 0.5);
//! ```
//!
//! Cross-channel rules live here because they need every channel:
//! routing edits that would close a cycle are rejected, and only one output
//! send across all channels stays active.

mod capture;
mod processor;
mod runtime;

pub use capture::{CaptureMeta, CaptureSink, CaptureSource};
pub use processor::AudioProcessor;
pub use runtime::ChannelRuntime;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;

use crate::chain::{BlockClock, ChainSnapshot, DisposalQueue, PluginChain, PluginSlot};
use crate::config::{ChannelConfig, RoutingConfig, TapPoint};
use crate::diagnostics::Diagnostics;
use crate::graph::{GraphError, PluginGraph};
use crate::meter::MeterReading;
use crate::plugin::{Plugin, PluginCapabilities};
use crate::queue::{
    DEFAULT_OVERFLOW_CAPACITY, DEFAULT_QUEUE_CAPACITY, Enqueued, ParameterChange, ParameterKind,
    ParameterSender, parameter_queue,
};
use crate::registry::PluginRegistry;
use crate::routing::{RoutingContext, RoutingPlan, RoutingState, collect_edges, find_cycle_edge};

/// Engine construction parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    /// Sample rate in Hz.
    pub sample_rate: f32,
    /// Maximum samples per callback.
    pub block_size: usize,
    /// Channel limit; bus buffers are sized for it up front.
    pub max_channels: usize,
    /// Capture inputs tracked by diagnostics.
    pub device_inputs: usize,
    /// Parameter queue transport capacity.
    pub queue_capacity: usize,
    /// Parameter queue overflow capacity.
    pub overflow_capacity: usize,
    /// Output device buffering added to reported latency.
    pub output_latency_samples: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            block_size: 256,
            max_channels: 16,
            device_inputs: 2,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_capacity: DEFAULT_OVERFLOW_CAPACITY,
            output_latency_samples: 0,
        }
    }
}

impl EngineSettings {
    /// Builder: sample rate.
    pub fn with_sample_rate(mut self, sample_rate: f32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Builder: block size.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Builder: channel limit.
    pub fn with_max_channels(mut self, max_channels: usize) -> Self {
        self.max_channels = max_channels;
        self
    }

    fn sanitized(mut self) -> Self {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            self.sample_rate = 48000.0;
        }
        self.block_size = self.block_size.max(1);
        self.max_channels = self.max_channels.max(1);
        self.queue_capacity = self.queue_capacity.max(1);
        self
    }
}

/// State shared between [`Engine`] and [`AudioProcessor`].
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) channels: ArcSwap<Vec<Arc<ChannelRuntime>>>,
    pub(crate) routing: RoutingContext,
    pub(crate) clock: Arc<BlockClock>,
    pub(crate) disposal: Arc<DisposalQueue>,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) tap: ArcSwap<RoutingConfig>,
    pub(crate) deferred_dropped: AtomicU64,
}

/// What one [`Engine::maintain`] pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Maintenance {
    /// Slots disposed.
    pub disposed: usize,
    /// Parked parameter changes moved to the transport.
    pub flushed: usize,
    /// Whether the routing order was rebuilt.
    pub rebuilt: bool,
}

/// Control-thread handle to the engine.
#[derive(Debug)]
pub struct Engine {
    shared: Arc<Shared>,
    graphs: Vec<PluginGraph>,
    sender: ParameterSender,
    settings: EngineSettings,
}

impl Engine {
    /// Create an engine with no channels.
    pub fn new(settings: EngineSettings) -> (Self, AudioProcessor) {
        let settings = settings.sanitized();
        let clock = Arc::new(BlockClock::new());
        let disposal = Arc::new(DisposalQueue::new(Arc::clone(&clock)));
        let shared = Arc::new(Shared {
            channels: ArcSwap::from_pointee(Vec::new()),
            routing: RoutingContext::new(settings.sample_rate, settings.block_size),
            clock,
            disposal,
            diagnostics: Diagnostics::new(settings.device_inputs),
            tap: ArcSwap::from_pointee(RoutingConfig::default()),
            deferred_dropped: AtomicU64::new(0),
        });
        Self::assemble(shared, Vec::new(), settings)
    }

    fn assemble(
        shared: Arc<Shared>,
        graphs: Vec<PluginGraph>,
        settings: EngineSettings,
    ) -> (Self, AudioProcessor) {
        let (sender, receiver) =
            parameter_queue(settings.queue_capacity, settings.overflow_capacity);
        let processor = AudioProcessor::new(
            Arc::clone(&shared),
            receiver,
            settings.max_channels,
            settings.sample_rate,
            settings.block_size,
            settings.queue_capacity,
        );
        #[cfg(feature = "tracing")]
        tracing::info!(
            sample_rate = settings.sample_rate,
            block_size = settings.block_size,
            channels = graphs.len(),
            "engine started"
        );
        (
            Self {
                shared,
                graphs,
                sender,
                settings,
            },
            processor,
        )
    }

    /// Settings the engine runs with.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.graphs.len()
    }

    /// Editor of `channel`.
    pub fn graph(&self, channel: usize) -> Option<&PluginGraph> {
        self.graphs.get(channel)
    }

    /// Audio-side state of `channel`.
    pub fn channel(&self, channel: usize) -> Option<Arc<ChannelRuntime>> {
        self.shared.channels.load().get(channel).cloned()
    }

    /// Post-fader level of `channel`.
    pub fn channel_meter(&self, channel: usize) -> Option<MeterReading> {
        self.channel(channel).map(|rt| rt.meter())
    }

    /// Routing order holder.
    pub fn routing(&self) -> &RoutingContext {
        &self.shared.routing
    }

    /// Device health counters.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.shared.diagnostics
    }

    /// Deferred disposal shared by every channel.
    pub fn disposal(&self) -> &Arc<DisposalQueue> {
        &self.shared.disposal
    }

    /// Audio block counter.
    pub fn block_clock(&self) -> &Arc<BlockClock> {
        &self.shared.clock
    }

    /// Plugin changes dropped because the audio-side deferral list was full.
    pub fn deferred_dropped(&self) -> u64 {
        self.shared.deferred_dropped.load(Ordering::Relaxed)
    }

    /// The parameter queue's control end, for its counters.
    pub fn parameter_queue(&self) -> &ParameterSender {
        &self.sender
    }

    fn graph_mut(&mut self, channel: usize) -> Result<&mut PluginGraph, GraphError> {
        self.graphs
            .get_mut(channel)
            .ok_or(GraphError::ChannelNotFound(channel))
    }

    fn publish_runtimes(&self, update: impl FnOnce(&mut Vec<Arc<ChannelRuntime>>)) {
        let mut runtimes = self.shared.channels.load().as_ref().clone();
        update(&mut runtimes);
        self.shared.channels.store(Arc::new(runtimes));
    }

    fn new_channel(&self, name: &str) -> Result<(PluginGraph, Arc<ChannelRuntime>), GraphError> {
        if self.graphs.len() >= self.settings.max_channels {
            return Err(GraphError::ChannelLimit {
                max: self.settings.max_channels,
            });
        }
        let chain = Arc::new(PluginChain::new(Arc::clone(&self.shared.disposal)));
        let graph = PluginGraph::new(
            name,
            Arc::clone(&chain),
            self.settings.sample_rate,
            self.settings.block_size,
        );
        Ok((graph, Arc::new(ChannelRuntime::new(chain))))
    }

    fn push_channel(&mut self, graph: PluginGraph, runtime: Arc<ChannelRuntime>) -> usize {
        self.graphs.push(graph);
        self.publish_runtimes(|list| list.push(runtime));
        self.shared.routing.mark_stale();
        self.graphs.len() - 1
    }

    /// Append an empty channel and return its index.
    ///
    /// # Errors
    ///
    /// [`GraphError::ChannelLimit`].
    pub fn add_channel(&mut self, name: &str) -> Result<usize, GraphError> {
        let (graph, runtime) = self.new_channel(name)?;
        let index = self.push_channel(graph, runtime);
        #[cfg(feature = "tracing")]
        tracing::debug!(channel = index, name, "channel added");
        Ok(index)
    }

    /// Append a channel built from a saved configuration.
    ///
    /// Nothing is added if a plugin cannot be restored.
    ///
    /// # Errors
    ///
    /// [`GraphError::ChannelLimit`] or any error of
    /// [`PluginGraph::restore_from_config`].
    pub fn restore_channel(
        &mut self,
        config: &ChannelConfig,
        registry: &PluginRegistry,
    ) -> Result<usize, GraphError> {
        let (mut graph, runtime) = self.new_channel(&config.name)?;
        graph.restore_from_config(config, registry)?;
        runtime.load_strip(
            config.input_gain_db,
            config.output_gain_db,
            config.muted,
            config.soloed,
        );
        let index = self.push_channel(graph, runtime);
        self.normalize_output_sends(None);
        Ok(index)
    }

    /// Delete a channel and every plugin on it.
    ///
    /// Routing references to the deleted channel move to channel 0 and
    /// references above it shift down by one, in the live ports and in every
    /// mirror. The routing order is rebuilt before returning. Returns the
    /// removed instance IDs.
    ///
    /// # Errors
    ///
    /// [`GraphError::ChannelNotFound`].
    pub fn remove_channel(&mut self, channel: usize) -> Result<Vec<i32>, GraphError> {
        if channel >= self.graphs.len() {
            return Err(GraphError::ChannelNotFound(channel));
        }
        let mut graph = self.graphs.remove(channel);
        let removed = graph.clear();
        drop(graph);
        self.publish_runtimes(|list| {
            list.remove(channel);
        });

        for graph in &mut self.graphs {
            let remapped = graph
                .chain()
                .get_snapshot()
                .slots()
                .filter_map(|s| s.capabilities().routing.as_ref())
                .fold(false, |changed, ports| ports.remap_removed(channel) | changed);
            if remapped {
                graph.sync();
            }
        }

        let tap = **self.shared.tap.load();
        let tap = match tap.tap_channel.cmp(&channel) {
            std::cmp::Ordering::Less => tap,
            std::cmp::Ordering::Equal => RoutingConfig::default(),
            std::cmp::Ordering::Greater => RoutingConfig {
                tap_channel: tap.tap_channel - 1,
                ..tap
            },
        };
        self.shared.tap.store(Arc::new(tap));

        self.shared.routing.mark_stale();
        self.rebuild_routing_graph();
        #[cfg(feature = "tracing")]
        tracing::debug!(channel, ?removed, "channel removed");
        Ok(removed)
    }

    fn snapshots(&self) -> Vec<Arc<ChainSnapshot>> {
        self.graphs.iter().map(|g| g.chain().snapshot()).collect()
    }

    /// Dependency edges of the installed chains.
    pub fn routing_edges(&self) -> Vec<(usize, usize)> {
        let snapshots = self.snapshots();
        collect_edges(snapshots.iter().map(|s| &**s))
    }

    /// Edges of every routing plugin except `skip`.
    fn edges_excluding(&self, skip: &Arc<PluginSlot>) -> Vec<(usize, usize)> {
        let mut edges = Vec::new();
        for (owner, graph) in self.graphs.iter().enumerate() {
            for slot in graph.chain().get_snapshot().slots() {
                if Arc::ptr_eq(slot, skip) {
                    continue;
                }
                if let Some(ports) = &slot.capabilities().routing {
                    edges.extend(ports.edges(owner));
                }
            }
        }
        edges
    }

    fn check_cycle(existing: &[(usize, usize)], added: &[(usize, usize)]) -> Result<(), GraphError> {
        match find_cycle_edge(existing, added) {
            Some((from, to)) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(from, to, "routing edit rejected, would create a cycle");
                Err(GraphError::RoutingCycle { from, to })
            }
            None => Ok(()),
        }
    }

    fn insert_with(
        &mut self,
        channel: usize,
        plugin: Box<dyn Plugin>,
        insert: impl FnOnce(&mut PluginGraph, Box<dyn Plugin>) -> Result<i32, GraphError>,
    ) -> Result<i32, GraphError> {
        if channel >= self.graphs.len() {
            return Err(GraphError::ChannelNotFound(channel));
        }
        let caps = PluginCapabilities::of(plugin.as_ref());
        if let Some(ports) = &caps.routing {
            Self::check_cycle(&self.routing_edges(), &ports.edges(channel))?;
        }
        let id = insert(self.graph_mut(channel)?, plugin)?;
        if caps.routing.is_some() {
            self.shared.routing.mark_stale();
        }
        if caps.output_send {
            self.normalize_output_sends(Some((channel, id)));
        }
        Ok(id)
    }

    /// Insert `plugin` into `channel` at `index`. See [`PluginGraph::insert_plugin`].
    ///
    /// A routing plugin whose references would close a cycle is rejected. A
    /// new output send becomes the active one.
    ///
    /// # Errors
    ///
    /// [`GraphError::ChannelNotFound`], [`GraphError::RoutingCycle`], or the
    /// graph's single-instance errors.
    pub fn insert_plugin(
        &mut self,
        channel: usize,
        plugin: Box<dyn Plugin>,
        index: usize,
    ) -> Result<i32, GraphError> {
        self.insert_with(channel, plugin, |g, p| g.insert_plugin(p, index))
    }

    /// Insert `plugin` into a container. See [`PluginGraph::insert_plugin_into_container`].
    ///
    /// # Errors
    ///
    /// As [`insert_plugin`](Self::insert_plugin), plus [`GraphError::ContainerNotFound`].
    pub fn insert_plugin_into_container(
        &mut self,
        channel: usize,
        plugin: Box<dyn Plugin>,
        container_id: i32,
        index: usize,
    ) -> Result<i32, GraphError> {
        self.insert_with(channel, plugin, |g, p| {
            g.insert_plugin_into_container(p, container_id, index)
        })
    }

    /// Create a plugin by registry id and insert it.
    ///
    /// # Errors
    ///
    /// [`GraphError::UnknownPlugin`], or as [`insert_plugin`](Self::insert_plugin).
    pub fn insert_plugin_by_id(
        &mut self,
        channel: usize,
        registry: &PluginRegistry,
        plugin_id: &str,
        index: usize,
    ) -> Result<i32, GraphError> {
        let plugin = registry
            .create(plugin_id)
            .ok_or_else(|| GraphError::UnknownPlugin(plugin_id.to_string()))?;
        self.insert_plugin(channel, plugin, index)
    }

    /// Remove a plugin. The slot goes to deferred disposal.
    ///
    /// # Errors
    ///
    /// [`GraphError::ChannelNotFound`], [`GraphError::PluginNotFound`] or
    /// [`GraphError::Pinned`].
    pub fn remove_plugin(&mut self, channel: usize, instance_id: i32) -> Result<(), GraphError> {
        let slot = self.graph_mut(channel)?.remove_plugin(instance_id)?;
        if slot.capabilities().routing.is_some() {
            self.shared.routing.mark_stale();
        }
        Ok(())
    }

    /// Move a plugin within its chain.
    ///
    /// # Errors
    ///
    /// As [`PluginGraph::move_plugin`], plus [`GraphError::ChannelNotFound`].
    pub fn move_plugin(
        &mut self,
        channel: usize,
        instance_id: i32,
        to_index: usize,
    ) -> Result<(), GraphError> {
        let graph = self.graph_mut(channel)?;
        graph.move_plugin(instance_id, to_index)?;
        let routing = graph
            .chain()
            .try_get_slot_by_id(instance_id)
            .is_some_and(|s| s.capabilities().routing.is_some());
        if routing {
            self.shared.routing.mark_stale();
        }
        Ok(())
    }

    /// Reorder a plugin among its container's members.
    ///
    /// # Errors
    ///
    /// As [`PluginGraph::move_plugin_within_container`].
    pub fn move_plugin_within_container(
        &mut self,
        channel: usize,
        instance_id: i32,
        container_id: i32,
        to_index: usize,
    ) -> Result<(), GraphError> {
        self.graph_mut(channel)?
            .move_plugin_within_container(instance_id, container_id, to_index)
    }

    /// Create an empty container on `channel`.
    ///
    /// # Errors
    ///
    /// [`GraphError::ChannelNotFound`].
    pub fn create_container(&mut self, channel: usize, name: &str) -> Result<i32, GraphError> {
        Ok(self.graph_mut(channel)?.create_container(name))
    }

    /// Delete a container; its members stay in the chain.
    ///
    /// # Errors
    ///
    /// [`GraphError::ChannelNotFound`] or [`GraphError::ContainerNotFound`].
    pub fn remove_container(&mut self, channel: usize, id: i32) -> Result<(), GraphError> {
        self.graph_mut(channel)?.remove_container(id)
    }

    /// Bypass or restore every member of a container.
    ///
    /// # Errors
    ///
    /// [`GraphError::ChannelNotFound`] or [`GraphError::ContainerNotFound`].
    pub fn set_container_bypass(
        &mut self,
        channel: usize,
        id: i32,
        bypassed: bool,
    ) -> Result<(), GraphError> {
        self.graph_mut(channel)?.set_container_bypass(id, bypassed)
    }

    /// Move a container's members to a chain position.
    ///
    /// # Errors
    ///
    /// [`GraphError::ChannelNotFound`] or [`GraphError::ContainerNotFound`].
    pub fn move_container(
        &mut self,
        channel: usize,
        id: i32,
        target_index: usize,
    ) -> Result<(), GraphError> {
        self.graph_mut(channel)?.move_container(id, target_index)
    }

    /// Queue a change for the audio thread and record it in the mirror.
    ///
    /// Routing parameters are topology edits: the new reference is checked
    /// for cycles, written to the plugin's ports at once and the routing
    /// order is marked stale. Re-enabling an output send bypasses every other
    /// active send.
    ///
    /// # Errors
    ///
    /// [`GraphError::ChannelNotFound`], [`GraphError::PluginNotFound`],
    /// [`GraphError::ParameterOutOfRange`], [`GraphError::RoutingCycle`] or
    /// [`GraphError::Queue`]. A rejected change leaves everything untouched.
    pub fn enqueue_parameter_change(
        &mut self,
        change: ParameterChange,
    ) -> Result<Enqueued, GraphError> {
        let channel = change.channel;
        let id = change.plugin_instance_id;
        let graph = self
            .graphs
            .get(channel)
            .ok_or(GraphError::ChannelNotFound(channel))?;

        let slot = match change.kind {
            ParameterKind::PluginParameter
            | ParameterKind::PluginBypass
            | ParameterKind::PluginCommand => Some(
                graph
                    .chain()
                    .try_get_slot_by_id(id)
                    .ok_or(GraphError::PluginNotFound(id))?,
            ),
            _ => None,
        };

        let mut port_edit = None;
        if let (Some(slot), ParameterKind::PluginParameter) = (&slot, change.kind) {
            let index = change.parameter_index;
            let descriptor = slot
                .descriptors()
                .get(index)
                .copied()
                .ok_or(GraphError::ParameterOutOfRange {
                    instance_id: id,
                    index,
                })?;
            if let (true, Some(ports)) = (descriptor.is_routing(), &slot.capabilities().routing) {
                let port = slot.descriptors()[..index]
                    .iter()
                    .filter(|d| d.is_routing())
                    .count();
                let value = descriptor.clamp(change.value).round();
                let target = (value >= 0.0).then_some(value as usize);
                let added = ports.edges_with(channel, port, target);
                Self::check_cycle(&self.edges_excluding(slot), &added)?;
                port_edit = Some((Arc::clone(ports), port, target));
            }
        }

        let outcome = self.sender.enqueue(change)?;

        if let Some((ports, port, target)) = port_edit {
            ports.set(port, target);
            self.shared.routing.mark_stale();
        }

        let graph = self.graph_mut(channel)?;
        match change.kind {
            ParameterKind::InputGainDb => graph.config_mut().input_gain_db = change.value,
            ParameterKind::OutputGainDb => graph.config_mut().output_gain_db = change.value,
            ParameterKind::Mute => graph.config_mut().muted = change.is_on(),
            ParameterKind::Solo => graph.config_mut().soloed = change.is_on(),
            ParameterKind::PluginParameter => {
                graph.set_plugin_parameter(id, change.parameter_index, change.value)?;
            }
            ParameterKind::PluginBypass => {
                graph.set_plugin_bypass(id, change.is_on())?;
                let enables_send = !change.is_on()
                    && slot.as_ref().is_some_and(|s| s.capabilities().output_send);
                if enables_send {
                    self.normalize_output_sends(Some((channel, id)));
                }
            }
            ParameterKind::PluginCommand => {}
        }
        Ok(outcome)
    }

    /// Keep at most one non-bypassed output send across all channels.
    ///
    /// A send counts as active if either its live slot or its mirror entry
    /// is enabled, since a queued re-enable may not have reached the audio
    /// thread yet. `preferred` stays active when given; otherwise the first
    /// active send in channel order does. The others are bypassed in the live
    /// slot and in the mirror, and a bypass is queued behind any pending
    /// re-enable. Returns the `(channel, instance_id)` pairs bypassed.
    pub fn normalize_output_sends(&mut self, preferred: Option<(usize, i32)>) -> Vec<(usize, i32)> {
        let mut keeper = preferred;
        let mut bypassed = Vec::new();
        for (channel, graph) in self.graphs.iter_mut().enumerate() {
            let active: Vec<Arc<PluginSlot>> = graph
                .chain()
                .get_snapshot()
                .slots()
                .filter(|s| s.capabilities().output_send)
                .filter(|s| {
                    let mirrored = graph
                        .config()
                        .plugin(s.instance_id())
                        .is_some_and(|p| !p.bypassed);
                    mirrored || !s.is_bypassed()
                })
                .cloned()
                .collect();
            for slot in active {
                let key = (channel, slot.instance_id());
                match keeper {
                    None => keeper = Some(key),
                    Some(k) if k == key => {}
                    Some(_) => {
                        slot.set_bypassed(true);
                        if let Err(_err) = graph.set_plugin_bypass(key.1, true) {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(channel, instance_id = key.1, %_err, "send bypass not mirrored");
                        }
                        if let Err(_err) = self
                            .sender
                            .enqueue(ParameterChange::plugin_bypass(key.0, key.1, true))
                        {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(channel, instance_id = key.1, %_err, "send bypass not queued");
                        }
                        bypassed.push(key);
                    }
                }
            }
        }
        #[cfg(feature = "tracing")]
        if !bypassed.is_empty() {
            tracing::debug!(?bypassed, "extra output sends bypassed");
        }
        bypassed
    }

    /// Recompute the processing order from the installed chains and install it.
    pub fn rebuild_routing_graph(&self) -> Arc<RoutingPlan> {
        let edges = self.routing_edges();
        self.shared.routing.rebuild(
            self.graphs.len(),
            self.settings.sample_rate,
            self.settings.block_size,
            &edges,
        )
    }

    /// Periodic control-thread housekeeping: dispose retired slots, move
    /// parked changes to the transport and rebuild a stale routing order.
    pub fn maintain(&mut self) -> Maintenance {
        let disposed = self.shared.disposal.drain();
        let flushed = self.sender.flush().unwrap_or(0);
        let rebuilt = self.shared.routing.state() != RoutingState::Valid;
        if rebuilt {
            self.rebuild_routing_graph();
        }
        Maintenance {
            disposed,
            flushed,
            rebuilt,
        }
    }

    /// Select the analysis tap.
    ///
    /// # Errors
    ///
    /// [`GraphError::ChannelNotFound`], or [`GraphError::PluginNotFound`]
    /// for a split after a plugin that is not on the channel.
    pub fn set_analysis_tap(&mut self, tap: RoutingConfig) -> Result<(), GraphError> {
        let graph = self
            .graphs
            .get(tap.tap_channel)
            .ok_or(GraphError::ChannelNotFound(tap.tap_channel))?;
        if let TapPoint::Plugin { instance_id } = tap.tap {
            if graph.chain().try_get_slot_by_id(instance_id).is_none() {
                return Err(GraphError::PluginNotFound(instance_id));
            }
        }
        self.shared.tap.store(Arc::new(tap));
        Ok(())
    }

    /// Current analysis tap.
    pub fn analysis_tap(&self) -> RoutingConfig {
        **self.shared.tap.load()
    }

    /// Latency from capture to output: the slowest channel with an active
    /// output send plus the output device buffering.
    pub fn latency_samples(&self) -> usize {
        let chain = self
            .snapshots()
            .iter()
            .filter(|s| s.has_active_output())
            .map(|s| s.latency_samples())
            .max()
            .unwrap_or(0);
        chain + self.settings.output_latency_samples
    }

    /// Serializable state of every channel, read from the live plugins.
    pub fn channel_configs(&mut self) -> Vec<ChannelConfig> {
        self.graphs
            .iter_mut()
            .map(|g| {
                g.capture_live_state();
                g.sync();
                g.config().clone()
            })
            .collect()
    }

    /// Restart with new settings (sample rate or block size change).
    ///
    /// Takes the processor by value, so the callback is known to be stopped.
    /// Queued changes are applied, every chain is detached, re-initialized
    /// and re-installed, and the routing order is rebuilt. The analysis sink
    /// moves to the new processor. Callers rebind to the returned handles.
    pub fn reinitialize(
        self,
        mut processor: AudioProcessor,
        settings: EngineSettings,
    ) -> (Engine, AudioProcessor) {
        let mut settings = settings.sanitized();
        settings.max_channels = settings.max_channels.max(self.graphs.len());

        if let Err(_err) = self.sender.flush() {
            #[cfg(feature = "tracing")]
            tracing::warn!(%_err, "pending changes not flushed before reinitialize");
        }
        processor.apply_all_pending();
        let capture = processor.take_capture_sink();
        drop(processor);

        let Engine {
            shared,
            mut graphs,
            sender,
            ..
        } = self;
        drop(sender);
        for graph in &mut graphs {
            graph.reinitialize(settings.sample_rate, settings.block_size);
        }
        shared.disposal.drain();

        let (engine, mut processor) = Self::assemble(shared, graphs, settings);
        if let Some(sink) = capture {
            processor.set_capture_sink(sink);
        }
        engine.rebuild_routing_graph();
        (engine, processor)
    }
}

#[cfg(test)]
mod tests;
