//! Per-channel chain editing.
//!
//! [`PluginGraph`] is the control-thread owner of one channel's chain. Every
//! edit builds a complete new slot order and installs it with
//! [`PluginChain::replace_all`], then reconciles the serializable
//! [`ChannelConfig`] mirror. Containers exist only here: their bypass is baked
//! into each snapshot as an overlay flag and never touches a slot's own bypass.
//!
//! Channel-wide invariants enforced at edit time:
//!
//! - at most one input plugin, always at position 0;
//! - bus and copy inputs are pinned (cannot be moved or removed by the user);
//! - at most one output send per channel.
//!
//! The cross-channel rules (single active output send, routing cycles) need
//! every channel and are enforced by the [`Engine`](crate::engine::Engine).

mod error;

pub use error::GraphError;

use std::sync::Arc;

use crate::chain::{ChainEntry, PluginChain, PluginSlot};
use crate::config::{ChannelConfig, ContainerConfig, PluginConfig};
use crate::param_info::{ParamDescriptor, ParameterInfo};
use crate::plugin::{Plugin, PluginCapabilities};
use crate::registry::PluginRegistry;

/// A named, independently bypassable group of plugin instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginContainer {
    /// Container ID, unique within the channel.
    pub id: i32,
    /// Display name.
    pub name: String,
    /// Bypass overlay for every member.
    pub bypassed: bool,
    /// Member instance IDs in display order.
    pub members: Vec<i32>,
}

/// Control-thread editor for one channel chain.
#[derive(Debug)]
pub struct PluginGraph {
    chain: Arc<PluginChain>,
    containers: Vec<PluginContainer>,
    mirror: ChannelConfig,
    next_instance_id: i32,
    next_container_id: i32,
    sample_rate: f32,
    block_size: usize,
}

/// Indices of a plugin's routing-flagged parameters, in port order.
fn routing_param_indices(descriptors: &[ParamDescriptor]) -> impl Iterator<Item = usize> + '_ {
    descriptors
        .iter()
        .enumerate()
        .filter(|(_, d)| d.is_routing())
        .map(|(i, _)| i)
}

/// Read a slot's parameters and state from the live plugin (brief lock).
fn live_config(slot: &PluginSlot) -> PluginConfig {
    let (params, state) = slot.with_plugin(|p| (p.param_values(), p.state()));
    PluginConfig {
        instance_id: slot.instance_id(),
        plugin_id: slot.plugin_id().to_string(),
        bypassed: slot.is_bypassed(),
        params,
        state,
    }
}

impl PluginGraph {
    /// An empty channel editing `chain`.
    pub fn new(
        name: impl Into<String>,
        chain: Arc<PluginChain>,
        sample_rate: f32,
        block_size: usize,
    ) -> Self {
        Self {
            chain,
            containers: Vec::new(),
            mirror: ChannelConfig::new(name),
            next_instance_id: 1,
            next_container_id: 1,
            sample_rate,
            block_size,
        }
    }

    /// The live chain.
    pub fn chain(&self) -> &Arc<PluginChain> {
        &self.chain
    }

    /// The serializable mirror.
    pub fn config(&self) -> &ChannelConfig {
        &self.mirror
    }

    /// Mutable mirror, for channel strip fields (gains, mute, solo, name).
    pub fn config_mut(&mut self) -> &mut ChannelConfig {
        &mut self.mirror
    }

    /// Containers in creation order.
    pub fn containers(&self) -> &[PluginContainer] {
        &self.containers
    }

    /// Container by ID.
    pub fn container(&self, id: i32) -> Option<&PluginContainer> {
        self.containers.iter().find(|c| c.id == id)
    }

    /// Live instance IDs in chain order.
    pub fn instance_ids(&self) -> Vec<i32> {
        self.chain.get_snapshot().instance_ids()
    }

    /// Current slots in chain order.
    fn slots(&self) -> Vec<Arc<PluginSlot>> {
        self.chain.get_snapshot().slots().cloned().collect()
    }

    fn position(slots: &[Arc<PluginSlot>], instance_id: i32) -> Result<usize, GraphError> {
        slots
            .iter()
            .position(|s| s.instance_id() == instance_id)
            .ok_or(GraphError::PluginNotFound(instance_id))
    }

    fn first_free_index(slots: &[Arc<PluginSlot>]) -> usize {
        usize::from(slots.first().is_some_and(|s| s.capabilities().is_input()))
    }

    fn container_index(&self, id: i32) -> Result<usize, GraphError> {
        self.containers
            .iter()
            .position(|c| c.id == id)
            .ok_or(GraphError::ContainerNotFound(id))
    }

    fn overlay(&self, instance_id: i32) -> bool {
        self.containers
            .iter()
            .any(|c| c.bypassed && c.members.contains(&instance_id))
    }

    /// Install `slots` as the new chain with container overlays, then
    /// reconcile the mirror.
    fn install(&mut self, slots: Vec<Arc<PluginSlot>>) -> Vec<i32> {
        let entries = slots
            .into_iter()
            .map(|slot| {
                let container_bypassed = self.overlay(slot.instance_id());
                Some(ChainEntry {
                    slot,
                    container_bypassed,
                })
            })
            .collect();
        let removed = self.chain.replace_all(entries);
        let mut mirror = std::mem::take(&mut self.mirror);
        self.sync_with_chain(&mut mirror);
        self.mirror = mirror;
        removed
    }

    fn allocate_instance_id(&mut self) -> i32 {
        let id = self.next_instance_id;
        self.next_instance_id += 1;
        id
    }

    fn wrap(&mut self, mut plugin: Box<dyn Plugin>) -> Arc<PluginSlot> {
        plugin.initialize(self.sample_rate, self.block_size);
        let id = self.allocate_instance_id();
        Arc::new(PluginSlot::new(id, plugin, self.block_size))
    }

    /// Check single-instance rules and pick the chain position for a new plugin.
    fn placement(
        slots: &[Arc<PluginSlot>],
        caps: &PluginCapabilities,
        index: usize,
    ) -> Result<usize, GraphError> {
        if caps.input.is_some() {
            if let Some(existing) = slots.iter().find(|s| s.capabilities().input.is_some()) {
                return Err(GraphError::DuplicateInput {
                    existing: existing.instance_id(),
                });
            }
            return Ok(0);
        }
        if caps.output_send {
            if let Some(existing) = slots.iter().find(|s| s.capabilities().output_send) {
                return Err(GraphError::DuplicateOutputSend {
                    existing: existing.instance_id(),
                });
            }
        }
        Ok(index.clamp(Self::first_free_index(slots), slots.len()))
    }

    /// Insert `plugin` at `index` and return its new instance ID.
    ///
    /// Input plugins always go to position 0; other plugins are placed after
    /// a pinned input.
    ///
    /// # Errors
    ///
    /// [`GraphError::DuplicateInput`] or [`GraphError::DuplicateOutputSend`]
    /// when the channel already has one.
    pub fn insert_plugin(&mut self, plugin: Box<dyn Plugin>, index: usize) -> Result<i32, GraphError> {
        let mut slots = self.slots();
        let caps = PluginCapabilities::of(plugin.as_ref());
        let at = Self::placement(&slots, &caps, index)?;
        let slot = self.wrap(plugin);
        let id = slot.instance_id();
        slots.insert(at, slot);
        self.install(slots);
        #[cfg(feature = "tracing")]
        tracing::debug!(instance_id = id, index = at, "plugin inserted");
        Ok(id)
    }

    /// Insert `plugin` as member `index` of container `container_id`.
    ///
    /// The chain position follows the container: before the member currently
    /// at `index`, after the last member, or at the end of the chain for an
    /// empty container.
    ///
    /// # Errors
    ///
    /// [`GraphError::ContainerNotFound`], plus the errors of
    /// [`insert_plugin`](Self::insert_plugin).
    pub fn insert_plugin_into_container(
        &mut self,
        plugin: Box<dyn Plugin>,
        container_id: i32,
        index: usize,
    ) -> Result<i32, GraphError> {
        let ci = self.container_index(container_id)?;
        let mut slots = self.slots();
        let present: Vec<i32> = self.containers[ci]
            .members
            .iter()
            .copied()
            .filter(|m| slots.iter().any(|s| s.instance_id() == *m))
            .collect();
        let member_index = index.min(present.len());
        let chain_index = match (present.get(member_index), present.last()) {
            (Some(&at), _) => Self::position(&slots, at)?,
            (None, Some(&last)) => Self::position(&slots, last)? + 1,
            (None, None) => slots.len(),
        };

        let caps = PluginCapabilities::of(plugin.as_ref());
        let at = Self::placement(&slots, &caps, chain_index)?;
        let slot = self.wrap(plugin);
        let id = slot.instance_id();
        slots.insert(at, slot);

        let members = &mut self.containers[ci].members;
        let member_at = present
            .get(member_index)
            .and_then(|m| members.iter().position(|x| x == m))
            .unwrap_or(members.len());
        members.insert(member_at, id);
        self.install(slots);
        Ok(id)
    }

    /// Remove a plugin from the chain and from every container.
    ///
    /// The returned slot has already been handed to deferred disposal; it is
    /// disposed once the caller drops it and the audio thread has moved on.
    ///
    /// # Errors
    ///
    /// [`GraphError::PluginNotFound`], or [`GraphError::Pinned`] for bus and
    /// copy inputs.
    pub fn remove_plugin(&mut self, instance_id: i32) -> Result<Arc<PluginSlot>, GraphError> {
        let mut slots = self.slots();
        let pos = Self::position(&slots, instance_id)?;
        if slots[pos].capabilities().is_pinned() {
            return Err(GraphError::Pinned(instance_id));
        }
        let removed = slots.remove(pos);
        for c in &mut self.containers {
            c.members.retain(|&m| m != instance_id);
        }
        self.install(slots);
        #[cfg(feature = "tracing")]
        tracing::debug!(instance_id, "plugin removed");
        Ok(removed)
    }

    /// Remove every plugin, pinned ones included. Used when the channel
    /// itself is deleted. Returns the removed instance IDs.
    pub fn clear(&mut self) -> Vec<i32> {
        for c in &mut self.containers {
            c.members.clear();
        }
        self.install(Vec::new())
    }

    /// Move a plugin to `to_index` in the chain.
    ///
    /// Nothing is moved in front of an input plugin, and a device input
    /// stays at position 0 whatever `to_index` asks for.
    ///
    /// # Errors
    ///
    /// [`GraphError::PluginNotFound`], or [`GraphError::Pinned`] for bus and
    /// copy inputs.
    pub fn move_plugin(&mut self, instance_id: i32, to_index: usize) -> Result<(), GraphError> {
        let mut slots = self.slots();
        let from = Self::position(&slots, instance_id)?;
        if slots[from].capabilities().is_pinned() {
            return Err(GraphError::Pinned(instance_id));
        }
        let slot = slots.remove(from);
        let to = if slot.capabilities().is_input() {
            0
        } else {
            to_index.clamp(Self::first_free_index(&slots), slots.len())
        };
        slots.insert(to, slot);
        if to != from {
            self.install(slots);
        }
        Ok(())
    }

    /// Reorder a member within its container.
    ///
    /// The member list is reordered and the chain positions the container's
    /// members occupy are refilled in the new member order. Input members
    /// keep their position.
    ///
    /// # Errors
    ///
    /// [`GraphError::ContainerNotFound`], [`GraphError::PluginNotFound`] if
    /// the plugin is not a member, or [`GraphError::Pinned`].
    pub fn move_plugin_within_container(
        &mut self,
        instance_id: i32,
        container_id: i32,
        to_index: usize,
    ) -> Result<(), GraphError> {
        let ci = self.container_index(container_id)?;
        let mut slots = self.slots();
        let member_pos = self.containers[ci]
            .members
            .iter()
            .position(|&m| m == instance_id)
            .ok_or(GraphError::PluginNotFound(instance_id))?;
        if let Ok(pos) = Self::position(&slots, instance_id) {
            if slots[pos].capabilities().is_pinned() {
                return Err(GraphError::Pinned(instance_id));
            }
        }

        let members = &mut self.containers[ci].members;
        let id = members.remove(member_pos);
        let to = to_index.min(members.len());
        members.insert(to, id);

        let movable: Vec<i32> = members
            .iter()
            .copied()
            .filter(|m| {
                slots
                    .iter()
                    .any(|s| s.instance_id() == *m && !s.capabilities().is_input())
            })
            .collect();
        let mut positions: Vec<usize> = movable
            .iter()
            .filter_map(|m| slots.iter().position(|s| s.instance_id() == *m))
            .collect();
        positions.sort_unstable();
        let reordered: Vec<Arc<PluginSlot>> = movable
            .iter()
            .filter_map(|m| slots.iter().find(|s| s.instance_id() == *m).cloned())
            .collect();
        for (pos, slot) in positions.into_iter().zip(reordered) {
            slots[pos] = slot;
        }
        self.install(slots);
        Ok(())
    }

    /// Create an empty container and return its ID.
    pub fn create_container(&mut self, name: impl Into<String>) -> i32 {
        let id = self.next_container_id;
        self.next_container_id += 1;
        self.containers.push(PluginContainer {
            id,
            name: name.into(),
            bypassed: false,
            members: Vec::new(),
        });
        let mut mirror = std::mem::take(&mut self.mirror);
        self.sync_with_chain(&mut mirror);
        self.mirror = mirror;
        id
    }

    /// Delete a container. Its members stay in the chain and lose the overlay.
    ///
    /// # Errors
    ///
    /// [`GraphError::ContainerNotFound`].
    pub fn remove_container(&mut self, id: i32) -> Result<(), GraphError> {
        let ci = self.container_index(id)?;
        self.containers.remove(ci);
        let slots = self.slots();
        self.install(slots);
        Ok(())
    }

    /// Set a container's bypass overlay. Members' own bypass flags are untouched.
    ///
    /// # Errors
    ///
    /// [`GraphError::ContainerNotFound`].
    pub fn set_container_bypass(&mut self, id: i32, bypassed: bool) -> Result<(), GraphError> {
        let ci = self.container_index(id)?;
        if self.containers[ci].bypassed != bypassed {
            self.containers[ci].bypassed = bypassed;
            let slots = self.slots();
            self.install(slots);
        }
        Ok(())
    }

    /// Move a container's members, in member order, to a contiguous run
    /// starting at `target_index` of the resulting chain.
    ///
    /// # Errors
    ///
    /// [`GraphError::ContainerNotFound`], or [`GraphError::Pinned`] if a
    /// member is an input plugin.
    pub fn move_container(&mut self, id: i32, target_index: usize) -> Result<(), GraphError> {
        let ci = self.container_index(id)?;
        let members = self.containers[ci].members.clone();
        let slots = self.slots();
        if let Some(pinned) = slots
            .iter()
            .find(|s| members.contains(&s.instance_id()) && s.capabilities().is_input())
        {
            return Err(GraphError::Pinned(pinned.instance_id()));
        }
        let (mut rest, moved): (Vec<_>, Vec<_>) = slots
            .into_iter()
            .partition(|s| !members.contains(&s.instance_id()));
        let moved: Vec<Arc<PluginSlot>> = members
            .iter()
            .filter_map(|m| moved.iter().find(|s| s.instance_id() == *m).cloned())
            .collect();
        let at = target_index.clamp(Self::first_free_index(&rest), rest.len());
        rest.splice(at..at, moved);
        self.install(rest);
        Ok(())
    }

    /// Reconcile `config` against the live chain and this graph's containers.
    ///
    /// Order, instance IDs and container membership come from the live side.
    /// Parameters, state and bypass of plugins already in `config` are kept
    /// (they were set through the mirror setters) except routing parameters,
    /// which are read from the plugin's shared ports. Plugins new to `config`
    /// are read from the live instance. Returns whether `config` changed.
    pub fn sync_with_chain(&self, config: &mut ChannelConfig) -> bool {
        let snapshot = self.chain.snapshot();
        let plugins: Vec<PluginConfig> = snapshot
            .slots()
            .map(|slot| {
                let mut pc = config
                    .plugin(slot.instance_id())
                    .filter(|p| p.plugin_id == slot.plugin_id())
                    .cloned()
                    .unwrap_or_else(|| live_config(slot));
                if let Some(ports) = &slot.capabilities().routing {
                    for (port, index) in routing_param_indices(slot.descriptors()).enumerate() {
                        if let Some(value) = pc.params.get_mut(index) {
                            *value = ports.get(port).map_or(-1.0, |c| c as f32);
                        }
                    }
                }
                pc
            })
            .collect();
        let containers: Vec<ContainerConfig> = self
            .containers
            .iter()
            .map(|c| ContainerConfig {
                id: c.id,
                name: c.name.clone(),
                bypassed: c.bypassed,
                members: c
                    .members
                    .iter()
                    .copied()
                    .filter(|m| plugins.iter().any(|p| p.instance_id == *m))
                    .collect(),
            })
            .collect();

        let changed = config.plugins != plugins || config.containers != containers;
        config.plugins = plugins;
        config.containers = containers;
        changed
    }

    /// Reconcile this graph's own mirror. Returns whether it changed.
    pub fn sync(&mut self) -> bool {
        let mut mirror = std::mem::take(&mut self.mirror);
        let changed = self.sync_with_chain(&mut mirror);
        self.mirror = mirror;
        changed
    }

    /// Re-read every plugin's parameters and state from the live instances.
    ///
    /// Locks each plugin briefly; call before saving, not per block.
    pub fn capture_live_state(&mut self) -> bool {
        let live: Vec<PluginConfig> = self.chain.snapshot().slots().map(|s| live_config(s)).collect();
        let changed = self.mirror.plugins != live;
        self.mirror.plugins = live;
        changed
    }

    /// Record a parameter value in the mirror.
    ///
    /// # Errors
    ///
    /// [`GraphError::PluginNotFound`] or [`GraphError::ParameterOutOfRange`].
    pub fn set_plugin_parameter(
        &mut self,
        instance_id: i32,
        index: usize,
        value: f32,
    ) -> Result<(), GraphError> {
        let snapshot = self.chain.get_snapshot();
        let (_, entry) = snapshot
            .find(instance_id)
            .ok_or(GraphError::PluginNotFound(instance_id))?;
        let descriptor = entry
            .slot
            .descriptors()
            .get(index)
            .copied()
            .ok_or(GraphError::ParameterOutOfRange { instance_id, index })?;
        let defaults: Vec<f32> = entry.slot.descriptors().iter().map(|d| d.default).collect();
        let pc = self
            .mirror
            .plugin_mut(instance_id)
            .ok_or(GraphError::PluginNotFound(instance_id))?;
        if pc.params.len() < defaults.len() {
            let have = pc.params.len();
            pc.params.extend_from_slice(&defaults[have..]);
        }
        pc.params[index] = descriptor.clamp(value);
        Ok(())
    }

    /// Record a plugin state blob in the mirror.
    ///
    /// # Errors
    ///
    /// [`GraphError::PluginNotFound`].
    pub fn set_plugin_state(&mut self, instance_id: i32, state: Vec<u8>) -> Result<(), GraphError> {
        let pc = self
            .mirror
            .plugin_mut(instance_id)
            .ok_or(GraphError::PluginNotFound(instance_id))?;
        pc.state = state;
        Ok(())
    }

    /// Record a plugin's own bypass flag in the mirror.
    ///
    /// # Errors
    ///
    /// [`GraphError::PluginNotFound`].
    pub fn set_plugin_bypass(&mut self, instance_id: i32, bypassed: bool) -> Result<(), GraphError> {
        let pc = self
            .mirror
            .plugin_mut(instance_id)
            .ok_or(GraphError::PluginNotFound(instance_id))?;
        pc.bypassed = bypassed;
        Ok(())
    }

    /// Keep exactly one input plugin, at position 0.
    ///
    /// When several are present the highest [`InputKind`](crate::InputKind)
    /// wins (first in chain order on a tie) and the rest are removed.
    /// Returns the removed instance IDs.
    pub fn normalize_input_plugins(&mut self) -> Vec<i32> {
        let slots = self.slots();
        let keep = slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.capabilities().input.map(|k| (k, std::cmp::Reverse(i))))
            .max()
            .map(|(_, std::cmp::Reverse(i))| i);
        let Some(keep) = keep else {
            return Vec::new();
        };
        let removed: Vec<i32> = slots
            .iter()
            .enumerate()
            .filter(|(i, s)| *i != keep && s.capabilities().input.is_some())
            .map(|(_, s)| s.instance_id())
            .collect();
        if keep == 0 && removed.is_empty() {
            return removed;
        }

        let kept = Arc::clone(&slots[keep]);
        let mut next: Vec<Arc<PluginSlot>> = slots
            .into_iter()
            .filter(|s| s.capabilities().input.is_none())
            .collect();
        next.insert(0, kept);
        for c in &mut self.containers {
            c.members.retain(|m| !removed.contains(m));
        }
        self.install(next);
        #[cfg(feature = "tracing")]
        if !removed.is_empty() {
            tracing::debug!(?removed, "extra input plugins removed");
        }
        removed
    }

    /// Replace the chain with plugins built from `config`.
    ///
    /// Instance IDs are preserved and the ID counter continues after the
    /// highest one seen. Nothing is installed if any plugin fails.
    ///
    /// # Errors
    ///
    /// [`GraphError::UnknownPlugin`], [`GraphError::InvalidInstanceId`], or
    /// [`GraphError::Plugin`] if a state blob is rejected.
    pub fn restore_from_config(
        &mut self,
        config: &ChannelConfig,
        registry: &PluginRegistry,
    ) -> Result<(), GraphError> {
        let mut slots: Vec<Arc<PluginSlot>> = Vec::with_capacity(config.plugins.len());
        let mut max_id = 0;
        for pc in &config.plugins {
            if pc.instance_id <= 0 || slots.iter().any(|s| s.instance_id() == pc.instance_id) {
                return Err(GraphError::InvalidInstanceId(pc.instance_id));
            }
            let mut plugin = registry
                .create(&pc.plugin_id)
                .ok_or_else(|| GraphError::UnknownPlugin(pc.plugin_id.clone()))?;
            for (i, &v) in pc.params.iter().enumerate().take(plugin.param_count()) {
                plugin.set_param(i, v);
            }
            plugin.set_state(&pc.state)?;
            plugin.initialize(self.sample_rate, self.block_size);
            let slot = PluginSlot::new(pc.instance_id, plugin, self.block_size);
            slot.set_bypassed(pc.bypassed);
            max_id = max_id.max(pc.instance_id);
            slots.push(Arc::new(slot));
        }

        self.containers = config
            .containers
            .iter()
            .map(|c| PluginContainer {
                id: c.id,
                name: c.name.clone(),
                bypassed: c.bypassed,
                members: c.members.clone(),
            })
            .collect();
        let max_member = config
            .containers
            .iter()
            .flat_map(|c| c.members.iter().copied())
            .max()
            .unwrap_or(0);
        self.next_instance_id = self.next_instance_id.max(max_id.max(max_member) + 1);
        self.next_container_id = self
            .next_container_id
            .max(config.containers.iter().map(|c| c.id).max().unwrap_or(0) + 1);

        let mut mirror = config.clone();
        mirror.plugins.clear();
        self.mirror = mirror;
        self.install(slots);
        self.normalize_input_plugins();
        Ok(())
    }

    /// Detach every slot, re-initialize it for a new rate or block size and
    /// install it again in the same order.
    ///
    /// Only valid while the audio callback is stopped.
    pub fn reinitialize(&mut self, sample_rate: f32, block_size: usize) {
        self.sample_rate = sample_rate;
        self.block_size = block_size;
        let slots = self.chain.detach_all();
        for slot in &slots {
            slot.reinitialize(sample_rate, block_size);
        }
        self.install(slots);
    }

    /// Sample rate plugins are initialized with.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Block size plugins are initialized with.
    pub fn block_size(&self) -> usize {
        self.block_size
    }
}
