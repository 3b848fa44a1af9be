//! Registry of built-in plugins.
//!
//! Session files name plugins by id (`"compressor"`, `"bus_input"`); the
//! registry turns an id into a fresh, uninitialized instance and lists
//! metadata for UIs and the CLI.
//!
//! ```rust
//! use hotmic_core::ParameterInfo;
//! use hotmic_core::registry::{PluginCategory, PluginRegistry};
//!
//! let registry = PluginRegistry::new();
//! let gate = registry.create("noise_gate").unwrap();
//! assert_eq!(gate.param_count(), 4);
//! assert!(!registry.in_category(PluginCategory::Routing).is_empty());
//! ```

use crate::param_info::ParameterInfo;
use crate::plugin::{OutputMode, Plugin};
use crate::plugins::{Compressor, GainPlugin, NoiseGate};
use crate::routing::{BusInput, ChannelMerge, CopyToChannel, InputSource, OutputSend};

/// Plugin grouping for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginCategory {
    /// Input, bus, copy, merge and output plugins.
    Routing,
    /// Gates and compressors.
    Dynamics,
    /// Gain stages.
    Utility,
}

impl PluginCategory {
    /// Display name.
    pub const fn name(&self) -> &'static str {
        match self {
            PluginCategory::Routing => "Routing",
            PluginCategory::Dynamics => "Dynamics",
            PluginCategory::Utility => "Utility",
        }
    }
}

/// Metadata for a registered plugin.
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    /// Registry id, equal to [`Plugin::plugin_id`].
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// Category.
    pub category: PluginCategory,
}

type PluginFactory = fn() -> Box<dyn Plugin>;

struct RegistryEntry {
    descriptor: PluginDescriptor,
    factory: PluginFactory,
}

/// All plugins that can be instantiated by id.
pub struct PluginRegistry {
    entries: Vec<RegistryEntry>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| e.descriptor.id))
            .finish()
    }
}

impl PluginRegistry {
    /// A registry with every built-in plugin.
    pub fn new() -> Self {
        let mut registry = Self {
            entries: Vec::with_capacity(9),
        };
        registry.register_builtins();
        registry
    }

    fn register_builtins(&mut self) {
        use PluginCategory::{Dynamics, Routing, Utility};

        self.register(
            "input_source",
            "Input",
            "Capture device input",
            Routing,
            || Box::new(InputSource::new(0)),
        );
        self.register(
            "bus_input",
            "Bus Input",
            "Another channel's post-fader output",
            Routing,
            || Box::new(BusInput::bus(None)),
        );
        self.register(
            "copy_input",
            "Copy Input",
            "Signal copied here by a Copy To Channel plugin",
            Routing,
            || Box::new(BusInput::copy_tap(None)),
        );
        self.register(
            "copy_to_channel",
            "Copy To Channel",
            "Copies the signal at this point to another channel",
            Routing,
            || Box::new(CopyToChannel::new(None)),
        );
        self.register(
            "merge",
            "Merge",
            "Sums other channels' outputs into this one",
            Routing,
            || Box::new(ChannelMerge::new(&[])),
        );
        self.register(
            "output_send",
            "Output",
            "Sends the channel to the shared output",
            Routing,
            || Box::new(OutputSend::new(OutputMode::Both)),
        );
        self.register(
            "gain",
            "Gain",
            "Trim gain with polarity invert",
            Utility,
            || Box::new(GainPlugin::new()),
        );
        self.register(
            "noise_gate",
            "Noise Gate",
            "Gate with noise-floor learning",
            Dynamics,
            || Box::new(NoiseGate::new()),
        );
        self.register(
            "compressor",
            "Compressor",
            "Soft-knee compressor",
            Dynamics,
            || Box::new(Compressor::new()),
        );
    }

    fn register(
        &mut self,
        id: &'static str,
        name: &'static str,
        description: &'static str,
        category: PluginCategory,
        factory: PluginFactory,
    ) {
        self.entries.push(RegistryEntry {
            descriptor: PluginDescriptor {
                id,
                name,
                description,
                category,
            },
            factory,
        });
    }

    /// Every registered plugin.
    pub fn all(&self) -> Vec<&PluginDescriptor> {
        self.entries.iter().map(|e| &e.descriptor).collect()
    }

    /// Plugins in `category`.
    pub fn in_category(&self, category: PluginCategory) -> Vec<&PluginDescriptor> {
        self.entries
            .iter()
            .filter(|e| e.descriptor.category == category)
            .map(|e| &e.descriptor)
            .collect()
    }

    /// Descriptor for `id`.
    pub fn get(&self, id: &str) -> Option<&PluginDescriptor> {
        self.entries
            .iter()
            .find(|e| e.descriptor.id == id)
            .map(|e| &e.descriptor)
    }

    /// A fresh, uninitialized instance of `id`.
    pub fn create(&self, id: &str) -> Option<Box<dyn Plugin>> {
        self.entries
            .iter()
            .find(|e| e.descriptor.id == id)
            .map(|e| (e.factory)())
    }

    /// Index of the parameter of `plugin_id` whose name or short name matches
    /// `param_name` (case-insensitive).
    pub fn param_index_by_name(&self, plugin_id: &str, param_name: &str) -> Option<usize> {
        self.create(plugin_id)?.find_param_by_name(param_name)
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
