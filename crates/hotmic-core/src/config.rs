//! Serializable mirror of live channel state.
//!
//! [`PluginGraph`](crate::graph::PluginGraph) keeps a [`ChannelConfig`] in step
//! with the live chain so that what gets saved is what is playing. These types
//! carry no file-format logic; `hotmic-config` embeds them in its session file.

use serde::{Deserialize, Serialize};

/// One plugin in a channel chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Instance ID, unique within the channel.
    pub instance_id: i32,
    /// Registry id of the plugin.
    #[serde(rename = "type")]
    pub plugin_id: String,
    /// The plugin's own bypass flag.
    #[serde(default)]
    pub bypassed: bool,
    /// Parameter values in index order.
    #[serde(default)]
    pub params: Vec<f32>,
    /// Opaque plugin state.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub state: Vec<u8>,
}

impl PluginConfig {
    /// A config with default parameters.
    pub fn new(instance_id: i32, plugin_id: impl Into<String>) -> Self {
        Self {
            instance_id,
            plugin_id: plugin_id.into(),
            bypassed: false,
            params: Vec::new(),
            state: Vec::new(),
        }
    }

    /// Builder: set parameter values.
    pub fn with_params(mut self, params: Vec<f32>) -> Self {
        self.params = params;
        self
    }

    /// Builder: set the bypass flag.
    pub fn with_bypass(mut self, bypassed: bool) -> Self {
        self.bypassed = bypassed;
        self
    }
}

/// A named group of plugins sharing one bypass toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Container ID, unique within the channel.
    pub id: i32,
    /// Display name.
    pub name: String,
    /// Container bypass overlay.
    #[serde(default)]
    pub bypassed: bool,
    /// Member instance IDs in display order.
    #[serde(default)]
    pub members: Vec<i32>,
}

/// A channel strip and its chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Display name.
    pub name: String,
    /// Input gain in dB.
    #[serde(default)]
    pub input_gain_db: f32,
    /// Output gain in dB.
    #[serde(default)]
    pub output_gain_db: f32,
    /// Muted.
    #[serde(default)]
    pub muted: bool,
    /// Soloed.
    #[serde(default)]
    pub soloed: bool,
    /// Chain in processing order.
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
    /// Containers.
    #[serde(default)]
    pub containers: Vec<ContainerConfig>,
}

impl ChannelConfig {
    /// An empty channel strip at unity gain.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_gain_db: 0.0,
            output_gain_db: 0.0,
            muted: false,
            soloed: false,
            plugins: Vec::new(),
            containers: Vec::new(),
        }
    }

    /// Builder: append a plugin.
    pub fn with_plugin(mut self, plugin: PluginConfig) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Plugin config for `instance_id`.
    pub fn plugin(&self, instance_id: i32) -> Option<&PluginConfig> {
        self.plugins.iter().find(|p| p.instance_id == instance_id)
    }

    /// Mutable plugin config for `instance_id`.
    pub fn plugin_mut(&mut self, instance_id: i32) -> Option<&mut PluginConfig> {
        self.plugins.iter_mut().find(|p| p.instance_id == instance_id)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new("Channel")
    }
}

/// Where analysis taps the signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TapPoint {
    /// The channel's final (post-chain) signal.
    #[default]
    Output,
    /// Right after the given plugin.
    Plugin {
        /// Instance ID of the plugin to split after.
        instance_id: i32,
    },
}

/// Analysis tap selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Channel to analyse.
    #[serde(default)]
    pub tap_channel: usize,
    /// Tap position within the channel.
    #[serde(default)]
    pub tap: TapPoint,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let mut ch = ChannelConfig::new("Mic")
            .with_plugin(PluginConfig::new(1, "input_source"))
            .with_plugin(PluginConfig::new(2, "gain").with_params(vec![-3.0, 0.0]));
        assert_eq!(ch.plugin(2).unwrap().params, vec![-3.0, 0.0]);
        ch.plugin_mut(1).unwrap().bypassed = true;
        assert!(ch.plugin(1).unwrap().bypassed);
        assert!(ch.plugin(3).is_none());
    }

    #[test]
    fn test_tap_point_default_is_output() {
        assert_eq!(RoutingConfig::default().tap, TapPoint::Output);
    }
}
