//! Session file format and operations.

use serde::{Deserialize, Serialize};
use std::path::Path;

use hotmic_analysis::AnalysisSettings;
use hotmic_core::{ChannelConfig, Engine, EngineSettings, RoutingConfig};

use crate::error::ConfigError;

/// Channel limit used when a session has fewer channels than this.
pub const DEFAULT_MAX_CHANNELS: usize = 16;

/// Trade-off between latency and processing headroom.
///
/// Each mode picks a callback block size; an explicit
/// [`SessionConfig::block_size`] overrides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityMode {
    /// Smallest blocks, for live monitoring.
    LowLatency,
    /// Default.
    #[default]
    Balanced,
    /// Large blocks for heavy chains or slow machines.
    HighQuality,
}

impl QualityMode {
    /// Callback block size in samples.
    pub const fn block_size(self) -> usize {
        match self {
            QualityMode::LowLatency => 128,
            QualityMode::Balanced => 256,
            QualityMode::HighQuality => 512,
        }
    }

    /// Name used in session files and on the command line.
    pub const fn name(self) -> &'static str {
        match self {
            QualityMode::LowLatency => "low_latency",
            QualityMode::Balanced => "balanced",
            QualityMode::HighQuality => "high_quality",
        }
    }
}

/// Everything needed to rebuild a running engine.
///
/// # TOML Format
///
/// ```toml
/// name = "Podcast"
/// sample_rate = 48000
/// quality = "low_latency"
///
/// [routing]
/// tap_channel = 0
/// [routing.tap]
/// mode = "plugin"
/// instance_id = 2
///
/// [analysis]
/// fft_size = 1024
///
/// [[channels]]
/// name = "Mic"
/// input_gain_db = 6.0
///
/// [[channels.plugins]]
/// instance_id = 1
/// type = "input_source"
///
/// [[channels.plugins]]
/// instance_id = 2
/// type = "noise_gate"
/// params = [-50.0, 5.0, 80.0, 0.0]
///
/// [[channels.plugins]]
/// instance_id = 3
/// type = "output_send"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session name.
    pub name: String,

    /// Device sample rate in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Latency/headroom preset.
    #[serde(default)]
    pub quality: QualityMode,

    /// Explicit block size, overriding the quality mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_size: Option<usize>,

    /// Analysis tap selection.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Analysis pipeline settings.
    #[serde(default)]
    pub analysis: AnalysisSettings,

    /// Channel strips in index order.
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

fn default_sample_rate() -> u32 {
    48000
}

impl SessionConfig {
    /// An empty session at 48 kHz.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sample_rate: default_sample_rate(),
            quality: QualityMode::default(),
            block_size: None,
            routing: RoutingConfig::default(),
            analysis: AnalysisSettings::default(),
            channels: Vec::new(),
        }
    }

    /// Builder: sample rate.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Builder: quality mode.
    pub fn with_quality(mut self, quality: QualityMode) -> Self {
        self.quality = quality;
        self
    }

    /// Builder: explicit block size.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = Some(block_size);
        self
    }

    /// Builder: append a channel.
    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channels.push(channel);
        self
    }

    /// Builder: analysis tap.
    pub fn with_routing(mut self, routing: RoutingConfig) -> Self {
        self.routing = routing;
        self
    }

    /// Load a session from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        match toml::from_str(&content) {
            Ok(session) => Ok(session),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "session file is not valid TOML");
                Err(e.into())
            }
        }
    }

    /// Load a session from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the session to a TOML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        tracing::debug!(path = %path.display(), channels = self.channels.len(), "session saved");
        Ok(())
    }

    /// Convert the session to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Block size after applying the quality mode.
    pub fn effective_block_size(&self) -> usize {
        self.block_size.unwrap_or(self.quality.block_size())
    }

    /// Engine settings for this session.
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings::default()
            .with_sample_rate(self.sample_rate as f32)
            .with_block_size(self.effective_block_size())
            .with_max_channels(self.channels.len().max(DEFAULT_MAX_CHANNELS))
    }

    /// Replace channels and tap with what `engine` is running now.
    ///
    /// Parameter values are read back from the live plugins, so edits made
    /// through the parameter queue are included.
    pub fn capture(&mut self, engine: &mut Engine) {
        self.channels = engine.channel_configs();
        self.routing = engine.analysis_tap();
        let settings = engine.settings();
        self.sample_rate = settings.sample_rate.round() as u32;
        self.block_size = if settings.block_size == self.quality.block_size() {
            None
        } else {
            Some(settings.block_size)
        };
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// `true` when the session has no channels.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotmic_core::{PluginConfig, TapPoint};

    fn podcast() -> SessionConfig {
        SessionConfig::new("Podcast")
            .with_quality(QualityMode::LowLatency)
            .with_channel(
                ChannelConfig::new("Mic")
                    .with_plugin(PluginConfig::new(1, "input_source"))
                    .with_plugin(PluginConfig::new(2, "gain").with_params(vec![-6.0, 0.0]))
                    .with_plugin(PluginConfig::new(3, "output_send")),
            )
            .with_routing(RoutingConfig {
                tap_channel: 0,
                tap: TapPoint::Plugin { instance_id: 2 },
            })
    }

    #[test]
    fn test_session_new() {
        let session = SessionConfig::new("Test");
        assert_eq!(session.name, "Test");
        assert_eq!(session.sample_rate, 48000);
        assert_eq!(session.quality, QualityMode::Balanced);
        assert!(session.is_empty());
    }

    #[test]
    fn test_quality_block_sizes() {
        assert_eq!(QualityMode::LowLatency.block_size(), 128);
        assert_eq!(QualityMode::Balanced.block_size(), 256);
        assert_eq!(QualityMode::HighQuality.block_size(), 512);
        assert_eq!(QualityMode::HighQuality.name(), "high_quality");
    }

    #[test]
    fn test_explicit_block_size_wins() {
        let session = podcast().with_block_size(64);
        assert_eq!(session.effective_block_size(), 64);
        assert_eq!(podcast().effective_block_size(), 128);
    }

    #[test]
    fn test_engine_settings() {
        let settings = podcast().with_sample_rate(44100).engine_settings();
        assert_eq!(settings.sample_rate, 44100.0);
        assert_eq!(settings.block_size, 128);
        assert_eq!(settings.max_channels, DEFAULT_MAX_CHANNELS);
    }

    #[test]
    fn test_session_from_toml() {
        let toml = r#"
name = "Test"
sample_rate = 44100
quality = "high_quality"

[routing]
tap_channel = 0
[routing.tap]
mode = "plugin"
instance_id = 2

[analysis]
fft_size = 1024
hop_size = 256

[[channels]]
name = "Mic"
input_gain_db = 6.0
muted = true

[[channels.plugins]]
instance_id = 1
type = "input_source"

[[channels.plugins]]
instance_id = 2
type = "noise_gate"
bypassed = true
params = [-50.0, 5.0, 80.0, 0.0]
"#;

        let session = SessionConfig::from_toml(toml).unwrap();
        assert_eq!(session.sample_rate, 44100);
        assert_eq!(session.quality, QualityMode::HighQuality);
        assert_eq!(session.routing.tap, TapPoint::Plugin { instance_id: 2 });
        assert_eq!(session.analysis.fft_size, 1024);
        assert_eq!(session.analysis.pitch_min_hz, AnalysisSettings::default().pitch_min_hz);

        let mic = &session.channels[0];
        assert_eq!(mic.input_gain_db, 6.0);
        assert!(mic.muted);
        assert!(!mic.soloed);
        let gate = mic.plugin(2).unwrap();
        assert_eq!(gate.plugin_id, "noise_gate");
        assert!(gate.bypassed);
        assert_eq!(gate.params, vec![-50.0, 5.0, 80.0, 0.0]);
    }

    #[test]
    fn test_minimal_toml() {
        let session = SessionConfig::from_toml("name = \"Minimal\"").unwrap();
        assert_eq!(session.sample_rate, 48000);
        assert_eq!(session.routing, RoutingConfig::default());
        assert_eq!(session.analysis, AnalysisSettings::default());
        assert!(session.channels.is_empty());
    }

    #[test]
    fn test_session_to_toml() {
        let toml = podcast().to_toml().unwrap();
        assert!(toml.contains("name = \"Podcast\""));
        assert!(toml.contains("quality = \"low_latency\""));
        assert!(toml.contains("type = \"gain\""));
        assert!(toml.contains("mode = \"plugin\""));
        assert!(!toml.contains("block_size"), "unset override is omitted: {toml}");
    }

    #[test]
    fn test_session_roundtrip() {
        let original = podcast().with_block_size(96);
        let parsed = SessionConfig::from_toml(&original.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_malformed_toml_is_rejected() {
        let err = SessionConfig::from_toml("name = ").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
        let err = SessionConfig::from_toml("name = \"x\"\nquality = \"turbo\"").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }
}
