//! Session validation.
//!
//! Checks everything an engine would reject or silently misroute before any
//! plugin is installed: unknown plugin types, instance IDs, parameter counts
//! and ranges, routing references to channels that do not exist, routing
//! cycles, container members, the analysis tap and the analysis settings.
//!
//! # Example
//!
//! ```rust
//! use hotmic_config::{SessionConfig, validate_session};
//! use hotmic_core::{ChannelConfig, PluginConfig, PluginRegistry};
//!
//! let registry = PluginRegistry::new();
//! let session = SessionConfig::new("Demo").with_channel(
//!     ChannelConfig::new("Mic").with_plugin(PluginConfig::new(1, "reverb")),
//! );
//! assert!(validate_session(&session, &registry).is_err());
//! ```

use thiserror::Error;

use hotmic_core::routing::topological_order;
use hotmic_core::{ChannelConfig, ParameterInfo, PluginCapabilities, PluginRegistry, TapPoint};

use crate::session::SessionConfig;

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// Sample rate of zero.
    #[error("invalid sample rate {0}")]
    InvalidSampleRate(u32),

    /// Block size of zero.
    #[error("invalid block size {0}")]
    InvalidBlockSize(usize),

    /// Unknown plugin type.
    #[error("channel {channel}: unknown plugin type '{plugin}'")]
    UnknownPlugin {
        /// Channel index.
        channel: usize,
        /// Plugin type as written in the session.
        plugin: String,
    },

    /// Instance ID that is not positive or repeats within the channel.
    #[error("channel {channel}: invalid or duplicate instance ID {instance_id}")]
    InvalidInstanceId {
        /// Channel index.
        channel: usize,
        /// Offending instance ID.
        instance_id: i32,
    },

    /// More parameter values than the plugin has parameters.
    #[error("channel {channel}: plugin {instance_id} has {expected} parameters, got {count}")]
    TooManyParameters {
        /// Channel index.
        channel: usize,
        /// Plugin instance.
        instance_id: i32,
        /// Values in the session.
        count: usize,
        /// Parameters the plugin exposes.
        expected: usize,
    },

    /// Parameter value out of range.
    #[error("channel {channel}: plugin {instance_id} parameter '{param}' value {value} out of range [{min}, {max}]")]
    OutOfRange {
        /// Channel index.
        channel: usize,
        /// Plugin instance.
        instance_id: i32,
        /// Parameter name.
        param: String,
        /// The value that was out of range.
        value: f32,
        /// Minimum allowed value.
        min: f32,
        /// Maximum allowed value.
        max: f32,
    },

    /// A routing plugin names a channel the session does not have.
    #[error("channel {channel}: plugin {instance_id} references missing channel {target}")]
    MissingChannel {
        /// Channel index.
        channel: usize,
        /// Routing plugin instance.
        instance_id: i32,
        /// Referenced channel.
        target: usize,
    },

    /// Routing references form a cycle.
    #[error("routing cycle between channels {channels:?}")]
    RoutingCycle {
        /// Channels that cannot be ordered.
        channels: Vec<usize>,
    },

    /// A container lists an instance that is not on the channel.
    #[error("channel {channel}: container {container} lists missing plugin {instance_id}")]
    ContainerMember {
        /// Channel index.
        channel: usize,
        /// Container ID.
        container: i32,
        /// Missing member.
        instance_id: i32,
    },

    /// The analysis tap names a channel the session does not have.
    #[error("analysis tap channel {0} does not exist")]
    TapChannel(usize),

    /// The analysis tap splits after a plugin that is not on the tap channel.
    #[error("analysis tap plugin {instance_id} is not on channel {channel}")]
    TapPlugin {
        /// Tap channel.
        channel: usize,
        /// Missing instance.
        instance_id: i32,
    },

    /// Analysis settings rejected by the pipeline.
    #[error("analysis settings: {0}")]
    Analysis(String),

    /// Multiple validation errors.
    #[error("multiple validation errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate a whole session against `registry`.
///
/// Every problem is collected; a single one is returned as is, several as
/// [`ValidationError::Multiple`].
pub fn validate_session(session: &SessionConfig, registry: &PluginRegistry) -> ValidationResult<()> {
    let mut errors = Vec::new();

    if session.sample_rate == 0 {
        errors.push(ValidationError::InvalidSampleRate(session.sample_rate));
    }
    let block_size = session.effective_block_size();
    if block_size == 0 {
        errors.push(ValidationError::InvalidBlockSize(block_size));
    }
    if session.sample_rate > 0 {
        if let Err(e) = session.analysis.validate(session.sample_rate as f32) {
            errors.push(ValidationError::Analysis(e.to_string()));
        }
    }

    let mut edges = Vec::new();
    for (index, channel) in session.channels.iter().enumerate() {
        validate_channel(index, channel, session.channels.len(), registry, &mut edges, &mut errors);
    }
    if let Err(hotmic_core::RoutingError::Cycle { channels }) =
        topological_order(session.channels.len(), &edges)
    {
        errors.push(ValidationError::RoutingCycle { channels });
    }

    validate_tap(session, &mut errors);

    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

/// Validate one channel, appending its routing edges to `edges`.
fn validate_channel(
    index: usize,
    channel: &ChannelConfig,
    channel_count: usize,
    registry: &PluginRegistry,
    edges: &mut Vec<(usize, usize)>,
    errors: &mut Vec<ValidationError>,
) {
    let mut seen: Vec<i32> = Vec::with_capacity(channel.plugins.len());
    for pc in &channel.plugins {
        if pc.instance_id <= 0 || seen.contains(&pc.instance_id) {
            errors.push(ValidationError::InvalidInstanceId {
                channel: index,
                instance_id: pc.instance_id,
            });
        }
        seen.push(pc.instance_id);

        let Some(mut plugin) = registry.create(&pc.plugin_id) else {
            errors.push(ValidationError::UnknownPlugin {
                channel: index,
                plugin: pc.plugin_id.clone(),
            });
            continue;
        };

        let expected = plugin.param_count();
        if pc.params.len() > expected {
            errors.push(ValidationError::TooManyParameters {
                channel: index,
                instance_id: pc.instance_id,
                count: pc.params.len(),
                expected,
            });
        }
        for (i, &value) in pc.params.iter().enumerate().take(expected) {
            let Some(desc) = plugin.param_info(i) else {
                continue;
            };
            if !value.is_finite() || value < desc.min || value > desc.max {
                errors.push(ValidationError::OutOfRange {
                    channel: index,
                    instance_id: pc.instance_id,
                    param: desc.name.to_string(),
                    value,
                    min: desc.min,
                    max: desc.max,
                });
                continue;
            }
            plugin.set_param(i, value);
        }

        if let Some(ports) = PluginCapabilities::of(plugin.as_ref()).routing {
            for target in ports.channels() {
                if target >= channel_count {
                    errors.push(ValidationError::MissingChannel {
                        channel: index,
                        instance_id: pc.instance_id,
                        target,
                    });
                }
            }
            edges.extend(ports.edges(index));
        }
    }

    for container in &channel.containers {
        for &member in &container.members {
            if !seen.contains(&member) {
                errors.push(ValidationError::ContainerMember {
                    channel: index,
                    container: container.id,
                    instance_id: member,
                });
            }
        }
    }
}

fn validate_tap(session: &SessionConfig, errors: &mut Vec<ValidationError>) {
    let tap = session.routing;
    // An empty session has nothing to tap; the default tap is fine there.
    if session.channels.is_empty() && tap.tap == TapPoint::Output && tap.tap_channel == 0 {
        return;
    }
    let Some(channel) = session.channels.get(tap.tap_channel) else {
        errors.push(ValidationError::TapChannel(tap.tap_channel));
        return;
    };
    if let TapPoint::Plugin { instance_id } = tap.tap {
        if channel.plugin(instance_id).is_none() {
            errors.push(ValidationError::TapPlugin {
                channel: tap.tap_channel,
                instance_id,
            });
        }
    }
}
