//! Errors for control-plane edits.

use thiserror::Error;

use crate::plugin::PluginError;
use crate::queue::QueueError;

/// Rejected configuration or topology edits.
///
/// Every rejection leaves the live chain and the mirror in their last valid
/// state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    /// No channel at this index.
    #[error("channel {0} not found")]
    ChannelNotFound(usize),

    /// The engine already has its maximum number of channels.
    #[error("channel limit of {max} reached")]
    ChannelLimit {
        /// Configured maximum.
        max: usize,
    },

    /// No plugin with this instance ID in the channel.
    #[error("plugin instance {0} not found")]
    PluginNotFound(i32),

    /// No container with this ID in the channel.
    #[error("container {0} not found")]
    ContainerNotFound(i32),

    /// The registry has no plugin with this id.
    #[error("unknown plugin type '{0}'")]
    UnknownPlugin(String),

    /// The channel already has an input plugin.
    #[error("channel already has an input plugin (instance {existing})")]
    DuplicateInput {
        /// Instance ID of the input already present.
        existing: i32,
    },

    /// The channel already has an output send.
    #[error("channel already has an output send (instance {existing})")]
    DuplicateOutputSend {
        /// Instance ID of the send already present.
        existing: i32,
    },

    /// A restored configuration repeats an instance ID, or uses one that is not positive.
    #[error("invalid or duplicate instance ID {0}")]
    InvalidInstanceId(i32),

    /// Bus and copy inputs stay at position 0 and are only removed with their channel.
    #[error("plugin instance {0} is pinned to position 0")]
    Pinned(i32),

    /// The edit would make a channel depend on itself.
    #[error("routing edge {from} -> {to} would create a cycle")]
    RoutingCycle {
        /// Source channel.
        from: usize,
        /// Consumer channel.
        to: usize,
    },

    /// Parameter index beyond the plugin's parameter count.
    #[error("parameter {index} out of range for plugin instance {instance_id}")]
    ParameterOutOfRange {
        /// Target plugin.
        instance_id: i32,
        /// Offending index.
        index: usize,
    },

    /// A plugin rejected restored state.
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// The parameter queue refused the change.
    #[error(transparent)]
    Queue(#[from] QueueError),
}
