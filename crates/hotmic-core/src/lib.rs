//! hotmic core - real-time microphone routing engine
//!
//! Every channel owns a plugin chain that the audio thread runs once per
//! block. Channels feed each other through routing plugins, and the engine
//! orders them so every source runs before its consumers.
//!
//! # Core Abstractions
//!
//! ## Plugins
//!
//! - [`Plugin`] - Object-safe trait for everything that sits in a chain
//! - [`ParameterInfo`] - Indexed parameter introspection shared by plugins
//! - [`PluginRegistry`] - Factory keyed by plugin id
//!
//! ## Chains
//!
//! - [`PluginChain`] - Lock-free snapshot of slots, swapped atomically
//! - [`PluginSlot`] - One plugin with its bypass flag, meter and fault counters
//! - [`DisposalQueue`] - Frees retired slots once the audio thread is done with them
//!
//! ## Channels and Routing
//!
//! - [`PluginGraph`] - Control-side editor and serializable mirror of one chain
//! - [`RoutingContext`] - Channel processing order, rebuilt on topology edits
//! - [`BusBuffers`] - Per-block channel outputs, copy taps and the output mix
//!
//! ## Engine
//!
//! - [`Engine`] - Control-thread half: channels, edits, maintenance
//! - [`AudioProcessor`] - Audio-thread half: one call per device callback
//! - [`ParameterChange`] - Strip, parameter, bypass and command updates
//!
//! # Example
//!
//! ```rust
//! use hotmic_core::{Engine, EngineSettings, ParameterChange, PluginRegistry};
//!
//! let registry = PluginRegistry::new();
//! let (mut engine, mut processor) = Engine::new(EngineSettings::default().with_block_size(128));
//!
//! let mic = engine.add_channel("Mic").unwrap();
//! engine.insert_plugin_by_id(mic, &registry, "input_source", 0).unwrap();
//! let gate = engine.insert_plugin_by_id(mic, &registry, "noise_gate", 1).unwrap();
//! engine.insert_plugin_by_id(mic, &registry, "output_send", 2).unwrap();
//!
//! engine
//!     .enqueue_parameter_change(ParameterChange::plugin_parameter(mic, gate, 0, -60.0))
//!     .unwrap();
//! engine.maintain();
//!
//! let input = vec![0.0_f32; 128];
//! let (mut left, mut right) = (vec![0.0; 128], vec![0.0; 128]);
//! processor.process(&[&input], &mut left, &mut right);
//! ```
//!
//! # Design Principles
//!
//! - **Real-time safe**: no allocation, locking or blocking in [`AudioProcessor::process`]
//! - **Deferred disposal**: removed plugins are dropped on the control thread
//! - **Mirror as truth for saving**: [`ChannelConfig`] tracks every edit so a
//!   session can be written without touching the audio thread

pub mod chain;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod graph;
pub mod math;
pub mod meter;
pub mod param_info;
pub mod plugin;
pub mod plugins;
pub mod queue;
pub mod registry;
pub mod routing;
pub mod spectral_delta;

// Re-export main types at crate root
pub use chain::{
    BlockClock, ChainEntry, ChainRun, ChainSnapshot, DisposalQueue, PluginChain, PluginSlot,
    SlotOutcome,
};
pub use config::{ChannelConfig, ContainerConfig, PluginConfig, RoutingConfig, TapPoint};
pub use diagnostics::{Diagnostics, DiagnosticsSnapshot, DropWindow, InputCounters, InputDiagnostics};
pub use engine::{
    AudioProcessor, CaptureMeta, CaptureSink, CaptureSource, ChannelRuntime, Engine,
    EngineSettings, Maintenance,
};
pub use graph::{GraphError, PluginContainer, PluginGraph};
pub use math::{AtomicF32, db_to_linear, linear_to_db};
pub use meter::{LevelMeter, MeterReading};
pub use param_info::{ParamDescriptor, ParamFlags, ParamUnit, ParameterInfo};
pub use plugin::{
    ChannelInputCapable, ChannelOutputCapable, InputKind, OutputMode, Plugin, PluginCapabilities,
    PluginCommand, PluginError, ProcessContext, RoutingDependencyCapable,
};
pub use queue::{
    Enqueued, ParameterChange, ParameterKind, ParameterReceiver, ParameterSender, QueueError,
    parameter_queue,
};
pub use registry::{PluginCategory, PluginDescriptor, PluginRegistry};
pub use routing::{BusBuffers, RoutingContext, RoutingError, RoutingPlan, RoutingState};
pub use spectral_delta::{BandDeltas, SpectralDelta};
