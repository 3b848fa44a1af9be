//! Session files and engine construction for hotmic.
//!
//! A session is everything needed to bring an engine back: sample rate,
//! quality mode, channel strips with their chains, the analysis tap and the
//! analysis settings. Sessions are stored as TOML.
//!
//! # Features
//!
//! - **Session files**: Load and save [`SessionConfig`] as TOML
//! - **Validation**: Catch unknown plugins, bad parameters, dangling routing
//!   references and cycles before anything is installed
//! - **Engine construction**: [`build_engine`] turns a session into a running
//!   engine; [`reinitialize_engine`] restarts it after a quality change
//!
//! # Example
//!
//! ```rust,no_run
//! use hotmic_config::{QualityMode, SessionConfig, build_engine};
//! use hotmic_core::{ChannelConfig, PluginConfig, PluginRegistry};
//!
//! let session = SessionConfig::new("Podcast")
//!     .with_quality(QualityMode::LowLatency)
//!     .with_channel(
//!         ChannelConfig::new("Mic")
//!             .with_plugin(PluginConfig::new(1, "input_source"))
//!             .with_plugin(PluginConfig::new(2, "noise_gate"))
//!             .with_plugin(PluginConfig::new(3, "output_send")),
//!     );
//! session.save("podcast.toml").unwrap();
//!
//! let loaded = SessionConfig::load("podcast.toml").unwrap();
//! let (engine, processor) = build_engine(&loaded, &PluginRegistry::new()).unwrap();
//! ```

mod build;
mod error;
mod session;

/// Session validation.
pub mod validation;

pub use build::{build_engine, reinitialize_engine};
pub use error::ConfigError;
pub use session::{DEFAULT_MAX_CHANNELS, QualityMode, SessionConfig};
pub use validation::{ValidationError, ValidationResult, validate_session};
