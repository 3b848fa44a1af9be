//! Built-in processing plugins.
//!
//! Routing plugins (input, bus, copy, merge, output) live in
//! [`routing`](crate::routing); this module holds the signal processors.

mod compressor;
mod envelope;
mod gain;
mod gate;

pub use compressor::Compressor;
pub use envelope::EnvelopeFollower;
pub use gain::GainPlugin;
pub use gate::{LEARN_MARGIN_DB, NoiseGate};
