//! Parameter introspection for plugins.
//!
//! Every [`Plugin`](crate::Plugin) exposes its parameters through the
//! [`ParameterInfo`] trait using index-based access. The index is the
//! `parameter_index` carried by [`ParameterChange`](crate::ParameterChange)
//! and the position of the value in the persisted
//! [`PluginConfig::params`](crate::config::PluginConfig) list.
//!
//! # Example
//!
//! ```rust
//! use hotmic_core::{ParamDescriptor, ParameterInfo};
//!
//! struct Trim {
//!     gain_db: f32,
//! }
//!
//! impl ParameterInfo for Trim {
//!     fn param_count(&self) -> usize { 1 }
//!
//!     fn param_info(&self, index: usize) -> Option<ParamDescriptor> {
//!         match index {
//!             0 => Some(ParamDescriptor::gain_db("Gain", "Gain", -24.0, 24.0, 0.0)),
//!             _ => None,
//!         }
//!     }
//!
//!     fn get_param(&self, index: usize) -> f32 {
//!         if index == 0 { self.gain_db } else { 0.0 }
//!     }
//!
//!     fn set_param(&mut self, index: usize, value: f32) {
//!         if index == 0 {
//!             self.gain_db = value.clamp(-24.0, 24.0);
//!         }
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};

/// Unit of a parameter value, used for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamUnit {
    /// Decibels.
    Decibels,
    /// Milliseconds.
    Milliseconds,
    /// Hertz.
    Hertz,
    /// Ratio (e.g. compression ratio, `4.0` means 4:1).
    Ratio,
    /// Percent, 0–100.
    Percent,
    /// Zero-based channel index. `-1` means "none".
    Channel,
    /// Discrete choice index.
    Choice,
    /// On/off, stored as `0.0` / `1.0`.
    Toggle,
}

impl ParamUnit {
    /// Short suffix for display.
    pub fn suffix(&self) -> &'static str {
        match self {
            ParamUnit::Decibels => " dB",
            ParamUnit::Milliseconds => " ms",
            ParamUnit::Hertz => " Hz",
            ParamUnit::Ratio => ":1",
            ParamUnit::Percent => "%",
            ParamUnit::Channel | ParamUnit::Choice | ParamUnit::Toggle => "",
        }
    }
}

/// Capability flags attached to a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamFlags(u8);

impl ParamFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// The parameter may be changed while audio is running.
    pub const AUTOMATABLE: Self = Self(1 << 0);
    /// The parameter only takes integer steps.
    pub const STEPPED: Self = Self(1 << 1);
    /// The parameter holds a channel reference. Changing it changes routing.
    pub const ROUTING: Self = Self(1 << 2);

    /// Returns `true` if all bits of `other` are set.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Bitwise union.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl Default for ParamFlags {
    fn default() -> Self {
        Self::AUTOMATABLE
    }
}

/// Index-based parameter access.
pub trait ParameterInfo {
    /// Number of parameters.
    fn param_count(&self) -> usize;

    /// Descriptor for the parameter at `index`, or `None` if out of range.
    fn param_info(&self, index: usize) -> Option<ParamDescriptor>;

    /// Current value of the parameter at `index`. Out-of-range returns `0.0`.
    fn get_param(&self, index: usize) -> f32;

    /// Set the parameter at `index`. Implementations clamp to the descriptor range
    /// and ignore out-of-range indices.
    fn set_param(&mut self, index: usize, value: f32);

    /// Find a parameter by name or short name (case-insensitive).
    fn find_param_by_name(&self, name: &str) -> Option<usize> {
        (0..self.param_count()).find(|&i| {
            self.param_info(i).is_some_and(|d| {
                d.name.eq_ignore_ascii_case(name) || d.short_name.eq_ignore_ascii_case(name)
            })
        })
    }

    /// All descriptors in index order.
    fn descriptors(&self) -> Vec<ParamDescriptor> {
        (0..self.param_count())
            .filter_map(|i| self.param_info(i))
            .collect()
    }

    /// All current values in index order.
    fn param_values(&self) -> Vec<f32> {
        (0..self.param_count()).map(|i| self.get_param(i)).collect()
    }
}

/// Metadata describing a single parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamDescriptor {
    /// Full display name.
    pub name: &'static str,
    /// Abbreviated name for compact displays.
    pub short_name: &'static str,
    /// Unit for display.
    pub unit: ParamUnit,
    /// Minimum value.
    pub min: f32,
    /// Maximum value.
    pub max: f32,
    /// Default value.
    pub default: f32,
    /// Step size for UI increments.
    pub step: f32,
    /// Capability flags.
    pub flags: ParamFlags,
}

impl ParamDescriptor {
    /// A gain parameter in decibels.
    pub fn gain_db(
        name: &'static str,
        short_name: &'static str,
        min: f32,
        max: f32,
        default: f32,
    ) -> Self {
        Self {
            name,
            short_name,
            unit: ParamUnit::Decibels,
            min,
            max,
            default,
            step: 0.5,
            flags: ParamFlags::AUTOMATABLE,
        }
    }

    /// A time parameter in milliseconds.
    pub fn time_ms(
        name: &'static str,
        short_name: &'static str,
        min: f32,
        max: f32,
        default: f32,
    ) -> Self {
        Self {
            name,
            short_name,
            unit: ParamUnit::Milliseconds,
            min,
            max,
            default,
            step: 1.0,
            flags: ParamFlags::AUTOMATABLE,
        }
    }

    /// A ratio parameter (`x:1`).
    pub fn ratio(name: &'static str, min: f32, max: f32, default: f32) -> Self {
        Self {
            name,
            short_name: name,
            unit: ParamUnit::Ratio,
            min,
            max,
            default,
            step: 0.1,
            flags: ParamFlags::AUTOMATABLE,
        }
    }

    /// A channel reference. `-1` means "none", otherwise a zero-based channel index.
    pub fn channel(name: &'static str, short_name: &'static str, default: f32) -> Self {
        Self {
            name,
            short_name,
            unit: ParamUnit::Channel,
            min: -1.0,
            max: 255.0,
            default,
            step: 1.0,
            flags: ParamFlags::STEPPED.union(ParamFlags::ROUTING),
        }
    }

    /// A discrete choice among `count` options.
    pub fn choice(name: &'static str, count: usize, default: usize) -> Self {
        Self {
            name,
            short_name: name,
            unit: ParamUnit::Choice,
            min: 0.0,
            max: count.saturating_sub(1) as f32,
            default: default as f32,
            step: 1.0,
            flags: ParamFlags::AUTOMATABLE.union(ParamFlags::STEPPED),
        }
    }

    /// An on/off switch.
    pub fn toggle(name: &'static str, default: bool) -> Self {
        Self {
            name,
            short_name: name,
            unit: ParamUnit::Toggle,
            min: 0.0,
            max: 1.0,
            default: if default { 1.0 } else { 0.0 },
            step: 1.0,
            flags: ParamFlags::AUTOMATABLE.union(ParamFlags::STEPPED),
        }
    }

    /// Clamp a value to this parameter's range. Stepped parameters are rounded.
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        let v = value.clamp(self.min, self.max);
        if self.flags.contains(ParamFlags::STEPPED) {
            v.round()
        } else {
            v
        }
    }

    /// Map a value to `[0, 1]`.
    #[inline]
    pub fn normalize(&self, value: f32) -> f32 {
        if self.max <= self.min {
            return 0.0;
        }
        (self.clamp(value) - self.min) / (self.max - self.min)
    }

    /// Whether changing this parameter changes cross-channel routing.
    #[inline]
    pub fn is_routing(&self) -> bool {
        self.flags.contains(ParamFlags::ROUTING)
    }
}
