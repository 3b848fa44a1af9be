//! CLI command implementations.

pub mod analyze;
pub mod plugins;
pub mod render;
pub mod routing;

use hotmic_core::linear_to_db;
use hotmic_core::math::peak_and_rms;

/// `RMS x dB, Peak y dB` for a block, floored at -120 dB.
pub fn level_summary(samples: &[f32]) -> String {
    let (peak, rms) = peak_and_rms(samples);
    format!(
        "RMS {:.1} dB, Peak {:.1} dB",
        linear_to_db(rms).max(-120.0),
        linear_to_db(peak).max(-120.0)
    )
}
