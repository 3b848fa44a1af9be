//! Lock-free level meters.
//!
//! The audio thread writes one peak/RMS pair per block; UI timers read them at
//! their own rate. Peak readings hold the maximum since the last
//! [`LevelMeter::take_peak`] so short transients between UI polls are not lost.

use crate::math::{AtomicF32, peak_and_rms};

/// Peak and RMS of the most recent blocks.
#[derive(Debug, Default)]
pub struct LevelMeter {
    peak: AtomicF32,
    held_peak: AtomicF32,
    rms: AtomicF32,
}

/// A meter reading.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeterReading {
    /// Peak absolute sample of the last block (linear).
    pub peak: f32,
    /// RMS of the last block (linear).
    pub rms: f32,
}

impl LevelMeter {
    /// A meter reading zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Measure a block (audio thread).
    #[inline]
    pub fn update(&self, block: &[f32]) {
        let (peak, rms) = peak_and_rms(block);
        self.peak.store(peak);
        self.rms.store(rms);
        if peak > self.held_peak.load() {
            self.held_peak.store(peak);
        }
    }

    /// Latest block's levels.
    pub fn reading(&self) -> MeterReading {
        MeterReading {
            peak: self.peak.load(),
            rms: self.rms.load(),
        }
    }

    /// Highest peak since the previous call, then reset the hold.
    pub fn take_peak(&self) -> f32 {
        let held = self.held_peak.load();
        self.held_peak.store(0.0);
        held
    }

    /// Zero all readings.
    pub fn reset(&self) {
        self.peak.store(0.0);
        self.held_peak.store(0.0);
        self.rms.store(0.0);
    }
}
