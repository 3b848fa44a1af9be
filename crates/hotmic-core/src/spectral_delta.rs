//! Per-slot spectral delta: how much a plugin changes each band.
//!
//! Measures band energy of a slot's input and output with one Goertzel filter
//! per band and publishes `output_db - input_db` per band. Everything is sized
//! at construction, so measuring a block never allocates.

use core::f32::consts::PI;
use std::sync::Arc;

use libm::cosf;

use crate::math::{AtomicF32, linear_to_db};

/// Number of measured bands.
pub const SPECTRAL_BANDS: usize = 8;

/// Band centre frequencies in Hz.
pub const BAND_CENTERS_HZ: [f32; SPECTRAL_BANDS] =
    [125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 12000.0];

/// Energy of one frequency in a block using the Goertzel recurrence.
#[inline]
fn goertzel_power(block: &[f32], coeff: f32) -> f32 {
    let mut s1 = 0.0f32;
    let mut s2 = 0.0f32;
    for &x in block {
        let s0 = x + coeff * s1 - s2;
        s2 = s1;
        s1 = s0;
    }
    let power = s1 * s1 + s2 * s2 - coeff * s1 * s2;
    power.max(0.0) / (block.len().max(1) as f32).powi(2)
}

/// Published per-band deltas, readable from any thread.
#[derive(Debug)]
pub struct BandDeltas([AtomicF32; SPECTRAL_BANDS]);

impl BandDeltas {
    fn new() -> Self {
        Self(std::array::from_fn(|_| AtomicF32::new(0.0)))
    }

    /// Latest per-band deltas in dB.
    pub fn read(&self) -> [f32; SPECTRAL_BANDS] {
        std::array::from_fn(|i| self.0[i].load())
    }
}

/// Goertzel band analyser with published deltas.
#[derive(Debug)]
pub struct SpectralDelta {
    coeffs: [f32; SPECTRAL_BANDS],
    active: [bool; SPECTRAL_BANDS],
    input_db: [f32; SPECTRAL_BANDS],
    published: Arc<BandDeltas>,
}

impl SpectralDelta {
    /// Prepare band filters for `sample_rate`. Bands at or above Nyquist are
    /// disabled and report `0.0`.
    pub fn new(sample_rate: f32) -> Self {
        let nyquist = sample_rate * 0.5;
        let mut coeffs = [0.0; SPECTRAL_BANDS];
        let mut active = [false; SPECTRAL_BANDS];
        for (i, &hz) in BAND_CENTERS_HZ.iter().enumerate() {
            if hz < nyquist {
                coeffs[i] = 2.0 * cosf(2.0 * PI * hz / sample_rate);
                active[i] = true;
            }
        }
        Self {
            coeffs,
            active,
            input_db: [0.0; SPECTRAL_BANDS],
            published: Arc::new(BandDeltas::new()),
        }
    }

    /// Measure the slot input (before the plugin runs).
    pub fn measure_input(&mut self, block: &[f32]) {
        for i in 0..SPECTRAL_BANDS {
            if self.active[i] {
                self.input_db[i] = linear_to_db(goertzel_power(block, self.coeffs[i]).sqrt());
            }
        }
    }

    /// Measure the slot output and publish per-band deltas.
    pub fn measure_output(&mut self, block: &[f32]) {
        for i in 0..SPECTRAL_BANDS {
            if self.active[i] {
                let out_db = linear_to_db(goertzel_power(block, self.coeffs[i]).sqrt());
                self.published.0[i].store(out_db - self.input_db[i]);
            }
        }
    }

    /// Latest per-band deltas in dB.
    pub fn deltas(&self) -> [f32; SPECTRAL_BANDS] {
        self.published.read()
    }

    /// Shared handle to the published deltas.
    pub fn readings(&self) -> Arc<BandDeltas> {
        Arc::clone(&self.published)
    }
}
