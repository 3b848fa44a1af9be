//! Level conversions and lock-free float storage.
//!
//! - [`db_to_linear`] / [`linear_to_db`] - Convert between dB and linear gain
//! - [`AtomicF32`] - `f32` stored as bits in an `AtomicU32`
//! - [`peak_and_rms`] - Block level measurement used by meters

use core::sync::atomic::{AtomicU32, Ordering};
use libm::{expf, logf, sqrtf};

/// Convert decibels to linear gain.
///
/// # Example
/// ```rust
/// use hotmic_core::db_to_linear;
///
/// assert!((db_to_linear(0.0) - 1.0).abs() < 0.001);
/// assert!((db_to_linear(-6.02) - 0.5).abs() < 0.01);
/// ```
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    // 10^(dB/20) = e^(dB * ln(10)/20)
    const FACTOR: f32 = core::f32::consts::LN_10 / 20.0;
    expf(db * FACTOR)
}

/// Convert linear gain to decibels.
///
/// Inputs at or below `1e-10` clamp to -200 dB.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    const FACTOR: f32 = 20.0 / core::f32::consts::LN_10;
    logf(linear.max(1e-10)) * FACTOR
}

/// Peak absolute value and RMS of a block.
///
/// Returns `(0.0, 0.0)` for an empty block.
#[inline]
pub fn peak_and_rms(block: &[f32]) -> (f32, f32) {
    if block.is_empty() {
        return (0.0, 0.0);
    }
    let mut peak = 0.0f32;
    let mut sum_sq = 0.0f32;
    for &s in block {
        peak = peak.max(s.abs());
        sum_sq += s * s;
    }
    (peak, sqrtf(sum_sq / block.len() as f32))
}

/// Returns `true` when every sample in the block is finite.
#[inline]
pub fn all_finite(block: &[f32]) -> bool {
    block.iter().all(|s| s.is_finite())
}

/// An `f32` that can be shared between threads without locking.
///
/// Stores the IEEE-754 bit pattern in an [`AtomicU32`]. Writers use `Release`,
/// readers use `Acquire`, so a reader that observes a value also observes
/// every write the writer made before storing it.
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    /// Create a new atomic float.
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    /// Load the current value.
    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    /// Store a new value.
    #[inline]
    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_round_trip() {
        for db in [-60.0, -12.0, -6.0, 0.0, 6.0, 12.0] {
            let back = linear_to_db(db_to_linear(db));
            assert!((back - db).abs() < 0.01, "{db} dB came back as {back}");
        }
    }

    #[test]
    fn test_linear_to_db_floor() {
        assert!(linear_to_db(0.0) <= -199.0);
    }

    #[test]
    fn test_peak_and_rms_of_square() {
        let block = [0.5, -0.5, 0.5, -0.5];
        let (peak, rms) = peak_and_rms(&block);
        assert!((peak - 0.5).abs() < 1e-6);
        assert!((rms - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_peak_and_rms_empty() {
        assert_eq!(peak_and_rms(&[]), (0.0, 0.0));
    }

    #[test]
    fn test_all_finite() {
        assert!(all_finite(&[0.0, 1.0, -1.0]));
        assert!(!all_finite(&[0.0, f32::NAN]));
        assert!(!all_finite(&[f32::INFINITY]));
    }

    #[test]
    fn test_atomic_f32() {
        let value = AtomicF32::new(1.5);
        assert_eq!(value.load(), 1.5);
        value.store(-0.25);
        assert_eq!(value.load(), -0.25);
    }
}
