//! Spectral shape features computed from a magnitude spectrum.
//!
//! All functions take linear magnitudes for bins `0..=fft_size/2`.

use crate::fft::bin_frequency;

/// Harmonics reported per frame.
pub const HARMONIC_COUNT: usize = 8;

/// Floor for harmonic levels in dB.
pub const HARMONIC_FLOOR_DB: f32 = -120.0;

fn bin_hz(sample_rate: f32, fft_size: usize) -> f64 {
    f64::from(bin_frequency(1, sample_rate, fft_size))
}

/// Magnitude-weighted mean frequency in Hz; `0.0` for an empty spectrum.
pub fn centroid(magnitudes: &[f32], sample_rate: f32, fft_size: usize) -> f64 {
    let hz = bin_hz(sample_rate, fft_size);
    let (mut weighted, mut total) = (0.0, 0.0);
    for (k, &m) in magnitudes.iter().enumerate() {
        let m = f64::from(m);
        weighted += k as f64 * hz * m;
        total += m;
    }
    if total > 0.0 { weighted / total } else { 0.0 }
}

/// Least squares slope of the log spectrum in dB per kHz over
/// `min_hz..=max_hz`. Returns `0.0` with fewer than two bins in range.
pub fn slope_db_per_khz(
    magnitudes: &[f32],
    sample_rate: f32,
    fft_size: usize,
    min_hz: f64,
    max_hz: f64,
) -> f64 {
    let hz = bin_hz(sample_rate, fft_size);
    let (mut n, mut sx, mut sy, mut sxx, mut sxy) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (k, &m) in magnitudes.iter().enumerate() {
        let f = k as f64 * hz;
        if f < min_hz || f > max_hz {
            continue;
        }
        let x = f / 1000.0;
        let y = 20.0 * f64::from(m).max(1e-10).log10();
        n += 1.0;
        sx += x;
        sy += y;
        sxx += x * x;
        sxy += x * y;
    }
    let denom = n * sxx - sx * sx;
    if n < 2.0 || denom.abs() <= f64::EPSILON {
        return 0.0;
    }
    (n * sxy - sx * sy) / denom
}

/// Spectral flux between consecutive frames.
///
/// Each spectrum is normalized to unit sum; flux is the L2 norm of the
/// positive bin differences. The first frame, and any frame after
/// [`reset`](Self::reset), reports `0.0`.
#[derive(Debug, Clone)]
pub struct SpectralFlux {
    previous: Vec<f64>,
    primed: bool,
}

impl SpectralFlux {
    /// Tracker for spectra of `bins` magnitudes.
    pub fn new(bins: usize) -> Self {
        Self {
            previous: vec![0.0; bins],
            primed: false,
        }
    }

    /// Forget the previous frame.
    pub fn reset(&mut self) {
        self.primed = false;
        self.previous.fill(0.0);
    }

    /// Flux of `magnitudes` against the previous call.
    pub fn update(&mut self, magnitudes: &[f32]) -> f64 {
        let total: f64 = magnitudes.iter().map(|&m| f64::from(m)).sum();
        let scale = if total > 0.0 { 1.0 / total } else { 0.0 };
        let mut sum = 0.0;
        for (prev, &m) in self.previous.iter_mut().zip(magnitudes) {
            let cur = f64::from(m) * scale;
            let rise = (cur - *prev).max(0.0);
            sum += rise * rise;
            *prev = cur;
        }
        let flux = if self.primed { sum.sqrt() } else { 0.0 };
        self.primed = true;
        flux
    }
}

/// Levels of the first [`HARMONIC_COUNT`] harmonics of `f0_hz` in dB.
///
/// Harmonic `h` reads the largest magnitude among the three bins around
/// `h * f0`. `scale` converts raw magnitudes to the reported level (for
/// instance `2 / sum(window)` for dBFS). Harmonics past Nyquist, or all of
/// them when `f0_hz` is not positive, report [`HARMONIC_FLOOR_DB`].
pub fn harmonics_db(
    magnitudes: &[f32],
    f0_hz: f64,
    sample_rate: f32,
    fft_size: usize,
    scale: f32,
    out: &mut [f32; HARMONIC_COUNT],
) {
    out.fill(HARMONIC_FLOOR_DB);
    if f0_hz <= 0.0 || magnitudes.is_empty() {
        return;
    }
    let hz = bin_hz(sample_rate, fft_size);
    let last = magnitudes.len() - 1;
    for (h, level) in out.iter_mut().enumerate() {
        let k = ((h + 1) as f64 * f0_hz / hz).round() as usize;
        if k > last {
            break;
        }
        let lo = k.saturating_sub(1);
        let hi = (k + 1).min(last);
        let peak = magnitudes[lo..=hi].iter().copied().fold(0.0_f32, f32::max);
        *level = crate::fft::to_db(peak * scale).max(HARMONIC_FLOOR_DB);
    }
}
