//! Spectral transforms shared by the analysis stages.

use rustfft::{FftPlanner, num_complex::Complex};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::sync::Arc;

/// Analysis window shape.
///
/// All shapes are periodic: a window of length `n` repeats with period `n`,
/// so `weight(0, n)` of a Hann window is exactly zero and the peak sits at
/// `n / 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    /// Unweighted.
    Rectangular,
    /// Raised cosine.
    #[default]
    Hann,
    /// Raised cosine on a 0.08 pedestal.
    Hamming,
    /// Three-term cosine sum.
    Blackman,
}

impl Window {
    /// Weight of sample `i` in a window of length `n`.
    pub fn weight(self, i: usize, n: usize) -> f32 {
        let phase = 2.0 * PI * i as f32 / n.max(1) as f32;
        match self {
            Window::Rectangular => 1.0,
            Window::Hann => 0.5 - 0.5 * phase.cos(),
            Window::Hamming => 0.54 - 0.46 * phase.cos(),
            Window::Blackman => 0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos(),
        }
    }

    /// Table of `len` weights, computed once and reused per frame.
    pub fn coefficients(self, len: usize) -> Vec<f32> {
        (0..len).map(|i| self.weight(i, len)).collect()
    }
}

/// Real-input transform of a fixed size.
///
/// Plans and work buffers are allocated in [`Fft::new`]; the per-frame
/// calls only touch them.
pub struct Fft {
    forward: Arc<dyn rustfft::Fft<f32>>,
    inverse: Arc<dyn rustfft::Fft<f32>>,
    work: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl std::fmt::Debug for Fft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fft").field("size", &self.size()).finish()
    }
}

impl Fft {
    /// Plans forward and inverse transforms of `size` points.
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let scratch = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        Self {
            forward,
            inverse,
            work: vec![Complex::default(); size],
            scratch: vec![Complex::default(); scratch],
        }
    }

    /// Transform length.
    pub fn size(&self) -> usize {
        self.work.len()
    }

    /// Bins from DC to Nyquist inclusive.
    pub fn bins(&self) -> usize {
        self.size() / 2 + 1
    }

    /// Magnitude spectrum of `input` weighted by `window`.
    ///
    /// Samples past the end of `input` count as zero and weights past the end
    /// of `window` as one. Writes at most [`bins`](Self::bins) values.
    pub fn magnitudes(&mut self, input: &[f32], window: &[f32], out: &mut [f32]) {
        let weights = window.iter().copied().chain(std::iter::repeat(1.0));
        let samples = input.iter().copied().chain(std::iter::repeat(0.0));
        for ((slot, x), w) in self.work.iter_mut().zip(samples).zip(weights) {
            *slot = Complex::new(x * w, 0.0);
        }
        self.forward
            .process_with_scratch(&mut self.work, &mut self.scratch);

        let bins = self.bins();
        for (o, c) in out.iter_mut().zip(&self.work[..bins]) {
            *o = c.norm();
        }
    }

    /// Real cepstrum of a half spectrum of magnitudes.
    ///
    /// `out[q]` is `|c[q]|` where `c` is the inverse transform of the natural
    /// log spectrum, floored at `1e-10` before the log.
    pub fn real_cepstrum(&mut self, magnitudes: &[f32], out: &mut [f32]) {
        let size = self.size();
        let bins = self.bins();
        for (k, slot) in self.work.iter_mut().enumerate() {
            let source = if k < bins { k } else { size - k };
            let mag = magnitudes.get(source).copied().unwrap_or(0.0);
            *slot = Complex::new(mag.max(1e-10).ln(), 0.0);
        }
        self.inverse
            .process_with_scratch(&mut self.work, &mut self.scratch);

        let norm = (size as f32).recip();
        for (o, c) in out.iter_mut().zip(&self.work) {
            *o = c.re.abs() * norm;
        }
    }
}

/// Magnitude in dB, floored at -200 dB.
#[inline]
pub fn to_db(magnitude: f32) -> f32 {
    20.0 * magnitude.max(1e-10).log10()
}

/// Centre frequency of bin `k` in Hz.
#[inline]
pub fn bin_frequency(k: usize, sample_rate: f32, fft_size: usize) -> f32 {
    k as f32 * sample_rate / fft_size as f32
}
