//! Linear prediction and formant extraction.
//!
//! [`burg`] fits an all-pole model `A(z) = 1 + a1 z^-1 + ... + ap z^-p`.
//! Formants are the complex roots of `A` inside the unit circle: root angle
//! gives the frequency and root radius the bandwidth. Roots are found with
//! Durand–Kerner iteration on the monic polynomial.

use rustfft::num_complex::Complex;

/// Roots with `|r|` at or below this are too damped to be formants.
const MIN_ROOT_RADIUS: f64 = 0.80;
/// Roots at or above this are treated as pure tones, not resonances.
const MAX_ROOT_RADIUS: f64 = 0.9995;
/// Widest accepted formant bandwidth in Hz.
const MAX_BANDWIDTH_HZ: f64 = 3500.0;
/// Real roots (and conjugates below the axis) are skipped.
const MIN_ROOT_IMAG: f64 = 0.001;

const ROOT_ITERATIONS: usize = 500;
const ROOT_TOLERANCE: f64 = 1e-12;

/// One resonance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Formant {
    /// Centre frequency in Hz.
    pub frequency_hz: f64,
    /// -3 dB bandwidth in Hz.
    pub bandwidth_hz: f64,
}

/// Burg's method with preallocated error buffers.
#[derive(Debug, Clone)]
pub struct Burg {
    forward: Vec<f64>,
    backward: Vec<f64>,
    coeffs: Vec<f64>,
    previous: Vec<f64>,
}

impl Burg {
    /// Buffers for signals up to `max_len` samples and models up to `order`.
    pub fn new(max_len: usize, order: usize) -> Self {
        Self {
            forward: vec![0.0; max_len],
            backward: vec![0.0; max_len],
            coeffs: vec![0.0; order + 1],
            previous: vec![0.0; order + 1],
        }
    }

    /// Fit an order-`order` model to `signal`.
    ///
    /// Returns `order + 1` coefficients with `a[0] = 1`. Stops early, leaving
    /// the remaining coefficients at zero, once the error energy vanishes.
    /// A signal longer than the buffers is truncated; a larger order than the
    /// buffers were built for is clamped.
    pub fn fit<T: Copy + Into<f64>>(&mut self, signal: &[T], order: usize) -> &[f64] {
        let n = signal.len().min(self.forward.len());
        let order = order.min(self.coeffs.len() - 1);
        let a = &mut self.coeffs[..=order];
        a.fill(0.0);
        a[0] = 1.0;

        let ef = &mut self.forward[..n];
        let eb = &mut self.backward[..n];
        for (i, &x) in signal[..n].iter().enumerate() {
            ef[i] = x.into();
            eb[i] = x.into();
        }

        for m in 1..=order.min(n.saturating_sub(1)) {
            let mut num = 0.0;
            let mut den = 0.0;
            for i in m..n {
                num += ef[i] * eb[i - 1];
                den += ef[i] * ef[i] + eb[i - 1] * eb[i - 1];
            }
            if den <= 1e-12 {
                break;
            }
            let k = -2.0 * num / den;

            let prev = &mut self.previous[..=order];
            prev.copy_from_slice(a);
            a[m] = k;
            for i in 1..m {
                a[i] = prev[i] + k * prev[m - i];
            }

            for i in m..n {
                let f = ef[i];
                let b = eb[i - 1];
                ef[i] = f + k * b;
                eb[i - 1] = b + k * f;
            }
        }
        &self.coeffs[..=order]
    }
}

/// Burg LPC coefficients of `signal` (`order + 1` values, `a[0] = 1`).
pub fn burg(signal: &[f64], order: usize) -> Vec<f64> {
    Burg::new(signal.len(), order).fit(signal, order).to_vec()
}

/// Polynomial root finder with preallocated storage.
#[derive(Debug, Clone)]
pub struct RootFinder {
    roots: Vec<Complex<f64>>,
}

impl RootFinder {
    /// Storage for polynomials up to `degree`.
    pub fn new(degree: usize) -> Self {
        Self {
            roots: Vec::with_capacity(degree),
        }
    }

    /// Roots of `coeffs[0] z^n + coeffs[1] z^(n-1) + ... + coeffs[n]`.
    ///
    /// Trailing zero coefficients (roots at the origin) are dropped, and the
    /// polynomial is made monic before iterating.
    pub fn roots(&mut self, coeffs: &[f64]) -> &[Complex<f64>] {
        self.roots.clear();
        let end = coeffs
            .iter()
            .rposition(|&c| c != 0.0)
            .map_or(0, |i| i + 1);
        let coeffs = &coeffs[..end];
        let Some(&lead) = coeffs.first() else {
            return &self.roots;
        };
        let degree = coeffs.len() - 1;
        if degree == 0 {
            return &self.roots;
        }

        let seed = Complex::new(0.4, 0.9);
        let mut z = Complex::new(1.0, 0.0);
        for _ in 0..degree {
            self.roots.push(z);
            z *= seed;
        }

        let eval = |x: Complex<f64>| {
            coeffs
                .iter()
                .fold(Complex::new(0.0, 0.0), |acc, &c| acc * x + c / lead)
        };

        for _ in 0..ROOT_ITERATIONS {
            let mut largest_step: f64 = 0.0;
            for k in 0..degree {
                let zk = self.roots[k];
                let mut denom = Complex::new(1.0, 0.0);
                for (j, &zj) in self.roots.iter().enumerate() {
                    if j != k {
                        denom *= zk - zj;
                    }
                }
                if denom.norm() == 0.0 {
                    denom = Complex::new(1e-12, 0.0);
                }
                let step = eval(zk) / denom;
                self.roots[k] = zk - step;
                largest_step = largest_step.max(step.norm());
            }
            if largest_step < ROOT_TOLERANCE {
                break;
            }
        }
        &self.roots
    }
}

/// Formants from LPC coefficients, sorted by frequency.
///
/// Keeps roots above the real axis with `0.80 < |r| < 0.9995`, frequency in
/// `max(min_hz, 0) ..= min(max_hz, 0.9 * nyquist)` and bandwidth in
/// `(0, 3500]` Hz.
pub fn extract_formants(coeffs: &[f64], sample_rate: f64, min_hz: f64, max_hz: f64) -> Vec<Formant> {
    let mut finder = RootFinder::new(coeffs.len());
    let mut out = Vec::new();
    formants_from_roots(finder.roots(coeffs), sample_rate, min_hz, max_hz, &mut out);
    out
}

/// Append the formants among `roots` to `out` and sort `out` by frequency.
pub fn formants_from_roots(
    roots: &[Complex<f64>],
    sample_rate: f64,
    min_hz: f64,
    max_hz: f64,
    out: &mut Vec<Formant>,
) {
    let nyquist = sample_rate * 0.5;
    let lo = min_hz.max(0.0);
    let hi = max_hz.min(nyquist * 0.9);
    for r in roots {
        if r.im <= MIN_ROOT_IMAG {
            continue;
        }
        let radius = r.norm();
        if radius <= MIN_ROOT_RADIUS || radius >= MAX_ROOT_RADIUS {
            continue;
        }
        let frequency_hz = r.im.atan2(r.re) * sample_rate / (2.0 * std::f64::consts::PI);
        let bandwidth_hz = -sample_rate / std::f64::consts::PI * radius.ln();
        if frequency_hz < lo || frequency_hz > hi {
            continue;
        }
        if bandwidth_hz <= 0.0 || bandwidth_hz > MAX_BANDWIDTH_HZ {
            continue;
        }
        out.push(Formant {
            frequency_hz,
            bandwidth_hz,
        });
    }
    out.sort_unstable_by(|a, b| a.frequency_hz.total_cmp(&b.frequency_hz));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn resonance(freq: f64, bw: f64, sr: f64) -> [f64; 3] {
        let theta = 2.0 * PI * freq / sr;
        let r = (-PI * bw / sr).exp();
        [1.0, -2.0 * r * theta.cos(), r * r]
    }

    fn convolve(a: &[f64], b: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; a.len() + b.len() - 1];
        for (i, &x) in a.iter().enumerate() {
            for (j, &y) in b.iter().enumerate() {
                out[i + j] += x * y;
            }
        }
        out
    }

    fn tones(parts: &[(f64, f64)], sr: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                parts
                    .iter()
                    .map(|&(f, a)| a * (2.0 * PI * f * i as f64 / sr).sin())
                    .sum()
            })
            .collect()
    }

    fn assert_close(got: &[f64], want: &[f64], tol: f64) {
        assert_eq!(got.len(), want.len());
        for (i, (g, w)) in got.iter().zip(want).enumerate() {
            assert!((g - w).abs() < tol, "coefficient {i}: {g} vs {w}");
        }
    }

    // --- burg ---

    #[test]
    fn test_burg_sine() {
        let x = tones(&[(100.0, 1.0)], 1000.0, 256);
        assert_close(
            &burg(&x, 4),
            &[1.0, -2.768173011, 3.597801205, -2.518262140, 0.808867161],
            1e-6,
        );
    }

    #[test]
    fn test_burg_two_tones() {
        let x = tones(&[(250.0, 1.0), (500.0, 0.4)], 8000.0, 256);
        assert_close(
            &burg(&x, 6),
            &[
                1.0,
                -5.708144309,
                13.828352617,
                -18.192215379,
                13.705722345,
                -5.606819103,
                0.973251688,
            ],
            1e-6,
        );
    }

    #[test]
    fn test_burg_silence_stops_early() {
        assert_eq!(burg(&[0.0; 64], 4), vec![1.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_burg_reuses_buffers_for_f32() {
        let mut lpc = Burg::new(256, 8);
        let x: Vec<f32> = tones(&[(100.0, 1.0)], 1000.0, 256)
            .into_iter()
            .map(|v| v as f32)
            .collect();
        let widened: Vec<f64> = x.iter().map(|&v| f64::from(v)).collect();
        assert_eq!(lpc.fit(&x, 4), burg(&widened, 4).as_slice());
        assert_eq!(lpc.fit(&x, 12).len(), 9, "order clamps to the buffer");
    }

    // --- formants ---

    #[test]
    fn test_single_resonance() {
        let formants = extract_formants(&resonance(500.0, 80.0, 16000.0), 16000.0, 0.0, 8000.0);
        assert_eq!(formants.len(), 1);
        assert!((formants[0].frequency_hz - 500.0).abs() < 1e-6);
        assert!((formants[0].bandwidth_hz - 80.0).abs() < 1e-6);
    }

    #[test]
    fn test_two_resonances_sorted() {
        let coeffs = convolve(&resonance(2000.0, 300.0, 16000.0), &resonance(500.0, 100.0, 16000.0));
        let formants = extract_formants(&coeffs, 16000.0, 0.0, 8000.0);
        assert_eq!(formants.len(), 2);
        assert!((formants[0].frequency_hz - 500.0).abs() < 1e-3);
        assert!((formants[0].bandwidth_hz - 100.0).abs() < 1e-3);
        assert!((formants[1].frequency_hz - 2000.0).abs() < 1e-3);
        assert!((formants[1].bandwidth_hz - 300.0).abs() < 1e-3);
    }

    #[test]
    fn test_narrow_resonance_kept_and_range_applied() {
        let coeffs = resonance(2500.0, 5.0, 12000.0);
        assert_eq!(extract_formants(&coeffs, 12000.0, 0.0, 6000.0).len(), 1);
        assert!(extract_formants(&coeffs, 12000.0, 0.0, 2000.0).is_empty());
        assert!(extract_formants(&coeffs, 12000.0, 3000.0, 6000.0).is_empty());
    }

    #[test]
    fn test_burg_formants_from_tones() {
        let sr = 12000.0;
        let x = tones(&[(700.0, 1.0), (1200.0, 0.7), (2500.0, 0.4)], sr, 512);
        let formants = extract_formants(&burg(&x, 12), sr, 100.0, 5500.0);
        let want = [
            (258.693312479, 102.600528134),
            (764.274701818, 92.453221791),
            (1236.419137924, 75.106221126),
            (1648.867482993, 51.161601481),
            (1975.809372201, 26.205987390),
            (2186.399530061, 7.291594045),
        ];
        assert_eq!(formants.len(), want.len());
        for (f, (hz, bw)) in formants.iter().zip(want) {
            assert!((f.frequency_hz - hz).abs() < 0.01, "{} vs {hz}", f.frequency_hz);
            assert!((f.bandwidth_hz - bw).abs() < 0.01, "{} vs {bw}", f.bandwidth_hz);
        }
    }

    #[test]
    fn test_burg_formants_with_noise() {
        let sr = 12000.0;
        let noise = crate::noise::gaussian(9012, 512);
        let x: Vec<f64> = tones(&[(700.0, 1.0), (1200.0, 0.7), (2500.0, 0.4)], sr, 512)
            .iter()
            .zip(&noise)
            .map(|(s, n)| s + 0.1 * n)
            .collect();
        let formants = extract_formants(&burg(&x, 12), sr, 100.0, 5500.0);
        let want_hz = [265.046, 782.896, 1267.059, 1691.283, 2027.693, 2245.750];
        assert_eq!(formants.len(), want_hz.len());
        for (f, hz) in formants.iter().zip(want_hz) {
            assert!((f.frequency_hz - hz).abs() < 0.05, "{} vs {hz}", f.frequency_hz);
        }
    }

    #[test]
    fn test_roots_of_quadratic() {
        let mut finder = RootFinder::new(4);
        // (z - 2)(z + 3) scaled by 2, with a trailing zero root.
        let mut roots: Vec<f64> = finder
            .roots(&[2.0, 2.0, -12.0, 0.0])
            .iter()
            .map(|r| r.re)
            .collect();
        roots.sort_by(f64::total_cmp);
        assert_close(&roots, &[-3.0, 2.0], 1e-9);
        assert!(finder.roots(&[0.0, 0.0]).is_empty());
    }
}
