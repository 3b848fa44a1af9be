//! Reproducible Gaussian noise for test signals.
//!
//! A 32-bit LCG feeds a Box–Muller transform, so the same seed gives the same
//! sequence on every platform.

/// 32-bit linear congruential generator producing uniforms in `(0, 1]`.
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u32,
}

impl Lcg {
    /// Generator seeded with the low 32 bits of `seed`.
    pub fn new(seed: u64) -> Self {
        Self { state: seed as u32 }
    }

    /// Next uniform value in `(0, 1]`.
    pub fn next_uniform(&mut self) -> f64 {
        self.state = self.state.wrapping_mul(1664525).wrapping_add(1013904223);
        (f64::from(self.state) + 1.0) / 4_294_967_296.0
    }

    /// Next standard normal value.
    pub fn next_gaussian(&mut self) -> f64 {
        let u1 = self.next_uniform();
        let u2 = self.next_uniform();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).sin()
    }
}

/// `n` standard normal samples from `seed`.
pub fn gaussian(seed: u64, n: usize) -> Vec<f64> {
    let mut lcg = Lcg::new(seed);
    (0..n).map(|_| lcg.next_gaussian()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lcg_sequence() {
        let mut lcg = Lcg::new(0);
        assert_eq!(lcg.next_uniform(), (1013904223.0 + 1.0) / 4_294_967_296.0);
        let mut a = Lcg::new(42);
        let mut b = Lcg::new(42 + (1 << 32));
        for _ in 0..16 {
            assert_eq!(a.next_uniform(), b.next_uniform());
        }
    }

    #[test]
    fn test_gaussian_moments() {
        let samples = gaussian(1234, 20000);
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let var = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / samples.len() as f64;
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((var - 1.0).abs() < 0.05, "variance {var}");
    }
}
