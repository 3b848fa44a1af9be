//! YIN fundamental frequency estimation.
//!
//! Difference function, cumulative mean normalized difference (CMND), an
//! absolute threshold, descent to the local minimum and parabolic
//! interpolation. Computed in `f64`.

/// Default CMND threshold.
pub const DEFAULT_YIN_THRESHOLD: f64 = 0.15;

/// One pitch estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    /// Fundamental frequency in Hz.
    pub frequency_hz: f64,
    /// `1 - cmnd(tau)` at the chosen lag, in `0..=1`.
    pub confidence: f64,
    /// Interpolated lag in samples.
    pub period_samples: f64,
}

/// YIN detector with scratch buffers sized for frames up to `max_frame`.
#[derive(Debug, Clone)]
pub struct YinDetector {
    diff: Vec<f64>,
    cmnd: Vec<f64>,
}

impl YinDetector {
    /// Detector for frames of at most `max_frame` samples.
    pub fn new(max_frame: usize) -> Self {
        Self {
            diff: vec![0.0; max_frame.max(2)],
            cmnd: vec![0.0; max_frame.max(2)],
        }
    }

    /// Estimate the pitch of `frame` between `fmin` and `fmax`.
    ///
    /// Returns `None` when no lag in range falls below `threshold`, when the
    /// frame is too short for the range, or when the frame is longer than
    /// this detector was sized for.
    pub fn detect(
        &mut self,
        frame: &[f32],
        sample_rate: f64,
        fmin: f64,
        fmax: f64,
        threshold: f64,
    ) -> Option<PitchEstimate> {
        let n = frame.len();
        if n < 3 || n > self.diff.len() || fmin <= 0.0 || fmax <= fmin {
            return None;
        }
        let tau_min = ((sample_rate / fmax) as usize).max(1);
        let tau_max = ((sample_rate / fmin) as usize).min(n - 1);
        if tau_min > tau_max {
            return None;
        }

        let d = &mut self.diff[..=tau_max];
        d[0] = 0.0;
        for tau in 1..=tau_max {
            let mut sum = 0.0;
            for i in 0..n - tau {
                let delta = f64::from(frame[i]) - f64::from(frame[i + tau]);
                sum += delta * delta;
            }
            d[tau] = sum;
        }

        let cmnd = &mut self.cmnd[..=tau_max];
        cmnd[0] = 1.0;
        let mut running_sum = 0.0;
        for tau in 1..=tau_max {
            running_sum += d[tau];
            cmnd[tau] = if running_sum > 0.0 {
                d[tau] * tau as f64 / running_sum
            } else {
                1.0
            };
        }

        let mut found = None;
        for t in tau_min..=tau_max {
            if cmnd[t] < threshold {
                let mut t = t;
                while t < tau_max && cmnd[t + 1] < cmnd[t] {
                    t += 1;
                }
                found = Some(t);
                break;
            }
        }
        let tau = found?;

        let mut period = tau as f64;
        if tau > 1 && tau < tau_max {
            let (s0, s1, s2) = (cmnd[tau - 1], cmnd[tau], cmnd[tau + 1]);
            let denom = 2.0 * (2.0 * s1 - s2 - s0);
            if denom != 0.0 {
                period += (s2 - s0) / denom;
            }
        }

        Some(PitchEstimate {
            frequency_hz: sample_rate / period,
            confidence: (1.0 - cmnd[tau]).clamp(0.0, 1.0),
            period_samples: period,
        })
    }
}

/// One-shot YIN over `frame`. Allocates scratch; use [`YinDetector`] per frame.
pub fn yin(frame: &[f32], sample_rate: f64, fmin: f64, fmax: f64, threshold: f64) -> Option<f64> {
    YinDetector::new(frame.len())
        .detect(frame, sample_rate, fmin, fmax, threshold)
        .map(|p| p.frequency_hz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(freq: f64, sr: f64, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / sr).sin() as f32)
            .collect()
    }

    #[test]
    fn test_pure_tones() {
        for f in [55.0, 100.0, 200.0, 300.0, 440.0, 950.0] {
            let frame = sine(f, 12000.0, 1024);
            let hz = yin(&frame, 12000.0, 50.0, 1000.0, DEFAULT_YIN_THRESHOLD).unwrap();
            assert!((hz - f).abs() / f < 0.01, "{f} Hz detected as {hz}");
        }
    }

    #[test]
    fn test_short_frame() {
        let frame = sine(100.0, 1000.0, 64);
        let hz = yin(&frame, 1000.0, 50.0, 200.0, DEFAULT_YIN_THRESHOLD).unwrap();
        assert!((hz - 100.0).abs() < 1.0, "got {hz}");
    }

    #[test]
    fn test_complex_tone_reports_fundamental() {
        let sr = 12000.0;
        let frame: Vec<f32> = (0..1024)
            .map(|i| {
                let t = i as f64 / sr;
                ((2.0 * PI * 200.0 * t).sin()
                    + 0.5 * (2.0 * PI * 400.0 * t).sin()
                    + 0.25 * (2.0 * PI * 600.0 * t).sin()) as f32
            })
            .collect();
        let hz = yin(&frame, sr, 50.0, 500.0, DEFAULT_YIN_THRESHOLD).unwrap();
        assert!((hz - 200.0).abs() < 2.0, "got {hz}");
    }

    #[test]
    fn test_non_bin_frequency() {
        let frame = sine(257.3, 12000.0, 1024);
        let hz = yin(&frame, 12000.0, 50.0, 500.0, DEFAULT_YIN_THRESHOLD).unwrap();
        assert!((hz - 257.3).abs() < 1.0, "got {hz}");
    }

    #[test]
    fn test_silence_and_noise_have_no_pitch() {
        assert!(yin(&[0.0; 1024], 12000.0, 50.0, 500.0, DEFAULT_YIN_THRESHOLD).is_none());
        let noise: Vec<f32> = crate::noise::gaussian(77, 1024)
            .into_iter()
            .map(|v| v as f32)
            .collect();
        assert!(yin(&noise, 12000.0, 50.0, 500.0, 0.05).is_none());
    }

    #[test]
    fn test_confidence_and_oversized_frame() {
        let mut detector = YinDetector::new(512);
        let frame = sine(200.0, 12000.0, 512);
        let estimate = detector
            .detect(&frame, 12000.0, 50.0, 500.0, DEFAULT_YIN_THRESHOLD)
            .unwrap();
        assert!(estimate.confidence > 0.9);
        assert!((estimate.period_samples - 60.0).abs() < 0.5);
        assert!(detector
            .detect(&sine(200.0, 12000.0, 1024), 12000.0, 50.0, 500.0, 0.15)
            .is_none());
    }
}
