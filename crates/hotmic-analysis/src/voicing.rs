//! Harmonicity, cepstral peak prominence and voicing decisions.

use serde::{Deserialize, Serialize};

/// Normalized autocorrelation is clamped to `[R_FLOOR, 1 - R_FLOOR]` before
/// conversion so HNR stays finite.
const R_FLOOR: f64 = 1e-6;

/// Coarse phonation state of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoicingState {
    /// Below the silence threshold.
    #[default]
    Silence,
    /// Energy without periodicity.
    Unvoiced,
    /// Periodic energy.
    Voiced,
}

impl VoicingState {
    /// Numeric code published through the signal store (0, 1, 2).
    pub fn code(self) -> f32 {
        match self {
            Self::Silence => 0.0,
            Self::Unvoiced => 1.0,
            Self::Voiced => 2.0,
        }
    }

    /// Inverse of [`code`](Self::code); anything unexpected is silence.
    pub fn from_code(code: f32) -> Self {
        if code >= 1.5 {
            Self::Voiced
        } else if code >= 0.5 {
            Self::Unvoiced
        } else {
            Self::Silence
        }
    }
}

/// Thresholds for [`classify`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoicingThresholds {
    /// Frames quieter than this RMS level (dBFS) are silence.
    pub silence_dbfs: f64,
    /// Minimum HNR (dB) for a pitched frame to count as voiced.
    pub voiced_hnr_db: f64,
}

impl Default for VoicingThresholds {
    fn default() -> Self {
        Self {
            silence_dbfs: -50.0,
            voiced_hnr_db: 5.0,
        }
    }
}

/// Normalized autocorrelation of `frame` at `lag`, in `-1..=1`.
pub fn normalized_autocorrelation(frame: &[f32], lag: usize) -> f64 {
    if lag == 0 || lag >= frame.len() {
        return 0.0;
    }
    let (mut xy, mut xx, mut yy) = (0.0, 0.0, 0.0);
    for i in 0..frame.len() - lag {
        let x = f64::from(frame[i]);
        let y = f64::from(frame[i + lag]);
        xy += x * y;
        xx += x * x;
        yy += y * y;
    }
    let den = (xx * yy).sqrt();
    if den <= 0.0 { 0.0 } else { xy / den }
}

/// Harmonics-to-noise ratio in dB from the autocorrelation peak over
/// `min_lag..=max_lag`: `10 log10(r / (1 - r))`.
pub fn hnr_db(frame: &[f32], min_lag: usize, max_lag: usize) -> f64 {
    let max_lag = max_lag.min(frame.len().saturating_sub(1));
    let r = (min_lag.max(1)..=max_lag)
        .map(|lag| normalized_autocorrelation(frame, lag))
        .fold(f64::NEG_INFINITY, f64::max);
    let r = if r.is_finite() { r } else { 0.0 };
    let r = r.clamp(R_FLOOR, 1.0 - R_FLOOR);
    10.0 * (r / (1.0 - r)).log10()
}

/// HNR around a known pitch period: the best lag within one sample of it.
pub fn hnr_at_period(frame: &[f32], period_samples: f64) -> f64 {
    let lag = period_samples.round().max(1.0) as usize;
    hnr_db(frame, lag.saturating_sub(1), lag + 1)
}

/// Cepstral peak prominence in dB.
///
/// `cepstrum[q]` is the real cepstrum magnitude at quefrency `q` samples.
/// The peak is searched over `min_q..=max_q` and measured against a least
/// squares line fitted to the cepstrum (in dB) over the same range. Returns
/// `0.0` when the range holds fewer than two points.
pub fn cepstral_peak_prominence(cepstrum: &[f32], min_q: usize, max_q: usize) -> f64 {
    let max_q = max_q.min(cepstrum.len().saturating_sub(1));
    let min_q = min_q.max(1);
    if max_q <= min_q {
        return 0.0;
    }
    let db = |q: usize| 20.0 * f64::from(cepstrum[q]).max(1e-12).log10();

    let n = (max_q - min_q + 1) as f64;
    let (mut sx, mut sy, mut sxx, mut sxy) = (0.0, 0.0, 0.0, 0.0);
    let mut peak_q = min_q;
    let mut peak_db = f64::NEG_INFINITY;
    for q in min_q..=max_q {
        let x = q as f64;
        let y = db(q);
        sx += x;
        sy += y;
        sxx += x * x;
        sxy += x * y;
        if y > peak_db {
            peak_db = y;
            peak_q = q;
        }
    }
    let denom = n * sxx - sx * sx;
    let slope = if denom.abs() > 0.0 {
        (n * sxy - sx * sy) / denom
    } else {
        0.0
    };
    let intercept = (sy - slope * sx) / n;
    peak_db - (slope * peak_q as f64 + intercept)
}

/// Silence below the RMS threshold, voiced when pitched with enough HNR,
/// unvoiced otherwise.
pub fn classify(
    rms_dbfs: f64,
    pitched: bool,
    hnr_db: f64,
    thresholds: &VoicingThresholds,
) -> VoicingState {
    if rms_dbfs < thresholds.silence_dbfs {
        VoicingState::Silence
    } else if pitched && hnr_db >= thresholds.voiced_hnr_db {
        VoicingState::Voiced
    } else {
        VoicingState::Unvoiced
    }
}
