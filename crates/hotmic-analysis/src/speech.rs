//! Speaking rate from the loudness envelope.
//!
//! Syllable nuclei show up as peaks of the smoothed RMS envelope while the
//! voice is voiced. Peaks need a minimum rise above the preceding valley and
//! a minimum spacing; the rate is the number of peaks in a rolling window
//! divided by the window length.

use std::collections::VecDeque;

/// Speaking-rate tracker settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeechRateConfig {
    /// Seconds between envelope updates (the analysis hop).
    pub hop_seconds: f64,
    /// Rolling window length in seconds.
    pub window_seconds: f64,
    /// Envelope smoothing time constant in seconds.
    pub smoothing_seconds: f64,
    /// Minimum peak-to-valley rise in dB.
    pub min_rise_db: f64,
    /// Minimum seconds between syllable nuclei.
    pub min_spacing_seconds: f64,
}

impl Default for SpeechRateConfig {
    fn default() -> Self {
        Self {
            hop_seconds: 512.0 / 48000.0,
            window_seconds: 3.0,
            smoothing_seconds: 0.02,
            min_rise_db: 3.0,
            min_spacing_seconds: 0.1,
        }
    }
}

/// Rolling syllables-per-second estimate.
#[derive(Debug, Clone)]
pub struct SpeechRate {
    config: SpeechRateConfig,
    alpha: f64,
    envelope: f64,
    previous: f64,
    rising: bool,
    previous_voiced: bool,
    valley: f64,
    elapsed: f64,
    last_peak: f64,
    peaks: VecDeque<f64>,
}

impl SpeechRate {
    /// Tracker with preallocated peak storage.
    pub fn new(config: SpeechRateConfig) -> Self {
        let hop = config.hop_seconds.max(1e-6);
        let alpha = if config.smoothing_seconds > 0.0 {
            1.0 - (-hop / config.smoothing_seconds).exp()
        } else {
            1.0
        };
        let capacity = (config.window_seconds / config.min_spacing_seconds.max(hop)).ceil() as usize + 1;
        Self {
            config,
            alpha,
            envelope: 0.0,
            previous: 0.0,
            rising: false,
            previous_voiced: false,
            valley: 0.0,
            elapsed: 0.0,
            last_peak: f64::NEG_INFINITY,
            peaks: VecDeque::with_capacity(capacity),
        }
    }

    /// Clear history.
    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    /// Feed one frame's RMS (linear) and voicing; returns syllables per second.
    pub fn update(&mut self, rms: f64, voiced: bool) -> f64 {
        let hop = self.config.hop_seconds;
        self.elapsed += hop;
        self.envelope += self.alpha * (rms.max(0.0) - self.envelope);
        let env = self.envelope;

        if env > self.previous {
            self.rising = true;
        } else if self.rising && env < self.previous {
            // `previous` was a local maximum one hop ago.
            let peak_time = self.elapsed - hop;
            let rise_db = 20.0 * (self.previous.max(1e-12) / self.valley.max(1e-12)).log10();
            if self.previous_voiced
                && rise_db >= self.config.min_rise_db
                && peak_time - self.last_peak >= self.config.min_spacing_seconds
            {
                if self.peaks.len() == self.peaks.capacity() {
                    self.peaks.pop_front();
                }
                self.peaks.push_back(peak_time);
                self.last_peak = peak_time;
                self.valley = env;
            }
            self.rising = false;
        }
        if !self.rising {
            self.valley = self.valley.min(env);
        }
        self.previous = env;
        self.previous_voiced = voiced;

        let horizon = self.elapsed - self.config.window_seconds;
        while self.peaks.front().is_some_and(|&t| t < horizon) {
            self.peaks.pop_front();
        }
        self.rate()
    }

    /// Current estimate without feeding a frame.
    pub fn rate(&self) -> f64 {
        let span = self.elapsed.min(self.config.window_seconds);
        if span <= 0.0 {
            return 0.0;
        }
        self.peaks.len() as f64 / span
    }
}
