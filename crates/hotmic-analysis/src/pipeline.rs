//! Frame-by-frame voice analysis.
//!
//! [`AnalysisPipeline`] buffers incoming samples, and every `hop_size`
//! samples (once a full FFT frame is available) computes a dB spectrum and
//! [`FrameFeatures`]. Pitch, HNR and formants run on a copy decimated to
//! roughly [`AnalysisSettings::lpc_sample_rate`]; spectral features, CPP and
//! harmonics use the full-rate spectrum. Everything is preallocated in
//! [`AnalysisPipeline::new`].

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::fft::{Fft, Window, to_db};
use crate::lpc::{Burg, Formant, RootFinder, formants_from_roots};
use crate::pitch::{DEFAULT_YIN_THRESHOLD, YinDetector};
use crate::signals::{AnalysisSignal, FrameFeatures};
use crate::spectral::{self, SpectralFlux};
use crate::speech::{SpeechRate, SpeechRateConfig};
use crate::voicing::{self, VoicingState, VoicingThresholds};

const PRE_EMPHASIS: f32 = 0.97;
const SLOPE_MIN_HZ: f64 = 50.0;

/// Analysis parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// FFT frame length (power of two).
    pub fft_size: usize,
    /// Samples between frames.
    pub hop_size: usize,
    /// Frames kept in the spectrogram and feature rings.
    pub ring_capacity: usize,
    /// Spectrum window.
    pub window: Window,
    /// Lowest pitch searched, Hz.
    pub pitch_min_hz: f32,
    /// Highest pitch searched, Hz.
    pub pitch_max_hz: f32,
    /// YIN CMND threshold.
    pub yin_threshold: f32,
    /// LPC model order.
    pub lpc_order: usize,
    /// Target rate for pitch and formant analysis, Hz.
    pub lpc_sample_rate: f32,
    /// Lowest formant reported, Hz.
    pub formant_min_hz: f32,
    /// Highest formant reported, Hz.
    pub formant_max_hz: f32,
    /// Upper edge of the spectral slope fit, Hz.
    pub slope_max_hz: f32,
    /// Frames quieter than this (dBFS) are silence.
    pub silence_threshold_db: f32,
    /// Minimum HNR (dB) for a voiced frame.
    pub voiced_hnr_db: f32,
    /// Speaking-rate window, seconds.
    pub speech_window_seconds: f32,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            hop_size: 512,
            ring_capacity: 256,
            window: Window::Hann,
            pitch_min_hz: 60.0,
            pitch_max_hz: 800.0,
            yin_threshold: DEFAULT_YIN_THRESHOLD as f32,
            lpc_order: 12,
            lpc_sample_rate: 12000.0,
            formant_min_hz: 90.0,
            formant_max_hz: 5500.0,
            slope_max_hz: 5000.0,
            silence_threshold_db: -50.0,
            voiced_hnr_db: 5.0,
            speech_window_seconds: 3.0,
        }
    }
}

impl AnalysisSettings {
    /// Check the settings against `sample_rate`.
    ///
    /// # Errors
    ///
    /// The first [`AnalysisError`] found.
    pub fn validate(&self, sample_rate: f32) -> Result<(), AnalysisError> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(AnalysisError::InvalidSampleRate(sample_rate));
        }
        if self.fft_size < 64 || !self.fft_size.is_power_of_two() {
            return Err(AnalysisError::InvalidFftSize(self.fft_size));
        }
        if self.hop_size == 0 || self.hop_size > self.fft_size {
            return Err(AnalysisError::InvalidHopSize {
                hop: self.hop_size,
                fft_size: self.fft_size,
            });
        }
        if !(self.pitch_min_hz > 0.0 && self.pitch_min_hz < self.pitch_max_hz) {
            return Err(AnalysisError::InvalidPitchRange {
                min: self.pitch_min_hz,
                max: self.pitch_max_hz,
            });
        }
        if self.ring_capacity < 2 {
            return Err(AnalysisError::InvalidRingCapacity(self.ring_capacity));
        }
        Ok(())
    }

    /// Decimation factor from `sample_rate` to the pitch/formant rate.
    pub fn decimation(&self, sample_rate: f32) -> usize {
        if self.lpc_sample_rate <= 0.0 {
            return 1;
        }
        ((sample_rate / self.lpc_sample_rate).floor() as usize).max(1)
    }

    /// Spectrum bins per frame.
    pub fn bins(&self) -> usize {
        self.fft_size / 2 + 1
    }
}

/// Windowed-sinc low-pass followed by integer downsampling.
#[derive(Debug, Clone)]
struct Decimator {
    factor: usize,
    taps: Vec<f32>,
}

impl Decimator {
    fn new(factor: usize) -> Self {
        if factor <= 1 {
            return Self {
                factor: 1,
                taps: vec![1.0],
            };
        }
        let half = 4 * factor;
        let len = 2 * half + 1;
        let cutoff = 0.45 / factor as f64;
        let mut taps: Vec<f64> = (0..len)
            .map(|i| {
                let n = i as f64 - half as f64;
                let sinc = if n == 0.0 {
                    2.0 * cutoff
                } else {
                    (2.0 * std::f64::consts::PI * cutoff * n).sin() / (std::f64::consts::PI * n)
                };
                let w = 0.54
                    - 0.46 * (2.0 * std::f64::consts::PI * i as f64 / (len - 1) as f64).cos();
                sinc * w
            })
            .collect();
        let sum: f64 = taps.iter().sum();
        for t in &mut taps {
            *t /= sum;
        }
        Self {
            factor,
            taps: taps.into_iter().map(|t| t as f32).collect(),
        }
    }

    /// Decimate `input` into `out`, returning the output length.
    fn process(&self, input: &[f32], out: &mut [f32]) -> usize {
        let n = (input.len() / self.factor).min(out.len());
        let half = (self.taps.len() / 2) as isize;
        for (j, o) in out[..n].iter_mut().enumerate() {
            let centre = (j * self.factor) as isize;
            let mut acc = 0.0;
            for (i, &t) in self.taps.iter().enumerate() {
                let idx = centre + i as isize - half;
                if idx >= 0 && (idx as usize) < input.len() {
                    acc += t * input[idx as usize];
                }
            }
            *o = acc;
        }
        n
    }
}

/// One analysed frame, borrowed from the pipeline for the callback.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisFrame<'a> {
    /// Frames analysed since the last reset, starting at 0.
    pub index: u64,
    /// Sample time just past the frame's last sample.
    pub sample_time: i64,
    /// Magnitude spectrum in dBFS, `fft_size / 2 + 1` bins.
    pub spectrum_db: &'a [f32],
    /// Scalar features and harmonics.
    pub features: FrameFeatures,
}

/// Streaming analysis with preallocated state.
#[derive(Debug)]
pub struct AnalysisPipeline {
    settings: AnalysisSettings,
    sample_rate: f32,
    history: Vec<f32>,
    filled: usize,
    since_hop: usize,
    sample_time: i64,
    frames: u64,

    fft: Fft,
    window: Vec<f32>,
    window_gain: f32,
    magnitudes: Vec<f32>,
    spectrum_db: Vec<f32>,
    cepstrum: Vec<f32>,

    decimator: Decimator,
    decimated: Vec<f32>,
    lpc_frame: Vec<f64>,
    lpc_window: Vec<f32>,
    yin: YinDetector,
    burg: Burg,
    roots: RootFinder,
    formants: Vec<Formant>,

    flux: SpectralFlux,
    speech: SpeechRate,
    thresholds: VoicingThresholds,
}

impl AnalysisPipeline {
    /// Pipeline for audio at `sample_rate`.
    ///
    /// # Errors
    ///
    /// Whatever [`AnalysisSettings::validate`] rejects.
    pub fn new(settings: AnalysisSettings, sample_rate: f32) -> Result<Self, AnalysisError> {
        settings.validate(sample_rate)?;
        let n = settings.fft_size;
        let window = settings.window.coefficients(n);
        let window_sum: f32 = window.iter().sum();
        let window_gain = if window_sum > 0.0 { 2.0 / window_sum } else { 1.0 };
        let factor = settings.decimation(sample_rate);
        let decimated_len = n / factor;
        let bins = settings.bins();

        Ok(Self {
            settings,
            sample_rate,
            history: vec![0.0; n],
            filled: 0,
            since_hop: 0,
            sample_time: 0,
            frames: 0,
            fft: Fft::new(n),
            window,
            window_gain,
            magnitudes: vec![0.0; bins],
            spectrum_db: vec![0.0; bins],
            cepstrum: vec![0.0; n / 2],
            decimator: Decimator::new(factor),
            decimated: vec![0.0; decimated_len],
            lpc_frame: vec![0.0; decimated_len],
            lpc_window: Window::Hamming.coefficients(decimated_len),
            yin: YinDetector::new(decimated_len),
            burg: Burg::new(decimated_len, settings.lpc_order),
            roots: RootFinder::new(settings.lpc_order),
            formants: Vec::with_capacity(settings.lpc_order),
            flux: SpectralFlux::new(bins),
            speech: SpeechRate::new(SpeechRateConfig {
                hop_seconds: settings.hop_size as f64 / f64::from(sample_rate),
                window_seconds: f64::from(settings.speech_window_seconds),
                ..SpeechRateConfig::default()
            }),
            thresholds: VoicingThresholds {
                silence_dbfs: f64::from(settings.silence_threshold_db),
                voiced_hnr_db: f64::from(settings.voiced_hnr_db),
            },
        })
    }

    /// Settings in use.
    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Input sample rate.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Spectrum bins per frame.
    pub fn bins(&self) -> usize {
        self.spectrum_db.len()
    }

    /// Frames analysed since the last reset.
    pub fn frames_analyzed(&self) -> u64 {
        self.frames
    }

    /// Drop buffered audio and per-stream history.
    pub fn reset(&mut self) {
        self.history.fill(0.0);
        self.filled = 0;
        self.since_hop = 0;
        self.frames = 0;
        self.flux.reset();
        self.speech.reset();
    }

    /// Align the running sample time with the next pushed sample.
    pub fn set_sample_time(&mut self, sample_time: i64) {
        self.sample_time = sample_time;
    }

    /// Feed samples, calling `on_frame` for every frame they complete.
    pub fn push(&mut self, samples: &[f32], mut on_frame: impl FnMut(&AnalysisFrame<'_>)) {
        let size = self.history.len();
        let hop = self.settings.hop_size;
        let mut rest = samples;
        while !rest.is_empty() {
            let take = rest.len().min(hop - self.since_hop);
            let (chunk, tail) = rest.split_at(take);
            self.history.copy_within(take.., 0);
            self.history[size - take..].copy_from_slice(chunk);
            self.filled = (self.filled + take).min(size);
            self.since_hop += take;
            self.sample_time += take as i64;
            rest = tail;

            if self.since_hop == hop {
                self.since_hop = 0;
                if self.filled == size {
                    let features = self.analyze();
                    on_frame(&AnalysisFrame {
                        index: self.frames,
                        sample_time: self.sample_time,
                        spectrum_db: &self.spectrum_db,
                        features,
                    });
                    self.frames += 1;
                }
            }
        }
    }

    fn analyze(&mut self) -> FrameFeatures {
        let s = self.settings;
        let sr = self.sample_rate;
        let mut features = FrameFeatures::default();

        let energy: f64 = self.history.iter().map(|&x| f64::from(x) * f64::from(x)).sum();
        let rms = (energy / self.history.len() as f64).sqrt();
        let rms_db = 20.0 * rms.max(1e-10).log10();

        self.fft
            .magnitudes(&self.history, &self.window, &mut self.magnitudes);
        for (db, &m) in self.spectrum_db.iter_mut().zip(&self.magnitudes) {
            *db = to_db(m * self.window_gain);
        }

        let m = self.decimator.process(&self.history, &mut self.decimated);
        let dec_sr = f64::from(sr) / self.decimator.factor as f64;
        let decimated = &self.decimated[..m];
        let (pmin, pmax) = (f64::from(s.pitch_min_hz), f64::from(s.pitch_max_hz));

        let pitch = self
            .yin
            .detect(decimated, dec_sr, pmin, pmax, f64::from(s.yin_threshold));
        let hnr = match pitch {
            Some(p) => voicing::hnr_at_period(decimated, p.period_samples),
            None => voicing::hnr_db(
                decimated,
                (dec_sr / pmax).floor() as usize,
                (dec_sr / pmin).ceil() as usize,
            ),
        };

        self.fft.real_cepstrum(&self.magnitudes, &mut self.cepstrum);
        let cpp = voicing::cepstral_peak_prominence(
            &self.cepstrum,
            (f64::from(sr) / pmax).floor() as usize,
            (f64::from(sr) / pmin).ceil() as usize,
        );

        let state = voicing::classify(rms_db, pitch.is_some(), hnr, &self.thresholds);
        let voiced = state == VoicingState::Voiced;

        if let Some(p) = pitch.filter(|_| voiced) {
            features.set(AnalysisSignal::Pitch, p.frequency_hz as f32);
            features.set(AnalysisSignal::PitchConfidence, p.confidence as f32);
            spectral::harmonics_db(
                &self.magnitudes,
                p.frequency_hz,
                sr,
                s.fft_size,
                self.window_gain,
                &mut features.harmonics_db,
            );
        }

        self.formants.clear();
        if state != VoicingState::Silence {
            let mut prev = 0.0;
            for ((out, &x), &w) in self.lpc_frame.iter_mut().zip(decimated).zip(&self.lpc_window) {
                *out = f64::from((x - PRE_EMPHASIS * prev) * w);
                prev = x;
            }
            let coeffs = self.burg.fit(&self.lpc_frame[..m], s.lpc_order);
            formants_from_roots(
                self.roots.roots(coeffs),
                dec_sr,
                f64::from(s.formant_min_hz),
                f64::from(s.formant_max_hz),
                &mut self.formants,
            );
        }
        for (signal, formant) in [
            AnalysisSignal::Formant1,
            AnalysisSignal::Formant2,
            AnalysisSignal::Formant3,
        ]
        .into_iter()
        .zip(&self.formants)
        {
            features.set(signal, formant.frequency_hz as f32);
        }

        let nyquist = f64::from(sr) * 0.5;
        features.set(AnalysisSignal::Hnr, hnr as f32);
        features.set(AnalysisSignal::Cpp, cpp as f32);
        features.set(
            AnalysisSignal::SpectralCentroid,
            spectral::centroid(&self.magnitudes, sr, s.fft_size) as f32,
        );
        features.set(
            AnalysisSignal::SpectralSlope,
            spectral::slope_db_per_khz(
                &self.magnitudes,
                sr,
                s.fft_size,
                SLOPE_MIN_HZ,
                f64::from(s.slope_max_hz).min(nyquist),
            ) as f32,
        );
        features.set(AnalysisSignal::SpectralFlux, self.flux.update(&self.magnitudes) as f32);
        features.set(AnalysisSignal::SpeakingRate, self.speech.update(rms, voiced) as f32);
        features.set(AnalysisSignal::Voicing, state.code());
        features.set(AnalysisSignal::RmsDb, rms_db as f32);
        features
    }
}
