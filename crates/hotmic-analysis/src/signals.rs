//! Latest analysis values, readable from any thread.

use std::sync::atomic::{AtomicU64, Ordering};

use hotmic_core::AtomicF32;
use serde::{Deserialize, Serialize};

use crate::spectral::{HARMONIC_COUNT, HARMONIC_FLOOR_DB};
use crate::voicing::VoicingState;

/// A scalar published once per analysis frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSignal {
    /// Fundamental frequency in Hz, `0` when unpitched.
    Pitch,
    /// YIN confidence in `0..=1`.
    PitchConfidence,
    /// First formant in Hz, `0` when not found.
    Formant1,
    /// Second formant in Hz.
    Formant2,
    /// Third formant in Hz.
    Formant3,
    /// Harmonics-to-noise ratio in dB.
    Hnr,
    /// Cepstral peak prominence in dB.
    Cpp,
    /// Spectral centroid in Hz.
    SpectralCentroid,
    /// Spectral slope in dB per kHz.
    SpectralSlope,
    /// Spectral flux.
    SpectralFlux,
    /// Syllables per second.
    SpeakingRate,
    /// [`VoicingState::code`].
    Voicing,
    /// Frame RMS in dBFS.
    RmsDb,
}

impl AnalysisSignal {
    /// Number of signals.
    pub const COUNT: usize = 13;

    /// Every signal, in index order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Pitch,
        Self::PitchConfidence,
        Self::Formant1,
        Self::Formant2,
        Self::Formant3,
        Self::Hnr,
        Self::Cpp,
        Self::SpectralCentroid,
        Self::SpectralSlope,
        Self::SpectralFlux,
        Self::SpeakingRate,
        Self::Voicing,
        Self::RmsDb,
    ];

    /// Position in [`ALL`](Self::ALL) and in feature rows.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Short display name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Pitch => "pitch",
            Self::PitchConfidence => "confidence",
            Self::Formant1 => "f1",
            Self::Formant2 => "f2",
            Self::Formant3 => "f3",
            Self::Hnr => "hnr",
            Self::Cpp => "cpp",
            Self::SpectralCentroid => "centroid",
            Self::SpectralSlope => "slope",
            Self::SpectralFlux => "flux",
            Self::SpeakingRate => "rate",
            Self::Voicing => "voicing",
            Self::RmsDb => "rms",
        }
    }

    /// Lookup by [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }
}

/// Values per row of the feature ring: every signal, then the harmonics.
pub const FEATURE_ROW_WIDTH: usize = AnalysisSignal::COUNT + HARMONIC_COUNT;

/// Everything measured on one analysis frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameFeatures {
    /// Signal values indexed by [`AnalysisSignal::index`].
    pub values: [f32; AnalysisSignal::COUNT],
    /// Levels of the first harmonics in dB.
    pub harmonics_db: [f32; HARMONIC_COUNT],
}

impl Default for FrameFeatures {
    fn default() -> Self {
        Self {
            values: [0.0; AnalysisSignal::COUNT],
            harmonics_db: [HARMONIC_FLOOR_DB; HARMONIC_COUNT],
        }
    }
}

impl FrameFeatures {
    /// Value of one signal.
    pub fn get(&self, signal: AnalysisSignal) -> f32 {
        self.values[signal.index()]
    }

    /// Set one signal.
    pub fn set(&mut self, signal: AnalysisSignal, value: f32) {
        self.values[signal.index()] = value;
    }

    /// Voicing decision.
    pub fn voicing(&self) -> VoicingState {
        VoicingState::from_code(self.get(AnalysisSignal::Voicing))
    }

    /// Pitch in Hz when the frame was pitched.
    pub fn pitch_hz(&self) -> Option<f32> {
        let hz = self.get(AnalysisSignal::Pitch);
        (hz > 0.0).then_some(hz)
    }

    /// Serialize into a feature ring row.
    pub fn write_row(&self, row: &mut [f32]) {
        let (signals, harmonics) = row.split_at_mut(AnalysisSignal::COUNT.min(row.len()));
        signals.copy_from_slice(&self.values[..signals.len()]);
        let n = harmonics.len().min(HARMONIC_COUNT);
        harmonics[..n].copy_from_slice(&self.harmonics_db[..n]);
    }

    /// Rebuild from a feature ring row; missing values keep their defaults.
    pub fn from_row(row: &[f32]) -> Self {
        let mut features = Self::default();
        for (v, &r) in features.values.iter_mut().zip(row) {
            *v = r;
        }
        for (v, &r) in features
            .harmonics_db
            .iter_mut()
            .zip(row.iter().skip(AnalysisSignal::COUNT))
        {
            *v = r;
        }
        features
    }
}

/// Last published value of every [`AnalysisSignal`].
#[derive(Debug, Default)]
pub struct SignalStore {
    values: [AtomicF32; AnalysisSignal::COUNT],
    frame_id: AtomicU64,
}

impl SignalStore {
    /// Store with every value at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent value of `signal`.
    pub fn last_value(&self, signal: AnalysisSignal) -> f32 {
        self.values[signal.index()].load()
    }

    /// Frame the values were last updated from, `0` before the first.
    pub fn frame_id(&self) -> u64 {
        self.frame_id.load(Ordering::Acquire)
    }

    /// Publish one frame's values.
    pub fn publish(&self, features: &FrameFeatures, frame_id: u64) {
        for (slot, &v) in self.values.iter().zip(&features.values) {
            slot.store(v);
        }
        self.frame_id.store(frame_id, Ordering::Release);
    }

    /// Copy of every value.
    pub fn snapshot(&self) -> FrameFeatures {
        let mut features = FrameFeatures::default();
        for (v, slot) in features.values.iter_mut().zip(&self.values) {
            *v = slot.load();
        }
        features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_match_order() {
        for (i, s) in AnalysisSignal::ALL.iter().enumerate() {
            assert_eq!(s.index(), i);
            assert_eq!(AnalysisSignal::from_name(s.name()), Some(*s));
        }
        assert_eq!(AnalysisSignal::from_name("loudness"), None);
    }

    #[test]
    fn test_store_last_value() {
        let store = SignalStore::new();
        assert_eq!(store.last_value(AnalysisSignal::Pitch), 0.0);
        let mut f = FrameFeatures::default();
        f.set(AnalysisSignal::Pitch, 220.0);
        f.set(AnalysisSignal::Voicing, VoicingState::Voiced.code());
        store.publish(&f, 7);
        assert_eq!(store.last_value(AnalysisSignal::Pitch), 220.0);
        assert_eq!(store.frame_id(), 7);
        assert_eq!(store.snapshot().voicing(), VoicingState::Voiced);
    }

    #[test]
    fn test_row_layout() {
        let mut f = FrameFeatures::default();
        f.set(AnalysisSignal::Formant2, 1200.0);
        f.harmonics_db[0] = -3.0;
        let mut row = [0.0; FEATURE_ROW_WIDTH];
        f.write_row(&mut row);
        assert_eq!(row[AnalysisSignal::Formant2.index()], 1200.0);
        assert_eq!(row[AnalysisSignal::COUNT], -3.0);
        assert_eq!(FrameFeatures::from_row(&row), f);
        assert_eq!(FrameFeatures::default().pitch_hz(), None);
    }
}
