//! hotmic analysis - voice analysis behind the engine's analysis tap
//!
//! The engine hands one tapped block per callback to an
//! [`AnalysisCaptureLink`]; a background [`AnalysisOrchestrator`] turns the
//! stream into spectrogram frames and voice features that UI threads read
//! without locking.
//!
//! - [`fft`] - FFT wrapper with windowing functions and the real cepstrum
//! - [`pitch`] - YIN fundamental frequency estimation
//! - [`lpc`] - Burg linear prediction and formant extraction
//! - [`voicing`] - HNR, cepstral peak prominence and voicing decisions
//! - [`spectral`] - Centroid, slope, flux and harmonic levels
//! - [`speech`] - Speaking rate from the loudness envelope
//! - [`pipeline`] - Streaming frame analysis shared by the worker and offline tools
//! - [`ring`] - Versioned single-writer frame ring
//! - [`signals`] - Latest value of every analysis signal
//! - [`capture`] - Audio-thread hand-off
//! - [`orchestrator`] - Worker thread and read API
//!
//! ## Offline analysis
//!
//! ```rust
//! use hotmic_analysis::{AnalysisPipeline, AnalysisSettings, AnalysisSignal};
//!
//! let sr = 48000.0;
//! let tone: Vec<f32> = (0..24000)
//!     .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 200.0 * i as f32 / sr).sin())
//!     .collect();
//!
//! let mut pipeline = AnalysisPipeline::new(AnalysisSettings::default(), sr).unwrap();
//! let mut pitch = 0.0;
//! pipeline.push(&tone, |frame| pitch = frame.features.get(AnalysisSignal::Pitch));
//! assert!((pitch - 200.0).abs() < 2.0);
//! ```
//!
//! ## Live analysis
//!
//! ```rust
//! use hotmic_analysis::{AnalysisOrchestrator, AnalysisSettings};
//! use hotmic_core::{Engine, EngineSettings};
//!
//! let (_engine, mut processor) = Engine::new(EngineSettings::default());
//! let (orchestrator, link) = AnalysisOrchestrator::start(AnalysisSettings::default(), 48000.0).unwrap();
//! processor.set_capture_sink(Box::new(link));
//!
//! // UI timer: copy only what changed since the last poll.
//! let capacity = orchestrator.spectrogram().capacity();
//! let mut frames = vec![0.0; capacity * orchestrator.bins()];
//! let mut ids = vec![0; capacity];
//! let update = orchestrator.copy_spectrogram_updates(0, &mut frames, &mut ids).unwrap();
//! assert_eq!(update.latest_frame_id, 0);
//! ```

pub mod capture;
pub mod error;
pub mod fft;
pub mod lpc;
pub mod noise;
pub mod orchestrator;
pub mod pipeline;
pub mod pitch;
pub mod ring;
pub mod signals;
pub mod spectral;
pub mod speech;
pub mod voicing;

pub use capture::{AnalysisCaptureLink, BlockHeader, CaptureStats, MAX_CAPTURE_PRODUCERS};
pub use error::AnalysisError;
pub use fft::{Fft, Window};
pub use lpc::{Burg, Formant, RootFinder, burg, extract_formants};
pub use orchestrator::AnalysisOrchestrator;
pub use pipeline::{AnalysisFrame, AnalysisPipeline, AnalysisSettings};
pub use pitch::{DEFAULT_YIN_THRESHOLD, PitchEstimate, YinDetector, yin};
pub use ring::{CopyResult, FrameRing, FrameWriter};
pub use signals::{AnalysisSignal, FEATURE_ROW_WIDTH, FrameFeatures, SignalStore};
pub use spectral::{HARMONIC_COUNT, SpectralFlux};
pub use speech::{SpeechRate, SpeechRateConfig};
pub use voicing::{VoicingState, VoicingThresholds};
