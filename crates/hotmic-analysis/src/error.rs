//! Analysis error type.

use thiserror::Error;

/// Rejected analysis settings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    /// FFT size must be a power of two of at least 64.
    #[error("invalid FFT size {0} (power of two, at least 64)")]
    InvalidFftSize(usize),

    /// Hop must be between 1 and the FFT size.
    #[error("invalid hop size {hop} for FFT size {fft_size}")]
    InvalidHopSize {
        /// Requested hop.
        hop: usize,
        /// FFT size it was checked against.
        fft_size: usize,
    },

    /// Sample rate must be finite and positive.
    #[error("invalid sample rate {0}")]
    InvalidSampleRate(f32),

    /// Pitch search range must satisfy `0 < min < max`.
    #[error("invalid pitch range {min}..{max} Hz")]
    InvalidPitchRange {
        /// Lower bound.
        min: f32,
        /// Upper bound.
        max: f32,
    },

    /// The frame ring needs at least two slots.
    #[error("ring capacity {0} is too small")]
    InvalidRingCapacity(usize),

    /// The analysis worker thread could not be started.
    #[error("failed to spawn analysis worker: {0}")]
    WorkerSpawn(String),

    /// Caller-supplied buffers do not match the ring layout.
    #[error("output buffers sized for {got} frames of {got_bins} bins, ring has {frames} of {bins}")]
    BufferMismatch {
        /// Ring capacity.
        frames: usize,
        /// Ring bins per frame.
        bins: usize,
        /// Frames the buffers hold.
        got: usize,
        /// Bins per frame the buffers hold.
        got_bins: usize,
    },
}
