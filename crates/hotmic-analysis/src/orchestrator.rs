//! Background analysis worker.
//!
//! [`AnalysisOrchestrator::start`] spawns a worker thread and returns the
//! [`AnalysisCaptureLink`] to install on the audio thread. The worker drains
//! captured blocks, runs them through an [`AnalysisPipeline`] and publishes
//! every frame to two rings that share frame IDs: the spectrogram (dB per
//! bin) and the feature rows (signals then harmonics). The feature row is
//! published first, so a reader that sees spectrogram frame `n` can read
//! feature frame `n`. Latest scalar values also go to a [`SignalStore`].
//!
//! When the tap moves (a different channel, tap point, bus or producer set)
//! the pipeline drops its buffered audio; frame IDs keep counting.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::capture::{self, AnalysisCaptureLink, BlockHeader, CaptureQueue, CaptureStats};
use crate::error::AnalysisError;
use crate::pipeline::{AnalysisPipeline, AnalysisSettings};
use crate::ring::{CopyResult, FrameRing, FrameWriter};
use crate::signals::{AnalysisSignal, FEATURE_ROW_WIDTH, SignalStore};

const HEADER_CAPACITY: usize = 1024;
const IDLE_WAIT: Duration = Duration::from_millis(20);

struct Shared {
    spectrogram: Arc<FrameRing>,
    features: Arc<FrameRing>,
    signals: SignalStore,
    capture: Arc<CaptureStats>,
    source_switches: AtomicU64,
    stop: AtomicBool,
}

/// Owns the analysis worker and the rings it publishes to.
pub struct AnalysisOrchestrator {
    shared: Arc<Shared>,
    settings: AnalysisSettings,
    sample_rate: f32,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for AnalysisOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisOrchestrator")
            .field("sample_rate", &self.sample_rate)
            .field("running", &self.is_running())
            .field("latest_frame_id", &self.shared.spectrogram.latest_frame_id())
            .finish_non_exhaustive()
    }
}

struct Worker {
    shared: Arc<Shared>,
    pipeline: AnalysisPipeline,
    queue: CaptureQueue,
    spectrogram: FrameWriter,
    features: FrameWriter,
    row: Vec<f32>,
    current: Option<BlockHeader>,
    expected_time: i64,
}

impl Worker {
    fn run(mut self) {
        while !self.shared.stop.load(Ordering::Acquire) {
            if !self.drain() {
                thread::park_timeout(IDLE_WAIT);
            }
        }
        self.drain();
    }

    /// Analyse every queued block; false when there was nothing to do.
    fn drain(&mut self) -> bool {
        let mut worked = false;
        while let Ok(header) = self.queue.headers.pop() {
            worked = true;
            self.follow_source(&header);

            let Ok(chunk) = self.queue.samples.read_chunk(header.len) else {
                // Samples are pushed before their header.
                break;
            };
            let (first, second) = chunk.as_slices();
            let row = &mut self.row;
            let features = &mut self.features;
            let spectrogram = &mut self.spectrogram;
            let signals = &self.shared.signals;
            for part in [first, second] {
                self.pipeline.push(part, |frame| {
                    frame.features.write_row(row);
                    features.publish(row);
                    let id = spectrogram.publish(frame.spectrum_db);
                    signals.publish(&frame.features, id);
                });
            }
            chunk.commit_all();
            self.expected_time = header.sample_time + header.len as i64;
        }
        worked
    }

    fn follow_source(&mut self, header: &BlockHeader) {
        let switched = self
            .current
            .as_ref()
            .is_some_and(|current| !current.same_source(header));
        if switched {
            self.pipeline.reset();
            self.shared.source_switches.fetch_add(1, Ordering::Relaxed);
            #[cfg(feature = "tracing")]
            tracing::debug!(
                channel = header.channel,
                source = ?header.source,
                sample_clock = header.sample_clock,
                "analysis tap moved, buffers reset"
            );
        }
        if switched || self.current.is_none() || header.sample_time != self.expected_time {
            self.pipeline.set_sample_time(header.sample_time);
        }
        self.current = Some(*header);
    }
}

impl AnalysisOrchestrator {
    /// Validate `settings`, spawn the worker and return the capture link.
    ///
    /// # Errors
    ///
    /// Whatever [`AnalysisSettings::validate`] rejects.
    pub fn start(
        settings: AnalysisSettings,
        sample_rate: f32,
    ) -> Result<(Self, AnalysisCaptureLink), AnalysisError> {
        let pipeline = AnalysisPipeline::new(settings, sample_rate)?;
        let (spectrogram_ring, spectrogram) =
            FrameRing::with_writer(settings.ring_capacity, settings.bins())?;
        let (feature_ring, features) =
            FrameRing::with_writer(settings.ring_capacity, FEATURE_ROW_WIDTH)?;

        let stats = Arc::new(CaptureStats::default());
        let sample_capacity = (sample_rate as usize * 2).max(settings.fft_size * 4);
        let (mut link, queue) = capture::channel(sample_capacity, HEADER_CAPACITY, Arc::clone(&stats));

        let shared = Arc::new(Shared {
            spectrogram: spectrogram_ring,
            features: feature_ring,
            signals: SignalStore::new(),
            capture: stats,
            source_switches: AtomicU64::new(0),
            stop: AtomicBool::new(false),
        });

        let worker = Worker {
            shared: Arc::clone(&shared),
            pipeline,
            queue,
            spectrogram,
            features,
            row: vec![0.0; FEATURE_ROW_WIDTH],
            current: None,
            expected_time: 0,
        };
        let handle = thread::Builder::new()
            .name("hotmic-analysis".into())
            .spawn(move || worker.run())
            .map_err(|e| AnalysisError::WorkerSpawn(e.to_string()))?;
        link.set_worker(handle.thread().clone());

        #[cfg(feature = "tracing")]
        tracing::info!(
            sample_rate,
            fft_size = settings.fft_size,
            hop = settings.hop_size,
            "analysis worker started"
        );

        Ok((
            Self {
                shared,
                settings,
                sample_rate,
                worker: Some(handle),
            },
            link,
        ))
    }

    /// Settings the worker runs with.
    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Input sample rate.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Spectrum bins per frame.
    pub fn bins(&self) -> usize {
        self.shared.spectrogram.width()
    }

    /// Spectrogram ring (dBFS per bin).
    pub fn spectrogram(&self) -> &Arc<FrameRing> {
        &self.shared.spectrogram
    }

    /// Feature ring (signals then harmonics).
    pub fn features(&self) -> &Arc<FrameRing> {
        &self.shared.features
    }

    /// Latest scalar values.
    pub fn signals(&self) -> &SignalStore {
        &self.shared.signals
    }

    /// Most recent value of `signal`.
    pub fn last_value(&self, signal: AnalysisSignal) -> f32 {
        self.shared.signals.last_value(signal)
    }

    /// Copy spectrogram frames newer than `since_frame_id`.
    /// See [`FrameRing::copy_updates`].
    ///
    /// # Errors
    ///
    /// [`AnalysisError::BufferMismatch`] for wrongly sized buffers.
    pub fn copy_spectrogram_updates(
        &self,
        since_frame_id: u64,
        frames: &mut [f32],
        frame_ids: &mut [u64],
    ) -> Result<CopyResult, AnalysisError> {
        self.shared
            .spectrogram
            .copy_updates(since_frame_id, frames, frame_ids)
    }

    /// Copy feature rows newer than `since_frame_id`.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::BufferMismatch`] for wrongly sized buffers.
    pub fn copy_feature_updates(
        &self,
        since_frame_id: u64,
        rows: &mut [f32],
        frame_ids: &mut [u64],
    ) -> Result<CopyResult, AnalysisError> {
        self.shared
            .features
            .copy_updates(since_frame_id, rows, frame_ids)
    }

    /// Blocks queued by the capture link.
    pub fn captured_blocks(&self) -> u64 {
        self.shared.capture.captured()
    }

    /// Blocks the capture link dropped because the worker fell behind.
    pub fn dropped_blocks(&self) -> u64 {
        self.shared.capture.dropped()
    }

    /// Times the tap source changed.
    pub fn source_switches(&self) -> u64 {
        self.shared.source_switches.load(Ordering::Relaxed)
    }

    /// Whether the worker thread is still attached.
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Stop the worker after it drains what is queued, and join it.
    pub fn stop(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        self.shared.stop.store(true, Ordering::Release);
        handle.thread().unpark();
        if handle.join().is_err() {
            #[cfg(feature = "tracing")]
            tracing::error!("analysis worker panicked");
        }
    }
}

impl Drop for AnalysisOrchestrator {
    fn drop(&mut self) {
        self.stop();
    }
}
