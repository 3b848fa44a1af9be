//! Device health counters and recovery tracking.
//!
//! The device layer writes counters from its own threads through the atomic
//! handles here; a control-thread timer calls [`Diagnostics::tick`] once per
//! interval to roll the [`DropWindow`] and update the recovery state, and UIs
//! read a [`DiagnosticsSnapshot`].

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

/// Default number of intervals kept by the drop window.
pub const DEFAULT_WINDOW_INTERVALS: usize = 10;

/// Default number of clean intervals that end recovery.
pub const DEFAULT_RECOVERY_INTERVALS: usize = 3;

/// Counters for one capture input.
#[derive(Debug, Default)]
pub struct InputCounters {
    active: AtomicBool,
    dropped_samples: AtomicU64,
    underflow_samples: AtomicU64,
    buffered_samples: AtomicUsize,
    buffer_capacity: AtomicUsize,
    last_callback_ticks: AtomicU64,
}

impl InputCounters {
    /// Mark the input as running or stopped.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }

    /// Count samples lost because the capture buffer overflowed.
    pub fn add_dropped(&self, samples: u64) {
        self.dropped_samples.fetch_add(samples, Ordering::Relaxed);
    }

    /// Count samples the engine wanted but the capture buffer did not have.
    pub fn add_underflow(&self, samples: u64) {
        self.underflow_samples.fetch_add(samples, Ordering::Relaxed);
    }

    /// Report buffer fill after a device callback.
    pub fn report_buffer(&self, buffered: usize, capacity: usize, callback_ticks: u64) {
        self.buffered_samples.store(buffered, Ordering::Relaxed);
        self.buffer_capacity.store(capacity, Ordering::Relaxed);
        self.last_callback_ticks
            .store(callback_ticks, Ordering::Relaxed);
    }

    fn snapshot(&self, channel: usize) -> InputDiagnostics {
        InputDiagnostics {
            channel,
            is_active: self.active.load(Ordering::Relaxed),
            dropped_samples: self.dropped_samples.load(Ordering::Relaxed),
            underflow_samples: self.underflow_samples.load(Ordering::Relaxed),
            buffered_samples: self.buffered_samples.load(Ordering::Relaxed),
            buffer_capacity: self.buffer_capacity.load(Ordering::Relaxed),
            last_callback_ticks: self.last_callback_ticks.load(Ordering::Relaxed),
        }
    }
}

/// Per-input section of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputDiagnostics {
    /// Input index.
    pub channel: usize,
    /// Whether the device is running.
    pub is_active: bool,
    /// Total samples dropped.
    pub dropped_samples: u64,
    /// Total samples underflowed.
    pub underflow_samples: u64,
    /// Samples waiting in the capture buffer.
    pub buffered_samples: usize,
    /// Capture buffer size.
    pub buffer_capacity: usize,
    /// Timestamp of the last device callback (device clock ticks).
    pub last_callback_ticks: u64,
}

/// A point-in-time view of device health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticsSnapshot {
    /// One entry per capture input.
    pub inputs: Vec<InputDiagnostics>,
    /// Total output underflow samples.
    pub output_underflow_samples: u64,
    /// Samples waiting in the monitor buffer.
    pub monitor_buffered_samples: usize,
    /// Monitor buffer size.
    pub monitor_buffer_capacity: usize,
    /// Drops and underflows recently seen and not yet followed by enough clean intervals.
    pub is_recovering: bool,
    /// Drop and underflow samples across the rolling window.
    pub recent_drop_samples: u64,
}

/// Fixed-length history of per-interval fault counts.
#[derive(Debug, Clone)]
pub struct DropWindow {
    intervals: Vec<u64>,
    next: usize,
    filled: usize,
}

impl DropWindow {
    /// A window of `len` intervals (at least one).
    pub fn new(len: usize) -> Self {
        Self {
            intervals: vec![0; len.max(1)],
            next: 0,
            filled: 0,
        }
    }

    /// Record one interval's count, evicting the oldest.
    pub fn push(&mut self, count: u64) {
        self.intervals[self.next] = count;
        self.next = (self.next + 1) % self.intervals.len();
        self.filled = (self.filled + 1).min(self.intervals.len());
    }

    /// Sum over the window.
    pub fn total(&self) -> u64 {
        self.intervals.iter().sum()
    }

    /// Most recent counts, newest last.
    pub fn recent(&self) -> Vec<u64> {
        let len = self.intervals.len();
        (0..self.filled)
            .map(|i| self.intervals[(self.next + len - self.filled + i) % len])
            .collect()
    }

    /// Window length in intervals.
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// Whether no interval has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }
}

#[derive(Debug)]
struct Rolling {
    window: DropWindow,
    last_total: u64,
    clean_streak: usize,
}

/// Engine-wide device diagnostics.
#[derive(Debug)]
pub struct Diagnostics {
    inputs: Vec<InputCounters>,
    output_underflow: AtomicU64,
    monitor_buffered: AtomicUsize,
    monitor_capacity: AtomicUsize,
    recovering: AtomicBool,
    recovery_intervals: usize,
    rolling: Mutex<Rolling>,
}

impl Diagnostics {
    /// Counters for `inputs` capture inputs with default window settings.
    pub fn new(inputs: usize) -> Self {
        Self::with_window(inputs, DEFAULT_WINDOW_INTERVALS, DEFAULT_RECOVERY_INTERVALS)
    }

    /// Counters with a custom window length and recovery threshold.
    pub fn with_window(inputs: usize, window: usize, recovery_intervals: usize) -> Self {
        Self {
            inputs: (0..inputs).map(|_| InputCounters::default()).collect(),
            output_underflow: AtomicU64::new(0),
            monitor_buffered: AtomicUsize::new(0),
            monitor_capacity: AtomicUsize::new(0),
            recovering: AtomicBool::new(false),
            recovery_intervals: recovery_intervals.max(1),
            rolling: Mutex::new(Rolling {
                window: DropWindow::new(window),
                last_total: 0,
                clean_streak: 0,
            }),
        }
    }

    /// Counters for input `index`.
    pub fn input(&self, index: usize) -> Option<&InputCounters> {
        self.inputs.get(index)
    }

    /// Count output underflow samples.
    pub fn add_output_underflow(&self, samples: u64) {
        self.output_underflow.fetch_add(samples, Ordering::Relaxed);
    }

    /// Report monitor buffer fill.
    pub fn report_monitor(&self, buffered: usize, capacity: usize) {
        self.monitor_buffered.store(buffered, Ordering::Relaxed);
        self.monitor_capacity.store(capacity, Ordering::Relaxed);
    }

    /// Whether a device fault was seen recently.
    pub fn is_recovering(&self) -> bool {
        self.recovering.load(Ordering::Relaxed)
    }

    fn fault_total(&self) -> u64 {
        let inputs: u64 = self
            .inputs
            .iter()
            .map(|i| {
                i.dropped_samples.load(Ordering::Relaxed)
                    + i.underflow_samples.load(Ordering::Relaxed)
            })
            .sum();
        inputs + self.output_underflow.load(Ordering::Relaxed)
    }

    /// Close the current interval (control-thread timer).
    ///
    /// Any fault in the interval enters recovery; recovery ends after the
    /// configured number of consecutive clean intervals.
    pub fn tick(&self) {
        let total = self.fault_total();
        let mut rolling = self.rolling.lock();
        let delta = total.saturating_sub(rolling.last_total);
        rolling.last_total = total;
        rolling.window.push(delta);

        if delta > 0 {
            rolling.clean_streak = 0;
            if !self.recovering.swap(true, Ordering::Relaxed) {
                #[cfg(feature = "tracing")]
                tracing::warn!(samples = delta, "device fault, entering recovery");
            }
        } else {
            rolling.clean_streak += 1;
            if rolling.clean_streak >= self.recovery_intervals
                && self.recovering.swap(false, Ordering::Relaxed)
            {
                #[cfg(feature = "tracing")]
                tracing::info!("device stable, recovery finished");
            }
        }
    }

    /// Current view.
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            inputs: self
                .inputs
                .iter()
                .enumerate()
                .map(|(i, c)| c.snapshot(i))
                .collect(),
            output_underflow_samples: self.output_underflow.load(Ordering::Relaxed),
            monitor_buffered_samples: self.monitor_buffered.load(Ordering::Relaxed),
            monitor_buffer_capacity: self.monitor_capacity.load(Ordering::Relaxed),
            is_recovering: self.is_recovering(),
            recent_drop_samples: self.rolling.lock().window.total(),
        }
    }
}
