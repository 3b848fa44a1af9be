//! Audio-side state of one channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::chain::{ChainRun, PluginChain};
use crate::math::{AtomicF32, db_to_linear};
use crate::meter::{LevelMeter, MeterReading};

/// Channel strip and chain as seen by the audio thread.
///
/// Strip values are written only by the audio thread while it drains the
/// parameter queue; the control side reads them for display.
#[derive(Debug)]
pub struct ChannelRuntime {
    chain: Arc<PluginChain>,
    input_gain: AtomicF32,
    output_gain: AtomicF32,
    muted: AtomicBool,
    soloed: AtomicBool,
    meter: LevelMeter,
    faulted_slots: AtomicU64,
    contended_slots: AtomicU64,
}

impl ChannelRuntime {
    pub(crate) fn new(chain: Arc<PluginChain>) -> Self {
        Self {
            chain,
            input_gain: AtomicF32::new(1.0),
            output_gain: AtomicF32::new(1.0),
            muted: AtomicBool::new(false),
            soloed: AtomicBool::new(false),
            meter: LevelMeter::new(),
            faulted_slots: AtomicU64::new(0),
            contended_slots: AtomicU64::new(0),
        }
    }

    /// Seed the strip from saved values before the channel goes live.
    pub(crate) fn load_strip(&self, input_db: f32, output_db: f32, muted: bool, soloed: bool) {
        self.set_input_gain_db(input_db);
        self.set_output_gain_db(output_db);
        self.set_muted(muted);
        self.set_soloed(soloed);
    }

    /// The live chain.
    pub fn chain(&self) -> &Arc<PluginChain> {
        &self.chain
    }

    /// Input gain (linear).
    #[inline]
    pub fn input_gain(&self) -> f32 {
        self.input_gain.load()
    }

    /// Output gain (linear).
    #[inline]
    pub fn output_gain(&self) -> f32 {
        self.output_gain.load()
    }

    /// Whether the channel is muted.
    #[inline]
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Whether the channel is soloed.
    #[inline]
    pub fn is_soloed(&self) -> bool {
        self.soloed.load(Ordering::Relaxed)
    }

    pub(crate) fn set_input_gain_db(&self, db: f32) {
        self.input_gain.store(db_to_linear(db));
    }

    pub(crate) fn set_output_gain_db(&self, db: f32) {
        self.output_gain.store(db_to_linear(db));
    }

    pub(crate) fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub(crate) fn set_soloed(&self, soloed: bool) {
        self.soloed.store(soloed, Ordering::Relaxed);
    }

    /// Post-fader level of the last block.
    pub fn meter(&self) -> MeterReading {
        self.meter.reading()
    }

    pub(crate) fn level_meter(&self) -> &LevelMeter {
        &self.meter
    }

    pub(crate) fn record(&self, run: ChainRun) {
        if run.faulted > 0 {
            self.faulted_slots
                .fetch_add(run.faulted as u64, Ordering::Relaxed);
        }
        if run.contended > 0 {
            self.contended_slots
                .fetch_add(run.contended as u64, Ordering::Relaxed);
        }
    }

    /// Slot-blocks bypassed because a plugin failed or produced non-finite output.
    pub fn faulted_slots(&self) -> u64 {
        self.faulted_slots.load(Ordering::Relaxed)
    }

    /// Slot-blocks skipped because the control thread held the plugin lock.
    pub fn contended_slots(&self) -> u64 {
        self.contended_slots.load(Ordering::Relaxed)
    }
}
