//! A live plugin instance and its per-slot state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;

use crate::math::all_finite;
use crate::meter::LevelMeter;
use crate::param_info::ParamDescriptor;
use crate::plugin::{Plugin, PluginCapabilities, ProcessContext};
use crate::spectral_delta::{BandDeltas, SpectralDelta};

/// What happened to a slot during one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOutcome {
    /// The plugin ran and produced finite output.
    Processed,
    /// The slot (or its container) is bypassed.
    Bypassed,
    /// The plugin failed or produced non-finite samples; the block was
    /// restored to its input and the slot treated as bypassed.
    Faulted,
    /// The control thread held the plugin lock; the slot was skipped.
    Contended,
}

/// Audio-side mutable state, guarded by the slot mutex.
struct SlotDsp {
    plugin: Box<dyn Plugin>,
    dry: Vec<f32>,
    spectral: Option<SpectralDelta>,
}

/// One plugin instance living in a channel chain.
///
/// The plugin sits behind a `parking_lot::Mutex`. The audio thread only ever
/// calls `try_lock`; the control thread locks briefly for state reads and
/// disposal. Everything the audio thread needs besides the plugin itself
/// (bypass flag, meter, counters) is atomic.
pub struct PluginSlot {
    instance_id: i32,
    plugin_id: &'static str,
    name: &'static str,
    capabilities: PluginCapabilities,
    descriptors: Vec<ParamDescriptor>,
    bypassed: AtomicBool,
    latency: AtomicUsize,
    meter: LevelMeter,
    spectral_readings: ArcSwapOption<BandDeltas>,
    faults: AtomicU64,
    contended: AtomicU64,
    disposed: AtomicBool,
    dsp: Mutex<SlotDsp>,
}

impl std::fmt::Debug for PluginSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginSlot")
            .field("instance_id", &self.instance_id)
            .field("plugin_id", &self.plugin_id)
            .field("bypassed", &self.is_bypassed())
            .finish_non_exhaustive()
    }
}

impl PluginSlot {
    /// Wrap an initialized plugin.
    ///
    /// Capabilities, descriptors and latency are captured here, once.
    /// `block_size` sizes the fault-recovery buffer.
    pub fn new(instance_id: i32, plugin: Box<dyn Plugin>, block_size: usize) -> Self {
        let capabilities = PluginCapabilities::of(plugin.as_ref());
        let descriptors = plugin.descriptors();
        Self {
            instance_id,
            plugin_id: plugin.plugin_id(),
            name: plugin.name(),
            capabilities,
            descriptors,
            bypassed: AtomicBool::new(false),
            latency: AtomicUsize::new(plugin.latency_samples()),
            meter: LevelMeter::new(),
            spectral_readings: ArcSwapOption::empty(),
            faults: AtomicU64::new(0),
            contended: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
            dsp: Mutex::new(SlotDsp {
                plugin,
                dry: vec![0.0; block_size],
                spectral: None,
            }),
        }
    }

    /// Stable instance ID, unique within the channel.
    pub fn instance_id(&self) -> i32 {
        self.instance_id
    }

    /// Registry id of the hosted plugin.
    pub fn plugin_id(&self) -> &'static str {
        self.plugin_id
    }

    /// Display name of the hosted plugin.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Capabilities captured at registration.
    pub fn capabilities(&self) -> &PluginCapabilities {
        &self.capabilities
    }

    /// Parameter descriptors captured at registration.
    pub fn descriptors(&self) -> &[ParamDescriptor] {
        &self.descriptors
    }

    /// The slot's own bypass flag (container bypass is separate).
    #[inline]
    pub fn is_bypassed(&self) -> bool {
        self.bypassed.load(Ordering::Acquire)
    }

    /// Set the slot's own bypass flag.
    #[inline]
    pub fn set_bypassed(&self, bypassed: bool) {
        self.bypassed.store(bypassed, Ordering::Release);
    }

    /// Latency reported by the plugin at its last initialization.
    pub fn latency_samples(&self) -> usize {
        self.latency.load(Ordering::Relaxed)
    }

    /// Output meter.
    pub fn meter(&self) -> &LevelMeter {
        &self.meter
    }

    /// Number of blocks in which the plugin faulted.
    pub fn fault_count(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }

    /// Number of blocks skipped because the control thread held the plugin.
    pub fn contended_count(&self) -> u64 {
        self.contended.load(Ordering::Relaxed)
    }

    /// Latest spectral deltas, if spectral measurement is enabled.
    pub fn spectral_deltas(&self) -> Option<Arc<BandDeltas>> {
        self.spectral_readings.load_full()
    }

    /// Enable or disable per-band spectral delta measurement (control thread).
    pub fn set_spectral_delta(&self, sample_rate: Option<f32>) {
        let mut dsp = self.dsp.lock();
        match sample_rate {
            Some(sr) => {
                let analyser = SpectralDelta::new(sr);
                self.spectral_readings.store(Some(analyser.readings()));
                dsp.spectral = Some(analyser);
            }
            None => {
                self.spectral_readings.store(None);
                dsp.spectral = None;
            }
        }
    }

    /// Run `f` with exclusive access to the plugin (control thread, blocking).
    pub fn with_plugin<R>(&self, f: impl FnOnce(&mut dyn Plugin) -> R) -> R {
        let mut dsp = self.dsp.lock();
        f(dsp.plugin.as_mut())
    }

    /// Run `f` if the plugin is not locked elsewhere (audio thread).
    #[inline]
    pub fn try_with_plugin<R>(&self, f: impl FnOnce(&mut dyn Plugin) -> R) -> Option<R> {
        let mut dsp = self.dsp.try_lock()?;
        Some(f(dsp.plugin.as_mut()))
    }

    /// Re-initialize for a new sample rate or block size.
    ///
    /// Only valid while the audio callback is stopped.
    pub fn reinitialize(&self, sample_rate: f32, block_size: usize) {
        let mut dsp = self.dsp.lock();
        dsp.plugin.initialize(sample_rate, block_size);
        dsp.plugin.reset();
        dsp.dry = vec![0.0; block_size];
        if dsp.spectral.is_some() {
            let analyser = SpectralDelta::new(sample_rate);
            self.spectral_readings.store(Some(analyser.readings()));
            dsp.spectral = Some(analyser);
        }
        self.latency
            .store(dsp.plugin.latency_samples(), Ordering::Relaxed);
    }

    /// Process one block in place (audio thread).
    ///
    /// Never blocks and never allocates. A plugin error or non-finite output
    /// restores the block to its input.
    pub fn process(
        &self,
        buffer: &mut [f32],
        ctx: &mut ProcessContext<'_>,
        container_bypassed: bool,
    ) -> SlotOutcome {
        if container_bypassed || self.is_bypassed() {
            self.meter.update(buffer);
            return SlotOutcome::Bypassed;
        }
        let Some(mut guard) = self.dsp.try_lock() else {
            self.contended.fetch_add(1, Ordering::Relaxed);
            return SlotOutcome::Contended;
        };
        let dsp = &mut *guard;
        let n = buffer.len();
        if n > dsp.dry.len() {
            self.faults.fetch_add(1, Ordering::Relaxed);
            return SlotOutcome::Faulted;
        }

        dsp.dry[..n].copy_from_slice(buffer);
        if let Some(spectral) = dsp.spectral.as_mut() {
            spectral.measure_input(buffer);
        }

        let result = dsp.plugin.process(buffer, ctx);
        if result.is_err() || !all_finite(buffer) {
            buffer.copy_from_slice(&dsp.dry[..n]);
            self.faults.fetch_add(1, Ordering::Relaxed);
            self.meter.update(buffer);
            return SlotOutcome::Faulted;
        }

        if let Some(spectral) = dsp.spectral.as_mut() {
            spectral.measure_output(buffer);
        }
        self.meter.update(buffer);
        SlotOutcome::Processed
    }

    /// Call the plugin's `dispose` exactly once (control thread).
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            self.dsp.lock().plugin.dispose();
        }
    }

    /// Whether [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param_info::ParameterInfo;
    use crate::plugin::PluginError;
    use crate::routing::BusBuffers;

    struct Scale {
        factor: f32,
        fail: bool,
    }

    impl ParameterInfo for Scale {
        fn param_count(&self) -> usize {
            0
        }
        fn param_info(&self, _index: usize) -> Option<ParamDescriptor> {
            None
        }
        fn get_param(&self, _index: usize) -> f32 {
            0.0
        }
        fn set_param(&mut self, _index: usize, _value: f32) {}
    }

    impl Plugin for Scale {
        fn plugin_id(&self) -> &'static str {
            "scale"
        }
        fn initialize(&mut self, _sample_rate: f32, _block_size: usize) {}
        fn process(
            &mut self,
            buffer: &mut [f32],
            _ctx: &mut ProcessContext<'_>,
        ) -> Result<(), PluginError> {
            for s in buffer.iter_mut() {
                *s *= self.factor;
            }
            if self.fail {
                Err(PluginError::Failed("test"))
            } else {
                Ok(())
            }
        }
    }

    fn slot(factor: f32, fail: bool) -> PluginSlot {
        PluginSlot::new(1, Box::new(Scale { factor, fail }), 4)
    }

    fn run(slot: &PluginSlot, buffer: &mut [f32], container_bypassed: bool) -> SlotOutcome {
        let mut buses = BusBuffers::new(1, 4);
        let mut ctx = ProcessContext::new(48000.0, 0, &mut buses);
        slot.process(buffer, &mut ctx, container_bypassed)
    }

    #[test]
    fn test_processes_in_place() {
        let s = slot(2.0, false);
        let mut buffer = [0.25; 4];
        assert_eq!(run(&s, &mut buffer, false), SlotOutcome::Processed);
        assert_eq!(buffer, [0.5; 4]);
        assert!((s.meter().reading().peak - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_bypass_flags() {
        let s = slot(2.0, false);
        let mut buffer = [0.25; 4];
        assert_eq!(run(&s, &mut buffer, true), SlotOutcome::Bypassed);
        s.set_bypassed(true);
        assert_eq!(run(&s, &mut buffer, false), SlotOutcome::Bypassed);
        assert_eq!(buffer, [0.25; 4]);
    }

    #[test]
    fn test_error_restores_block() {
        let s = slot(3.0, true);
        let mut buffer = [0.1, 0.2, 0.3, 0.4];
        assert_eq!(run(&s, &mut buffer, false), SlotOutcome::Faulted);
        assert_eq!(buffer, [0.1, 0.2, 0.3, 0.4]);
        assert_eq!(s.fault_count(), 1);
    }

    #[test]
    fn test_non_finite_output_restores_block() {
        let s = slot(f32::INFINITY, false);
        let mut buffer = [0.5; 4];
        assert_eq!(run(&s, &mut buffer, false), SlotOutcome::Faulted);
        assert_eq!(buffer, [0.5; 4]);
    }

    #[test]
    fn test_oversized_block_faults_without_allocating() {
        let s = slot(2.0, false);
        let mut buffer = [0.5; 8];
        let mut buses = BusBuffers::new(1, 8);
        let mut ctx = ProcessContext::new(48000.0, 0, &mut buses);
        assert_eq!(s.process(&mut buffer, &mut ctx, false), SlotOutcome::Faulted);
        assert_eq!(buffer, [0.5; 8]);
    }

    #[test]
    fn test_contended_slot_is_skipped() {
        let s = slot(2.0, false);
        let guard = s.dsp.lock();
        let mut buffer = [0.5; 4];
        assert_eq!(run(&s, &mut buffer, false), SlotOutcome::Contended);
        drop(guard);
        assert_eq!(buffer, [0.5; 4]);
        assert_eq!(s.contended_count(), 1);
    }

    #[test]
    fn test_dispose_runs_once() {
        let s = slot(1.0, false);
        assert!(!s.is_disposed());
        s.dispose();
        s.dispose();
        assert!(s.is_disposed());
    }

    #[test]
    fn test_spectral_delta_toggle() {
        let s = slot(0.5, false);
        assert!(s.spectral_deltas().is_none());
        s.set_spectral_delta(Some(48000.0));
        let mut buffer = [0.5, -0.5, 0.5, -0.5];
        run(&s, &mut buffer, false);
        assert!(s.spectral_deltas().is_some());
        s.set_spectral_delta(None);
        assert!(s.spectral_deltas().is_none());
    }
}
