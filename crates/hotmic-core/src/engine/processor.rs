//! The audio-thread half of the engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::TapPoint;
use crate::param_info::ParameterInfo;
use crate::plugin::{InputKind, ProcessContext};
use crate::queue::{ParameterChange, ParameterKind, ParameterReceiver};
use crate::routing::BusBuffers;

use super::capture::{CaptureMeta, CaptureSink, CaptureSource};
use super::runtime::ChannelRuntime;
use super::Shared;

/// Upper bound on producers reported with a captured block.
const MAX_PRODUCERS: usize = 64;

enum Applied {
    Done,
    Contended,
}

fn apply_change(channels: &[Arc<ChannelRuntime>], change: &ParameterChange) -> Applied {
    let Some(rt) = channels.get(change.channel) else {
        return Applied::Done;
    };
    match change.kind {
        ParameterKind::InputGainDb => rt.set_input_gain_db(change.value),
        ParameterKind::OutputGainDb => rt.set_output_gain_db(change.value),
        ParameterKind::Mute => rt.set_muted(change.is_on()),
        ParameterKind::Solo => rt.set_soloed(change.is_on()),
        ParameterKind::PluginParameter
        | ParameterKind::PluginBypass
        | ParameterKind::PluginCommand => {
            let snapshot = rt.chain().get_snapshot();
            let Some((_, entry)) = snapshot.find(change.plugin_instance_id) else {
                return Applied::Done;
            };
            if change.kind == ParameterKind::PluginBypass {
                entry.slot.set_bypassed(change.is_on());
                return Applied::Done;
            }
            let applied = entry.slot.try_with_plugin(|plugin| {
                if change.kind == ParameterKind::PluginCommand {
                    plugin.handle_command(change.command);
                } else {
                    plugin.set_param(change.parameter_index, change.value);
                }
            });
            if applied.is_none() {
                return Applied::Contended;
            }
        }
    }
    Applied::Done
}

fn same_target(a: &ParameterChange, b: &ParameterChange) -> bool {
    a.channel == b.channel && a.plugin_instance_id == b.plugin_instance_id && a.plugin_instance_id != 0
}

/// Holds back plugin changes whose plugin was locked, keeping per-plugin order.
struct Deferral<'a> {
    pending: &'a mut Vec<ParameterChange>,
    dropped: &'a AtomicU64,
}

impl Deferral<'_> {
    fn apply(&mut self, channels: &[Arc<ChannelRuntime>], change: ParameterChange) {
        let queued_behind = self.pending.iter().any(|p| same_target(p, &change));
        if queued_behind || matches!(apply_change(channels, &change), Applied::Contended) {
            if self.pending.len() < self.pending.capacity() {
                self.pending.push(change);
            } else {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Processes one callback at a time on the audio thread.
///
/// Created together with its [`Engine`](super::Engine). Each
/// [`process`](Self::process) call drains the parameter queue, walks the
/// channels in routing order and writes the stereo output mix. Nothing here
/// allocates, locks or blocks once constructed.
pub struct AudioProcessor {
    shared: Arc<Shared>,
    receiver: ParameterReceiver,
    buses: BusBuffers,
    scratch: Vec<f32>,
    tapped: Vec<f32>,
    deferred: Vec<ParameterChange>,
    retry: Vec<ParameterChange>,
    producers: Vec<i32>,
    capture: Option<Box<dyn CaptureSink>>,
    sample_rate: f32,
    block_size: usize,
    sample_time: i64,
}

impl std::fmt::Debug for AudioProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioProcessor")
            .field("sample_rate", &self.sample_rate)
            .field("block_size", &self.block_size)
            .field("sample_time", &self.sample_time)
            .field("capture", &self.capture.is_some())
            .finish_non_exhaustive()
    }
}

impl AudioProcessor {
    pub(crate) fn new(
        shared: Arc<Shared>,
        receiver: ParameterReceiver,
        max_channels: usize,
        sample_rate: f32,
        block_size: usize,
        deferred_capacity: usize,
    ) -> Self {
        Self {
            shared,
            receiver,
            buses: BusBuffers::new(max_channels, block_size),
            scratch: vec![0.0; block_size],
            tapped: vec![0.0; block_size],
            deferred: Vec::with_capacity(deferred_capacity),
            retry: Vec::with_capacity(deferred_capacity),
            producers: Vec::with_capacity(MAX_PRODUCERS),
            capture: None,
            sample_rate,
            block_size,
            sample_time: 0,
        }
    }

    /// Install the analysis tap consumer, returning the previous one.
    pub fn set_capture_sink(&mut self, sink: Box<dyn CaptureSink>) -> Option<Box<dyn CaptureSink>> {
        self.capture.replace(sink)
    }

    /// Remove the analysis tap consumer.
    pub fn take_capture_sink(&mut self) -> Option<Box<dyn CaptureSink>> {
        self.capture.take()
    }

    /// Engine sample rate.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Maximum samples per block.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Samples processed since construction.
    pub fn sample_time(&self) -> i64 {
        self.sample_time
    }

    /// Plugin changes waiting for a contended plugin.
    pub fn deferred_changes(&self) -> usize {
        self.deferred.len()
    }

    fn apply_pending(&mut self, channels: &[Arc<ChannelRuntime>]) {
        std::mem::swap(&mut self.deferred, &mut self.retry);
        let mut deferral = Deferral {
            pending: &mut self.deferred,
            dropped: &self.shared.deferred_dropped,
        };
        for change in self.retry.drain(..) {
            deferral.apply(channels, change);
        }
        self.receiver
            .drain(|change| deferral.apply(channels, change));
    }

    /// Apply everything still queued. Used while the callback is stopped.
    pub(crate) fn apply_all_pending(&mut self) {
        let channels = self.shared.channels.load_full();
        for _ in 0..=self.deferred.capacity() {
            self.apply_pending(&channels);
            if self.receiver.is_empty() && self.deferred.is_empty() {
                break;
            }
        }
    }

    /// Process one callback.
    ///
    /// `inputs[d]` is capture device `d`'s block. Output slices longer than
    /// the block size are zero-filled past it and counted as output underflow.
    pub fn process(&mut self, inputs: &[&[f32]], out_left: &mut [f32], out_right: &mut [f32]) {
        let shared = Arc::clone(&self.shared);
        let block = shared.clock.begin_block();
        shared.routing.note_block();

        let channels = shared.channels.load();
        self.apply_pending(&channels);

        let requested = out_left.len().min(out_right.len());
        let frames = requested.min(self.block_size);
        self.buses.begin_block(frames);

        let plan = shared.routing.current();
        let tap = shared.tap.load();
        let any_solo = channels.iter().any(|c| c.is_soloed());
        // Channels added after the plan was built run last, in index order.
        let unplanned = plan.channel_count.min(channels.len())..channels.len();

        for ch in plan.processing_order.iter().copied().chain(unplanned) {
            let Some(rt) = channels.get(ch) else { continue };
            let buffer = &mut self.scratch[..frames];
            buffer.fill(0.0);

            let output_gain = rt.output_gain();
            let mut ctx = ProcessContext {
                sample_rate: self.sample_rate,
                sample_time: self.sample_time,
                channel: ch,
                input_gain: rt.input_gain(),
                output_gain,
                output_enabled: !rt.is_muted() && (!any_solo || rt.is_soloed()),
                device_inputs: inputs,
                buses: &mut self.buses,
            };

            let run = match self.capture.as_deref_mut() {
                Some(sink) if tap.tap_channel == ch => {
                    let snapshot = rt.chain().get_snapshot();
                    let (split, source) = match tap.tap {
                        TapPoint::Plugin { instance_id } => match snapshot.find(instance_id) {
                            Some((position, _)) => (position, CaptureSource::Plugin),
                            None => (usize::MAX, CaptureSource::Output),
                        },
                        TapPoint::Output => (usize::MAX, CaptureSource::Output),
                    };

                    self.producers.clear();
                    for (position, entry) in snapshot.entries().iter().enumerate() {
                        if position > split || self.producers.len() == self.producers.capacity() {
                            break;
                        }
                        if let Some(entry) = entry {
                            if !entry.is_bypassed() {
                                self.producers.push(entry.slot.instance_id());
                            }
                        }
                    }

                    let bus = snapshot
                        .slots()
                        .next()
                        .filter(|s| s.capabilities().input.is_some_and(InputKind::is_pinned))
                        .and_then(|s| s.capabilities().routing.as_ref())
                        .and_then(|ports| ports.get(0));

                    let meta = CaptureMeta {
                        sample_clock: block,
                        sample_time: self.sample_time,
                        channel: ch,
                        bus,
                        producers: &self.producers,
                        source,
                    };
                    let tapped = &mut self.tapped;
                    let mut copied = None;
                    let run = rt.chain().process_with_split(buffer, &mut ctx, split, &mut |view| {
                        tapped[..view.len()].copy_from_slice(view);
                        copied = Some(view.len());
                    });
                    if let Some(len) = copied {
                        sink.capture(&self.tapped[..len], &meta);
                    }
                    run
                }
                _ => rt.chain().process(buffer, &mut ctx),
            };
            rt.record(run);

            self.buses.publish_channel_output(ch, buffer, output_gain);
            if let Some(published) = self.buses.channel_output(ch) {
                rt.level_meter().update(published);
            }
        }

        let (left, right) = self.buses.output();
        out_left[..frames].copy_from_slice(left);
        out_right[..frames].copy_from_slice(right);
        out_left[frames..].fill(0.0);
        out_right[frames..].fill(0.0);
        if requested > frames {
            shared
                .diagnostics
                .add_output_underflow((requested - frames) as u64);
        }

        self.sample_time += frames as i64;
        shared.clock.end_block(block);
    }
}
