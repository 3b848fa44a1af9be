use std::sync::Arc;

use parking_lot::Mutex;

use super::*;
use crate::ParameterInfo;
use crate::config::PluginConfig;
use crate::plugin::{OutputMode, PluginCommand};
use crate::plugins::{GainPlugin, NoiseGate};
use crate::routing::{BusInput, ChannelMerge, InputSource, OutputSend};

const BLOCK: usize = 32;

fn engine() -> (Engine, AudioProcessor) {
    Engine::new(EngineSettings::default().with_block_size(BLOCK).with_max_channels(4))
}

fn gain(db: f32) -> Box<GainPlugin> {
    let mut g = GainPlugin::new();
    g.set_param(0, db);
    Box::new(g)
}

fn run(processor: &mut AudioProcessor, input: f32) -> (Vec<f32>, Vec<f32>) {
    let mic = vec![input; BLOCK];
    let mut left = vec![0.0; BLOCK];
    let mut right = vec![0.0; BLOCK];
    processor.process(&[&mic], &mut left, &mut right);
    (left, right)
}

/// Channel with a device input and an output send.
fn mic_channel(engine: &mut Engine, name: &str) -> (usize, i32, i32) {
    let ch = engine.add_channel(name).unwrap();
    let input = engine.insert_plugin(ch, Box::new(InputSource::new(0)), 0).unwrap();
    let send = engine
        .insert_plugin(ch, Box::new(OutputSend::new(OutputMode::Both)), 9)
        .unwrap();
    (ch, input, send)
}

// --- channels ---

#[test]
fn test_channel_limit() {
    let (mut engine, _p) = engine();
    for i in 0..4 {
        assert_eq!(engine.add_channel("ch").unwrap(), i);
    }
    assert_eq!(
        engine.add_channel("one too many"),
        Err(GraphError::ChannelLimit { max: 4 })
    );
}

#[test]
fn test_passthrough_with_strip_gain() {
    let (mut engine, mut processor) = engine();
    let (ch, _, _) = mic_channel(&mut engine, "Mic");
    engine.maintain();

    let (left, right) = run(&mut processor, 0.25);
    assert_eq!(left, vec![0.25; BLOCK]);
    assert_eq!(right, vec![0.25; BLOCK]);

    engine
        .enqueue_parameter_change(ParameterChange::output_gain_db(ch, -6.0206))
        .unwrap();
    assert!((engine.graph(ch).unwrap().config().output_gain_db + 6.0206).abs() < 1e-6);
    let (left, _) = run(&mut processor, 0.25);
    assert!((left[0] - 0.125).abs() < 1e-4);
    assert!(engine.channel_meter(ch).unwrap().peak > 0.12);
}

#[test]
fn test_solo_silences_other_sends() {
    let (mut engine, mut processor) = engine();
    let (mic, _, _) = mic_channel(&mut engine, "Mic");
    let other = engine.add_channel("Other").unwrap();
    engine.maintain();

    engine
        .enqueue_parameter_change(ParameterChange::solo(other, true))
        .unwrap();
    let (left, _) = run(&mut processor, 0.5);
    assert!(left.iter().all(|&s| s == 0.0));

    engine
        .enqueue_parameter_change(ParameterChange::solo(mic, true))
        .unwrap();
    let (left, _) = run(&mut processor, 0.5);
    assert_eq!(left[0], 0.5);
}

#[test]
fn test_mute() {
    let (mut engine, mut processor) = engine();
    let (mic, _, _) = mic_channel(&mut engine, "Mic");
    engine
        .enqueue_parameter_change(ParameterChange::mute(mic, true))
        .unwrap();
    let (left, _) = run(&mut processor, 0.5);
    assert!(left.iter().all(|&s| s == 0.0));
    assert!(engine.graph(mic).unwrap().config().muted);
}

// --- routing ---

#[test]
fn test_bus_source_processed_first() {
    let (mut engine, mut processor) = engine();
    // Channel 0 listens to channel 1.
    let listener = engine.add_channel("Listener").unwrap();
    let source = engine.add_channel("Source").unwrap();
    engine
        .insert_plugin(listener, Box::new(BusInput::bus(Some(source))), 0)
        .unwrap();
    engine
        .insert_plugin(listener, Box::new(OutputSend::default()), 1)
        .unwrap();
    engine
        .insert_plugin(source, Box::new(InputSource::new(0)), 0)
        .unwrap();
    engine.insert_plugin(source, gain(-6.0206), 1).unwrap();

    let plan = engine.rebuild_routing_graph();
    assert_eq!(plan.processing_order, vec![source, listener]);
    assert!(plan.diagnostic.is_none());

    let (left, _) = run(&mut processor, 1.0);
    assert!((left[0] - 0.5).abs() < 1e-4, "listener hears this block's source");
}

#[test]
fn test_cycle_rejected_on_insert() {
    let (mut engine, _p) = engine();
    let a = engine.add_channel("A").unwrap();
    let b = engine.add_channel("B").unwrap();
    engine
        .insert_plugin(a, Box::new(BusInput::bus(Some(b))), 0)
        .unwrap();
    let err = engine
        .insert_plugin(b, Box::new(ChannelMerge::new(&[a])), 0)
        .unwrap_err();
    assert_eq!(err, GraphError::RoutingCycle { from: a, to: b });
    assert!(engine.graph(b).unwrap().instance_ids().is_empty());
}

#[test]
fn test_routing_parameter_is_a_topology_edit() {
    let (mut engine, _p) = engine();
    let a = engine.add_channel("A").unwrap();
    let b = engine.add_channel("B").unwrap();
    engine
        .insert_plugin(a, Box::new(BusInput::bus(Some(b))), 0)
        .unwrap();
    let merge = engine
        .insert_plugin(b, Box::new(ChannelMerge::new(&[])), 0)
        .unwrap();
    engine.maintain();

    let err = engine
        .enqueue_parameter_change(ParameterChange::plugin_parameter(b, merge, 0, a as f32))
        .unwrap_err();
    assert_eq!(err, GraphError::RoutingCycle { from: a, to: b });
    assert_eq!(engine.routing_edges(), vec![(b, a)]);

    let c = engine.add_channel("C").unwrap();
    engine.maintain();
    engine
        .enqueue_parameter_change(ParameterChange::plugin_parameter(b, merge, 0, c as f32))
        .unwrap();
    assert_eq!(engine.routing().state(), RoutingState::Stale);
    assert_eq!(engine.graph(b).unwrap().config().plugin(merge).unwrap().params[0], 2.0);
    assert!(engine.maintain().rebuilt);
    assert_eq!(engine.routing().plan().processing_order, vec![2, 1, 0]);
}

#[test]
fn test_remove_channel_remaps_references() {
    let (mut engine, _p) = engine();
    let a = engine.add_channel("A").unwrap();
    let c = engine.add_channel("C").unwrap();
    let b = engine.add_channel("B").unwrap();
    let bus = engine
        .insert_plugin(b, Box::new(BusInput::bus(Some(c))), 0)
        .unwrap();
    engine
        .insert_plugin(a, Box::new(InputSource::new(0)), 0)
        .unwrap();
    engine.rebuild_routing_graph();

    let removed = engine.remove_channel(a).unwrap();
    assert_eq!(removed, vec![1]);
    assert_eq!(engine.channel_count(), 2);
    assert_eq!(engine.graph(1).unwrap().config().name, "B");

    let slot = engine.graph(1).unwrap().chain().try_get_slot_by_id(bus).unwrap();
    let ports = slot.capabilities().routing.clone().unwrap();
    assert_eq!(ports.get(0), Some(0), "C shifted down to index 0");
    assert_eq!(engine.graph(1).unwrap().config().plugin(bus).unwrap().params, vec![0.0]);
    assert_eq!(engine.routing().plan().processing_order, vec![0, 1]);
    assert_eq!(engine.routing().state(), RoutingState::Valid);
}

#[test]
fn test_removing_the_source_channel_points_at_first_remaining() {
    let (mut engine, _p) = engine();
    let a = engine.add_channel("A").unwrap();
    let b = engine.add_channel("B").unwrap();
    let bus = engine
        .insert_plugin(b, Box::new(BusInput::bus(Some(a))), 0)
        .unwrap();
    engine.remove_channel(a).unwrap();

    let slot = engine.graph(0).unwrap().chain().try_get_slot_by_id(bus).unwrap();
    assert_eq!(slot.capabilities().routing.as_ref().unwrap().get(0), Some(0));
    assert!(engine.routing_edges().is_empty(), "self reference is not an edge");
}

// --- output sends ---

#[test]
fn test_single_active_output_send() {
    let (mut engine, _p) = engine();
    let (a, _, send_a) = mic_channel(&mut engine, "A");
    let (b, _, send_b) = mic_channel(&mut engine, "B");

    let slot_a = engine.graph(a).unwrap().chain().try_get_slot_by_id(send_a).unwrap();
    let slot_b = engine.graph(b).unwrap().chain().try_get_slot_by_id(send_b).unwrap();
    assert!(slot_a.is_bypassed(), "newest send wins");
    assert!(!slot_b.is_bypassed());
    assert!(engine.graph(a).unwrap().config().plugin(send_a).unwrap().bypassed);

    engine
        .enqueue_parameter_change(ParameterChange::plugin_bypass(a, send_a, false))
        .unwrap();
    assert!(slot_b.is_bypassed());
    assert!(engine.graph(b).unwrap().config().plugin(send_b).unwrap().bypassed);
}

// --- parameters ---

#[test]
fn test_parameter_applied_at_block_boundary() {
    let (mut engine, mut processor) = engine();
    let ch = engine.add_channel("Mic").unwrap();
    let id = engine.insert_plugin(ch, gain(0.0), 0).unwrap();
    let slot = engine.graph(ch).unwrap().chain().try_get_slot_by_id(id).unwrap();

    engine
        .enqueue_parameter_change(ParameterChange::plugin_parameter(ch, id, 0, -12.0))
        .unwrap();
    assert_eq!(engine.graph(ch).unwrap().config().plugin(id).unwrap().params[0], -12.0);
    assert_eq!(slot.with_plugin(|p| p.get_param(0)), 0.0);

    run(&mut processor, 0.0);
    assert_eq!(slot.with_plugin(|p| p.get_param(0)), -12.0);
}

#[test]
fn test_invalid_changes_rejected() {
    let (mut engine, _p) = engine();
    let ch = engine.add_channel("Mic").unwrap();
    let id = engine.insert_plugin(ch, gain(0.0), 0).unwrap();
    assert_eq!(
        engine.enqueue_parameter_change(ParameterChange::mute(7, true)),
        Err(GraphError::ChannelNotFound(7))
    );
    assert_eq!(
        engine.enqueue_parameter_change(ParameterChange::plugin_parameter(ch, 99, 0, 1.0)),
        Err(GraphError::PluginNotFound(99))
    );
    assert_eq!(
        engine.enqueue_parameter_change(ParameterChange::plugin_parameter(ch, id, 5, 1.0)),
        Err(GraphError::ParameterOutOfRange {
            instance_id: id,
            index: 5
        })
    );
}

#[test]
fn test_contended_plugin_change_is_deferred() {
    let (mut engine, mut processor) = engine();
    let ch = engine.add_channel("Mic").unwrap();
    let id = engine.insert_plugin(ch, gain(0.0), 0).unwrap();
    let slot = engine.graph(ch).unwrap().chain().try_get_slot_by_id(id).unwrap();

    engine
        .enqueue_parameter_change(ParameterChange::plugin_parameter(ch, id, 0, -3.0))
        .unwrap();
    engine
        .enqueue_parameter_change(ParameterChange::plugin_parameter(ch, id, 1, 1.0))
        .unwrap();
    slot.with_plugin(|_| run(&mut processor, 0.0));
    assert_eq!(processor.deferred_changes(), 2);

    run(&mut processor, 0.0);
    assert_eq!(processor.deferred_changes(), 0);
    assert_eq!(slot.with_plugin(|p| (p.get_param(0), p.get_param(1))), (-3.0, 1.0));
    assert_eq!(engine.channel(ch).unwrap().contended_slots(), 1);
}

#[test]
fn test_command_reaches_plugin() {
    let (mut engine, mut processor) = engine();
    let ch = engine.add_channel("Mic").unwrap();
    engine
        .insert_plugin(ch, Box::new(InputSource::new(0)), 0)
        .unwrap();
    let gate = engine.insert_plugin(ch, Box::new(NoiseGate::new()), 1).unwrap();
    let toggle = ParameterChange::plugin_command(ch, gate, PluginCommand::ToggleNoiseLearn);

    engine.enqueue_parameter_change(toggle).unwrap();
    run(&mut processor, 0.01);
    engine.enqueue_parameter_change(toggle).unwrap();
    run(&mut processor, 0.01);

    let slot = engine.graph(ch).unwrap().chain().try_get_slot_by_id(gate).unwrap();
    let threshold = slot.with_plugin(|p| p.get_param(0));
    assert!(threshold > -50.0, "learned threshold {threshold}");
}

// --- disposal ---

#[test]
fn test_removed_plugin_disposed_after_block() {
    let (mut engine, mut processor) = engine();
    let ch = engine.add_channel("Mic").unwrap();
    let id = engine.insert_plugin(ch, gain(0.0), 0).unwrap();
    run(&mut processor, 0.0);

    engine.remove_plugin(ch, id).unwrap();
    assert_eq!(engine.disposal().pending_instance_ids(), vec![id]);
    let done = engine.maintain();
    assert_eq!(done.disposed, 1);
    assert_eq!(engine.disposal().disposed_count(), 1);
}

#[test]
fn test_device_input_keeps_position_zero() {
    let (mut engine, mut processor) = engine();
    let (ch, input, send) = mic_channel(&mut engine, "Mic");
    let g = engine.insert_plugin(ch, gain(-6.0206), 0).unwrap();
    assert_eq!(engine.graph(ch).unwrap().instance_ids(), vec![input, g, send]);

    engine.move_plugin(ch, input, 2).unwrap();
    assert_eq!(engine.graph(ch).unwrap().instance_ids(), vec![input, g, send]);
    engine.maintain();
    let (left, _) = run(&mut processor, 1.0);
    assert!((left[0] - 0.5).abs() < 1e-4, "gain runs on the device signal");
}

// --- analysis tap ---

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<(Vec<f32>, Vec<i32>, CaptureSource, Option<usize>)>>>);

impl CaptureSink for Recorder {
    fn capture(&mut self, block: &[f32], meta: &CaptureMeta<'_>) {
        self.0
            .lock()
            .push((block.to_vec(), meta.producers.to_vec(), meta.source, meta.bus));
    }
}

#[test]
fn test_tap_split_and_output() {
    let (mut engine, mut processor) = engine();
    let (ch, input, send) = mic_channel(&mut engine, "Mic");
    let g = engine.insert_plugin(ch, gain(-6.0206), 1).unwrap();
    let recorder = Recorder::default();
    processor.set_capture_sink(Box::new(recorder.clone()));

    engine
        .set_analysis_tap(RoutingConfig {
            tap_channel: ch,
            tap: TapPoint::Plugin { instance_id: input },
        })
        .unwrap();
    let (left, _) = run(&mut processor, 0.5);
    assert!((left[0] - 0.25).abs() < 1e-4);

    engine.set_analysis_tap(RoutingConfig::default()).unwrap();
    run(&mut processor, 0.5);

    let captured = recorder.0.lock();
    assert_eq!(captured.len(), 2);
    assert_eq!(captured[0].0, vec![0.5; BLOCK], "split sees pre-gain signal");
    assert_eq!(captured[0].1, vec![input]);
    assert_eq!(captured[0].2, CaptureSource::Plugin);
    assert_eq!(captured[0].3, None);
    assert!((captured[1].0[0] - 0.25).abs() < 1e-4);
    assert_eq!(captured[1].1, vec![input, g, send]);
    assert_eq!(captured[1].2, CaptureSource::Output);
}

#[test]
fn test_tap_block_is_unaffected_by_later_plugins() {
    let (mut engine, mut processor) = engine();
    let (ch, _input, _send) = mic_channel(&mut engine, "Mic");
    let first = engine.insert_plugin(ch, gain(-6.0206), 1).unwrap();
    engine.insert_plugin(ch, gain(-6.0206), 2).unwrap();
    let recorder = Recorder::default();
    processor.set_capture_sink(Box::new(recorder.clone()));
    engine
        .set_analysis_tap(RoutingConfig {
            tap_channel: ch,
            tap: TapPoint::Plugin { instance_id: first },
        })
        .unwrap();

    let (left, _) = run(&mut processor, 1.0);
    assert!((left[0] - 0.25).abs() < 1e-4, "both gains reach the output");
    let (left, _) = run(&mut processor, 0.5);
    assert!((left[0] - 0.125).abs() < 1e-4);

    let captured = recorder.0.lock();
    assert_eq!(captured.len(), 2);
    for (block, expected) in captured.iter().zip([0.5, 0.25]) {
        assert_eq!(block.0.len(), BLOCK);
        assert!(block.0.iter().all(|&v| (v - expected).abs() < 1e-4));
    }
}

#[test]
fn test_tap_validation() {
    let (mut engine, _p) = engine();
    let ch = engine.add_channel("Mic").unwrap();
    assert_eq!(
        engine.set_analysis_tap(RoutingConfig {
            tap_channel: 3,
            tap: TapPoint::Output
        }),
        Err(GraphError::ChannelNotFound(3))
    );
    assert_eq!(
        engine.set_analysis_tap(RoutingConfig {
            tap_channel: ch,
            tap: TapPoint::Plugin { instance_id: 4 }
        }),
        Err(GraphError::PluginNotFound(4))
    );
}

// --- persistence and restart ---

#[test]
fn test_restore_channel_loads_strip() {
    let (mut engine, mut processor) = engine();
    let registry = PluginRegistry::new();
    let mut config = ChannelConfig::new("Saved")
        .with_plugin(PluginConfig::new(3, "input_source"))
        .with_plugin(PluginConfig::new(7, "output_send"));
    config.input_gain_db = -6.0206;

    let ch = engine.restore_channel(&config, &registry).unwrap();
    assert_eq!(engine.graph(ch).unwrap().instance_ids(), vec![3, 7]);
    let (left, _) = run(&mut processor, 1.0);
    assert!((left[0] - 0.5).abs() < 1e-4);

    let saved = engine.channel_configs();
    assert_eq!(saved[0].input_gain_db, config.input_gain_db);
    assert_eq!(saved[0].plugins.len(), 2);
}

#[test]
fn test_reinitialize_keeps_chains() {
    let (mut engine, processor) = engine();
    let (ch, input, send) = mic_channel(&mut engine, "Mic");
    engine
        .enqueue_parameter_change(ParameterChange::input_gain_db(ch, -6.0206))
        .unwrap();

    let (engine, mut processor) =
        engine.reinitialize(processor, EngineSettings::default().with_block_size(64));
    assert_eq!(engine.settings().block_size, 64);
    assert_eq!(engine.graph(ch).unwrap().instance_ids(), vec![input, send]);
    assert_eq!(engine.routing().state(), RoutingState::Valid);

    let mic = vec![1.0; 64];
    let (mut left, mut right) = (vec![0.0; 64], vec![0.0; 64]);
    processor.process(&[&mic], &mut left, &mut right);
    assert!((left[63] - 0.5).abs() < 1e-4, "queued strip change survived the restart");
}

#[test]
fn test_oversized_output_counts_underflow() {
    let (mut engine, mut processor) = engine();
    mic_channel(&mut engine, "Mic");
    let mic = vec![1.0; BLOCK];
    let (mut left, mut right) = (vec![9.0; BLOCK + 8], vec![9.0; BLOCK + 8]);
    processor.process(&[&mic], &mut left, &mut right);
    assert_eq!(&left[BLOCK..], &[0.0; 8]);
    assert_eq!(engine.diagnostics().snapshot().output_underflow_samples, 8);
}

#[test]
fn test_latency_includes_output_buffer() {
    let settings = EngineSettings {
        output_latency_samples: 128,
        ..EngineSettings::default()
    };
    let (mut engine, _p) = Engine::new(settings);
    assert_eq!(engine.latency_samples(), 128);
    mic_channel(&mut engine, "Mic");
    assert_eq!(engine.latency_samples(), 128);
}
