//! Property-based tests for hotmic-core routing, queueing and engine invariants.
//!
//! Randomized channel graphs check the processing order, randomized change
//! streams check that coalescing never loses the latest value, and randomized
//! edit sequences check the cross-channel engine rules.

use proptest::prelude::*;
use hotmic_core::routing::{InputSource, OutputSend, order_with_fallback, topological_order};
use hotmic_core::{
    Engine, EngineSettings, OutputMode, ParameterChange, ParameterInfo, Plugin, PluginRegistry,
    parameter_queue,
};

/// Edges of a random DAG: only from earlier to later entries of `permutation`.
fn dag_edges(permutation: &[usize], picks: &[(usize, usize)]) -> Vec<(usize, usize)> {
    picks
        .iter()
        .filter(|(a, b)| a != b)
        .map(|&(a, b)| {
            let (lo, hi) = if a < b { (a, b) } else { (b, a) };
            (permutation[lo], permutation[hi])
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Every acyclic edge set produces an order in which each source runs
    /// before its consumer.
    #[test]
    fn topological_order_respects_edges(
        permutation in Just((0..8usize).collect::<Vec<_>>()).prop_shuffle(),
        picks in prop::collection::vec((0usize..8, 0usize..8), 0..20),
    ) {
        let edges = dag_edges(&permutation, &picks);
        let order = topological_order(8, &edges).unwrap();
        let position = |ch: usize| order.iter().position(|&c| c == ch).unwrap();
        for &(from, to) in &edges {
            prop_assert!(position(from) < position(to), "edge {}->{} in {:?}", from, to, order);
        }
    }

    /// With arbitrary edges (cycles included) the fallback order is always a
    /// permutation of every channel.
    #[test]
    fn fallback_order_is_a_permutation(
        count in 1usize..10,
        edges in prop::collection::vec((0usize..12, 0usize..12), 0..30),
    ) {
        let (mut order, _) = order_with_fallback(count, &edges);
        order.sort_unstable();
        prop_assert_eq!(order, (0..count).collect::<Vec<_>>());
    }

    /// However the transport overflows, the last value sent for each channel
    /// is the one the audio side ends up with.
    #[test]
    fn coalescing_keeps_latest_value(
        changes in prop::collection::vec((0usize..4, -60.0f32..12.0), 1..80),
    ) {
        let (tx, rx) = parameter_queue(4, 128);
        let mut applied = [f32::NAN; 4];
        let mut expected = [f32::NAN; 4];
        for &(channel, db) in &changes {
            tx.enqueue(ParameterChange::input_gain_db(channel, db)).unwrap();
            expected[channel] = db;
        }
        loop {
            rx.drain(|c| applied[c.channel] = c.value);
            if tx.flush().unwrap() == 0 && rx.is_empty() {
                break;
            }
        }
        for ch in 0..4 {
            prop_assert!(
                applied[ch].to_bits() == expected[ch].to_bits(),
                "channel {}: applied {} expected {}", ch, applied[ch], expected[ch]
            );
        }
    }

    /// Any parameter value keeps every registered plugin's output finite.
    #[test]
    fn registered_plugins_stay_finite(
        values in prop::collection::vec(-1000.0f32..1000.0, 8),
        input in prop::array::uniform32(-1.0f32..=1.0f32),
    ) {
        let registry = PluginRegistry::new();
        for descriptor in registry.all() {
            let Some(mut plugin) = registry.create(descriptor.id) else { continue };
            plugin.initialize(48000.0, 32);
            for (i, &v) in values.iter().enumerate().take(plugin.param_count()) {
                if let Some(info) = plugin.param_info(i) {
                    if !info.is_routing() {
                        plugin.set_param(i, v);
                    }
                }
            }
            let mut buffer = input;
            let mut buses = hotmic_core::BusBuffers::new(2, 32);
            let mut ctx = hotmic_core::ProcessContext::new(48000.0, 0, &mut buses);
            if plugin.process(&mut buffer, &mut ctx).is_ok() {
                prop_assert!(
                    buffer.iter().all(|s| s.is_finite()),
                    "{} produced non-finite output", descriptor.id
                );
            }
        }
    }

    /// Random inserts (loose or into a container) and removals never produce
    /// two live slots with one ID, never hand out an ID twice, and never
    /// leave a container pointing at a removed slot.
    #[test]
    fn instance_ids_stay_unique(
        ops in prop::collection::vec((0u8..3, 0usize..8), 1..40),
    ) {
        let registry = PluginRegistry::new();
        let (mut engine, _processor) = Engine::new(EngineSettings::default().with_block_size(32));
        let ch = engine.add_channel("ch").unwrap();
        let container = engine.create_container(ch, "group").unwrap();
        let mut issued = std::collections::HashSet::new();

        for &(op, pick) in &ops {
            let live = engine.graph(ch).unwrap().instance_ids();
            let new_id = match op {
                0 => Some(engine.insert_plugin_by_id(ch, &registry, "gain", pick).unwrap()),
                1 => {
                    let plugin = registry.create("gain").unwrap();
                    Some(engine.insert_plugin_into_container(ch, plugin, container, pick).unwrap())
                }
                _ => {
                    if !live.is_empty() {
                        engine.remove_plugin(ch, live[pick % live.len()]).unwrap();
                    }
                    None
                }
            };
            if let Some(id) = new_id {
                prop_assert!(id > 0);
                prop_assert!(issued.insert(id), "id {} issued twice", id);
            }

            let graph = engine.graph(ch).unwrap();
            let mut live = graph.instance_ids();
            let count = live.len();
            live.sort_unstable();
            live.dedup();
            prop_assert_eq!(live.len(), count);
            for member in &graph.container(container).unwrap().members {
                prop_assert!(live.binary_search(member).is_ok(), "dangling member {}", member);
            }
            engine.maintain();
        }
    }

    /// Whatever order output sends are added and re-enabled in, at most one
    /// stays active.
    #[test]
    fn at_most_one_active_output_send(
        ops in prop::collection::vec((0usize..4, any::<bool>()), 1..24),
    ) {
        let (mut engine, _processor) =
            Engine::new(EngineSettings::default().with_block_size(32).with_max_channels(4));
        let mut sends = [None; 4];
        for ch in 0..4 {
            engine.add_channel("ch").unwrap();
            engine.insert_plugin(ch, Box::new(InputSource::new(0)), 0).unwrap();
        }
        for &(ch, add) in &ops {
            match (sends[ch], add) {
                (None, _) => {
                    let id = engine
                        .insert_plugin(ch, Box::new(OutputSend::new(OutputMode::Both)), 1)
                        .unwrap();
                    sends[ch] = Some(id);
                }
                (Some(id), enable) => {
                    engine
                        .enqueue_parameter_change(ParameterChange::plugin_bypass(ch, id, !enable))
                        .unwrap();
                }
            }
            let active = (0..4)
                .filter_map(|ch| {
                    let id = sends[ch]?;
                    let bypassed = engine.graph(ch)?.config().plugin(id)?.bypassed;
                    (!bypassed).then_some(ch)
                })
                .count();
            prop_assert!(active <= 1, "{} active sends after {:?}", active, ops);
        }
    }
}

#[test]
fn plugin_trait_objects_report_parameters() {
    let registry = PluginRegistry::new();
    for descriptor in registry.all() {
        let plugin: Box<dyn Plugin> = registry.create(descriptor.id).unwrap();
        for i in 0..plugin.param_count() {
            let info = plugin.param_info(i).unwrap();
            let value = plugin.get_param(i);
            assert!(
                value >= info.min && value <= info.max,
                "{} param {} default {} outside {}..{}",
                descriptor.id,
                info.name,
                value,
                info.min,
                info.max
            );
        }
    }
}
