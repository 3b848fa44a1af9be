//! Criterion benchmarks for the hotmic-core audio path
//!
//! Run with: cargo bench -p hotmic-core
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use hotmic_core::routing::{BusInput, InputSource, OutputSend};
use hotmic_core::{Engine, EngineSettings, ParameterChange, PluginRegistry};

const SAMPLE_RATE: f32 = 48000.0;
const BLOCK_SIZES: &[usize] = &[64, 128, 256, 512];

fn generate_test_signal(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE;
            (2.0 * std::f32::consts::PI * 220.0 * t).sin() * 0.5
        })
        .collect()
}

fn bench_voice_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("VoiceChain");
    let registry = PluginRegistry::new();

    for &block_size in BLOCK_SIZES {
        let input = generate_test_signal(block_size);
        let (mut engine, mut processor) =
            Engine::new(EngineSettings::default().with_block_size(block_size));
        let mic = engine.add_channel("Mic").unwrap();
        for (i, id) in ["input_source", "gain", "noise_gate", "compressor", "output_send"]
            .into_iter()
            .enumerate()
        {
            engine.insert_plugin_by_id(mic, &registry, id, i).unwrap();
        }
        engine.maintain();

        let mut left = vec![0.0; block_size];
        let mut right = vec![0.0; block_size];
        group.bench_with_input(
            BenchmarkId::new("process", block_size),
            &block_size,
            |b, _| {
                b.iter(|| {
                    processor.process(&[black_box(input.as_slice())], &mut left, &mut right);
                    black_box(left[0]);
                });
            },
        );
    }

    group.finish();
}

fn bench_bus_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("BusFanout");
    let block_size = 256;
    let input = generate_test_signal(block_size);

    for &listeners in &[1usize, 4, 15] {
        let (mut engine, mut processor) = Engine::new(
            EngineSettings::default()
                .with_block_size(block_size)
                .with_max_channels(listeners + 1),
        );
        let source = engine.add_channel("Source").unwrap();
        engine
            .insert_plugin(source, Box::new(InputSource::new(0)), 0)
            .unwrap();
        for _ in 0..listeners {
            let ch = engine.add_channel("Listener").unwrap();
            engine
                .insert_plugin(ch, Box::new(BusInput::bus(Some(source))), 0)
                .unwrap();
        }
        engine
            .insert_plugin(listeners, Box::new(OutputSend::default()), 1)
            .unwrap();
        engine.maintain();

        let mut left = vec![0.0; block_size];
        let mut right = vec![0.0; block_size];
        group.bench_with_input(
            BenchmarkId::new("process", listeners),
            &listeners,
            |b, _| {
                b.iter(|| processor.process(&[black_box(input.as_slice())], &mut left, &mut right));
            },
        );
    }

    group.finish();
}

fn bench_parameter_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("ParameterQueue");
    let block_size = 256;
    let input = generate_test_signal(block_size);
    let registry = PluginRegistry::new();

    let (mut engine, mut processor) =
        Engine::new(EngineSettings::default().with_block_size(block_size));
    let mic = engine.add_channel("Mic").unwrap();
    engine.insert_plugin_by_id(mic, &registry, "input_source", 0).unwrap();
    let trim = engine.insert_plugin_by_id(mic, &registry, "gain", 1).unwrap();
    engine.maintain();

    let mut left = vec![0.0; block_size];
    let mut right = vec![0.0; block_size];
    group.bench_function("enqueue_and_apply_32", |b| {
        b.iter(|| {
            for i in 0..32 {
                let change = ParameterChange::plugin_parameter(mic, trim, 0, -(i as f32) * 0.5);
                black_box(engine.enqueue_parameter_change(change).ok());
            }
            processor.process(&[input.as_slice()], &mut left, &mut right);
        });
    });

    group.bench_function("routing_rebuild_16", |b| {
        let (mut engine, _processor) =
            Engine::new(EngineSettings::default().with_block_size(block_size));
        for ch in 0..16 {
            engine.add_channel("ch").unwrap();
            if ch > 0 {
                engine
                    .insert_plugin(ch, Box::new(BusInput::bus(Some(ch - 1))), 0)
                    .unwrap();
            }
        }
        b.iter(|| black_box(engine.rebuild_routing_graph()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_voice_chain,
    bench_bus_fanout,
    bench_parameter_queue
);
criterion_main!(benches);
