//! Integration tests for hotmic-analysis.
//!
//! Drive the engine's analysis tap into a live orchestrator and read the
//! results back through the ring and signal store APIs.

use std::f32::consts::PI;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use hotmic_analysis::{
    AnalysisOrchestrator, AnalysisSettings, AnalysisSignal, FEATURE_ROW_WIDTH, FrameFeatures,
    FrameRing, VoicingState,
};
use hotmic_core::{AudioProcessor, Engine, EngineSettings, PluginRegistry, RoutingConfig, TapPoint};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const SR: f32 = 48000.0;
const BLOCK: usize = 256;

fn settings() -> AnalysisSettings {
    AnalysisSettings {
        fft_size: 1024,
        hop_size: 256,
        ring_capacity: 32,
        ..AnalysisSettings::default()
    }
}

/// Mic channel with input, gain and output send; returns the gain's ID.
fn voice_engine() -> (Engine, AudioProcessor, i32) {
    let registry = PluginRegistry::new();
    let (mut engine, processor) = Engine::new(EngineSettings::default().with_block_size(BLOCK));
    let mic = engine.add_channel("Mic").unwrap();
    engine.insert_plugin_by_id(mic, &registry, "input_source", 0).unwrap();
    let gain = engine.insert_plugin_by_id(mic, &registry, "gain", 1).unwrap();
    engine.insert_plugin_by_id(mic, &registry, "output_send", 2).unwrap();
    engine.maintain();
    (engine, processor, gain)
}

fn run_tone(processor: &mut AudioProcessor, freq: f32, blocks: usize, start: usize) {
    let mut left = vec![0.0; BLOCK];
    let mut right = vec![0.0; BLOCK];
    for b in start..start + blocks {
        let input: Vec<f32> = (0..BLOCK)
            .map(|i| 0.5 * (2.0 * PI * freq * (b * BLOCK + i) as f32 / SR).sin())
            .collect();
        processor.process(&[&input], &mut left, &mut right);
    }
}

fn wait_for(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}

// ---------------------------------------------------------------------------
// Engine to orchestrator
// ---------------------------------------------------------------------------

#[test]
fn tapped_tone_reaches_signal_store() {
    let (_engine, mut processor, _) = voice_engine();
    let (orchestrator, link) = AnalysisOrchestrator::start(settings(), SR).unwrap();
    processor.set_capture_sink(Box::new(link));

    run_tone(&mut processor, 220.0, 80, 0);
    wait_for("voiced frames", || {
        VoicingState::from_code(orchestrator.last_value(AnalysisSignal::Voicing)) == VoicingState::Voiced
    });
    let pitch = orchestrator.last_value(AnalysisSignal::Pitch);
    assert!((pitch - 220.0).abs() < 3.0, "pitch {pitch}");
    assert_eq!(orchestrator.dropped_blocks(), 0);
    assert_eq!(orchestrator.captured_blocks(), 80);

    let capacity = orchestrator.features().capacity();
    let mut rows = vec![0.0; capacity * FEATURE_ROW_WIDTH];
    let mut ids = vec![0; capacity];
    wait_for("all frames", || orchestrator.features().latest_frame_id() >= 77);
    let update = orchestrator.copy_feature_updates(0, &mut rows, &mut ids).unwrap();
    assert!(update.full_copy_required);
    let newest = orchestrator.features().position(update.latest_frame_id);
    let features = FrameFeatures::from_row(&rows[newest * FEATURE_ROW_WIDTH..(newest + 1) * FEATURE_ROW_WIDTH]);
    assert!((features.pitch_hz().unwrap() - 220.0).abs() < 3.0);
    assert!(features.harmonics_db[0] > -12.0);
}

#[test]
fn tap_switch_resets_but_frame_ids_keep_growing() {
    let (mut engine, mut processor, gain) = voice_engine();
    let (orchestrator, link) = AnalysisOrchestrator::start(settings(), SR).unwrap();
    processor.set_capture_sink(Box::new(link));

    let capacity = orchestrator.spectrogram().capacity();
    let bins = orchestrator.bins();
    let mut frames = vec![0.0; capacity * bins];
    let mut ids = vec![0; capacity];

    run_tone(&mut processor, 300.0, 12, 0);
    wait_for("first frames", || orchestrator.spectrogram().latest_frame_id() >= 9);
    let first = orchestrator
        .copy_spectrogram_updates(0, &mut frames, &mut ids)
        .unwrap();

    engine
        .set_analysis_tap(RoutingConfig {
            tap_channel: 0,
            tap: TapPoint::Plugin { instance_id: gain },
        })
        .unwrap();
    run_tone(&mut processor, 300.0, 12, 12);
    wait_for("switch", || orchestrator.source_switches() == 1);
    wait_for("frames after switch", || {
        orchestrator.spectrogram().latest_frame_id() > first.latest_frame_id
    });

    let second = orchestrator
        .copy_spectrogram_updates(first.latest_frame_id, &mut frames, &mut ids)
        .unwrap();
    assert!(second.latest_frame_id > first.latest_frame_id);
    assert!(!second.full_copy_required);
    // A reset pipeline needs a whole frame (four blocks) before it publishes.
    assert!(second.latest_frame_id - first.latest_frame_id <= 9);
    for id in first.latest_frame_id + 1..=second.latest_frame_id {
        assert_eq!(ids[orchestrator.spectrogram().position(id)], id);
    }
}

#[test]
fn untapped_channel_is_not_captured() {
    let (mut engine, mut processor, _) = voice_engine();
    let registry = PluginRegistry::new();
    let other = engine.add_channel("Other").unwrap();
    engine.insert_plugin_by_id(other, &registry, "input_source", 0).unwrap();
    engine
        .set_analysis_tap(RoutingConfig {
            tap_channel: other,
            tap: TapPoint::Output,
        })
        .unwrap();
    engine.maintain();

    let (orchestrator, link) = AnalysisOrchestrator::start(settings(), SR).unwrap();
    processor.set_capture_sink(Box::new(link));
    run_tone(&mut processor, 200.0, 10, 0);
    assert_eq!(orchestrator.captured_blocks(), 10, "one block per callback from the tapped channel");
}

// ---------------------------------------------------------------------------
// Concurrent readers
// ---------------------------------------------------------------------------

#[test]
fn readers_never_see_torn_frames() {
    let width = 257;
    let (ring, mut writer) = FrameRing::with_writer(16, width).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let ring = Arc::clone(&ring);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut frames = vec![0.0; ring.capacity() * width];
                let mut ids = vec![0; ring.capacity()];
                let mut since = 0;
                let mut polls = 0;
                while !stop.load(Ordering::Acquire) {
                    let update = ring.copy_updates(since, &mut frames, &mut ids).unwrap();
                    assert!(update.latest_frame_id >= since, "frame IDs went backwards");
                    for (pos, &id) in ids.iter().enumerate() {
                        if id == 0 {
                            continue;
                        }
                        let row = &frames[pos * width..(pos + 1) * width];
                        assert!(row.iter().all(|&v| v == id as f32), "torn frame {id}");
                    }
                    since = update.latest_frame_id;
                    polls += 1;
                }
                polls
            })
        })
        .collect();

    let mut row = vec![0.0; width];
    for id in 1..=20_000u64 {
        row.fill(id as f32);
        assert_eq!(writer.publish(&row), id);
    }
    stop.store(true, Ordering::Release);
    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }
}

#[test]
fn lapped_copies_never_skip_frames_silently() {
    let width = 64;
    let (ring, mut writer) = FrameRing::with_writer(4, width).unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let publisher = {
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut row = vec![0.0; width];
            for id in 1..=50_000u64 {
                row.fill(id as f32);
                writer.publish(&row);
            }
            done.store(true, Ordering::Release);
        })
    };

    let mut frames = vec![0.0; ring.capacity() * width];
    let mut ids = vec![0; ring.capacity()];
    let mut since = 0;
    loop {
        let finished = done.load(Ordering::Acquire);
        let update = ring.copy_updates(since, &mut frames, &mut ids).unwrap();
        assert!(update.latest_frame_id >= since);
        if !update.full_copy_required {
            for id in since + 1..=update.latest_frame_id {
                let pos = ring.position(id);
                assert_eq!(ids[pos], id, "frame {id} skipped after cursor {since}");
                assert_eq!(frames[pos * width], id as f32);
            }
        }
        since = update.latest_frame_id;
        if finished && since == ring.latest_frame_id() {
            break;
        }
    }
    publisher.join().unwrap();
    assert_eq!(since, 50_000);
}
