//! Integration tests for chains of components
//!
//! These tests validate complete pipelines:
//! - Sources feeding encoders and multi-source sinks
//! - Frame accumulation across iterations
//! - Source eviction while a chain keeps running
//! - Teardown of every component

mod common;

use common::mock_helpers::{create_test_video_output, RecordingRenderer};
use mediaflow_rs::config::{AudioOutputConfig, EncoderConfig};
use mediaflow_rs::pipeline::components::{
    AudioOutput, FrameEncoderComponent, NullAudioBackend, PcmFrameEncoder, TestPatternConfig,
    TestPatternSource, ToneConfig, ToneSource,
};
use mediaflow_rs::pipeline::{Chain, Initialize, Iteration, ManualClock, SessionEvent};
use std::sync::Arc;
use std::time::Duration;

fn pattern(source_id: u64, stop_after: Option<u64>) -> TestPatternSource {
    let mut p = TestPatternSource::new(format!("pattern-{}", source_id));
    p.init(TestPatternConfig {
        source_id,
        geometries: vec![(8, 6), (16, 12)],
        iterations_per_geometry: 3,
        stop_after: stop_after.map(Iteration),
    })
    .unwrap();
    p
}

fn tone(samples_per_iteration: usize) -> ToneSource {
    let mut t = ToneSource::new("tone");
    t.init(ToneConfig {
        source_id: 20,
        samples_per_iteration,
        ..ToneConfig::default()
    })
    .unwrap();
    t
}

fn encoder(frame_size: usize) -> FrameEncoderComponent<PcmFrameEncoder> {
    let config = EncoderConfig {
        frame_size,
        sample_rate: 8000,
    };
    let mut e = FrameEncoderComponent::new("pcm", PcmFrameEncoder::new(&config).unwrap()).unwrap();
    e.init(()).unwrap();
    e
}

#[test]
fn test_video_chain_with_quiet_source() {
    let (video, clock, events) = create_test_video_output(1.0);
    let directory = video.view_directory();
    let mut chain = Chain::new();
    let steady = chain.add_component(pattern(1, None));
    let quiet = chain.add_component(pattern(2, Some(2)));
    let sink = chain.add_component(video);
    chain.link(steady, sink).unwrap();
    chain.link(quiet, sink).unwrap();

    let mut view = directory.attach(1);
    let mut renderer = RecordingRenderer::default();
    for _ in 0..8 {
        clock.advance(Duration::from_millis(400));
        let report = chain.run_iteration();
        assert!(report.is_clean());
        view.render_pending(&mut renderer).unwrap();
    }

    // Source 2 last pushed at 0.8s and is gone once more than 1s has passed.
    let events: Vec<_> = events.try_iter().collect();
    assert_eq!(
        events,
        vec![
            SessionEvent::NewSource(1),
            SessionEvent::NewSource(2),
            SessionEvent::RemovedSource(2),
        ]
    );
    assert_eq!(renderer.frames.len(), 8);
    // 8x6 for three iterations, 16x12 for three, then 8x6 again.
    assert_eq!(renderer.resizes.len(), 3);

    assert!(chain.destroy_all().is_empty());
    assert!(!view.is_attached());
}

#[test]
fn test_encoder_chain_yields_one_frame_per_block() {
    let mut chain = Chain::new();
    let src = chain.add_component(tone(160));
    let enc = chain.add_component(encoder(160));
    chain.link(src, enc).unwrap();

    for i in 1..=5 {
        let report = chain.run_iteration();
        assert_eq!(report.iteration, Iteration(i));
        assert_eq!(report.dropped, 1);
    }
}

#[test]
fn test_encoder_chain_with_partial_blocks() {
    let mut chain = Chain::new();
    let src = chain.add_component(tone(100));
    let enc = chain.add_component(encoder(160));
    chain.link(src, enc).unwrap();

    // 100 samples per iteration into 160-sample frames: 8 iterations, 5 frames.
    let frames: usize = (0..8).map(|_| chain.run_iteration().dropped).sum();
    assert_eq!(frames, 5);
}

#[test]
fn test_audio_chain_tracks_voices() {
    let clock = ManualClock::new();
    let mut speaker =
        AudioOutput::new("speaker", NullAudioBackend::new()).with_clock(Arc::new(clock.clone()));
    speaker.init(AudioOutputConfig::with_timeout_secs(1.0)).unwrap();
    let directory = speaker.source_directory().unwrap();

    let mut chain = Chain::new();
    let src = chain.add_component(tone(80));
    let out = chain.add_component(speaker);
    chain.link(src, out).unwrap();

    for _ in 0..4 {
        assert!(chain.run_iteration().is_clean());
    }
    assert_eq!(
        directory.list_active_sources().into_iter().collect::<Vec<_>>(),
        vec![20]
    );
    assert_eq!(directory.session_info(20).unwrap().messages, 4);

    assert!(chain.destroy_all().is_empty());
    assert!(directory.list_active_sources().is_empty());
}
